use actix_rt::time::sleep;
use serde::Serialize;

use crate::bridge::DomBridge;
use crate::config::TourConfig;

/// Opens whatever UI the upcoming step points at. Missing anchors are skipped;
/// the step is shown either way.
pub async fn prepare_step<B: DomBridge>(bridge: &B, config: &TourConfig, index: usize) {
    let targets = &config.targets;
    match index {
        1 => {
            if !is_open(bridge, &targets.dock_menu) {
                if let Some(toggle) = bridge.find(&targets.dock_toggle) {
                    log::debug!("Opening the chat dock before step 1");
                    bridge.click(toggle);
                    sleep(config.dock_settle()).await;
                }
            }
        }
        2 => {
            if !is_open(bridge, &targets.chat_popup) {
                if let Some(entry) = bridge.find(&targets.ai_menu_entry) {
                    log::debug!("Opening the chat popup before step 2");
                    bridge.click(entry);
                    sleep(config.popup_settle()).await;
                }
            }
        }
        _ => {}
    }
}

fn is_open<B: DomBridge>(bridge: &B, tour_id: &str) -> bool {
    bridge.find(tour_id).is_some_and(|node| bridge.is_visible(node))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub popup_closed: bool,
    pub menu_closed: bool,
}

/// Puts the page back the way step 0 expects it: popup and dock menu closed,
/// scrolled to the top.
pub async fn reset_ui<B: DomBridge>(bridge: &B, config: &TourConfig) -> ResetReport {
    let targets = &config.targets;
    let mut report = ResetReport::default();

    report.popup_closed = bridge.close_if_open(&targets.chat_popup, &|node| bridge.is_visible(node));
    if report.popup_closed {
        sleep(config.dock_settle()).await;
    }

    if is_open(bridge, &targets.dock_menu) {
        if let Some(toggle) = bridge.find(&targets.dock_toggle) {
            bridge.click(toggle);
            report.menu_closed = true;
            sleep(config.dock_settle()).await;
        }
    }

    bridge.scroll_to_top();
    sleep(config.reset_settle()).await;
    report
}
