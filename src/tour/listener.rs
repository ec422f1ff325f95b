use std::time::Duration;

use crate::config::TourConfig;
use crate::dom::events::{DomEvent, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// Move to `to` once the collaborator's open animation has had `delay`.
    AdvanceAfter { to: usize, delay: Duration },
    /// The viewer sent a message: close and mark the tour completed.
    Terminate,
}

/// Decides how the tour answers a user interaction. Purely event-reactive:
/// nothing here ever advances on a timer alone.
pub fn react(event: &DomEvent, current_step_index: usize, is_open: bool, config: &TourConfig) -> Option<Reaction> {
    if !is_open {
        return None;
    }
    let targets = &config.targets;
    match event.kind {
        EventKind::Click if event.passes_through(&targets.message_send) => Some(Reaction::Terminate),
        EventKind::Click if current_step_index == 0 && event.passes_through(&targets.dock_toggle) => {
            Some(Reaction::AdvanceAfter { to: 1, delay: config.dock_settle() })
        }
        EventKind::Click if current_step_index == 1 && event.passes_through(&targets.ai_menu_entry) => {
            Some(Reaction::AdvanceAfter { to: 2, delay: config.popup_settle() })
        }
        EventKind::Submit => {
            let has_message = event
                .field(&targets.message_input)
                .is_some_and(|text| !text.trim().is_empty());
            has_message.then_some(Reaction::Terminate)
        }
        _ => None,
    }
}
