//! The only layer that reads or drives the page outside the tour's own overlay.
//!
//! Every call re-queries the current mirror, so nothing here can go stale
//! across snapshots. A missing element is an ordinary outcome: lookups return
//! `None`, actions become no-ops, and nothing panics.

use actix::prelude::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::TourConfig;
use crate::dom::document::{lock, SharedDocument};
use crate::dom::events::EventKind;
use crate::dom::{ElementData, NodeId};

/// Instructions replayed by the browser client against the real page.
#[derive(Message, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[rtype(result = "()")]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeCommand {
    Click { selector: String },
    Focus { selector: String },
    SetValue { selector: String, value: String },
    ScrollToTop { smooth: bool },
}

pub trait DomBridge {
    fn find(&self, tour_id: &str) -> Option<NodeId>;
    fn is_visible(&self, node: NodeId) -> bool;
    fn click(&self, node: NodeId);
    fn focus(&self, node: NodeId);
    /// Writes `text` only over an empty or whitespace value. Returns whether it wrote.
    fn set_value_if_empty(&self, node: NodeId, text: &str) -> bool;
    /// Triggers the dismiss control of an open element. Returns whether a
    /// close action was performed.
    fn close_if_open(&self, tour_id: &str, visibility: &dyn Fn(NodeId) -> bool) -> bool;
    fn scroll_to_top(&self);
}

static CLOSE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(close|dismiss)\b").unwrap());
static CLOSE_ICON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(x|close|x-?mark|cross)$|close").unwrap());

#[derive(Clone)]
pub struct DocumentBridge {
    document: SharedDocument,
    config: Arc<TourConfig>,
}

impl DocumentBridge {
    pub fn new(document: SharedDocument, config: Arc<TourConfig>) -> Self {
        Self { document, config }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Primary lookup: a control whose accessible label is exactly the
    /// configured close label.
    fn labelled_close_control(&self, container: &ElementData) -> Option<NodeId> {
        container
            .descendants()
            .into_iter()
            .find(|el| el.attr("aria-label") == Some(self.config.close_label.as_str()))
            .map(|el| el.id)
    }
}

/// Fallback lookup: a button in the container's header region carrying a
/// close icon marker, or a label that merely mentions closing.
fn heuristic_close_control(container: &ElementData) -> Option<NodeId> {
    let header = container
        .descendants()
        .into_iter()
        .find(|el| el.tag_name == "header" || el.attr("class").is_some_and(|c| c.split_whitespace().any(|w| w.ends_with("header"))))?;

    header
        .descendants()
        .into_iter()
        .filter(|el| el.tag_name == "button" || el.attr("role") == Some("button"))
        .find(|button| {
            if button.attr("aria-label").is_some_and(|label| CLOSE_LABEL.is_match(label)) {
                return true;
            }
            std::iter::once(*button)
                .chain(button.descendants())
                .any(|el| has_close_icon(el))
        })
        .map(|el| el.id)
}

fn has_close_icon(el: &ElementData) -> bool {
    let icon_attr = ["data-icon", "data-lucide", "data-testid"]
        .iter()
        .filter_map(|name| el.attr(name))
        .any(|value| CLOSE_ICON.is_match(value));
    let icon_class = el
        .attr("class")
        .is_some_and(|class| class.split_whitespace().any(|c| c.contains("close") || c == "lucide-x"));
    icon_attr || icon_class
}

impl DomBridge for DocumentBridge {
    fn find(&self, tour_id: &str) -> Option<NodeId> {
        let found = lock(&self.document).find(tour_id);
        if found.is_none() {
            log::debug!("Tour target '{}' is not on the page right now", tour_id);
        }
        found
    }

    fn is_visible(&self, node: NodeId) -> bool {
        lock(&self.document).dom().is_rendered(node)
    }

    fn click(&self, node: NodeId) {
        let document = lock(&self.document);
        let Some(selector) = document.selector_for(node) else {
            return;
        };
        document.dispatch_on(EventKind::Click, node);
        document.push_command(BridgeCommand::Click { selector });
    }

    fn focus(&self, node: NodeId) {
        let mut document = lock(&self.document);
        let Some(selector) = document.selector_for(node) else {
            return;
        };
        if document.focus(node) {
            document.dispatch_on(EventKind::Focus, node);
            document.push_command(BridgeCommand::Focus { selector });
        }
    }

    fn set_value_if_empty(&self, node: NodeId, text: &str) -> bool {
        let mut document = lock(&self.document);
        let Some(current) = document.value_of(node) else {
            return false;
        };
        if !current.trim().is_empty() {
            log::debug!("The field already holds text, leaving it alone");
            return false;
        }
        let Some(selector) = document.selector_for(node) else {
            return false;
        };
        document.set_value(node, text);
        // Reactive bindings only pick the value up from an input event.
        document.dispatch_on(EventKind::Input, node);
        document.push_command(BridgeCommand::SetValue { selector, value: text.to_string() });
        true
    }

    fn close_if_open(&self, tour_id: &str, visibility: &dyn Fn(NodeId) -> bool) -> bool {
        let Some(node) = self.find(tour_id) else {
            return false;
        };
        if !visibility(node) {
            return false;
        }

        let control = {
            let document = lock(&self.document);
            let Some(container) = document.dom().get(node) else {
                return false;
            };
            self.labelled_close_control(container).or_else(|| {
                log::debug!("No '{}' control in '{}', trying the header buttons", self.config.close_label, tour_id);
                heuristic_close_control(container)
            })
        };

        match control {
            Some(button) => {
                self.click(button);
                true
            }
            None => {
                log::debug!("Could not find a way to close '{}', leaving it open", tour_id);
                false
            }
        }
    }

    fn scroll_to_top(&self) {
        let mut document = lock(&self.document);
        document.set_scroll_top(0);
        document.push_command(BridgeCommand::ScrollToTop { smooth: true });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::document::Document;

    const PAGE: &str = r#"
        <html><body>
          <button data-tour="chat-dock-toggle">Chat</button>
          <div data-tour="chat-dock-menu" hidden>
            <button data-tour="ai-menu-entry">AI</button>
          </div>
          <section data-tour="chat-popup">
            <header><span>Assistant</span><button aria-label="Close"><svg data-icon="x"></svg></button></header>
            <form data-tour="chat-form">
              <textarea data-tour="message-input"></textarea>
              <input data-tour="subject" value="  already typed ">
            </form>
          </section>
          <section data-tour="legacy-popup">
            <div class="popup-header"><button><i class="icon-close"></i></button></div>
          </section>
          <section data-tour="stubborn-popup"><header><button>Help</button></header></section>
          <details><summary data-tour="summary">More</summary><p data-tour="details-body">Body</p></details>
        </body></html>
    "#;

    fn bridge() -> DocumentBridge {
        let document = Document::from_html(PAGE, "data-tour").unwrap().shared();
        DocumentBridge::new(document, Arc::new(TourConfig::default()))
    }

    #[test]
    fn test_find_missing_target_is_none() {
        let bridge = bridge();
        assert!(bridge.find("chat-popup").is_some());
        assert!(bridge.find("does-not-exist").is_none());
    }

    #[test]
    fn test_visibility_rules() {
        let bridge = bridge();
        let toggle = bridge.find("chat-dock-toggle").unwrap();
        let entry = bridge.find("ai-menu-entry").unwrap();
        let summary = bridge.find("summary").unwrap();
        let details_body = bridge.find("details-body").unwrap();
        assert!(bridge.is_visible(toggle));
        assert!(!bridge.is_visible(entry), "inside a hidden menu");
        assert!(bridge.is_visible(summary));
        assert!(!bridge.is_visible(details_body), "inside a closed details element");
    }

    #[test]
    fn test_set_value_if_empty_writes_once() {
        let bridge = bridge();
        let input = bridge.find("message-input").unwrap();
        assert!(bridge.set_value_if_empty(input, "Hello"));
        assert!(!bridge.set_value_if_empty(input, "Something else"));
        let value = lock(bridge.document()).value_of(input).unwrap();
        assert_eq!(value, "Hello");
    }

    #[test]
    fn test_set_value_if_empty_keeps_existing_text() {
        let bridge = bridge();
        let subject = bridge.find("subject").unwrap();
        assert!(!bridge.set_value_if_empty(subject, "Seed"));
        assert_eq!(lock(bridge.document()).value_of(subject).unwrap(), "  already typed ");
    }

    #[test]
    fn test_close_prefers_exact_label() {
        let bridge = bridge();
        let closed = bridge.close_if_open("chat-popup", &|node| bridge.is_visible(node));
        assert!(closed);
    }

    #[test]
    fn test_close_falls_back_to_header_icon() {
        let bridge = bridge();
        let container = {
            let document = lock(bridge.document());
            let node = document.find("legacy-popup").unwrap();
            document.dom().get(node).cloned().unwrap()
        };
        assert!(bridge.labelled_close_control(&container).is_none());
        assert!(heuristic_close_control(&container).is_some());
        assert!(bridge.close_if_open("legacy-popup", &|node| bridge.is_visible(node)));
    }

    #[test]
    fn test_close_without_control_or_when_hidden() {
        let bridge = bridge();
        assert!(!bridge.close_if_open("stubborn-popup", &|node| bridge.is_visible(node)));
        assert!(!bridge.close_if_open("chat-popup", &|_| false));
        assert!(!bridge.close_if_open("missing", &|_| true));
    }

    #[test]
    fn test_focus_and_scroll() {
        let bridge = bridge();
        let input = bridge.find("message-input").unwrap();
        bridge.focus(input);
        lock(bridge.document()).set_scroll_top(420);
        bridge.scroll_to_top();
        let document = lock(bridge.document());
        assert_eq!(document.focused(), Some(input));
        assert_eq!(document.scroll_top(), 0);
    }

    #[test]
    fn test_selector_for_unlabelled_button() {
        let bridge = bridge();
        let document = lock(bridge.document());
        let node = document.find("legacy-popup").unwrap();
        let container = document.dom().get(node).unwrap();
        let button = heuristic_close_control(container).unwrap();
        assert_eq!(
            document.selector_for(button).unwrap(),
            "[data-tour=\"legacy-popup\"] > div:nth-child(1) > button:nth-child(1)"
        );
    }
}
