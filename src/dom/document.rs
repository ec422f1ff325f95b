use actix::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::events::{DomEvent, EventKind, ListenerId, Listeners, PathEntry};
use super::{parser, Dom, NodeId, RENDERED_MARKER};
use crate::bridge::BridgeCommand;
use crate::errors::TourError;

pub type SharedDocument = Arc<Mutex<Document>>;

/// Locks the mirror. A panic while holding the lock leaves the tree intact, so
/// poisoning is ignored.
pub fn lock(document: &SharedDocument) -> MutexGuard<'_, Document> {
    document.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server-side mirror of the page the tour runs on.
pub struct Document {
    dom: Dom,
    tour_attribute: String,
    listeners: Listeners,
    focused: Option<NodeId>,
    scroll_top: u32,
    command_sink: Option<Recipient<BridgeCommand>>,
}

impl Document {
    pub fn new(dom: Dom, tour_attribute: &str) -> Self {
        Self {
            dom,
            tour_attribute: tour_attribute.to_string(),
            listeners: Listeners::default(),
            focused: None,
            scroll_top: 0,
            command_sink: None,
        }
    }

    pub fn from_html(html: &str, tour_attribute: &str) -> Result<Self, TourError> {
        Ok(Self::new(parser::parse(html)?, tour_attribute))
    }

    pub fn shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn find(&self, tour_id: &str) -> Option<NodeId> {
        self.dom.find_by_attr(&self.tour_attribute, tour_id).map(|el| el.id)
    }

    pub fn tour_id_of(&self, node: NodeId) -> Option<String> {
        self.dom.get(node).and_then(|el| el.attr(&self.tour_attribute)).map(str::to_string)
    }

    /// Swaps in a fresh snapshot from the browser. Listeners survive, and focus
    /// follows the element's tour identifier when it has one.
    pub fn replace_snapshot(&mut self, dom: Dom) {
        let focused_tour_id = self.focused.and_then(|node| self.tour_id_of(node));
        self.dom = dom;
        self.focused = focused_tour_id.and_then(|tour_id| self.find(&tour_id));
    }

    pub fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    pub fn set_scroll_top(&mut self, scroll_top: u32) {
        self.scroll_top = scroll_top;
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn focus(&mut self, node: NodeId) -> bool {
        if self.dom.get(node).is_none() {
            return false;
        }
        self.focused = Some(node);
        true
    }

    pub fn value_of(&self, node: NodeId) -> Option<String> {
        self.dom.get(node).map(|el| el.value())
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) -> bool {
        match self.dom.get_mut(node) {
            Some(el) => {
                el.set_value(value);
                true
            }
            None => false,
        }
    }

    /// Toggles the `hidden` attribute. A measured visibility from the last
    /// snapshot no longer applies afterwards.
    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) -> bool {
        if let Some(el) = self.dom.get_mut(node) {
            el.attributes.remove(RENDERED_MARKER);
        }
        match self.dom.get_mut(node) {
            Some(el) if hidden => {
                el.attributes.insert("hidden".to_string(), String::new());
                true
            }
            Some(el) => {
                el.attributes.remove("hidden");
                true
            }
            None => false,
        }
    }

    pub fn event_path(&self, node: NodeId) -> Vec<PathEntry> {
        self.dom
            .ancestors(node)
            .into_iter()
            .map(|el| PathEntry {
                tag: el.tag_name.clone(),
                tour_id: el.attr(&self.tour_attribute).map(str::to_string),
                aria_label: el.attr("aria-label").map(str::to_string),
            })
            .collect()
    }

    /// Values of the tour-identified controls inside `form`.
    pub fn form_fields(&self, form: NodeId) -> HashMap<String, String> {
        let Some(form_el) = self.dom.get(form) else {
            return HashMap::new();
        };
        form_el
            .descendants()
            .into_iter()
            .filter(|el| el.is_form_control())
            .filter_map(|el| el.attr(&self.tour_attribute).map(|id| (id.to_string(), el.value())))
            .collect()
    }

    /// Builds an event on `node` and hands it to the listeners. A click on a
    /// submit button also submits its form, as a browser would.
    pub fn dispatch_on(&self, kind: EventKind, node: NodeId) -> bool {
        if self.dom.get(node).is_none() {
            return false;
        }
        let fields = if kind == EventKind::Submit { self.form_fields(node) } else { HashMap::new() };
        self.dispatch(&DomEvent { kind, path: self.event_path(node), fields });

        if kind == EventKind::Click {
            if let Some(form) = self.submitted_form(node) {
                self.dispatch(&DomEvent {
                    kind: EventKind::Submit,
                    path: self.event_path(form),
                    fields: self.form_fields(form),
                });
            }
        }
        true
    }

    fn submitted_form(&self, node: NodeId) -> Option<NodeId> {
        let ancestors = self.dom.ancestors(node);
        let button = ancestors.iter().position(|el| match el.tag_name.as_str() {
            "button" => el.attr("type").map_or(true, |t| t.eq_ignore_ascii_case("submit")),
            "input" => el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("submit")),
            _ => false,
        })?;
        ancestors[button..].iter().find(|el| el.tag_name == "form").map(|el| el.id)
    }

    pub fn dispatch(&self, event: &DomEvent) {
        self.listeners.dispatch(event);
    }

    pub fn add_listener(&mut self, recipient: Recipient<DomEvent>) -> ListenerId {
        self.listeners.add(recipient)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_command_sink(&mut self, sink: Recipient<BridgeCommand>) {
        self.command_sink = Some(sink);
    }

    pub fn push_command(&self, command: BridgeCommand) {
        match &self.command_sink {
            Some(sink) => sink.do_send(command),
            None => log::trace!("No browser attached, keeping {:?} in the mirror only", command),
        }
    }

    /// A CSS selector the browser can resolve to the same element. Anchored at
    /// the nearest tour identifier or html id.
    pub fn selector_for(&self, node: NodeId) -> Option<String> {
        let path = self.dom.path_to(node)?;
        let mut segments = Vec::new();
        for i in (0..path.len()).rev() {
            let el = path[i];
            if let Some(tour_id) = el.attr(&self.tour_attribute) {
                segments.push(format!("[{}=\"{}\"]", self.tour_attribute, tour_id));
                break;
            }
            if let Some(html_id) = el.html_id() {
                segments.push(format!("#{}", html_id));
                break;
            }
            if i == 0 || el.tag_name == "html" {
                segments.push(el.tag_name.clone());
                break;
            }
            let position = path[i - 1]
                .element_children()
                .position(|child| child.id == el.id)
                .unwrap_or(0)
                + 1;
            segments.push(format!("{}:nth-child({})", el.tag_name, position));
        }
        segments.reverse();
        Some(segments.join(" > "))
    }
}
