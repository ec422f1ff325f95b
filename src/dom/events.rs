use actix::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    Submit,
    Input,
    Focus,
}

/// One element the event travelled through.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathEntry {
    pub tag: String,
    #[serde(default)]
    pub tour_id: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
}

/// An event as seen by capture-phase listeners on the document.
#[derive(Message, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[rtype(result = "()")]
pub struct DomEvent {
    pub kind: EventKind,
    /// Innermost element first, document root last.
    pub path: Vec<PathEntry>,
    /// For submits: current values of the tour-identified controls inside the form.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl DomEvent {
    pub fn passes_through(&self, tour_id: &str) -> bool {
        self.path.iter().any(|entry| entry.tour_id.as_deref() == Some(tour_id))
    }

    pub fn field(&self, tour_id: &str) -> Option<&str> {
        self.fields.get(tour_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Capture-phase listeners, notified in registration order.
#[derive(Default)]
pub struct Listeners {
    next: u64,
    entries: Vec<(ListenerId, Recipient<DomEvent>)>,
}

impl Listeners {
    pub fn add(&mut self, recipient: Recipient<DomEvent>) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, recipient));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn dispatch(&self, event: &DomEvent) {
        for (_, recipient) in &self.entries {
            recipient.do_send(event.clone());
        }
    }
}
