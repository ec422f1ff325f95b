//! A self-contained page with the chat dock, menu and popup the tour drives,
//! plus actors that play their part. Used by the `simulate` command and by
//! the scenario tests.

use actix::prelude::*;
use colored::*;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::tour::{GetContext, RunStepAction, TourActor, TourContext};
use crate::bridge::DocumentBridge;
use crate::config::{TourConfig, TourTargets};
use crate::dom::document::{lock, Document, SharedDocument};
use crate::dom::events::{DomEvent, EventKind, ListenerId};
use crate::errors::TourError;
use crate::store::{CompletionFlag, FlagStore, MemoryStore};

pub const PLAYGROUND_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Clinic dashboard</title></head>
<body>
  <header class="topbar">
    <h1>Today</h1>
    <button data-tour="start-tour">Start tour</button>
  </header>
  <main>
    <table data-tour="appointments">
      <tr><td>09:00</td><td>Follow-up</td></tr>
      <tr><td>10:30</td><td>New patient</td></tr>
    </table>
  </main>
  <aside data-tour="chat-dock">
    <button data-tour="chat-dock-toggle" aria-label="Chat"><svg data-icon="message-circle"></svg></button>
    <nav data-tour="chat-dock-menu" hidden>
      <button data-tour="ai-menu-entry">AI assistant</button>
      <button data-tour="front-desk-entry">Front desk</button>
    </nav>
  </aside>
  <section data-tour="chat-popup" hidden>
    <div class="popup-header">
      <span>AI assistant</span>
      <button aria-label="Close"><svg data-icon="x"></svg></button>
    </div>
    <form data-tour="chat-form">
      <textarea data-tour="message-input"></textarea>
      <button type="submit" data-tour="message-send">Send</button>
    </form>
  </section>
</body>
</html>"#;

/// The dock, its menu and the chat popup, reacting to clicks the way the
/// real widgets do.
pub struct ChatWidgets {
    document: SharedDocument,
    targets: TourTargets,
    close_label: String,
    listener: Option<ListenerId>,
}

impl ChatWidgets {
    /// Starts the widgets with their listener already on the document, so a
    /// click dispatched right after this returns is not missed.
    pub fn attach(document: SharedDocument, config: &TourConfig) -> Addr<Self> {
        ChatWidgets::create(|ctx| {
            let listener = lock(&document).add_listener(ctx.address().recipient());
            Self {
                document,
                targets: config.targets.clone(),
                close_label: config.close_label.clone(),
                listener: Some(listener),
            }
        })
    }

    fn toggle(&self, tour_id: &str, force: Option<bool>) {
        let mut document = lock(&self.document);
        let Some(node) = document.find(tour_id) else {
            return;
        };
        let hidden = document.dom().get(node).is_some_and(|el| el.has_attr("hidden"));
        document.set_hidden(node, force.map_or(!hidden, |show| !show));
    }

    fn is_close_click(&self, event: &DomEvent) -> bool {
        event.passes_through(&self.targets.chat_popup)
            && event.path.iter().any(|entry| {
                entry
                    .aria_label
                    .as_deref()
                    .is_some_and(|label| label == self.close_label || label.eq_ignore_ascii_case("close"))
            })
    }
}

impl Actor for ChatWidgets {
    type Context = Context<Self>;

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        if let Some(id) = self.listener.take() {
            lock(&self.document).remove_listener(id);
        }
        Running::Stop
    }
}

impl Handler<DomEvent> for ChatWidgets {
    type Result = ();

    fn handle(&mut self, event: DomEvent, _ctx: &mut Context<Self>) {
        match event.kind {
            EventKind::Click if event.passes_through(&self.targets.dock_toggle) => {
                self.toggle(&self.targets.dock_menu, None);
            }
            EventKind::Click if event.passes_through(&self.targets.ai_menu_entry) => {
                self.toggle(&self.targets.chat_popup, Some(true));
            }
            EventKind::Click if self.is_close_click(&event) => {
                self.toggle(&self.targets.chat_popup, Some(false));
            }
            EventKind::Submit => {
                let sent = event.field(&self.targets.message_input).is_some_and(|t| !t.trim().is_empty());
                if sent {
                    let mut document = lock(&self.document);
                    if let Some(input) = document.find(&self.targets.message_input) {
                        document.set_value(input, "");
                    }
                }
            }
            _ => {}
        }
    }
}

/// Acts as the person in front of the page.
#[derive(Clone)]
pub struct Visitor {
    document: SharedDocument,
}

impl Visitor {
    pub fn new(document: SharedDocument) -> Self {
        Self { document }
    }

    pub fn click(&self, tour_id: &str) -> bool {
        let document = lock(&self.document);
        match document.find(tour_id) {
            Some(node) => document.dispatch_on(EventKind::Click, node),
            None => false,
        }
    }

    pub fn type_text(&self, tour_id: &str, text: &str) -> bool {
        let mut document = lock(&self.document);
        let Some(node) = document.find(tour_id) else {
            return false;
        };
        document.set_value(node, text);
        document.dispatch_on(EventKind::Input, node)
    }

    pub fn submit(&self, tour_id: &str) -> bool {
        let document = lock(&self.document);
        match document.find(tour_id) {
            Some(node) => document.dispatch_on(EventKind::Submit, node),
            None => false,
        }
    }

    pub fn is_visible(&self, tour_id: &str) -> bool {
        let document = lock(&self.document);
        document.find(tour_id).is_some_and(|node| document.dom().is_rendered(node))
    }

    pub fn value_of(&self, tour_id: &str) -> Option<String> {
        let document = lock(&self.document);
        document.find(tour_id).and_then(|node| document.value_of(node))
    }
}

pub struct Playground {
    pub document: SharedDocument,
    pub bridge: DocumentBridge,
    pub visitor: Visitor,
}

/// Loads the playground page and starts its widgets. Must run inside an
/// actix system. The document's listener keeps the widgets alive.
pub fn start_playground(config: Arc<TourConfig>) -> Result<Playground, TourError> {
    let document = Document::from_html(PLAYGROUND_HTML, &config.tour_attribute)?.shared();
    ChatWidgets::attach(document.clone(), &config);
    Ok(Playground {
        bridge: DocumentBridge::new(document.clone(), config),
        visitor: Visitor::new(document.clone()),
        document,
    })
}

fn describe(context: &TourContext) -> String {
    if !context.is_open {
        return "closed".dimmed().to_string();
    }
    let text = context
        .steps
        .get(context.current_step_index)
        .map(|view| view.text.as_str())
        .unwrap_or_default();
    format!("{} {}", format!("step {}", context.current_step_index).cyan(), text)
}

/// Walks a first-time visitor through the whole tour against the playground
/// page and prints what happens.
pub async fn run_simulation(config: Arc<TourConfig>) -> anyhow::Result<()> {
    let playground = start_playground(config.clone())?;
    let store: Arc<dyn FlagStore> = Arc::new(MemoryStore::new());
    let flag = CompletionFlag::new(store, &config.completion_key);
    let tour = TourActor::new(config.clone(), playground.bridge.clone(), flag.clone()).start();

    let settle = config.popup_settle() + config.dock_settle() + Duration::from_millis(50);
    let show = |label: &str, context: &TourContext| println!("{:>16}  {}", label.bold(), describe(context));

    actix_rt::time::sleep(settle).await;
    show("page loaded", &tour.send(GetContext).await?);

    playground.visitor.click(&config.targets.dock_toggle);
    actix_rt::time::sleep(settle).await;
    show("dock opened", &tour.send(GetContext).await?);

    playground.visitor.click(&config.targets.ai_menu_entry);
    actix_rt::time::sleep(settle).await;
    show("assistant opened", &tour.send(GetContext).await?);

    tour.send(RunStepAction).await??;
    actix_rt::time::sleep(config.seed_delay() + Duration::from_millis(50)).await;
    show("start chatting", &tour.send(GetContext).await?);

    let seeded = playground.visitor.value_of(&config.targets.message_input).unwrap_or_default();
    println!("{:>16}  {:?}", "chat input".bold(), seeded);
    println!("{:>16}  {}", "completed".bold(), flag.is_set());
    Ok(())
}
