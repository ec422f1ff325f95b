use actix::prelude::*;
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::actors::tour::{Detach, GetContext, StateChanged, TourActor, TourContext};
use crate::actors::ws_server::{Connect, Disconnect, WsServer};
use crate::bridge::{BridgeCommand, DocumentBridge};
use crate::config::TourConfig;
use crate::dom::document::{lock, Document, SharedDocument};
use crate::dom::events::DomEvent;
use crate::dom::parser;
use crate::errors::TourError;
use crate::store::{CompletionFlag, FlagStore, ScopedStore};

/// Mirror contents until the page's first snapshot arrives.
const BLANK_PAGE: &str = "<html><head></head><body></body></html>";

/// What the browser client reports about the live page.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Snapshot {
        html: String,
        #[serde(default)]
        scroll_top: Option<u32>,
    },
    Event(DomEvent),
}

/// The tour as one page sees it. `page` is the id its control requests carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageState {
    pub page: String,
    pub can_start_tour: bool,
    #[serde(flatten)]
    pub context: TourContext,
}

/// Everything the server pushes to an attached browser.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    State(PageState),
    Command(BridgeCommand),
}

/// Applies one client report to the mirror. Events go to the document's
/// listeners exactly as a local dispatch would.
pub fn apply_client_message(document: &SharedDocument, message: ClientMessage) -> Result<(), TourError> {
    match message {
        ClientMessage::Snapshot { html, scroll_top } => {
            let dom = parser::parse(&html)?;
            let mut document = lock(document);
            document.replace_snapshot(dom);
            if let Some(scroll_top) = scroll_top {
                document.set_scroll_top(scroll_top);
            }
        }
        ClientMessage::Event(event) => lock(document).dispatch(&event),
    }
    Ok(())
}

/// What every page's tour is built from.
#[derive(Clone)]
pub struct TourSetup {
    pub config: Arc<TourConfig>,
    pub store: Arc<dyn FlagStore>,
}

impl TourSetup {
    /// A fresh mirror and tour for one page. The completion flag lives in the
    /// viewer's slice of the store and is read as the tour starts.
    pub fn start_tour(
        &self,
        viewer: &str,
        commands: Recipient<BridgeCommand>,
        subscriber: Recipient<StateChanged>,
    ) -> Result<(SharedDocument, Addr<TourActor>), TourError> {
        let mut document = Document::from_html(BLANK_PAGE, &self.config.tour_attribute)?;
        document.set_command_sink(commands);
        let document = document.shared();

        let store: Arc<dyn FlagStore> = Arc::new(ScopedStore::new(self.store.clone(), viewer));
        let flag = CompletionFlag::new(store, &self.config.completion_key);
        let bridge = DocumentBridge::new(document.clone(), self.config.clone());
        let tour = TourActor::new(self.config.clone(), bridge, flag)
            .with_subscriber(subscriber)
            .start();
        Ok((document, tour))
    }
}

pub struct TourSocket {
    id: Uuid,
    viewer: String,
    can_start_tour: bool,
    hub: Addr<WsServer>,
    setup: TourSetup,
    document: Option<SharedDocument>,
    tour: Option<Addr<TourActor>>,
}

impl TourSocket {
    pub fn new(hub: Addr<WsServer>, setup: TourSetup, viewer: String, can_start_tour: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            viewer,
            can_start_tour,
            hub,
            setup,
            document: None,
            tour: None,
        }
    }

    fn page_state(&self, context: TourContext) -> PageState {
        PageState { page: self.id.to_string(), can_start_tour: self.can_start_tour, context }
    }

    fn push(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(text) => ctx.text(text),
            Err(e) => log::error!("Could not encode a message for page {}: {}", self.id, e),
        }
    }
}

impl Actor for TourSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (document, tour) = match self.setup.start_tour(&self.viewer, ctx.address().recipient(), ctx.address().recipient()) {
            Ok(started) => started,
            Err(e) => {
                log::error!("Could not start a tour for page {}: {}", self.id, e);
                ctx.stop();
                return;
            }
        };
        self.hub.do_send(Connect { id: self.id, tour: tour.clone() });

        // The page learns its id and the viewer's rights before anything else.
        tour.send(GetContext)
            .into_actor(self)
            .map(|result, act, ctx| match result {
                Ok(context) => act.push(&ServerMessage::State(act.page_state(context)), ctx),
                Err(e) => log::warn!("The tour did not answer page {}: {}", act.id, e),
            })
            .spawn(ctx);

        self.document = Some(document);
        self.tour = Some(tour);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        self.hub.do_send(Disconnect { id: self.id });
        if let Some(tour) = self.tour.take() {
            tour.do_send(Detach);
        }
        Running::Stop
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TourSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                let Some(document) = &self.document else {
                    return;
                };
                let applied = serde_json::from_str::<ClientMessage>(&text)
                    .map_err(|e| TourError::Snapshot { message: e.to_string() })
                    .and_then(|message| apply_client_message(document, message));
                if let Err(e) = applied {
                    log::warn!("Ignoring a report from page {}: {}", self.id, e);
                }
            }
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::error!("The tour connection to page {} failed: {:?}. The overlay will stop following the page until it reconnects.", self.id, e);
                ctx.stop();
            }
            _ => (),
        }
    }
}

impl Handler<StateChanged> for TourSocket {
    type Result = ();

    fn handle(&mut self, msg: StateChanged, ctx: &mut Self::Context) {
        let state = self.page_state(msg.0);
        self.push(&ServerMessage::State(state), ctx);
    }
}

impl Handler<BridgeCommand> for TourSocket {
    type Result = ();

    fn handle(&mut self, msg: BridgeCommand, ctx: &mut Self::Context) {
        self.push(&ServerMessage::Command(msg), ctx);
    }
}
