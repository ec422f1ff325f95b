use actix::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::actors::tour::TourActor;

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: Uuid,
    pub tour: Addr<TourActor>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: Uuid,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct SessionCount;

/// Looks up the tour of one attached page.
#[derive(Message)]
#[rtype(result = "Option<Addr<TourActor>>")]
pub struct FindTour {
    pub id: Uuid,
}

/// Keeps track of the attached pages. Each page runs its own tour, reachable
/// only through the id handed to that page's socket.
#[derive(Default)]
pub struct WsServer {
    sessions: HashMap<Uuid, Addr<TourActor>>,
}

impl WsServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for WsServer {
    type Context = Context<Self>;
}

impl Handler<Connect> for WsServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        self.sessions.insert(msg.id, msg.tour);
        log::debug!("Page {} attached ({} connected)", msg.id, self.sessions.len());
    }
}

impl Handler<Disconnect> for WsServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        self.sessions.remove(&msg.id);
        log::debug!("Page {} detached ({} connected)", msg.id, self.sessions.len());
    }
}

impl Handler<SessionCount> for WsServer {
    type Result = usize;

    fn handle(&mut self, _msg: SessionCount, _: &mut Context<Self>) -> usize {
        self.sessions.len()
    }
}

impl Handler<FindTour> for WsServer {
    type Result = MessageResult<FindTour>;

    fn handle(&mut self, msg: FindTour, _: &mut Context<Self>) -> Self::Result {
        MessageResult(self.sessions.get(&msg.id).cloned())
    }
}
