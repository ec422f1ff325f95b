use actix::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::bridge::DocumentBridge;
use crate::config::TourConfig;
use crate::dom::document::lock;
use crate::dom::events::{DomEvent, ListenerId};
use crate::errors::TourError;
use crate::store::CompletionFlag;
use crate::tour::engine::TourEngine;
use crate::tour::listener::{react, Reaction};
use crate::tour::prepare::{prepare_step, reset_ui, ResetReport};
use crate::tour::steps::{get_steps, render_views, StepEnv, StepView, TourControls, TourStep};

// --- Messages ---

/// The tour as the rest of the application sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourContext {
    pub current_step_index: usize,
    pub is_open: bool,
    pub steps: Vec<StepView>,
}

#[derive(Message)]
#[rtype(result = "TourContext")]
pub struct GetContext;

/// Shows the overlay, at `at` when given, otherwise where it was left.
#[derive(Message)]
#[rtype(result = "Result<(), TourError>")]
pub struct Open {
    pub at: Option<usize>,
}

#[derive(Message)]
#[rtype(result = "Result<(), TourError>")]
pub struct SetStep {
    pub index: usize,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct SetOpen {
    pub open: bool,
}

/// Mask click or the overlay's close button.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Dismiss;

#[derive(Message)]
#[rtype(result = "()")]
pub struct Close {
    pub mark_completed: bool,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Restart;

#[derive(Message)]
#[rtype(result = "ResetReport")]
pub struct ResetUi;

#[derive(Message)]
#[rtype(result = "Result<(), TourError>")]
pub struct RunStepAction;

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct StateChanged(pub TourContext);

/// The page this tour runs on went away.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Detach;

// --- Actor ---

pub struct TourActor {
    config: Arc<TourConfig>,
    bridge: DocumentBridge,
    flag: CompletionFlag,
    engine: TourEngine,
    steps: Vec<TourStep>,
    controls: Option<TourControls>,
    listener: Option<ListenerId>,
    subscriber: Option<Recipient<StateChanged>>,
}

impl TourActor {
    pub fn new(config: Arc<TourConfig>, bridge: DocumentBridge, flag: CompletionFlag) -> Self {
        let mut actor = Self {
            config,
            bridge,
            flag,
            engine: TourEngine::new(0),
            steps: Vec::new(),
            controls: None,
            listener: None,
            subscriber: None,
        };
        actor.rebuild_steps();
        actor
    }

    pub fn with_subscriber(mut self, subscriber: Recipient<StateChanged>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    fn rebuild_steps(&mut self) {
        let env = StepEnv {
            flag: self.flag.clone(),
            bridge: self.bridge.clone(),
            config: self.config.clone(),
        };
        self.steps = get_steps(&env);
        self.engine.set_step_count(self.steps.len());
    }

    fn controls(&self) -> TourControls {
        self.controls.clone().unwrap_or_else(|| TourControls::new(|| {}))
    }

    fn context(&self) -> TourContext {
        TourContext {
            current_step_index: self.engine.current_step_index(),
            is_open: self.engine.is_open(),
            steps: render_views(&self.steps, &self.controls(), &self.config),
        }
    }

    fn after_change(&mut self, ctx: &mut Context<Self>) {
        self.sync_listener(ctx);
        if let Some(subscriber) = &self.subscriber {
            subscriber.do_send(StateChanged(self.context()));
        }
    }

    /// Listens on the document exactly while the overlay is open.
    fn sync_listener(&mut self, ctx: &mut Context<Self>) {
        match (self.engine.is_open(), self.listener) {
            (true, None) => {
                let id = lock(self.bridge.document()).add_listener(ctx.address().recipient());
                self.listener = Some(id);
                log::trace!("Auto-advance listener attached");
            }
            (false, Some(id)) => self.detach_listener(id),
            _ => {}
        }
    }

    fn detach_listener(&mut self, id: ListenerId) {
        lock(self.bridge.document()).remove_listener(id);
        self.listener = None;
        log::trace!("Auto-advance listener detached");
    }

    /// Runs the preparation hook for `index`, then shows it, unless the tour
    /// changed in the meantime.
    fn show_step(&mut self, index: usize, open: bool, ctx: &mut Context<Self>) {
        let generation = self.engine.generation();
        let bridge = self.bridge.clone();
        let config = self.config.clone();
        let preparation = async move { prepare_step(&bridge, &config, index).await };

        ctx.spawn(preparation.into_actor(self).map(move |_, act, ctx| {
            if !act.engine.is_current(generation) {
                log::debug!("Step {} was superseded while its UI was opening", index);
                return;
            }
            let result = if open { act.engine.open(Some(index)) } else { act.engine.advance(index) };
            match result {
                Ok(()) => {
                    log::debug!("Tour is showing step {}", index);
                    act.after_change(ctx);
                }
                Err(e) => log::warn!("Could not show step {}: {}", index, e),
            }
        }));
    }

    fn open_tour(&mut self, at: Option<usize>, ctx: &mut Context<Self>) -> Result<(), TourError> {
        if let Some(index) = at {
            self.engine.check_index(index)?;
        }
        self.rebuild_steps();
        let index = at.unwrap_or_else(|| self.engine.current_step_index());
        self.show_step(index, true, ctx);
        Ok(())
    }

    fn close_tour(&mut self, mark_completed: bool, ctx: &mut Context<Self>) {
        if !self.engine.is_open() {
            if mark_completed {
                self.flag.set();
            }
            return;
        }
        if self.engine.close(mark_completed) {
            self.flag.set();
        }
        log::debug!("Tour closed{}", if mark_completed { " and marked completed" } else { "" });
        self.after_change(ctx);
    }

    /// A page just mounted the tour. The completion flag decides whether it
    /// shows up on its own.
    fn mount(&mut self, ctx: &mut Context<Self>) {
        if self.flag.is_set() {
            log::info!("The tour was already completed here. It will only open from \"Start tour\".");
        } else if self.config.auto_open {
            log::info!("First visit detected. Opening the tour.");
            self.show_step(0, true, ctx);
        }
    }

    fn restart(&mut self, ctx: &mut Context<Self>) {
        log::info!("Restarting the tour from the first step");
        self.flag.clear();
        self.rebuild_steps();
        self.engine.begin_restart();
        self.after_change(ctx);

        let generation = self.engine.generation();
        let bridge = self.bridge.clone();
        let config = self.config.clone();
        let reset = async move { reset_ui(&bridge, &config).await };

        ctx.spawn(reset.into_actor(self).map(move |report, act, ctx| {
            if !act.engine.is_current(generation) {
                log::debug!("A newer tour change replaced this restart");
                return;
            }
            log::debug!("Page reset for the tour: {:?}", report);
            if let Err(e) = act.engine.advance(0) {
                log::warn!("Could not rewind the tour: {}", e);
                return;
            }
            act.after_change(ctx);

            // Let the reset's own transitions finish before the overlay returns.
            let rewound = act.engine.generation();
            ctx.run_later(act.config.reopen_delay(), move |act, ctx| {
                if act.engine.is_current(rewound) {
                    act.show_step(0, true, ctx);
                }
            });
        }));
    }
}

impl Actor for TourActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let close = ctx.address().recipient::<Close>();
        self.controls = Some(TourControls::new(move || close.do_send(Close { mark_completed: false })));
        self.mount(ctx);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        if let Some(id) = self.listener {
            self.detach_listener(id);
        }
        Running::Stop
    }
}

// --- Handlers ---

impl Handler<GetContext> for TourActor {
    type Result = MessageResult<GetContext>;

    fn handle(&mut self, _msg: GetContext, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.context())
    }
}

impl Handler<Open> for TourActor {
    type Result = Result<(), TourError>;

    fn handle(&mut self, msg: Open, ctx: &mut Context<Self>) -> Self::Result {
        self.open_tour(msg.at, ctx)
    }
}

impl Handler<SetStep> for TourActor {
    type Result = Result<(), TourError>;

    fn handle(&mut self, msg: SetStep, ctx: &mut Context<Self>) -> Self::Result {
        self.engine.check_index(msg.index)?;
        if self.engine.is_open() {
            self.show_step(msg.index, false, ctx);
        } else {
            self.engine.advance(msg.index)?;
            self.after_change(ctx);
        }
        Ok(())
    }
}

impl Handler<SetOpen> for TourActor {
    type Result = ();

    fn handle(&mut self, msg: SetOpen, ctx: &mut Context<Self>) {
        match (msg.open, self.engine.is_open()) {
            (true, false) => {
                if let Err(e) = self.open_tour(None, ctx) {
                    log::warn!("Could not reopen the tour: {}", e);
                }
            }
            (false, true) => {
                if self.engine.dismiss() {
                    self.flag.set();
                }
                self.after_change(ctx);
            }
            _ => {}
        }
    }
}

impl Handler<Dismiss> for TourActor {
    type Result = ();

    fn handle(&mut self, _msg: Dismiss, ctx: &mut Context<Self>) {
        if !self.engine.is_open() {
            return;
        }
        if self.engine.dismiss() {
            self.flag.set();
            log::debug!("Tour dismissed on its last step, marking it completed");
        } else {
            log::debug!("Tour dismissed at step {}", self.engine.current_step_index());
        }
        self.after_change(ctx);
    }
}

impl Handler<Close> for TourActor {
    type Result = ();

    fn handle(&mut self, msg: Close, ctx: &mut Context<Self>) {
        self.close_tour(msg.mark_completed, ctx);
    }
}

impl Handler<Restart> for TourActor {
    type Result = ();

    fn handle(&mut self, _msg: Restart, ctx: &mut Context<Self>) {
        self.restart(ctx);
    }
}

impl Handler<Detach> for TourActor {
    type Result = ();

    fn handle(&mut self, _msg: Detach, ctx: &mut Context<Self>) {
        log::debug!("Page detached, stopping its tour");
        ctx.stop();
    }
}

impl Handler<ResetUi> for TourActor {
    type Result = ResponseFuture<ResetReport>;

    fn handle(&mut self, _msg: ResetUi, _ctx: &mut Context<Self>) -> Self::Result {
        let bridge = self.bridge.clone();
        let config = self.config.clone();
        Box::pin(async move { reset_ui(&bridge, &config).await })
    }
}

impl Handler<RunStepAction> for TourActor {
    type Result = Result<(), TourError>;

    fn handle(&mut self, _msg: RunStepAction, _ctx: &mut Context<Self>) -> Self::Result {
        let index = self.engine.current_step_index();
        let step = self.steps.get(index).ok_or(TourError::StepOutOfRange {
            index,
            step_count: self.steps.len(),
        })?;
        match step.body(&self.controls()).action {
            Some(action) => {
                log::debug!("Running \"{}\" from step {}", action.label, index);
                action.run();
                Ok(())
            }
            None => Err(TourError::NoStepAction { index }),
        }
    }
}

impl Handler<DomEvent> for TourActor {
    type Result = ();

    fn handle(&mut self, event: DomEvent, ctx: &mut Context<Self>) {
        let reaction = react(&event, self.engine.current_step_index(), self.engine.is_open(), &self.config);
        match reaction {
            Some(Reaction::AdvanceAfter { to, delay }) => {
                log::debug!("Viewer did what step {} asked, moving on in {:?}", to - 1, delay);
                let generation = self.engine.generation();
                ctx.run_later(delay, move |act, ctx| {
                    if act.engine.is_current(generation) && act.engine.is_open() {
                        act.show_step(to, false, ctx);
                    }
                });
            }
            Some(Reaction::Terminate) => {
                log::info!("The viewer sent a message. The tour is done.");
                self.close_tour(true, ctx);
            }
            None => {}
        }
    }
}
