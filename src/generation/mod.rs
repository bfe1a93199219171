//! Async driver for the generation session.
//!
//! [`GenerationController::begin`] accepts or rejects synchronously;
//! [`GenerationController::run`] dispatches the request and polls progress
//! alongside it until the generate call resolves.

mod params;

use std::cell::RefCell;
use std::rc::Rc;

use futures::join;
use serde_json::{Map, Value};
use web_time::Instant;

use crate::context::Context;
use crate::effect::Effect;
use crate::error::ApiResult;
use crate::scheduler::{LoopControl, PollHandle, PollLoop};
use crate::session::{self, GenerationSession, GenerationTicket, Rejection, SessionPhase};
use crate::types::{GenerationResult, Severity};

#[derive(Clone)]
pub struct GenerationController {
    ctx: Context,
    session: Rc<RefCell<GenerationSession>>,
}

impl GenerationController {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            session: Rc::new(RefCell::new(GenerationSession::new())),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.borrow().phase()
    }

    pub fn is_generating(&self) -> bool {
        self.ctx.read(|state| state.is_generating)
    }

    /// Validate and accept a generation. Sets `is_generating` before
    /// returning; rejections are reported to the presenter.
    pub fn begin(&self) -> Result<GenerationTicket, Rejection> {
        let accepted = {
            let mut state = self.ctx.state.borrow_mut();
            self.session.borrow_mut().begin(&mut state)
        };
        match accepted {
            Ok((ticket, effects)) => {
                self.ctx.apply(effects);
                Ok(ticket)
            }
            Err(rejection) => {
                self.ctx.reject(&rejection);
                Err(rejection)
            }
        }
    }

    /// Dispatch an accepted generation and poll progress until it resolves.
    ///
    /// Finalization happens as soon as the generate call returns; the
    /// progress loop notices on its next wake-up and ends silently.
    pub async fn run(&self, ticket: GenerationTicket) -> ApiResult<GenerationResult> {
        let started = Instant::now();
        let mut poll = PollLoop::new("progress", self.ctx.settings.progress_poll_interval);
        let handle = poll.handle();

        let call = async {
            let outcome = self.ctx.api.generate(ticket.request.into_payload()).await;
            handle.stop();
            self.finish(&outcome);
            log::info!(
                "Generation finished in {:.1}s",
                started.elapsed().as_secs_f64()
            );
            outcome
        };

        let progress = async {
            self.session.borrow_mut().polling_started();
            poll.run(self.ctx.timer.as_ref(), || self.poll_progress(&handle))
                .await;
        };

        let (outcome, ()) = join!(call, progress);
        outcome
    }

    /// Accept and run a generation. Returns once it has been finalized.
    pub async fn generate(&self) -> Result<(), Rejection> {
        let ticket = self.begin()?;
        // The outcome has already been reported by `finish`.
        self.run(ticket).await.ok();
        Ok(())
    }

    async fn poll_progress(&self, handle: &PollHandle) -> LoopControl {
        let outcome = self.ctx.api.progress().await;
        // The generate call may have resolved while we were waiting.
        if handle.is_stopped() {
            return LoopControl::Stop;
        }

        match outcome {
            Ok(snapshot) => {
                let (effects, control) = {
                    let mut state = self.ctx.state.borrow_mut();
                    self.session.borrow_mut().on_progress(&mut state, snapshot)
                };
                self.ctx.apply(effects);
                control
            }
            Err(e) => {
                log::warn!("Progress poll failed: {}", e);
                if self.is_generating() {
                    LoopControl::Continue
                } else {
                    LoopControl::Stop
                }
            }
        }
    }

    fn finish(&self, outcome: &ApiResult<GenerationResult>) {
        let effects = {
            let mut state = self.ctx.state.borrow_mut();
            self.session.borrow_mut().finish(&mut state, outcome)
        };
        self.ctx.apply(effects);
    }

    /// Save the last generated image. `metadata` is merged over the echoed
    /// generation parameters.
    pub async fn save_result(&self, metadata: Map<String, Value>) -> Result<(), Rejection> {
        let (image_id, metadata) = self
            .ctx
            .read(|state| session::save_target(state, metadata))
            .inspect_err(|rejection| self.ctx.reject(rejection))?;

        let effect = match self.ctx.api.save_image(&image_id, &metadata).await {
            Ok(()) => {
                log::info!("Saved image {}", image_id);
                Effect::notify("Image saved", Severity::Success)
            }
            Err(e) => {
                log::error!("Failed to save image {}: {}", image_id, e);
                Effect::notify(
                    format!("Failed to save image: {}", e.user_message()),
                    Severity::Error,
                )
            }
        };
        self.ctx.apply(vec![effect]);
        Ok(())
    }

    /// Delete the last generated image and hide the result area.
    pub async fn delete_result(&self) -> Result<(), Rejection> {
        let image_id = self
            .ctx
            .read(session::delete_target)
            .inspect_err(|rejection| self.ctx.reject(rejection))?;

        match self.ctx.api.delete_image(&image_id).await {
            Ok(()) => {
                log::info!("Deleted image {}", image_id);
                self.ctx
                    .transition(|state| session::image_deleted(state, &image_id));
            }
            Err(e) => {
                log::error!("Failed to delete image {}: {}", image_id, e);
                self.ctx.apply(vec![Effect::notify(
                    format!("Failed to delete image: {}", e.user_message()),
                    Severity::Error,
                )]);
            }
        }
        Ok(())
    }
}
