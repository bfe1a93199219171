//! Shared context handed to every coordinator.

use std::rc::Rc;

use crate::api::ImgenieApi;
use crate::config::{ClientSettings, ConfigStore};
use crate::effect::{Effect, apply_effects};
use crate::presenter::Presenter;
use crate::scheduler::Timer;
use crate::session::Rejection;
use crate::state::{ApplicationState, SharedState};

/// Everything a coordinator needs. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub state: SharedState,
    pub api: Rc<dyn ImgenieApi>,
    pub presenter: Rc<dyn Presenter>,
    pub timer: Rc<dyn Timer>,
    pub store: Rc<dyn ConfigStore>,
    pub settings: ClientSettings,
}

impl Context {
    pub fn new(
        api: Rc<dyn ImgenieApi>,
        presenter: Rc<dyn Presenter>,
        timer: Rc<dyn Timer>,
        store: Rc<dyn ConfigStore>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            state: ApplicationState::new().shared(),
            api,
            presenter,
            timer,
            store,
            settings,
        }
    }

    /// Read from the state.
    pub fn read<R>(&self, f: impl FnOnce(&ApplicationState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Run a transition, then apply its effects with the state released.
    pub fn transition(&self, f: impl FnOnce(&mut ApplicationState) -> Vec<Effect>) {
        let effects = f(&mut self.state.borrow_mut());
        self.apply(effects);
    }

    /// Like [`transition`](Self::transition) for transitions with a
    /// precondition. A rejection is reported and returned.
    pub fn try_transition(
        &self,
        f: impl FnOnce(&mut ApplicationState) -> Result<Vec<Effect>, Rejection>,
    ) -> Result<(), Rejection> {
        let result = f(&mut self.state.borrow_mut());
        match result {
            Ok(effects) => {
                self.apply(effects);
                Ok(())
            }
            Err(rejection) => {
                self.reject(&rejection);
                Err(rejection)
            }
        }
    }

    pub fn apply(&self, effects: Vec<Effect>) {
        apply_effects(effects, self.presenter.as_ref(), self.store.as_ref());
    }

    /// Report a precondition failure.
    pub fn reject(&self, rejection: &Rejection) {
        log::warn!("Rejected: {}", rejection);
        if rejection.is_reported() {
            self.presenter
                .on_error(&rejection.to_string(), rejection.severity());
        }
    }
}
