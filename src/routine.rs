//! The effect surface handler routines run against.
//!
//! A routine is an `async fn` that receives a [`RoutineContext`]. It reads
//! state with [`select`](RoutineContext::select), mutates it with
//! [`put`](RoutineContext::put), and reaches the backend with
//! [`call`](RoutineContext::call). `select` and `put` are synchronous; only
//! `call` suspends. Every effect is recorded as an [`Effect`] so a routine's
//! behaviour can be asserted on as a trace.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::Backend;
use crate::cancel::CancellationToken;
use crate::context::DashboardContext;
use crate::error::{EffectError, RoutineError};
use crate::selector::Selector;
use crate::session::EngineConfig;
use crate::state::{DashboardAction, StateStore};

/// Backend operation named by a `call` effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEffect {
    LoadDashboard,
    ResolveCurrentUser,
    ExecuteVisualization,
    ResolveTitles,
    CreateAutomation,
    UpdateAutomation,
    DeleteAutomation,
}

/// One step taken by a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Derived state read through the named selector.
    Select { selector: &'static str },
    /// Raw action applied to the named slice.
    Put { slice: &'static str },
    /// Backend call awaited by the routine.
    Call { operation: CallEffect },
}

/// Per-command handle given to a routine by the scheduler.
pub(crate) struct RoutineContext<'a> {
    ctx: Arc<DashboardContext>,
    store: &'a mut StateStore,
    config: &'a EngineConfig,
    cancellation: Option<CancellationToken>,
    effects: Vec<Effect>,
}

impl<'a> RoutineContext<'a> {
    pub(crate) fn new(
        ctx: Arc<DashboardContext>,
        store: &'a mut StateStore,
        config: &'a EngineConfig,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            ctx,
            store,
            config,
            cancellation,
            effects: Vec::new(),
        }
    }

    pub(crate) fn ctx(&self) -> &DashboardContext {
        &self.ctx
    }

    /// The session backend. Routines clone it out so the call future does
    /// not borrow the context.
    pub(crate) fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.ctx.backend)
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Effects performed so far, in order.
    pub(crate) fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub(crate) fn puts(&self) -> usize {
        self.effects
            .iter()
            .filter(|e| matches!(e, Effect::Put { .. }))
            .count()
    }

    /// Read derived state. Never suspends.
    pub(crate) fn select<S: Selector>(&mut self, selector: &S) -> S::Output {
        self.effects.push(Effect::Select {
            selector: selector.name(),
        });
        selector.select(self.store.state())
    }

    /// Apply a raw action to the store. Never suspends.
    ///
    /// # Errors
    ///
    /// Returns [`RoutineError::Cancelled`] without applying the action if
    /// the command has been cancelled.
    pub(crate) fn put(&mut self, action: impl Into<DashboardAction>) -> Result<(), RoutineError> {
        self.check_cancelled()?;
        let action = action.into();
        self.effects.push(Effect::Put {
            slice: action.slice(),
        });
        self.store.dispatch(&action);
        Ok(())
    }

    /// Await a backend call, racing it against cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`RoutineError::Effect`] if the backend rejects, or
    /// [`RoutineError::Cancelled`] if the command is cancelled before or
    /// while the call is outstanding. A cancelled call is dropped.
    pub(crate) async fn call<T, F>(
        &mut self,
        operation: CallEffect,
        call: F,
    ) -> Result<T, RoutineError>
    where
        F: Future<Output = Result<T, EffectError>>,
    {
        self.check_cancelled()?;
        self.effects.push(Effect::Call { operation });
        tracing::debug!(?operation, "awaiting backend call");

        let result = match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(RoutineError::Cancelled),
                result = call => result,
            },
            None => call.await,
        };
        result.map_err(|err| {
            tracing::debug!(?operation, error = %err, "backend call rejected");
            RoutineError::Effect(err)
        })
    }

    fn check_cancelled(&self) -> Result<(), RoutineError> {
        match &self.cancellation {
            Some(token) if token.is_cancelled() => Err(RoutineError::Cancelled),
            _ => Ok(()),
        }
    }
}
