//! Scheduler task that owns a session's state and runs routines serially.
//!
//! The scheduler is the single writer of the [`StateStore`]. It pops one
//! message at a time from a bounded `mpsc` queue, runs the routine bound to
//! the command to completion (suspending only at backend calls), and
//! publishes exactly one terminal event per command before taking the next
//! message.
//!
//! Public API lives on [`DashboardSession`](crate::DashboardSession); this
//! module is the loop behind it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::cancel::CancellationToken;
use crate::channel::EventChannel;
use crate::command::Command;
use crate::context::DashboardContext;
use crate::error::RoutineError;
use crate::event::{DashboardEvent, EventPayload, FailureReason};
use crate::handlers;
use crate::routine::RoutineContext;
use crate::session::EngineConfig;
use crate::state::{DashboardState, StateStore};

/// Messages sent from a `DashboardSession` to the scheduler task.
pub(crate) enum SchedulerMessage {
    /// Run the routine for a command.
    Execute {
        command: Command,
        /// Resolved correlation id; never empty.
        correlation_id: String,
    },

    /// Snapshot the state after every command queued before this message.
    GetState {
        reply: oneshot::Sender<DashboardState>,
    },
}

/// State owned by the scheduler task.
pub(crate) struct Scheduler {
    pub(crate) ctx: Arc<DashboardContext>,
    pub(crate) store: StateStore,
    pub(crate) config: EngineConfig,
    pub(crate) channel: EventChannel,
    /// Cancelled when the session closes. Aborts the running routine and
    /// every command still queued.
    pub(crate) shutdown: CancellationToken,
}

/// Runs the scheduler loop until the session closes or every sender is
/// dropped.
///
/// Queued messages are always taken before shutdown is observed, so a
/// closing session answers each accepted command with a terminal event
/// (`Cancelled` for those that never ran).
///
/// # Arguments
///
/// * `scheduler` - Store, context, and channel for the session.
/// * `rx` - Receiving end of the session's command queue.
pub(crate) async fn run_scheduler(
    mut scheduler: Scheduler,
    mut rx: mpsc::Receiver<SchedulerMessage>,
) {
    let session_id = scheduler.ctx.session_id;
    tracing::debug!(%session_id, "scheduler started");

    loop {
        let msg = tokio::select! {
            biased;
            msg = rx.recv() => msg,
            () = scheduler.shutdown.cancelled() => None,
        };
        match msg {
            Some(msg) => scheduler.handle(msg).await,
            None => break,
        }
    }

    // Refuse new messages, then answer whatever was accepted before that.
    rx.close();
    let mut drained = 0usize;
    while let Ok(msg) = rx.try_recv() {
        scheduler.handle(msg).await;
        drained += 1;
    }
    tracing::debug!(%session_id, drained, "scheduler stopped");
}

impl Scheduler {
    async fn handle(&mut self, msg: SchedulerMessage) {
        match msg {
            SchedulerMessage::Execute {
                command,
                correlation_id,
            } => {
                let span = tracing::info_span!(
                    "command",
                    command_type = command.command_type(),
                    correlation_id = %correlation_id,
                );
                self.execute(command, correlation_id).instrument(span).await;
            }
            SchedulerMessage::GetState { reply } => {
                // The caller may have given up waiting; nothing to do then.
                let _ = reply.send(self.store.snapshot());
            }
        }
    }

    /// Process one command and publish its terminal event.
    async fn execute(&mut self, command: Command, correlation_id: String) {
        let command_type = command.command_type();

        let payload = if command.is_cancelled() || self.shutdown.is_cancelled() {
            tracing::debug!("command cancelled before its routine started");
            EventPayload::Cancelled { command_type }
        } else if !handlers::is_enabled(&command.body, &self.ctx) {
            tracing::warn!("command rejected, its feature is disabled");
            EventPayload::CommandRejected { command_type }
        } else {
            if self.config.emit_command_started {
                self.publish(&correlation_id, EventPayload::CommandStarted { command_type });
            }
            self.run_routine(&command).await
        };

        self.publish(&correlation_id, payload);
    }

    /// Run the routine for `command` and map its outcome to an event.
    ///
    /// Mutations of a cancelled or panicked routine are rolled back. A
    /// routine that fails keeps what it applied before failing.
    async fn run_routine(&mut self, command: &Command) -> EventPayload {
        let command_type = command.command_type();
        let snapshot = self.store.snapshot();

        let mut cx = RoutineContext::new(
            Arc::clone(&self.ctx),
            &mut self.store,
            &self.config,
            command.cancellation.clone(),
        );
        let routine = AssertUnwindSafe(handlers::run(&mut cx, &command.body)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Ok(Err(RoutineError::Cancelled)),
            outcome = routine => outcome,
        };
        let applied = cx.puts();
        let effects = cx.effects().len();
        drop(cx);

        match outcome {
            Ok(Ok(payload)) => {
                tracing::info!(applied, effects, "command succeeded");
                payload
            }
            Ok(Err(RoutineError::Validation(message))) => {
                tracing::warn!(applied, %message, "command failed validation");
                EventPayload::CommandFailed {
                    command_type,
                    reason: FailureReason::UserError,
                    message,
                }
            }
            Ok(Err(RoutineError::Effect(err))) => {
                tracing::warn!(applied, error = %err, "command failed in a backend call");
                EventPayload::CommandFailed {
                    command_type,
                    reason: FailureReason::InternalError,
                    message: err.to_string(),
                }
            }
            Ok(Err(RoutineError::Cancelled)) => {
                self.store.restore(snapshot);
                tracing::info!(discarded = applied, "command cancelled");
                EventPayload::Cancelled { command_type }
            }
            Err(panic) => {
                self.store.restore(snapshot);
                let message = panic_message(panic.as_ref());
                tracing::error!(discarded = applied, %message, "routine panicked");
                EventPayload::CommandFailed {
                    command_type,
                    reason: FailureReason::InternalError,
                    message: format!("routine panicked: {message}"),
                }
            }
        }
    }

    fn publish(&self, correlation_id: &str, payload: EventPayload) {
        let event = DashboardEvent {
            ctx: Arc::clone(&self.ctx),
            correlation_id: Some(correlation_id.to_owned()),
            payload,
        };
        self.channel.publish(&event);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
