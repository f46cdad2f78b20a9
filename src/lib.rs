//! Command and event orchestration for embeddable analytics dashboards.
//!
//! A [`DashboardSession`] accepts [`Command`]s, runs one handler routine per
//! command on a single scheduler task that owns the [`DashboardState`], and
//! publishes exactly one terminal [`DashboardEvent`] per command on the
//! session's [`EventChannel`]. Routines read state through [`Selector`]s,
//! mutate it through reducers, and reach the outside world only through the
//! [`Backend`] trait. [`Arbiter`]s keep exclusive UI resources with a single
//! owner.

mod arbiter;
pub use arbiter::{Arbiter, ArbiterRegistry, ArbiterState, OpenGrant, OwnerRegistration};
mod backend;
pub use backend::Backend;
mod cancel;
pub use cancel::CancellationToken;
mod channel;
pub use channel::{EventChannel, EventStream, Subscription};
mod command;
pub use command::{Command, DashboardCommand};
mod context;
pub use context::{DashboardContext, FEATURE_SCHEDULING, FeatureFlags};
mod error;
mod event;
mod handlers;
pub mod model;
mod routine;
mod scheduler;
pub mod selector;
mod session;
pub mod state;
pub mod testing;

pub use error::{ArbiterError, DispatchError, EffectError, RoutineError};
pub use event::{DashboardEvent, EventPayload, EventType, FailureReason};
pub use routine::{CallEffect, Effect};
pub use selector::Selector;
pub use session::{
    DEFAULT_MAX_ATTRIBUTE_FILTERS, DEFAULT_QUEUE_CAPACITY, DashboardSession,
    DashboardSessionBuilder, EngineConfig,
};
pub use state::{DashboardAction, DashboardState};
