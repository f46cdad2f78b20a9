//! The backend collaborator seam.
//!
//! Handler routines never talk to a network directly. Every external call
//! goes through [`Backend`], whose futures the scheduler awaits while the
//! calling routine is suspended. Concrete adapters (REST, gRPC, fixtures)
//! live outside this crate.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::error::EffectError;
use crate::model::{
    Automation, AutomationDefinition, DashboardDefinition, ExecutionDefinition, PreparedExecution,
    UserInfo, WidgetRef,
};

/// Execution and automation services of the analytical backend.
///
/// # Contract
///
/// - Each call settles exactly once, with a value or an [`EffectError`].
/// - The engine does not retry. Retry policy, if any, belongs to the
///   implementation.
/// - Implementations must be `Send + Sync`; a single backend is shared by
///   every routine of a session.
pub trait Backend: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Load the persisted dashboard definition.
    fn load_dashboard<'a>(
        &'a self,
        dashboard_ref: &'a str,
    ) -> BoxFuture<'a, Result<DashboardDefinition, EffectError>>;

    /// Resolve the user the session runs as.
    fn resolve_current_user(&self) -> BoxFuture<'_, Result<UserInfo, EffectError>>;

    /// Execute a widget's visualization and return the prepared execution.
    fn execute_visualization<'a>(
        &'a self,
        definition: &'a ExecutionDefinition,
    ) -> BoxFuture<'a, Result<PreparedExecution, EffectError>>;

    /// Resolve widget titles translated into `locale`.
    ///
    /// Widgets the backend cannot translate may be omitted from the result;
    /// callers fall back to the stored title.
    fn resolve_titles<'a>(
        &'a self,
        widgets: &'a [WidgetRef],
        locale: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<WidgetRef, String>, EffectError>>;

    fn create_automation<'a>(
        &'a self,
        definition: &'a AutomationDefinition,
    ) -> BoxFuture<'a, Result<Automation, EffectError>>;

    fn update_automation<'a>(
        &'a self,
        automation: &'a Automation,
    ) -> BoxFuture<'a, Result<Automation, EffectError>>;

    fn delete_automation<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), EffectError>>;
}
