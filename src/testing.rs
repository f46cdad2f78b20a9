//! In-memory [`Backend`] for tests and demos.
//!
//! [`RecordingBackend`] answers every call from local data, records the
//! operations it was asked to perform, and supports failure injection and
//! holding calls open so tests can observe suspended routines.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use uuid::Uuid;

use crate::backend::Backend;
use crate::context::{DashboardContext, FeatureFlags};
use crate::error::EffectError;
use crate::model::{
    Automation, AutomationDefinition, DashboardDefinition, ExecutionDefinition, PreparedExecution,
    UserInfo, WidgetRef,
};

#[derive(Default)]
struct Inner {
    dashboards: HashMap<String, DashboardDefinition>,
    user: Option<UserInfo>,
    titles: HashMap<WidgetRef, String>,
    failures: HashMap<&'static str, VecDeque<EffectError>>,
    rejected_deletes: HashMap<String, EffectError>,
    panics: HashMap<&'static str, usize>,
    calls: Vec<String>,
}

/// Backend double that records every call.
///
/// `Clone` is cheap and clones share the same recorded state, so a test can
/// keep one handle while the session owns another.
#[derive(Clone)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Inner>>,
    /// Number of outstanding [`CallGate`]s; calls wait while it is non-zero.
    held: Arc<watch::Sender<usize>>,
    /// Number of calls that have started.
    started: Arc<watch::Sender<usize>>,
    next_id: Arc<AtomicU64>,
}

/// Holds every backend call open until dropped.
#[must_use = "calls are released as soon as the gate is dropped"]
pub struct CallGate {
    held: Arc<watch::Sender<usize>>,
}

impl Drop for CallGate {
    fn drop(&mut self) {
        self.held.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            held: Arc::new(watch::channel(0).0),
            started: Arc::new(watch::channel(0).0),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `dashboard` from `load_dashboard`.
    pub fn set_dashboard(&self, dashboard: DashboardDefinition) {
        self.lock()
            .dashboards
            .insert(dashboard.dashboard_ref.clone(), dashboard);
    }

    pub fn set_user(&self, user: UserInfo) {
        self.lock().user = Some(user);
    }

    /// Translated title returned by `resolve_titles` for `widget`.
    pub fn set_title(&self, widget: impl Into<String>, title: impl Into<String>) {
        self.lock()
            .titles
            .insert(WidgetRef::new(widget), title.into());
    }

    /// Make the next call to `operation` fail with `error`.
    ///
    /// `operation` is the trait method name, e.g. `"update_automation"`.
    /// Queued failures are consumed in order.
    pub fn fail_next(&self, operation: &'static str, error: EffectError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Make every `delete_automation` of `id` fail with `error`.
    pub fn fail_delete(&self, id: impl Into<String>, error: EffectError) {
        self.lock().rejected_deletes.insert(id.into(), error);
    }

    /// Make the next call to `operation` panic instead of returning.
    pub fn panic_next(&self, operation: &'static str) {
        *self.lock().panics.entry(operation).or_default() += 1;
    }

    /// Hold every call, current and future, until the gate is dropped.
    pub fn hold_calls(&self) -> CallGate {
        self.held.send_modify(|n| *n += 1);
        CallGate {
            held: Arc::clone(&self.held),
        }
    }

    /// Operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == operation).count()
    }

    /// Wait until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    /// Record the call, wait for any gate, then consume an injected failure.
    async fn enter(&self, operation: &'static str) -> Result<(), EffectError> {
        self.lock().calls.push(operation.to_owned());
        self.started.send_modify(|n| *n += 1);
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|n| *n == 0).await;

        let mut inner = self.lock();
        if let Some(n) = inner.panics.get_mut(operation)
            && *n > 0
        {
            *n -= 1;
            drop(inner);
            panic!("injected panic in {operation}");
        }
        match inner.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn load_dashboard<'a>(
        &'a self,
        dashboard_ref: &'a str,
    ) -> BoxFuture<'a, Result<DashboardDefinition, EffectError>> {
        async move {
            self.enter("load_dashboard").await?;
            self.lock()
                .dashboards
                .get(dashboard_ref)
                .cloned()
                .ok_or_else(|| EffectError::NotFound(format!("dashboard {dashboard_ref}")))
        }
        .boxed()
    }

    fn resolve_current_user(&self) -> BoxFuture<'_, Result<UserInfo, EffectError>> {
        async move {
            self.enter("resolve_current_user").await?;
            Ok(self.lock().user.clone().unwrap_or_else(|| UserInfo {
                login: "test.user@example.com".into(),
                name: Some("Test User".into()),
                email: Some("test.user@example.com".into()),
            }))
        }
        .boxed()
    }

    fn execute_visualization<'a>(
        &'a self,
        definition: &'a ExecutionDefinition,
    ) -> BoxFuture<'a, Result<PreparedExecution, EffectError>> {
        async move {
            self.enter("execute_visualization").await?;
            Ok(PreparedExecution {
                fingerprint: format!("fp-{}", definition.widget_ref),
                definition: definition.clone(),
            })
        }
        .boxed()
    }

    fn resolve_titles<'a>(
        &'a self,
        widgets: &'a [WidgetRef],
        _locale: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<WidgetRef, String>, EffectError>> {
        async move {
            self.enter("resolve_titles").await?;
            let inner = self.lock();
            Ok(widgets
                .iter()
                .filter_map(|w| inner.titles.get(w).map(|t| (w.clone(), t.clone())))
                .collect())
        }
        .boxed()
    }

    fn create_automation<'a>(
        &'a self,
        definition: &'a AutomationDefinition,
    ) -> BoxFuture<'a, Result<Automation, EffectError>> {
        async move {
            self.enter("create_automation").await?;
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            Ok(Automation {
                id: format!("automation-{id}"),
                definition: definition.clone(),
            })
        }
        .boxed()
    }

    fn update_automation<'a>(
        &'a self,
        automation: &'a Automation,
    ) -> BoxFuture<'a, Result<Automation, EffectError>> {
        async move {
            self.enter("update_automation").await?;
            Ok(automation.clone())
        }
        .boxed()
    }

    fn delete_automation<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), EffectError>> {
        async move {
            self.enter("delete_automation").await?;
            match self.lock().rejected_deletes.get(id) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
        .boxed()
    }
}

/// A session context over `backend` for dashboard `dash-1`, with default
/// feature flags.
pub fn test_context(backend: impl Backend) -> Arc<DashboardContext> {
    test_context_with_features(backend, FeatureFlags::default())
}

pub fn test_context_with_features(
    backend: impl Backend,
    features: FeatureFlags,
) -> Arc<DashboardContext> {
    Arc::new(DashboardContext {
        session_id: Uuid::new_v4(),
        backend: Arc::new(backend),
        workspace: "test-workspace".into(),
        dashboard_ref: Some("dash-1".into()),
        locale: "en-US".into(),
        user: None,
        features,
    })
}
