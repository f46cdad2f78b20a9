//! Read-only session context handed to every handler routine.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::Backend;
use crate::model::UserInfo;

/// Feature flag gating the scheduled email and automation commands.
pub const FEATURE_SCHEDULING: &str = "scheduling";

/// Snapshot of feature flags taken when the session opens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlags(BTreeMap<String, bool>);

impl FeatureFlags {
    pub fn with(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.0.insert(name.into(), enabled);
        self
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.get(name).copied()
    }

    /// Flags not present in the snapshot fall back to `default`.
    pub fn is_enabled_or(&self, name: &str, default: bool) -> bool {
        self.get(name).unwrap_or(default)
    }
}

/// Everything a routine may know about its session besides the store.
///
/// One instance exists per dashboard session. The scheduler owns it and
/// shares it (behind an `Arc`) with routines and with every published event;
/// nothing mutates it after the session opens.
#[derive(Clone)]
pub struct DashboardContext {
    /// Unique id of the dashboard session.
    pub session_id: Uuid,
    /// The backend collaborator routines call into.
    pub backend: Arc<dyn Backend>,
    pub workspace: String,
    /// Dashboard loaded by `Initialize`, if the session was opened for one.
    pub dashboard_ref: Option<String>,
    pub locale: String,
    pub user: Option<UserInfo>,
    pub features: FeatureFlags,
}

impl DashboardContext {
    /// Whether the session handles commands gated by `feature`. Flags
    /// missing from the snapshot count as on.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.features.is_enabled_or(feature, true)
    }
}

// Manual `Debug` because `dyn Backend` is not `Debug`.
impl fmt::Debug for DashboardContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardContext")
            .field("session_id", &self.session_id)
            .field("backend", &self.backend.name())
            .field("workspace", &self.workspace)
            .field("dashboard_ref", &self.dashboard_ref)
            .field("locale", &self.locale)
            .field("user", &self.user)
            .field("features", &self.features)
            .finish()
    }
}
