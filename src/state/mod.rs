//! Normalized dashboard state, raw actions, and the reducers that apply them.
//!
//! The state tree is split into named slices. Each slice is held behind an
//! `Arc` so snapshots are cheap and memoized selectors can detect "this slice
//! did not change" by pointer identity. Only [`StateStore::dispatch`] mutates
//! a slice, and only by running that slice's reducer on a raw action.

mod automations;
mod config;
mod execution_results;
mod filter_context;
mod layout;
mod meta;

use std::sync::Arc;

use serde::Serialize;

use crate::selector::SelectorCache;

pub use automations::{AutomationsAction, AutomationsState};
pub use config::{ConfigAction, ConfigState, DateFilterConfig};
pub use execution_results::{ExecutionResultsAction, ExecutionResultsState};
pub use filter_context::{FilterContextAction, FilterContextState};
pub use layout::{DEFAULT_UNDO_LIMIT, LayoutAction, LayoutState, UndoEntry};
pub use meta::{MetaAction, MetaState};

/// A named subtree of the dashboard state with its own reducer.
///
/// # Contract
///
/// - [`reduce`](Slice::reduce) must be a pure, total function: no I/O, no
///   panics. Actions that do not apply to the current state (for example an
///   index that is out of range) leave the slice unchanged. Routines
///   validate before they dispatch.
pub trait Slice: Clone + Default + Send + Sync + 'static {
    /// Name of the slice, used in logs.
    const NAME: &'static str;

    /// Raw actions this slice reacts to.
    type Action: std::fmt::Debug;

    /// Apply a single action to produce the next state.
    fn reduce(self, action: &Self::Action) -> Self;
}

/// The whole dashboard state tree.
///
/// `Clone` is cheap: every slice is `Arc`-wrapped and only the slice touched
/// by an action is copied on write. Clones share the session's
/// [`SelectorCache`]; equality compares slices only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardState {
    pub(crate) meta: Arc<MetaState>,
    pub(crate) config: Arc<ConfigState>,
    pub(crate) filter_context: Arc<FilterContextState>,
    pub(crate) layout: Arc<LayoutState>,
    pub(crate) execution_results: Arc<ExecutionResultsState>,
    pub(crate) automations: Arc<AutomationsState>,
    #[serde(skip)]
    pub(crate) selectors: SelectorCache,
}

impl PartialEq for DashboardState {
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta
            && self.config == other.config
            && self.filter_context == other.filter_context
            && self.layout == other.layout
            && self.execution_results == other.execution_results
            && self.automations == other.automations
    }
}

impl DashboardState {
    pub fn meta(&self) -> &Arc<MetaState> {
        &self.meta
    }

    pub fn config(&self) -> &Arc<ConfigState> {
        &self.config
    }

    pub fn filter_context(&self) -> &Arc<FilterContextState> {
        &self.filter_context
    }

    pub fn layout(&self) -> &Arc<LayoutState> {
        &self.layout
    }

    pub fn execution_results(&self) -> &Arc<ExecutionResultsState> {
        &self.execution_results
    }

    pub fn automations(&self) -> &Arc<AutomationsState> {
        &self.automations
    }

    /// Memo table shared by this state and every snapshot of its session.
    pub fn selector_cache(&self) -> &SelectorCache {
        &self.selectors
    }

    /// Initial state for a new session.
    pub(crate) fn initial(config: ConfigState, undo_limit: usize) -> Self {
        Self {
            config: Arc::new(config),
            layout: Arc::new(LayoutState::with_undo_limit(undo_limit)),
            ..Self::default()
        }
    }
}

/// A raw, state-mutating action addressed to one slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "slice", content = "action", rename_all = "snake_case")]
pub enum DashboardAction {
    Meta(MetaAction),
    Config(ConfigAction),
    FilterContext(FilterContextAction),
    Layout(LayoutAction),
    ExecutionResults(ExecutionResultsAction),
    Automations(AutomationsAction),
}

impl DashboardAction {
    /// Name of the slice the action is addressed to.
    pub fn slice(&self) -> &'static str {
        match self {
            Self::Meta(_) => MetaState::NAME,
            Self::Config(_) => ConfigState::NAME,
            Self::FilterContext(_) => FilterContextState::NAME,
            Self::Layout(_) => LayoutState::NAME,
            Self::ExecutionResults(_) => ExecutionResultsState::NAME,
            Self::Automations(_) => AutomationsState::NAME,
        }
    }
}

macro_rules! impl_from_slice_action {
    ($($action:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$action> for DashboardAction {
                fn from(action: $action) -> Self {
                    Self::$variant(action)
                }
            }
        )*
    };
}

impl_from_slice_action! {
    MetaAction => Meta,
    ConfigAction => Config,
    FilterContextAction => FilterContext,
    LayoutAction => Layout,
    ExecutionResultsAction => ExecutionResults,
    AutomationsAction => Automations,
}

/// Run `S`'s reducer in place, copying the slice only if a snapshot still
/// shares it.
fn apply_slice<S: Slice>(slot: &mut Arc<S>, action: &S::Action) {
    let slice = Arc::make_mut(slot);
    *slice = std::mem::take(slice).reduce(action);
}

/// Route an action to its slice reducer.
pub fn reduce(state: &mut DashboardState, action: &DashboardAction) {
    match action {
        DashboardAction::Meta(a) => apply_slice(&mut state.meta, a),
        DashboardAction::Config(a) => apply_slice(&mut state.config, a),
        DashboardAction::FilterContext(a) => apply_slice(&mut state.filter_context, a),
        DashboardAction::Layout(a) => apply_slice(&mut state.layout, a),
        DashboardAction::ExecutionResults(a) => apply_slice(&mut state.execution_results, a),
        DashboardAction::Automations(a) => apply_slice(&mut state.automations, a),
    }
}

/// Owner of the live state tree.
///
/// Exactly one store exists per session and it is owned by the scheduler
/// task, which is the only caller of [`dispatch`](StateStore::dispatch).
#[derive(Debug, Default)]
pub struct StateStore {
    state: DashboardState,
    dispatched: u64,
}

impl StateStore {
    pub fn new(state: DashboardState) -> Self {
        Self {
            state,
            dispatched: 0,
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    /// Total number of actions applied since the store was created.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Apply a raw action synchronously.
    pub fn dispatch(&mut self, action: &DashboardAction) {
        tracing::debug!(slice = action.slice(), ?action, "reducing action");
        reduce(&mut self.state, action);
        self.dispatched += 1;
    }

    /// Cheap copy of the current state.
    pub fn snapshot(&self) -> DashboardState {
        self.state.clone()
    }

    /// Replace the state with an earlier snapshot.
    ///
    /// Used by the scheduler to discard the mutations of a cancelled or
    /// panicked routine.
    pub(crate) fn restore(&mut self, snapshot: DashboardState) {
        self.state = snapshot;
    }
}
