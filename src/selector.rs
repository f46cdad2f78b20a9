//! Memoized read-side projections of [`DashboardState`].
//!
//! Static selectors (`SELECT_*`) recompute only when the slice they read
//! has been replaced, which the store signals by swapping the slice's
//! `Arc`. Their memo entries live in the [`SelectorCache`] carried by the
//! state tree, so each session memoizes independently and entries are freed
//! with the session's last snapshot. Parameterized selectors are small
//! structs that build on the static ones.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{
    AttributeFilter, Automation, DateFilterSelection, ExecutionDefinition, ExecutionResult,
    FilterContextDefinition, LayoutItem, LayoutSection, PreparedExecution, UserInfo, Widget,
    WidgetRef,
};
use crate::state::{
    AutomationsState, ConfigState, DashboardState, DateFilterConfig, FilterContextState,
    LayoutState, MetaState,
};

/// A pure, named projection of the dashboard state.
///
/// # Contract
///
/// - [`select`](Selector::select) must be deterministic: the same state
///   yields an equal output. Routines rely on this to read state more than
///   once within a turn.
pub trait Selector {
    type Output;

    /// Name recorded in a routine's effect trace.
    fn name(&self) -> &'static str;

    fn select(&self, state: &DashboardState) -> Self::Output;
}

type CacheKey = (TypeId, &'static str);

/// Memo table for [`Memoized`] selectors, one per session.
///
/// A session's live state and every snapshot taken from it share the same
/// table. Each entry holds the last input slice and output of one selector.
#[derive(Clone, Default)]
pub struct SelectorCache {
    entries: Arc<Mutex<HashMap<CacheKey, Box<dyn Any + Send + Sync>>>>,
}

impl SelectorCache {
    /// Number of selectors with a memoized output.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Entries are replaced whole, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Box<dyn Any + Send + Sync>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Manual `Debug` because `dyn Any` is not `Debug`.
impl fmt::Debug for SelectorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorCache")
            .field("entries", &self.len())
            .finish()
    }
}

/// A selector over one slice, cached on that slice's identity.
///
/// A call with the same slice allocation as the previous call on the same
/// session returns a clone of the cached output without running `project`.
pub struct Memoized<I, O> {
    name: &'static str,
    input: fn(&DashboardState) -> &Arc<I>,
    project: fn(&I) -> O,
}

impl<I, O> Memoized<I, O> {
    pub const fn new(
        name: &'static str,
        input: fn(&DashboardState) -> &Arc<I>,
        project: fn(&I) -> O,
    ) -> Self {
        Self {
            name,
            input,
            project,
        }
    }
}

impl<I, O> Selector for Memoized<I, O>
where
    I: Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    type Output = O;

    fn name(&self) -> &'static str {
        self.name
    }

    fn select(&self, state: &DashboardState) -> O {
        let input = (self.input)(state);
        let key = (TypeId::of::<Self>(), self.name);
        if let Some((cached_input, output)) = state
            .selectors
            .lock()
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<(Arc<I>, O)>())
            && Arc::ptr_eq(cached_input, input)
        {
            return output.clone();
        }
        // Projected without the lock held.
        let output = (self.project)(input);
        state
            .selectors
            .lock()
            .insert(key, Box::new((Arc::clone(input), output.clone())));
        output
    }
}

impl<S: Selector + ?Sized> Selector for &S {
    type Output = S::Output;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn select(&self, state: &DashboardState) -> S::Output {
        (**self).select(state)
    }
}

// -- meta --------------------------------------------------------------------

pub static SELECT_DASHBOARD_TITLE: Memoized<MetaState, String> =
    Memoized::new("dashboard_title", |s| &s.meta, |m| m.title.clone());

pub static SELECT_DASHBOARD_REF: Memoized<MetaState, Option<String>> =
    Memoized::new("dashboard_ref", |s| &s.meta, |m| m.dashboard_ref.clone());

pub static SELECT_CURRENT_USER: Memoized<MetaState, Option<UserInfo>> =
    Memoized::new("current_user", |s| &s.meta, |m| m.user.clone());

pub static SELECT_IS_INITIALIZED: Memoized<MetaState, bool> =
    Memoized::new("is_initialized", |s| &s.meta, |m| m.initialized);

// -- config ------------------------------------------------------------------

pub static SELECT_LOCALE: Memoized<ConfigState, String> =
    Memoized::new("locale", |s| &s.config, |c| c.locale.clone());

pub static SELECT_DATE_FILTER_CONFIG: Memoized<ConfigState, DateFilterConfig> =
    Memoized::new("date_filter_config", |s| &s.config, |c| c.date_filter.clone());

// -- filter context ----------------------------------------------------------

pub static SELECT_DATE_FILTER: Memoized<FilterContextState, Option<DateFilterSelection>> =
    Memoized::new("date_filter", |s| &s.filter_context, |f| f.date_filter.clone());

pub static SELECT_ATTRIBUTE_FILTERS: Memoized<FilterContextState, Arc<Vec<AttributeFilter>>> =
    Memoized::new(
        "attribute_filters",
        |s| &s.filter_context,
        |f| Arc::new(f.attribute_filters.clone()),
    );

pub static SELECT_FILTER_CONTEXT_DEFINITION: Memoized<
    FilterContextState,
    Arc<FilterContextDefinition>,
> = Memoized::new(
    "filter_context_definition",
    |s| &s.filter_context,
    |f| Arc::new(f.definition()),
);

/// `true` when the filters differ from the ones the dashboard was loaded with.
pub static SELECT_FILTER_CONTEXT_CHANGED: Memoized<FilterContextState, bool> = Memoized::new(
    "filter_context_changed",
    |s| &s.filter_context,
    |f| match &f.original {
        Some(original) => {
            original.attribute_filters != f.attribute_filters
                || original.date_filter.clone().filter(|d| !d.is_all_time()) != f.date_filter
        }
        None => false,
    },
);

// -- layout ------------------------------------------------------------------

pub static SELECT_LAYOUT_SECTIONS: Memoized<LayoutState, Arc<Vec<LayoutSection>>> =
    Memoized::new("layout_sections", |s| &s.layout, |l| Arc::new(l.sections.clone()));

pub static SELECT_WIDGETS_BY_REF: Memoized<LayoutState, Arc<BTreeMap<WidgetRef, Widget>>> =
    Memoized::new(
        "widgets_by_ref",
        |s| &s.layout,
        |l| {
            Arc::new(
                l.widgets()
                    .map(|w| (w.widget_ref.clone(), w.clone()))
                    .collect(),
            )
        },
    );

/// Names of the undoable layout changes, oldest first.
pub static SELECT_LAYOUT_HISTORY: Memoized<LayoutState, Arc<Vec<&'static str>>> =
    Memoized::new(
        "layout_history",
        |s| &s.layout,
        |l| Arc::new(l.undo.iter().map(|e| e.action).collect()),
    );

pub static SELECT_STASH: Memoized<LayoutState, Arc<BTreeMap<String, Vec<LayoutItem>>>> =
    Memoized::new("layout_stash", |s| &s.layout, |l| Arc::new(l.stash.clone()));

// -- automations -------------------------------------------------------------

pub static SELECT_AUTOMATIONS: Memoized<AutomationsState, Arc<Vec<Automation>>> = Memoized::new(
    "automations",
    |s| &s.automations,
    |a| Arc::new(a.automations.values().cloned().collect()),
);

// -- parameterized -----------------------------------------------------------

/// A widget on the layout, by reference.
#[derive(Debug, Clone)]
pub struct WidgetByRef(pub WidgetRef);

impl Selector for WidgetByRef {
    type Output = Option<Widget>;

    fn name(&self) -> &'static str {
        "widget_by_ref"
    }

    fn select(&self, state: &DashboardState) -> Option<Widget> {
        SELECT_WIDGETS_BY_REF.select(state).get(&self.0).cloned()
    }
}

/// The tracked execution state of a widget, loading or not.
#[derive(Debug, Clone)]
pub struct ExecutionResultByWidget(pub WidgetRef);

impl Selector for ExecutionResultByWidget {
    type Output = Option<ExecutionResult>;

    fn name(&self) -> &'static str {
        "execution_result_by_widget"
    }

    fn select(&self, state: &DashboardState) -> Option<ExecutionResult> {
        state.execution_results.get(&self.0).cloned()
    }
}

/// A widget's prepared execution, if it finished loading without error.
#[derive(Debug, Clone)]
pub struct PreparedExecutionByWidget(pub WidgetRef);

impl Selector for PreparedExecutionByWidget {
    type Output = Option<PreparedExecution>;

    fn name(&self) -> &'static str {
        "prepared_execution_by_widget"
    }

    fn select(&self, state: &DashboardState) -> Option<PreparedExecution> {
        state.execution_results.prepared(&self.0).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct AttributeFilterByLocalId(pub String);

impl Selector for AttributeFilterByLocalId {
    type Output = Option<AttributeFilter>;

    fn name(&self) -> &'static str {
        "attribute_filter_by_local_id"
    }

    fn select(&self, state: &DashboardState) -> Option<AttributeFilter> {
        state.filter_context.attribute_filter(&self.0).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct AutomationById(pub String);

impl Selector for AutomationById {
    type Output = Option<Automation>;

    fn name(&self) -> &'static str {
        "automation_by_id"
    }

    fn select(&self, state: &DashboardState) -> Option<Automation> {
        state.automations.get(&self.0).cloned()
    }
}

/// What to execute for a widget under the current dashboard filters.
///
/// Attribute filters the widget ignores are left out, and the date filter
/// only applies to widgets with a date dataset.
#[derive(Debug, Clone)]
pub struct WidgetExecutionDefinition(pub WidgetRef);

impl Selector for WidgetExecutionDefinition {
    type Output = Option<ExecutionDefinition>;

    fn name(&self) -> &'static str {
        "widget_execution_definition"
    }

    fn select(&self, state: &DashboardState) -> Option<ExecutionDefinition> {
        let widget = WidgetByRef(self.0.clone()).select(state)?;
        let date_filter = widget
            .date_dataset
            .as_ref()
            .and_then(|_| SELECT_DATE_FILTER.select(state));
        let attribute_filters = SELECT_ATTRIBUTE_FILTERS
            .select(state)
            .iter()
            .filter(|f| !widget.ignored_attribute_filters.contains(&f.display_form))
            .cloned()
            .collect();
        Some(ExecutionDefinition {
            widget_ref: widget.widget_ref,
            insight: widget.insight,
            date_filter,
            attribute_filters,
        })
    }
}
