//! Events published by a dashboard session.
//!
//! Every command that reaches the scheduler produces exactly one terminal
//! event carrying the command's correlation id: the routine's success event,
//! `CommandFailed`, `CommandRejected`, or `Cancelled`. When enabled,
//! `CommandStarted` precedes it but is never terminal.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::context::DashboardContext;
use crate::model::{
    AttributeFilter, Automation, DashboardDefinition, DateFilterSelection, ExecutionResult,
    LayoutSection, PreparedExecution, SectionHeader, UserInfo, WidgetRef,
};

/// Why a command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The command failed a precondition; the issuer can fix and retry.
    UserError,
    /// A backend call or the routine itself failed.
    InternalError,
}

macro_rules! event_types {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Discriminant of [`EventPayload`], used to match awaited events.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum EventType {
            $(#[serde(rename = $name)] $variant,)*
        }

        impl EventType {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

event_types! {
    CommandStarted => "GDC.DASH/EVT.COMMAND.STARTED",
    CommandFailed => "GDC.DASH/EVT.COMMAND.FAILED",
    CommandRejected => "GDC.DASH/EVT.COMMAND.REJECTED",
    Cancelled => "GDC.DASH/EVT.COMMAND.CANCELLED",
    DashboardInitialized => "GDC.DASH/EVT.INITIALIZED",
    DashboardRenamed => "GDC.DASH/EVT.RENAMED",
    DateFilterSelectionChanged => "GDC.DASH/EVT.FILTER_CONTEXT.DATE_FILTER.SELECTION_CHANGED",
    AttributeFilterAdded => "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.ADDED",
    AttributeFiltersRemoved => "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.REMOVED",
    AttributeFilterMoved => "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.MOVED",
    AttributeFilterSelectionChanged => "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.SELECTION_CHANGED",
    LayoutSectionAdded => "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_ADDED",
    LayoutSectionRemoved => "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_REMOVED",
    LayoutSectionMoved => "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_MOVED",
    LayoutSectionHeaderChanged => "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_HEADER_CHANGED",
    LayoutChangesUndone => "GDC.DASH/EVT.FLUID_LAYOUT.CHANGES_UNDONE",
    InsightWidgetHeaderChanged => "GDC.DASH/EVT.INSIGHT_WIDGET.HEADER_CHANGED",
    InsightWidgetRefreshed => "GDC.DASH/EVT.INSIGHT_WIDGET.REFRESHED",
    ExecutionResultUpserted => "GDC.DASH/EVT.EXECUTION_RESULT.UPSERTED",
    ScheduledEmailCreated => "GDC.DASH/EVT.SCHEDULED_EMAIL.CREATED",
    ScheduledEmailSaved => "GDC.DASH/EVT.SCHEDULED_EMAIL.SAVED",
    AutomationsRemoved => "GDC.DASH/EVT.AUTOMATIONS.REMOVED",
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened, with the data describing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
    #[serde(rename = "GDC.DASH/EVT.COMMAND.STARTED")]
    CommandStarted { command_type: &'static str },

    #[serde(rename = "GDC.DASH/EVT.COMMAND.FAILED")]
    CommandFailed {
        command_type: &'static str,
        reason: FailureReason,
        message: String,
    },

    /// No routine handles the command in this session, for example because
    /// its feature flag is off.
    #[serde(rename = "GDC.DASH/EVT.COMMAND.REJECTED")]
    CommandRejected { command_type: &'static str },

    #[serde(rename = "GDC.DASH/EVT.COMMAND.CANCELLED")]
    Cancelled { command_type: &'static str },

    #[serde(rename = "GDC.DASH/EVT.INITIALIZED")]
    DashboardInitialized {
        dashboard: DashboardDefinition,
        user: UserInfo,
    },

    #[serde(rename = "GDC.DASH/EVT.RENAMED")]
    DashboardRenamed { title: String },

    #[serde(rename = "GDC.DASH/EVT.FILTER_CONTEXT.DATE_FILTER.SELECTION_CHANGED")]
    DateFilterSelectionChanged { selection: DateFilterSelection },

    #[serde(rename = "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.ADDED")]
    AttributeFilterAdded { filter: AttributeFilter, index: usize },

    #[serde(rename = "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.REMOVED")]
    AttributeFiltersRemoved { removed: Vec<AttributeFilter> },

    #[serde(rename = "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.MOVED")]
    AttributeFilterMoved {
        local_id: String,
        from: usize,
        to: usize,
    },

    #[serde(rename = "GDC.DASH/EVT.FILTER_CONTEXT.ATTRIBUTE_FILTER.SELECTION_CHANGED")]
    AttributeFilterSelectionChanged { filter: AttributeFilter },

    #[serde(rename = "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_ADDED")]
    LayoutSectionAdded { index: usize, section: LayoutSection },

    #[serde(rename = "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_REMOVED")]
    LayoutSectionRemoved {
        index: usize,
        section: LayoutSection,
        stash_identifier: Option<String>,
    },

    #[serde(rename = "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_MOVED")]
    LayoutSectionMoved { from: usize, to: usize },

    #[serde(rename = "GDC.DASH/EVT.FLUID_LAYOUT.SECTION_HEADER_CHANGED")]
    LayoutSectionHeaderChanged { index: usize, header: SectionHeader },

    /// `undone` lists the reverted changes, most recent first.
    #[serde(rename = "GDC.DASH/EVT.FLUID_LAYOUT.CHANGES_UNDONE")]
    LayoutChangesUndone { undone: Vec<&'static str> },

    #[serde(rename = "GDC.DASH/EVT.INSIGHT_WIDGET.HEADER_CHANGED")]
    InsightWidgetHeaderChanged { widget_ref: WidgetRef, title: String },

    #[serde(rename = "GDC.DASH/EVT.INSIGHT_WIDGET.REFRESHED")]
    InsightWidgetRefreshed {
        widget_ref: WidgetRef,
        execution: PreparedExecution,
    },

    #[serde(rename = "GDC.DASH/EVT.EXECUTION_RESULT.UPSERTED")]
    ExecutionResultUpserted { result: ExecutionResult },

    #[serde(rename = "GDC.DASH/EVT.SCHEDULED_EMAIL.CREATED")]
    ScheduledEmailCreated { automation: Automation },

    #[serde(rename = "GDC.DASH/EVT.SCHEDULED_EMAIL.SAVED")]
    ScheduledEmailSaved { automation: Automation },

    #[serde(rename = "GDC.DASH/EVT.AUTOMATIONS.REMOVED")]
    AutomationsRemoved { ids: Vec<String> },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::CommandStarted { .. } => EventType::CommandStarted,
            Self::CommandFailed { .. } => EventType::CommandFailed,
            Self::CommandRejected { .. } => EventType::CommandRejected,
            Self::Cancelled { .. } => EventType::Cancelled,
            Self::DashboardInitialized { .. } => EventType::DashboardInitialized,
            Self::DashboardRenamed { .. } => EventType::DashboardRenamed,
            Self::DateFilterSelectionChanged { .. } => EventType::DateFilterSelectionChanged,
            Self::AttributeFilterAdded { .. } => EventType::AttributeFilterAdded,
            Self::AttributeFiltersRemoved { .. } => EventType::AttributeFiltersRemoved,
            Self::AttributeFilterMoved { .. } => EventType::AttributeFilterMoved,
            Self::AttributeFilterSelectionChanged { .. } => {
                EventType::AttributeFilterSelectionChanged
            }
            Self::LayoutSectionAdded { .. } => EventType::LayoutSectionAdded,
            Self::LayoutSectionRemoved { .. } => EventType::LayoutSectionRemoved,
            Self::LayoutSectionMoved { .. } => EventType::LayoutSectionMoved,
            Self::LayoutSectionHeaderChanged { .. } => EventType::LayoutSectionHeaderChanged,
            Self::LayoutChangesUndone { .. } => EventType::LayoutChangesUndone,
            Self::InsightWidgetHeaderChanged { .. } => EventType::InsightWidgetHeaderChanged,
            Self::InsightWidgetRefreshed { .. } => EventType::InsightWidgetRefreshed,
            Self::ExecutionResultUpserted { .. } => EventType::ExecutionResultUpserted,
            Self::ScheduledEmailCreated { .. } => EventType::ScheduledEmailCreated,
            Self::ScheduledEmailSaved { .. } => EventType::ScheduledEmailSaved,
            Self::AutomationsRemoved { .. } => EventType::AutomationsRemoved,
        }
    }
}

/// An event as delivered to subscribers.
///
/// `ctx` is the session context the producing routine ran with. It is
/// shared, not copied, and is left out of the serialized form.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardEvent {
    #[serde(skip)]
    pub ctx: Arc<DashboardContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl DashboardEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// `false` only for lifecycle events that precede the outcome.
    pub fn is_terminal(&self) -> bool {
        self.event_type() != EventType::CommandStarted
    }

    /// `true` for events reporting that the command did not succeed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.event_type(),
            EventType::CommandFailed | EventType::CommandRejected | EventType::Cancelled
        )
    }

    /// The failure message, for `CommandFailed` events.
    pub fn failure_message(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::CommandFailed { message, .. } => Some(message),
            _ => None,
        }
    }
}
