//! Command envelope and the typed command set.

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::context::FEATURE_SCHEDULING;
use crate::model::{
    AttributeSelection, Automation, AutomationDefinition, DateFilterSelection, ExecutionResult,
    LayoutItem, SectionHeader, WidgetRef,
};

fn one() -> usize {
    1
}

/// Every request a host can make of a dashboard session.
///
/// Serialized adjacently tagged, so a command reads as
/// `{"type": "GDC.DASH/CMD.RENAME", "payload": {"title": "Q3"}}`.
/// Each variant is handled by exactly one routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DashboardCommand {
    /// Load a dashboard into the session. Falls back to the dashboard the
    /// session was opened for when `dashboard_ref` is `None`.
    #[serde(rename = "GDC.DASH/CMD.INITIALIZE")]
    Initialize {
        #[serde(default)]
        dashboard_ref: Option<String>,
    },

    #[serde(rename = "GDC.DASH/CMD.RENAME")]
    RenameDashboard { title: String },

    #[serde(rename = "GDC.DASH/CMD.FILTER_CONTEXT.DATE_FILTER.CHANGE_SELECTION")]
    ChangeDateFilterSelection { selection: DateFilterSelection },

    /// Add a filter on `display_form`, at `index` or at the end.
    #[serde(rename = "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.ADD")]
    AddAttributeFilter {
        display_form: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        selection: AttributeSelection,
    },

    #[serde(rename = "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.REMOVE")]
    RemoveAttributeFilters { local_ids: Vec<String> },

    #[serde(rename = "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.MOVE")]
    MoveAttributeFilter { local_id: String, index: usize },

    #[serde(rename = "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.CHANGE_SELECTION")]
    ChangeAttributeFilterSelection {
        local_id: String,
        selection: AttributeSelection,
    },

    /// Insert a section. Items from the listed stashes are appended after
    /// `items` and the stashes are consumed.
    #[serde(rename = "GDC.DASH/CMD.FLUID_LAYOUT.ADD_SECTION")]
    AddLayoutSection {
        index: usize,
        #[serde(default)]
        header: SectionHeader,
        #[serde(default)]
        items: Vec<LayoutItem>,
        #[serde(default)]
        stashes: Vec<String>,
    },

    /// Remove a section, optionally stashing its items for later reuse.
    #[serde(rename = "GDC.DASH/CMD.FLUID_LAYOUT.REMOVE_SECTION")]
    RemoveLayoutSection {
        index: usize,
        #[serde(default)]
        stash_identifier: Option<String>,
    },

    #[serde(rename = "GDC.DASH/CMD.FLUID_LAYOUT.MOVE_SECTION")]
    MoveLayoutSection { from: usize, to: usize },

    #[serde(rename = "GDC.DASH/CMD.FLUID_LAYOUT.CHANGE_SECTION_HEADER")]
    ChangeLayoutSectionHeader { index: usize, header: SectionHeader },

    #[serde(rename = "GDC.DASH/CMD.FLUID_LAYOUT.UNDO")]
    UndoLayoutChanges {
        #[serde(default = "one")]
        steps: usize,
    },

    #[serde(rename = "GDC.DASH/CMD.INSIGHT_WIDGET.CHANGE_HEADER")]
    ChangeInsightWidgetHeader { widget_ref: WidgetRef, title: String },

    /// Re-execute an insight widget with the current filters.
    #[serde(rename = "GDC.DASH/CMD.INSIGHT_WIDGET.REFRESH")]
    RefreshInsightWidget { widget_ref: WidgetRef },

    #[serde(rename = "GDC.DASH/CMD.EXECUTION_RESULT.UPSERT")]
    UpsertExecutionResult { result: ExecutionResult },

    #[serde(rename = "GDC.DASH/CMD.SCHEDULED_EMAIL.CREATE")]
    CreateScheduledEmail { definition: AutomationDefinition },

    #[serde(rename = "GDC.DASH/CMD.SCHEDULED_EMAIL.SAVE")]
    SaveScheduledEmail { automation: Automation },

    #[serde(rename = "GDC.DASH/CMD.AUTOMATIONS.REMOVE")]
    RemoveAutomations { ids: Vec<String> },
}

impl DashboardCommand {
    /// The wire name of the command, as used in its `type` tag.
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "GDC.DASH/CMD.INITIALIZE",
            Self::RenameDashboard { .. } => "GDC.DASH/CMD.RENAME",
            Self::ChangeDateFilterSelection { .. } => {
                "GDC.DASH/CMD.FILTER_CONTEXT.DATE_FILTER.CHANGE_SELECTION"
            }
            Self::AddAttributeFilter { .. } => "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.ADD",
            Self::RemoveAttributeFilters { .. } => {
                "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.REMOVE"
            }
            Self::MoveAttributeFilter { .. } => "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.MOVE",
            Self::ChangeAttributeFilterSelection { .. } => {
                "GDC.DASH/CMD.FILTER_CONTEXT.ATTRIBUTE_FILTER.CHANGE_SELECTION"
            }
            Self::AddLayoutSection { .. } => "GDC.DASH/CMD.FLUID_LAYOUT.ADD_SECTION",
            Self::RemoveLayoutSection { .. } => "GDC.DASH/CMD.FLUID_LAYOUT.REMOVE_SECTION",
            Self::MoveLayoutSection { .. } => "GDC.DASH/CMD.FLUID_LAYOUT.MOVE_SECTION",
            Self::ChangeLayoutSectionHeader { .. } => {
                "GDC.DASH/CMD.FLUID_LAYOUT.CHANGE_SECTION_HEADER"
            }
            Self::UndoLayoutChanges { .. } => "GDC.DASH/CMD.FLUID_LAYOUT.UNDO",
            Self::ChangeInsightWidgetHeader { .. } => "GDC.DASH/CMD.INSIGHT_WIDGET.CHANGE_HEADER",
            Self::RefreshInsightWidget { .. } => "GDC.DASH/CMD.INSIGHT_WIDGET.REFRESH",
            Self::UpsertExecutionResult { .. } => "GDC.DASH/CMD.EXECUTION_RESULT.UPSERT",
            Self::CreateScheduledEmail { .. } => "GDC.DASH/CMD.SCHEDULED_EMAIL.CREATE",
            Self::SaveScheduledEmail { .. } => "GDC.DASH/CMD.SCHEDULED_EMAIL.SAVE",
            Self::RemoveAutomations { .. } => "GDC.DASH/CMD.AUTOMATIONS.REMOVE",
        }
    }

    /// Feature flag that must be enabled for the command to be handled.
    pub fn required_feature(&self) -> Option<&'static str> {
        match self {
            Self::CreateScheduledEmail { .. }
            | Self::SaveScheduledEmail { .. }
            | Self::RemoveAutomations { .. } => Some(FEATURE_SCHEDULING),
            _ => None,
        }
    }
}

/// A command together with its correlation id and optional cancellation.
///
/// The command bus fills in a correlation id when the issuer did not
/// provide one; every event produced for the command carries it.
///
/// # Examples
///
/// ```
/// use dashboard_engine::{CancellationToken, Command, DashboardCommand};
///
/// let token = CancellationToken::new();
/// let cmd = Command::new(DashboardCommand::RenameDashboard { title: "Q3".into() })
///     .with_correlation_id("req-7")
///     .with_cancellation(token.clone());
///
/// assert_eq!(cmd.correlation_id.as_deref(), Some("req-7"));
/// assert_eq!(cmd.command_type(), "GDC.DASH/CMD.RENAME");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(flatten)]
    pub body: DashboardCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Command {
    pub fn new(body: DashboardCommand) -> Self {
        Self {
            body,
            correlation_id: None,
            cancellation: None,
        }
    }

    /// Set the correlation id. An empty id is treated as absent.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Attach a cancellation token. Cancelling it before the routine
    /// completes discards the routine's mutations.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn command_type(&self) -> &'static str {
        self.body.command_type()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl From<DashboardCommand> for Command {
    fn from(body: DashboardCommand) -> Self {
        Self::new(body)
    }
}
