//! Domain value types shared by commands, state slices, and the backend.
//!
//! Everything here is plain data: cloneable, comparable, and serializable so
//! hosts can build commands from JSON and inspect events as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to a widget placed on the dashboard layout.
///
/// Opaque to the engine; backends typically use the widget's identifier or
/// URI here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetRef(String);

impl WidgetRef {
    /// Create a widget reference from any string-like identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WidgetRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Insight,
    Kpi,
}

/// A widget as stored in the layout slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub widget_ref: WidgetRef,
    pub kind: WidgetKind,
    pub title: String,
    /// Identifier of the visualization rendered by an insight widget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    /// Display forms of dashboard attribute filters this widget ignores.
    #[serde(default)]
    pub ignored_attribute_filters: Vec<String>,
    /// Date dataset used for date filtering; `None` disables the date filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_dataset: Option<String>,
}

impl Widget {
    /// Build an insight widget with no filter customizations.
    pub fn insight(
        widget_ref: impl Into<String>,
        insight: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            widget_ref: WidgetRef::new(widget_ref),
            kind: WidgetKind::Insight,
            title: title.into(),
            insight: Some(insight.into()),
            ignored_attribute_filters: Vec::new(),
            date_dataset: Some("date".to_string()),
        }
    }

    /// Build a KPI widget.
    pub fn kpi(widget_ref: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            widget_ref: WidgetRef::new(widget_ref),
            kind: WidgetKind::Kpi,
            title: title.into(),
            insight: None,
            ignored_attribute_filters: Vec::new(),
            date_dataset: Some("date".to_string()),
        }
    }
}

/// A layout item: a widget with its grid width (1 to 12 columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutItem {
    pub size: u8,
    pub widget: Widget,
}

impl LayoutItem {
    pub fn new(size: u8, widget: Widget) -> Self {
        Self { size, widget }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A horizontal band of layout items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSection {
    #[serde(default)]
    pub header: SectionHeader,
    #[serde(default)]
    pub items: Vec<LayoutItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilterType {
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilterGranularity {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// One end of a date range.
///
/// Relative filters use offsets from today on the filter's granularity;
/// absolute filters use formatted dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateBound {
    Offset(i32),
    Date(String),
}

/// The dashboard-level date filter selection.
///
/// A relative selection with neither bound is the "All time" filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilterSelection {
    pub filter_type: DateFilterType,
    pub granularity: DateFilterGranularity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_local_id: Option<String>,
}

impl DateFilterSelection {
    /// The unbounded "All time" selection.
    pub fn all_time() -> Self {
        Self {
            filter_type: DateFilterType::Relative,
            granularity: DateFilterGranularity::Day,
            from: None,
            to: None,
            option_local_id: None,
        }
    }

    /// A relative selection covering `from..=to` offsets on `granularity`.
    pub fn relative(granularity: DateFilterGranularity, from: i32, to: i32) -> Self {
        Self {
            filter_type: DateFilterType::Relative,
            granularity,
            from: Some(DateBound::Offset(from)),
            to: Some(DateBound::Offset(to)),
            option_local_id: None,
        }
    }

    pub fn is_all_time(&self) -> bool {
        self.filter_type == DateFilterType::Relative && self.from.is_none() && self.to.is_none()
    }
}

/// Selected attribute elements.
///
/// A negative selection with no elements selects everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSelection {
    #[serde(default)]
    pub elements: Vec<String>,
    pub negative: bool,
}

impl AttributeSelection {
    pub fn all() -> Self {
        Self {
            elements: Vec::new(),
            negative: true,
        }
    }

    pub fn only(elements: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
            negative: false,
        }
    }
}

impl Default for AttributeSelection {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub local_id: String,
    pub display_form: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub selection: AttributeSelection,
}

/// Persistent definition of the dashboard filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterContextDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<DateFilterSelection>,
    #[serde(default)]
    pub attribute_filters: Vec<AttributeFilter>,
}

/// A dashboard as loaded from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDefinition {
    pub dashboard_ref: String,
    pub title: String,
    #[serde(default)]
    pub layout: Vec<LayoutSection>,
    #[serde(default)]
    pub filter_context: FilterContextDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// What the backend needs to compute a widget's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDefinition {
    pub widget_ref: WidgetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<DateFilterSelection>,
    #[serde(default)]
    pub attribute_filters: Vec<AttributeFilter>,
}

/// A prepared (executed) visualization, reusable for raw exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedExecution {
    pub fingerprint: String,
    pub definition: ExecutionDefinition,
}

/// Execution state of one widget, as tracked in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub widget_ref: WidgetRef,
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<PreparedExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn loading(widget_ref: WidgetRef) -> Self {
        Self {
            widget_ref,
            is_loading: true,
            execution: None,
            error: None,
        }
    }

    pub fn ready(execution: PreparedExecution) -> Self {
        Self {
            widget_ref: execution.definition.widget_ref.clone(),
            is_loading: false,
            execution: Some(execution),
            error: None,
        }
    }

    pub fn failed(widget_ref: WidgetRef, error: impl Into<String>) -> Self {
        Self {
            widget_ref,
            is_loading: false,
            execution: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Pdf,
    Png,
    Csv,
    CsvRaw,
    Xlsx,
}

/// Something attached to a scheduled email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    /// The whole dashboard, exported with the automation's filters.
    Dashboard { format: ExportFormat },
    /// A single widget export. `title` is filled in with the translated
    /// widget title when the automation is saved.
    Widget {
        widget_ref: WidgetRef,
        format: ExportFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl Attachment {
    pub fn widget(widget_ref: impl Into<String>, format: ExportFormat) -> Self {
        Self::Widget {
            widget_ref: WidgetRef::new(widget_ref),
            format,
            title: None,
        }
    }

    /// The referenced widget, if this is a widget attachment.
    pub fn widget_ref(&self) -> Option<&WidgetRef> {
        match self {
            Self::Widget { widget_ref, .. } => Some(widget_ref),
            Self::Dashboard { .. } => None,
        }
    }

    /// Raw exports reuse the widget's prepared execution instead of
    /// re-executing it on the backend.
    pub fn is_raw_export(&self) -> bool {
        matches!(
            self,
            Self::Widget {
                format: ExportFormat::CsvRaw,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub cron: String,
    pub timezone: String,
}

/// User-editable part of a scheduled email automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationDefinition {
    pub title: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub schedule: Schedule,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Filters the exports are computed with; captured from the dashboard
    /// filter context when the automation is saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterContextDefinition>,
    /// Locale the attachment titles were resolved in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Raw-export executions captured at save time, keyed by widget.
    #[serde(default)]
    pub raw_executions: Vec<PreparedExecution>,
}

/// A persisted automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub definition: AutomationDefinition,
}
