//! Command handler routines.
//!
//! [`run`] maps each [`DashboardCommand`] variant to exactly one routine.
//! Routines validate first, then perform effects through the
//! [`RoutineContext`], and return the success event payload.

mod dashboard;
mod filter_context;
mod layout;
mod scheduled_email;
mod widgets;

use crate::command::DashboardCommand;
use crate::context::DashboardContext;
use crate::error::RoutineError;
use crate::event::EventPayload;
use crate::routine::RoutineContext;

/// Whether this session handles `command` at all.
///
/// Commands gated by a feature flag are rejected while the flag is off.
pub(crate) fn is_enabled(command: &DashboardCommand, ctx: &DashboardContext) -> bool {
    command
        .required_feature()
        .is_none_or(|feature| ctx.is_feature_enabled(feature))
}

/// Run the routine bound to `command`.
pub(crate) async fn run(
    cx: &mut RoutineContext<'_>,
    command: &DashboardCommand,
) -> Result<EventPayload, RoutineError> {
    match command {
        DashboardCommand::Initialize { dashboard_ref } => {
            dashboard::initialize(cx, dashboard_ref.as_deref()).await
        }
        DashboardCommand::RenameDashboard { title } => dashboard::rename(cx, title),
        DashboardCommand::ChangeDateFilterSelection { selection } => {
            filter_context::change_date_filter_selection(cx, selection)
        }
        DashboardCommand::AddAttributeFilter {
            display_form,
            index,
            title,
            selection,
        } => filter_context::add_attribute_filter(
            cx,
            display_form,
            *index,
            title.as_deref(),
            selection,
        ),
        DashboardCommand::RemoveAttributeFilters { local_ids } => {
            filter_context::remove_attribute_filters(cx, local_ids)
        }
        DashboardCommand::MoveAttributeFilter { local_id, index } => {
            filter_context::move_attribute_filter(cx, local_id, *index)
        }
        DashboardCommand::ChangeAttributeFilterSelection {
            local_id,
            selection,
        } => filter_context::change_attribute_filter_selection(cx, local_id, selection),
        DashboardCommand::AddLayoutSection {
            index,
            header,
            items,
            stashes,
        } => layout::add_section(cx, *index, header, items, stashes),
        DashboardCommand::RemoveLayoutSection {
            index,
            stash_identifier,
        } => layout::remove_section(cx, *index, stash_identifier.as_deref()),
        DashboardCommand::MoveLayoutSection { from, to } => layout::move_section(cx, *from, *to),
        DashboardCommand::ChangeLayoutSectionHeader { index, header } => {
            layout::change_section_header(cx, *index, header)
        }
        DashboardCommand::UndoLayoutChanges { steps } => layout::undo(cx, *steps),
        DashboardCommand::ChangeInsightWidgetHeader { widget_ref, title } => {
            widgets::change_insight_widget_header(cx, widget_ref, title)
        }
        DashboardCommand::RefreshInsightWidget { widget_ref } => {
            widgets::refresh_insight_widget(cx, widget_ref).await
        }
        DashboardCommand::UpsertExecutionResult { result } => {
            widgets::upsert_execution_result(cx, result)
        }
        DashboardCommand::CreateScheduledEmail { definition } => {
            scheduled_email::create(cx, definition).await
        }
        DashboardCommand::SaveScheduledEmail { automation } => {
            scheduled_email::save(cx, automation).await
        }
        DashboardCommand::RemoveAutomations { ids } => {
            scheduled_email::remove_automations(cx, ids).await
        }
    }
}
