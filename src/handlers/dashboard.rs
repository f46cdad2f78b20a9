use crate::error::RoutineError;
use crate::event::EventPayload;
use crate::routine::{CallEffect, RoutineContext};
use crate::state::{ExecutionResultsAction, FilterContextAction, LayoutAction, MetaAction};

pub(crate) async fn initialize(
    cx: &mut RoutineContext<'_>,
    dashboard_ref: Option<&str>,
) -> Result<EventPayload, RoutineError> {
    let Some(target) = dashboard_ref
        .map(str::to_owned)
        .or_else(|| cx.ctx().dashboard_ref.clone())
    else {
        return Err(RoutineError::validation(
            "no dashboard reference to initialize the session with",
        ));
    };

    let backend = cx.backend();
    let dashboard = cx
        .call(CallEffect::LoadDashboard, backend.load_dashboard(&target))
        .await?;
    let user = match cx.ctx().user.clone() {
        Some(user) => user,
        None => {
            cx.call(CallEffect::ResolveCurrentUser, backend.resolve_current_user())
                .await?
        }
    };

    cx.put(MetaAction::SetDashboard {
        dashboard_ref: dashboard.dashboard_ref.clone(),
        title: dashboard.title.clone(),
    })?;
    cx.put(MetaAction::SetUser(user.clone()))?;
    cx.put(LayoutAction::SetLayout(dashboard.layout.clone()))?;
    cx.put(FilterContextAction::SetFilterContext(
        dashboard.filter_context.clone(),
    ))?;
    cx.put(ExecutionResultsAction::Clear)?;

    Ok(EventPayload::DashboardInitialized { dashboard, user })
}

pub(crate) fn rename(
    cx: &mut RoutineContext<'_>,
    title: &str,
) -> Result<EventPayload, RoutineError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(RoutineError::validation("dashboard title must not be empty"));
    }
    cx.put(MetaAction::Rename(title.to_owned()))?;
    Ok(EventPayload::DashboardRenamed {
        title: title.to_owned(),
    })
}
