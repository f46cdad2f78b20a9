use crate::error::RoutineError;
use crate::event::EventPayload;
use crate::model::{ExecutionResult, Widget, WidgetKind, WidgetRef};
use crate::routine::{CallEffect, RoutineContext};
use crate::selector::{WidgetByRef, WidgetExecutionDefinition};
use crate::state::{ExecutionResultsAction, LayoutAction};

fn insight_widget(
    cx: &mut RoutineContext<'_>,
    widget_ref: &WidgetRef,
) -> Result<Widget, RoutineError> {
    let widget = cx
        .select(&WidgetByRef(widget_ref.clone()))
        .ok_or_else(|| RoutineError::validation(format!("widget {widget_ref} does not exist")))?;
    if widget.kind != WidgetKind::Insight {
        return Err(RoutineError::validation(format!(
            "widget {widget_ref} is not an insight widget"
        )));
    }
    Ok(widget)
}

pub(crate) fn change_insight_widget_header(
    cx: &mut RoutineContext<'_>,
    widget_ref: &WidgetRef,
    title: &str,
) -> Result<EventPayload, RoutineError> {
    insight_widget(cx, widget_ref)?;
    cx.put(LayoutAction::ReplaceWidgetHeader {
        widget_ref: widget_ref.clone(),
        title: title.to_owned(),
    })?;
    Ok(EventPayload::InsightWidgetHeaderChanged {
        widget_ref: widget_ref.clone(),
        title: title.to_owned(),
    })
}

/// Re-execute a widget. A rejected execution is recorded on the widget's
/// result before the routine fails.
pub(crate) async fn refresh_insight_widget(
    cx: &mut RoutineContext<'_>,
    widget_ref: &WidgetRef,
) -> Result<EventPayload, RoutineError> {
    insight_widget(cx, widget_ref)?;
    let Some(definition) = cx.select(&WidgetExecutionDefinition(widget_ref.clone())) else {
        return Err(RoutineError::validation(format!(
            "widget {widget_ref} does not exist"
        )));
    };

    cx.put(ExecutionResultsAction::Upsert(ExecutionResult::loading(
        widget_ref.clone(),
    )))?;
    let backend = cx.backend();
    match cx
        .call(
            CallEffect::ExecuteVisualization,
            backend.execute_visualization(&definition),
        )
        .await
    {
        Ok(execution) => {
            cx.put(ExecutionResultsAction::Upsert(ExecutionResult::ready(
                execution.clone(),
            )))?;
            Ok(EventPayload::InsightWidgetRefreshed {
                widget_ref: widget_ref.clone(),
                execution,
            })
        }
        Err(RoutineError::Effect(err)) => {
            cx.put(ExecutionResultsAction::Upsert(ExecutionResult::failed(
                widget_ref.clone(),
                err.to_string(),
            )))?;
            Err(RoutineError::Effect(err))
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn upsert_execution_result(
    cx: &mut RoutineContext<'_>,
    result: &ExecutionResult,
) -> Result<EventPayload, RoutineError> {
    cx.put(ExecutionResultsAction::Upsert(result.clone()))?;
    Ok(EventPayload::ExecutionResultUpserted {
        result: result.clone(),
    })
}

#[cfg(test)]
mod tests {
    use crate::command::DashboardCommand;
    use crate::error::{EffectError, RoutineError};
    use crate::event::EventPayload;
    use crate::handlers::test_support::Harness;
    use crate::model::WidgetRef;
    use crate::routine::{CallEffect, Effect};

    #[tokio::test]
    async fn header_change_requires_insight_widget() {
        let mut h = Harness::loaded();
        let err = h
            .run(DashboardCommand::ChangeInsightWidgetHeader {
                widget_ref: WidgetRef::new("w-kpi"),
                title: "KPI".into(),
            })
            .await
            .expect_err("kpi is not an insight");
        assert_eq!(err.to_string(), "widget w-kpi is not an insight widget");

        h.run(DashboardCommand::ChangeInsightWidgetHeader {
            widget_ref: WidgetRef::new("w-chart"),
            title: "Stages".into(),
        })
        .await
        .expect("header change should succeed");
        assert_eq!(
            h.store
                .state()
                .layout()
                .widget(&WidgetRef::new("w-chart"))
                .map(|w| w.title.clone()),
            Some("Stages".to_string())
        );
    }

    #[tokio::test]
    async fn refresh_stores_prepared_execution() {
        let mut h = Harness::loaded();
        let widget = WidgetRef::new("w-table");
        let payload = h
            .run(DashboardCommand::RefreshInsightWidget {
                widget_ref: widget.clone(),
            })
            .await
            .expect("refresh should succeed");

        assert!(matches!(payload, EventPayload::InsightWidgetRefreshed { .. }));
        let results = h.store.state().execution_results();
        assert!(results.prepared(&widget).is_some());
        assert_eq!(
            h.effects
                .iter()
                .filter(|e| matches!(e, Effect::Put { .. }))
                .count(),
            2
        );
        assert_eq!(h.call_effects(), vec![CallEffect::ExecuteVisualization]);
    }

    #[tokio::test]
    async fn failed_refresh_records_error_on_result() {
        let mut h = Harness::loaded();
        h.backend.fail_next(
            "execute_visualization",
            EffectError::rejected("execute_visualization", "bad insight"),
        );
        let widget = WidgetRef::new("w-table");
        let err = h
            .run(DashboardCommand::RefreshInsightWidget {
                widget_ref: widget.clone(),
            })
            .await
            .expect_err("refresh should fail");

        assert!(matches!(err, RoutineError::Effect(_)));
        let result = h
            .store
            .state()
            .execution_results()
            .get(&widget)
            .cloned()
            .expect("result should be recorded");
        assert!(!result.is_loading);
        assert_eq!(
            result.error.as_deref(),
            Some("execute_visualization rejected: bad insight")
        );
    }
}
