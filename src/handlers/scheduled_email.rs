//! Scheduled email (automation) routines.

use crate::error::RoutineError;
use crate::event::EventPayload;
use crate::model::{Attachment, Automation, AutomationDefinition, PreparedExecution, WidgetRef};
use crate::routine::{CallEffect, RoutineContext};
use crate::selector::{
    AutomationById, PreparedExecutionByWidget, SELECT_FILTER_CONTEXT_DEFINITION, SELECT_LOCALE,
    WidgetByRef,
};
use crate::state::AutomationsAction;

/// Message of the validation failure for a raw export with nothing to reuse.
pub(crate) const MISSING_RAW_EXECUTION: &str =
    "CSV raw widget attachment requires an available execution";

/// Check widget attachments against the store and collect the prepared
/// executions raw exports will reuse.
///
/// For raw exports the execution is checked before the widget, so a widget
/// that is missing altogether reports the missing execution.
fn validate_attachments(
    cx: &mut RoutineContext<'_>,
    attachments: &[Attachment],
) -> Result<Vec<PreparedExecution>, RoutineError> {
    let mut raw_executions = Vec::new();
    for attachment in attachments {
        let Some(widget_ref) = attachment.widget_ref() else {
            continue;
        };
        if attachment.is_raw_export() {
            let execution = cx
                .select(&PreparedExecutionByWidget(widget_ref.clone()))
                .ok_or_else(|| RoutineError::validation(MISSING_RAW_EXECUTION))?;
            raw_executions.push(execution);
        }
        if cx.select(&WidgetByRef(widget_ref.clone())).is_none() {
            return Err(RoutineError::validation(format!(
                "attachment references widget {widget_ref} which is not on the dashboard"
            )));
        }
    }
    Ok(raw_executions)
}

/// Validate `definition` and complete it with the dashboard's filters,
/// locale, translated widget titles, and raw executions.
async fn prepare_definition(
    cx: &mut RoutineContext<'_>,
    definition: &AutomationDefinition,
) -> Result<AutomationDefinition, RoutineError> {
    let raw_executions = validate_attachments(cx, &definition.attachments)?;
    if definition.title.trim().is_empty() {
        return Err(RoutineError::validation(
            "scheduled email title must not be empty",
        ));
    }
    if definition.recipients.is_empty() {
        return Err(RoutineError::validation(
            "scheduled email needs at least one recipient",
        ));
    }

    let locale = cx.select(&SELECT_LOCALE);
    let filters = cx.select(&SELECT_FILTER_CONTEXT_DEFINITION);

    let mut prepared = definition.clone();
    let widgets: Vec<WidgetRef> = prepared
        .attachments
        .iter()
        .filter_map(Attachment::widget_ref)
        .cloned()
        .collect();
    if !widgets.is_empty() {
        let backend = cx.backend();
        let titles = cx
            .call(
                CallEffect::ResolveTitles,
                backend.resolve_titles(&widgets, &locale),
            )
            .await?;
        for attachment in &mut prepared.attachments {
            if let Attachment::Widget {
                widget_ref, title, ..
            } = attachment
            {
                let resolved = match titles.get(&*widget_ref) {
                    Some(t) => Some(t.clone()),
                    None => cx.select(&WidgetByRef(widget_ref.clone())).map(|w| w.title),
                };
                *title = resolved;
            }
        }
    }

    prepared.filters = Some((*filters).clone());
    prepared.locale = Some(locale);
    prepared.raw_executions = raw_executions;
    Ok(prepared)
}

pub(crate) async fn create(
    cx: &mut RoutineContext<'_>,
    definition: &AutomationDefinition,
) -> Result<EventPayload, RoutineError> {
    let prepared = prepare_definition(cx, definition).await?;
    let backend = cx.backend();
    let automation = cx
        .call(
            CallEffect::CreateAutomation,
            backend.create_automation(&prepared),
        )
        .await?;
    cx.put(AutomationsAction::Upsert(automation.clone()))?;
    Ok(EventPayload::ScheduledEmailCreated { automation })
}

pub(crate) async fn save(
    cx: &mut RoutineContext<'_>,
    automation: &Automation,
) -> Result<EventPayload, RoutineError> {
    let definition = prepare_definition(cx, &automation.definition).await?;
    let updated = Automation {
        id: automation.id.clone(),
        definition,
    };
    let backend = cx.backend();
    let saved = cx
        .call(
            CallEffect::UpdateAutomation,
            backend.update_automation(&updated),
        )
        .await?;
    cx.put(AutomationsAction::Upsert(saved.clone()))?;
    Ok(EventPayload::ScheduledEmailSaved { automation: saved })
}

/// Delete automations one by one.
///
/// Each deletion the backend confirms is applied to the store right away,
/// so a rejection part way through leaves the store agreeing with the
/// backend about the automations already gone.
pub(crate) async fn remove_automations(
    cx: &mut RoutineContext<'_>,
    ids: &[String],
) -> Result<EventPayload, RoutineError> {
    if ids.is_empty() {
        return Err(RoutineError::validation("no automations given to remove"));
    }
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            return Err(RoutineError::validation(format!(
                "automation {id} is listed more than once"
            )));
        }
        if cx.select(&AutomationById(id.clone())).is_none() {
            return Err(RoutineError::validation(format!(
                "automation {id} does not exist"
            )));
        }
    }

    let backend = cx.backend();
    for id in ids {
        cx.call(CallEffect::DeleteAutomation, backend.delete_automation(id))
            .await?;
        cx.put(AutomationsAction::Remove(vec![id.clone()]))?;
    }
    Ok(EventPayload::AutomationsRemoved { ids: ids.to_vec() })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{definition, raw_table_automation};
    use super::*;
    use crate::command::DashboardCommand;
    use crate::error::EffectError;
    use crate::handlers::test_support::Harness;
    use crate::model::{ExecutionResult, ExportFormat};
    use crate::routine::Effect;
    use crate::state::ExecutionResultsAction;
    use crate::state::test_fixtures::prepared;

    #[tokio::test]
    async fn save_without_execution_fails_before_any_call() {
        let mut h = Harness::loaded();
        let before = h.store.snapshot();

        let err = h
            .run(DashboardCommand::SaveScheduledEmail {
                automation: raw_table_automation(),
            })
            .await
            .expect_err("save should fail");

        assert_eq!(err, RoutineError::Validation(MISSING_RAW_EXECUTION.into()));
        assert_eq!(h.store.state(), &before);
        assert!(h.call_effects().is_empty());
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_execution_is_reported_before_missing_widget() {
        let mut h = Harness::loaded();
        let automation = Automation {
            id: "auto-1".into(),
            definition: definition(vec![Attachment::widget("w-gone", ExportFormat::CsvRaw)]),
        };
        let err = h
            .run(DashboardCommand::SaveScheduledEmail { automation })
            .await
            .expect_err("save should fail");
        assert_eq!(err.to_string(), MISSING_RAW_EXECUTION);
    }

    #[tokio::test]
    async fn missing_widget_is_reported_for_regular_exports() {
        let mut h = Harness::loaded();
        let automation = Automation {
            id: "auto-1".into(),
            definition: definition(vec![Attachment::widget("w-gone", ExportFormat::Pdf)]),
        };
        let err = h
            .run(DashboardCommand::SaveScheduledEmail { automation })
            .await
            .expect_err("save should fail");
        assert_eq!(
            err.to_string(),
            "attachment references widget w-gone which is not on the dashboard"
        );
    }

    #[tokio::test]
    async fn save_resolves_titles_and_captures_context() {
        let mut h = Harness::loaded();
        h.store.dispatch(
            &ExecutionResultsAction::Upsert(ExecutionResult::ready(prepared("w-table"))).into(),
        );
        h.backend.set_title("w-table", "Tabulka tržeb");

        let payload = h
            .run(DashboardCommand::SaveScheduledEmail {
                automation: raw_table_automation(),
            })
            .await
            .expect("save should succeed");

        let EventPayload::ScheduledEmailSaved { automation } = payload else {
            panic!("unexpected payload {payload:?}");
        };
        let def = &automation.definition;
        assert_eq!(def.locale.as_deref(), Some("en-US"));
        assert_eq!(def.raw_executions, vec![prepared("w-table")]);
        assert_eq!(
            def.filters.as_ref().map(|f| f.attribute_filters.len()),
            Some(1)
        );
        assert!(matches!(
            &def.attachments[0],
            Attachment::Widget { title: Some(t), .. } if t == "Tabulka tržeb"
        ));
        assert_eq!(
            h.call_effects(),
            vec![CallEffect::ResolveTitles, CallEffect::UpdateAutomation]
        );
        assert!(h.store.state().automations().get("auto-1").is_some());
        assert_eq!(h.effects.last(), Some(&Effect::Put { slice: "automations" }));
    }

    #[tokio::test]
    async fn untranslated_titles_fall_back_to_widget_title() {
        let mut h = Harness::loaded();
        let payload = h
            .run(DashboardCommand::CreateScheduledEmail {
                definition: definition(vec![Attachment::widget("w-chart", ExportFormat::Pdf)]),
            })
            .await
            .expect("create should succeed");
        let EventPayload::ScheduledEmailCreated { automation } = payload else {
            panic!("unexpected payload {payload:?}");
        };
        assert!(matches!(
            &automation.definition.attachments[0],
            Attachment::Widget { title: Some(t), .. } if t == "Pipeline by stage"
        ));
    }

    #[tokio::test]
    async fn remove_deletes_each_automation() {
        let mut h = Harness::loaded();
        let payload = h
            .run(DashboardCommand::CreateScheduledEmail {
                definition: definition(Vec::new()),
            })
            .await
            .expect("create should succeed");
        let EventPayload::ScheduledEmailCreated { automation } = payload else {
            panic!("unexpected payload {payload:?}");
        };

        h.run(DashboardCommand::RemoveAutomations {
            ids: vec![automation.id.clone()],
        })
        .await
        .expect("remove should succeed");
        assert!(h.store.state().automations().automations.is_empty());
        assert_eq!(h.call_effects(), vec![CallEffect::DeleteAutomation]);

        let err = h
            .run(DashboardCommand::RemoveAutomations {
                ids: vec![automation.id],
            })
            .await
            .expect_err("second remove should fail");
        assert!(matches!(err, RoutineError::Validation(_)));
    }

    async fn create_two(h: &mut Harness) -> Vec<String> {
        let mut ids = Vec::new();
        for _ in 0..2 {
            let payload = h
                .run(DashboardCommand::CreateScheduledEmail {
                    definition: definition(Vec::new()),
                })
                .await
                .expect("create should succeed");
            let EventPayload::ScheduledEmailCreated { automation } = payload else {
                panic!("unexpected payload {payload:?}");
            };
            ids.push(automation.id);
        }
        ids
    }

    #[tokio::test]
    async fn rejected_delete_keeps_store_in_step_with_backend() {
        let mut h = Harness::loaded();
        let ids = create_two(&mut h).await;
        h.backend.fail_delete(&ids[1], EffectError::Unavailable("down".into()));

        let err = h
            .run(DashboardCommand::RemoveAutomations { ids: ids.clone() })
            .await
            .expect_err("remove should fail");

        assert!(matches!(err, RoutineError::Effect(_)));
        let automations = h.store.state().automations();
        assert!(automations.get(&ids[0]).is_none());
        assert!(automations.get(&ids[1]).is_some());
        assert_eq!(
            h.call_effects(),
            vec![CallEffect::DeleteAutomation, CallEffect::DeleteAutomation]
        );
    }

    #[tokio::test]
    async fn remove_rejects_repeated_ids() {
        let mut h = Harness::loaded();
        let ids = create_two(&mut h).await;

        let err = h
            .run(DashboardCommand::RemoveAutomations {
                ids: vec![ids[0].clone(), ids[0].clone()],
            })
            .await
            .expect_err("repeated id should fail");

        assert!(matches!(err, RoutineError::Validation(_)));
        assert!(h.call_effects().is_empty());
        assert_eq!(h.store.state().automations().automations.len(), 2);
    }
}
