//! End-to-end tests of a dashboard session over the recording backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashboard_engine::model::{
    AttributeFilter, AttributeSelection, Attachment, Automation, AutomationDefinition,
    DashboardDefinition, ExportFormat, FilterContextDefinition, LayoutItem, LayoutSection,
    Schedule, SectionHeader, Widget,
};
use dashboard_engine::selector::{
    SELECT_AUTOMATIONS, SELECT_CURRENT_USER, SELECT_DASHBOARD_REF, SELECT_DASHBOARD_TITLE,
    SELECT_IS_INITIALIZED, SELECT_LAYOUT_HISTORY,
};
use dashboard_engine::testing::RecordingBackend;
use dashboard_engine::{
    ArbiterState, CancellationToken, Command, DashboardCommand, DashboardEvent, DashboardSession,
    DispatchError, EngineConfig, EventPayload, EventType, FEATURE_SCHEDULING, FailureReason,
    FeatureFlags, OpenGrant, Selector, Subscription,
};
use tokio_stream::StreamExt;

const MISSING_EXECUTION: &str = "CSV raw widget attachment requires an available execution";

fn dashboard() -> DashboardDefinition {
    DashboardDefinition {
        dashboard_ref: "dash-1".into(),
        title: "Sales overview".into(),
        layout: vec![
            LayoutSection {
                header: SectionHeader {
                    title: Some("Top".into()),
                    description: None,
                },
                items: vec![
                    LayoutItem::new(
                        6,
                        Widget::insight("w-table", "insight-table", "Revenue table"),
                    ),
                    LayoutItem::new(6, Widget::kpi("w-kpi", "Won deals")),
                ],
            },
            LayoutSection {
                header: SectionHeader::default(),
                items: vec![LayoutItem::new(
                    12,
                    Widget::insight("w-chart", "insight-chart", "Pipeline by stage"),
                )],
            },
        ],
        filter_context: FilterContextDefinition {
            date_filter: None,
            attribute_filters: vec![AttributeFilter {
                local_id: "f-region".into(),
                display_form: "region.name".into(),
                title: Some("Region".into()),
                selection: AttributeSelection::all(),
            }],
        },
    }
}

fn raw_table_automation() -> Automation {
    Automation {
        id: "auto-1".into(),
        definition: AutomationDefinition {
            title: "Weekly revenue".into(),
            recipients: vec!["ceo@example.com".into()],
            schedule: Schedule {
                cron: "0 8 * * 1".into(),
                timezone: "Europe/Prague".into(),
            },
            attachments: vec![Attachment::widget("w-table", ExportFormat::CsvRaw)],
            filters: None,
            locale: None,
            raw_executions: Vec::new(),
        },
    }
}

fn rename(title: &str) -> DashboardCommand {
    DashboardCommand::RenameDashboard {
        title: title.into(),
    }
}

fn refresh(widget: &str) -> DashboardCommand {
    DashboardCommand::RefreshInsightWidget {
        widget_ref: widget.into(),
    }
}

/// Open a session with the sample dashboard loaded.
async fn loaded_session(
    features: FeatureFlags,
    config: EngineConfig,
) -> (DashboardSession, RecordingBackend) {
    let backend = RecordingBackend::new();
    backend.set_dashboard(dashboard());
    let session = DashboardSession::builder(backend.clone())
        .workspace("sales")
        .dashboard_ref("dash-1")
        .features(features)
        .config(config)
        .open();
    session
        .dispatch_and_wait_for(
            DashboardCommand::Initialize {
                dashboard_ref: None,
            },
            &[EventType::DashboardInitialized],
        )
        .await
        .expect("initialize should succeed");
    (session, backend)
}

async fn default_session() -> (DashboardSession, RecordingBackend) {
    loaded_session(FeatureFlags::default(), EngineConfig::default()).await
}

/// Collect every event published by `session`.
fn record(session: &DashboardSession) -> (Arc<Mutex<Vec<DashboardEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sub = {
        let events = Arc::clone(&events);
        session.subscribe(|_| true, move |e| events.lock().expect("lock").push(e.clone()))
    };
    (events, sub)
}

fn types(events: &Mutex<Vec<DashboardEvent>>) -> Vec<EventType> {
    events
        .lock()
        .expect("lock")
        .iter()
        .map(DashboardEvent::event_type)
        .collect()
}

#[tokio::test]
async fn initialize_loads_dashboard_through_backend() {
    let (session, backend) = default_session().await;

    let title = session
        .select(&SELECT_DASHBOARD_TITLE)
        .await
        .expect("select should succeed");
    assert_eq!(title, "Sales overview");
    assert_eq!(backend.calls(), vec!["load_dashboard", "resolve_current_user"]);

    let state = session.state().await.expect("state should succeed");
    assert!(SELECT_IS_INITIALIZED.select(&state));
    assert_eq!(SELECT_DASHBOARD_REF.select(&state).as_deref(), Some("dash-1"));
    let user = SELECT_CURRENT_USER
        .select(&state)
        .expect("user should be resolved");
    assert_eq!(user.login, "test.user@example.com");
}

#[tokio::test]
async fn queued_command_waits_for_suspended_routine() {
    let (session, backend) = default_session().await;
    let (events, _sub) = record(&session);
    let calls_before = backend.calls().len();

    let gate = backend.hold_calls();
    session.dispatch(refresh("w-chart")).await.expect("dispatch should succeed");
    session.dispatch(rename("Renamed")).await.expect("dispatch should succeed");
    backend.wait_for_calls(calls_before + 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(
        types(&events).is_empty(),
        "rename must not run while refresh is suspended"
    );
    drop(gate);
    let state = session.state().await.expect("state should succeed");

    assert_eq!(
        types(&events),
        vec![EventType::InsightWidgetRefreshed, EventType::DashboardRenamed]
    );
    assert_eq!(state.meta().title, "Renamed");
    assert!(state.execution_results().prepared(&"w-chart".into()).is_some());
}

#[tokio::test]
async fn each_command_gets_exactly_one_terminal_event() {
    let (session, _backend) = default_session().await;
    let (events, _sub) = record(&session);

    let mut ids = Vec::new();
    for cmd in [
        Command::new(rename("A")).with_correlation_id("c-1"),
        Command::new(rename("")),
        Command::new(DashboardCommand::MoveLayoutSection { from: 0, to: 1 }),
        Command::new(DashboardCommand::UndoLayoutChanges { steps: 5 }).with_correlation_id(""),
    ] {
        ids.push(session.dispatch(cmd).await.expect("dispatch should succeed"));
    }
    session.state().await.expect("state should succeed");

    assert_eq!(ids[0], "c-1");
    assert!(ids.iter().all(|id| !id.is_empty()));

    let mut per_id: HashMap<String, usize> = HashMap::new();
    for event in events.lock().expect("lock").iter() {
        assert!(event.is_terminal());
        let id = event.correlation_id.clone().expect("events carry correlation ids");
        *per_id.entry(id).or_default() += 1;
    }
    assert_eq!(per_id.len(), ids.len());
    assert!(ids.iter().all(|id| per_id.get(id) == Some(&1)));
}

#[tokio::test]
async fn started_event_precedes_outcome_when_enabled() {
    let config = EngineConfig {
        emit_command_started: true,
        ..EngineConfig::default()
    };
    let (session, _backend) = loaded_session(FeatureFlags::default(), config).await;
    let (events, _sub) = record(&session);

    let event = session
        .dispatch_and_wait_for(rename("B"), &[EventType::DashboardRenamed])
        .await
        .expect("rename should succeed");

    let recorded = events.lock().expect("lock").clone();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].event_type(), EventType::CommandStarted);
    assert_eq!(recorded[0].correlation_id, event.correlation_id);
}

#[tokio::test]
async fn overlapping_waits_resolve_with_their_own_events() {
    let (session, _backend) = default_session().await;

    let (first, second) = tokio::join!(
        session.dispatch_and_wait_for(rename("First"), &[EventType::DashboardRenamed]),
        session.dispatch_and_wait_for(rename("Second"), &[EventType::DashboardRenamed]),
    );
    let first = first.expect("first rename should succeed");
    let second = second.expect("second rename should succeed");

    assert_ne!(first.correlation_id, second.correlation_id);
    assert_eq!(
        first.payload,
        EventPayload::DashboardRenamed {
            title: "First".into()
        }
    );
    assert_eq!(
        second.payload,
        EventPayload::DashboardRenamed {
            title: "Second".into()
        }
    );
}

#[tokio::test]
async fn failed_command_surfaces_as_unexpected_event() {
    let (session, _backend) = default_session().await;

    let err = session
        .dispatch_and_wait_for(rename("   "), &[EventType::DashboardRenamed])
        .await
        .expect_err("blank title should fail");
    let DispatchError::UnexpectedEvent(event) = err else {
        panic!("expected UnexpectedEvent, got {err:?}");
    };
    assert!(event.is_failure());
    assert_eq!(event.failure_message(), Some("dashboard title must not be empty"));
}

#[tokio::test]
async fn scheduling_commands_are_rejected_when_flag_is_off() {
    let features = FeatureFlags::default().with(FEATURE_SCHEDULING, false);
    let (session, backend) = loaded_session(features, EngineConfig::default()).await;

    let event = session
        .dispatch_and_wait_for(
            DashboardCommand::RemoveAutomations {
                ids: vec!["auto-1".into()],
            },
            &[EventType::CommandRejected],
        )
        .await
        .expect("rejection should be delivered");

    assert_eq!(
        event.payload,
        EventPayload::CommandRejected {
            command_type: "GDC.DASH/CMD.AUTOMATIONS.REMOVE"
        }
    );
    assert_eq!(backend.call_count("delete_automation"), 0);
}

#[tokio::test]
async fn save_without_prepared_execution_fails_and_keeps_state() {
    let (session, backend) = default_session().await;
    let before = session.state().await.expect("state should succeed");

    let err = session
        .dispatch_and_wait_for(
            DashboardCommand::SaveScheduledEmail {
                automation: raw_table_automation(),
            },
            &[EventType::ScheduledEmailSaved],
        )
        .await
        .expect_err("save should fail");
    let DispatchError::UnexpectedEvent(event) = err else {
        panic!("expected UnexpectedEvent, got {err:?}");
    };

    assert!(matches!(
        &event.payload,
        EventPayload::CommandFailed {
            reason: FailureReason::UserError,
            message,
            ..
        } if message == MISSING_EXECUTION
    ));
    assert_eq!(session.state().await.expect("state should succeed"), before);
    assert_eq!(backend.call_count("update_automation"), 0);
}

#[tokio::test]
async fn save_reuses_execution_prepared_by_refresh() {
    let (session, backend) = default_session().await;
    backend.set_title("w-table", "Tabulka tržeb");

    session
        .dispatch_and_wait_for(refresh("w-table"), &[EventType::InsightWidgetRefreshed])
        .await
        .expect("refresh should succeed");
    let event = session
        .dispatch_and_wait_for(
            DashboardCommand::SaveScheduledEmail {
                automation: raw_table_automation(),
            },
            &[EventType::ScheduledEmailSaved],
        )
        .await
        .expect("save should succeed");

    let EventPayload::ScheduledEmailSaved { automation } = event.payload else {
        panic!("unexpected payload {:?}", event.payload);
    };
    assert_eq!(automation.definition.raw_executions.len(), 1);
    assert_eq!(automation.definition.raw_executions[0].fingerprint, "fp-w-table");
    let automations = session
        .select(&SELECT_AUTOMATIONS)
        .await
        .expect("select should succeed");
    assert_eq!(automations.len(), 1);
    assert_eq!(automations[0].id, "auto-1");
}

#[tokio::test]
async fn second_owner_request_is_delegated_to_holder() {
    let (session, _backend) = default_session().await;
    let arbiter = session.arbiter::<String>("schedule-email-dialog");
    let a_calls = Arc::new(Mutex::new(Vec::new()));
    let b_calls = Arc::new(Mutex::new(Vec::new()));

    let a = {
        let a_calls = Arc::clone(&a_calls);
        arbiter
            .register_owner("A", move |def| a_calls.lock().expect("lock").push(def))
            .expect("register A should succeed")
    };
    let b = {
        let b_calls = Arc::clone(&b_calls);
        arbiter
            .register_owner("B", move |def| b_calls.lock().expect("lock").push(def))
            .expect("register B should succeed")
    };

    assert_eq!(a.request_open("def1".into()), Ok(OpenGrant::Granted));
    assert_eq!(
        b.request_open("def2".into()),
        Ok(OpenGrant::Delegated {
            holder: "A".into()
        })
    );
    assert_eq!(*a_calls.lock().expect("lock"), vec!["def2".to_string()]);
    assert!(b_calls.lock().expect("lock").is_empty());
    assert_eq!(arbiter.state(), ArbiterState::Held("A".into()));

    b.release();
    assert_eq!(arbiter.state(), ArbiterState::Held("A".into()));
    a.release();
    a.release();
    assert_eq!(arbiter.state(), ArbiterState::Idle);
}

#[tokio::test]
async fn cancelled_before_dispatch_leaves_state_untouched() {
    let (session, backend) = default_session().await;
    let before = session.state().await.expect("state should succeed");
    let calls_before = backend.calls().len();

    let token = CancellationToken::new();
    token.cancel();
    let event = session
        .dispatch_and_wait_for(
            Command::new(refresh("w-chart")).with_cancellation(token),
            &[EventType::Cancelled],
        )
        .await
        .expect("cancellation should be delivered");

    assert_eq!(event.event_type(), EventType::Cancelled);
    assert_eq!(session.state().await.expect("state should succeed"), before);
    assert_eq!(backend.calls().len(), calls_before);
}

#[tokio::test]
async fn cancellation_during_call_rolls_back_partial_mutations() {
    let (session, backend) = default_session().await;
    let before = session.state().await.expect("state should succeed");
    let calls_before = backend.calls().len();
    let gate = backend.hold_calls();

    let token = CancellationToken::new();
    let waiter = {
        let session = session.clone();
        let cmd = Command::new(refresh("w-chart")).with_cancellation(token.clone());
        tokio::spawn(async move {
            session
                .dispatch_and_wait_for(cmd, &[EventType::Cancelled])
                .await
        })
    };
    backend.wait_for_calls(calls_before + 1).await;
    token.cancel();

    let event = waiter
        .await
        .expect("waiter should not panic")
        .expect("cancellation should be delivered");
    drop(gate);

    assert_eq!(event.event_type(), EventType::Cancelled);
    let after = session.state().await.expect("state should succeed");
    assert_eq!(after, before, "the loading marker must be rolled back");
}

#[tokio::test]
async fn close_cancels_pending_commands_and_refuses_new_ones() {
    let (session, backend) = default_session().await;
    let (events, _sub) = record(&session);
    let calls_before = backend.calls().len();
    let gate = backend.hold_calls();

    session.dispatch(refresh("w-chart")).await.expect("dispatch should succeed");
    session.dispatch(rename("never")).await.expect("dispatch should succeed");
    backend.wait_for_calls(calls_before + 1).await;

    session.close().await;
    drop(gate);

    assert_eq!(types(&events), vec![EventType::Cancelled, EventType::Cancelled]);
    assert!(matches!(
        session.dispatch(rename("late")).await,
        Err(DispatchError::SessionClosed)
    ));
    assert!(matches!(
        session
            .dispatch_and_wait_for(rename("late"), &[EventType::DashboardRenamed])
            .await,
        Err(DispatchError::SessionClosed)
    ));
}

#[tokio::test]
async fn layout_changes_can_be_undone() {
    let (session, _backend) = default_session().await;
    let mut stream = session.event_stream(|e| e.event_type() == EventType::LayoutChangesUndone);

    session
        .dispatch(DashboardCommand::MoveLayoutSection { from: 0, to: 1 })
        .await
        .expect("dispatch should succeed");
    session
        .dispatch(DashboardCommand::RemoveLayoutSection {
            index: 0,
            stash_identifier: Some("stash-1".into()),
        })
        .await
        .expect("dispatch should succeed");
    let history = session
        .select(&SELECT_LAYOUT_HISTORY)
        .await
        .expect("select should succeed");
    assert_eq!(*history, vec!["move_section", "remove_section"]);

    session
        .dispatch(DashboardCommand::UndoLayoutChanges { steps: 2 })
        .await
        .expect("dispatch should succeed");
    let undone = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("undo event should arrive")
        .expect("stream should yield");
    assert_eq!(
        undone.payload,
        EventPayload::LayoutChangesUndone {
            undone: vec!["remove_section", "move_section"]
        }
    );

    let state = session.state().await.expect("state should succeed");
    assert_eq!(state.layout().sections, dashboard().layout);
}
