//! The host-facing handle of one dashboard session.
//!
//! [`DashboardSession`] is the command bus: it queues commands for the
//! session's scheduler task, lets hosts wait for the event that answers a
//! command, exposes the event channel, and owns the session's arbiters.
//! Sessions are created with [`DashboardSessionBuilder`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::arbiter::{Arbiter, ArbiterRegistry};
use crate::backend::Backend;
use crate::cancel::CancellationToken;
use crate::channel::{EventChannel, EventStream, Subscription};
use crate::command::Command;
use crate::context::{DashboardContext, FeatureFlags};
use crate::error::DispatchError;
use crate::event::{DashboardEvent, EventType};
use crate::model::UserInfo;
use crate::scheduler::{Scheduler, SchedulerMessage, run_scheduler};
use crate::selector::Selector;
use crate::state::{ConfigState, DEFAULT_UNDO_LIMIT, DashboardState, DateFilterConfig, StateStore};

/// Default bound of the command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default maximum number of attribute filters on one dashboard.
pub const DEFAULT_MAX_ATTRIBUTE_FILTERS: usize = 30;

/// Engine tuning knobs.
///
/// Deserializes with every field optional, so hosts can embed it in their
/// own configuration files.
///
/// ```
/// use dashboard_engine::EngineConfig;
///
/// let config: EngineConfig =
///     serde_json::from_str(r#"{ "emit_command_started": true }"#).unwrap();
/// assert!(config.emit_command_started);
/// assert_eq!(config.queue_capacity, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of the command queue. `dispatch` waits while the queue is
    /// full.
    pub queue_capacity: usize,
    /// Publish `CommandStarted` before each routine runs.
    pub emit_command_started: bool,
    /// Upper bound enforced by `AddAttributeFilter`.
    pub max_attribute_filters: usize,
    /// Layout undo history depth. `0` disables undo.
    pub layout_undo_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            emit_command_started: false,
            max_attribute_filters: DEFAULT_MAX_ATTRIBUTE_FILTERS,
            layout_undo_limit: DEFAULT_UNDO_LIMIT,
        }
    }
}

/// Builder for a [`DashboardSession`].
///
/// # Examples
///
/// ```no_run
/// use dashboard_engine::testing::RecordingBackend;
/// use dashboard_engine::{DashboardCommand, DashboardSession, EventType};
///
/// # async fn example() -> Result<(), dashboard_engine::DispatchError> {
/// let session = DashboardSession::builder(RecordingBackend::new())
///     .workspace("sales")
///     .dashboard_ref("dash-1")
///     .open();
///
/// let event = session
///     .dispatch_and_wait_for(
///         DashboardCommand::Initialize { dashboard_ref: None },
///         &[EventType::DashboardInitialized],
///     )
///     .await?;
/// println!("{}", event.event_type());
/// # Ok(())
/// # }
/// ```
pub struct DashboardSessionBuilder {
    backend: Arc<dyn Backend>,
    workspace: String,
    dashboard_ref: Option<String>,
    locale: String,
    user: Option<UserInfo>,
    features: FeatureFlags,
    date_filter: DateFilterConfig,
    config: EngineConfig,
}

impl DashboardSessionBuilder {
    /// Create a builder for a session talking to `backend`.
    ///
    /// # Arguments
    ///
    /// * `backend` - Collaborator every `call` effect is routed to.
    pub fn new(backend: impl Backend) -> Self {
        Self {
            backend: Arc::new(backend),
            workspace: String::new(),
            dashboard_ref: None,
            locale: ConfigState::default().locale,
            user: None,
            features: FeatureFlags::default(),
            date_filter: DateFilterConfig::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Dashboard loaded by an `Initialize` command that names none.
    pub fn dashboard_ref(mut self, dashboard_ref: impl Into<String>) -> Self {
        self.dashboard_ref = Some(dashboard_ref.into());
        self
    }

    /// Locale used for formatting and for translated export titles.
    ///
    /// Defaults to `en-US`.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Current user, when the host already knows it. Otherwise
    /// `Initialize` resolves it through the backend.
    pub fn user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    /// Feature flag snapshot for the session's lifetime.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Date filter options offered by the dashboard.
    pub fn date_filter_config(mut self, date_filter: DateFilterConfig) -> Self {
        self.date_filter = date_filter;
        self
    }

    /// Engine tuning. If not called, [`EngineConfig::default()`] is used.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the session and start its scheduler task.
    ///
    /// # Returns
    ///
    /// A running [`DashboardSession`]. Its state is empty until an
    /// `Initialize` command is processed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn open(self) -> DashboardSession {
        let ctx = Arc::new(DashboardContext {
            session_id: Uuid::new_v4(),
            backend: self.backend,
            workspace: self.workspace,
            dashboard_ref: self.dashboard_ref,
            locale: self.locale.clone(),
            user: self.user,
            features: self.features,
        });
        let state = DashboardState::initial(
            ConfigState {
                locale: self.locale,
                date_filter: self.date_filter,
            },
            self.config.layout_undo_limit,
        );

        let channel = EventChannel::new();
        let shutdown = CancellationToken::new();
        let (sender, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let scheduler = Scheduler {
            ctx: Arc::clone(&ctx),
            store: StateStore::new(state),
            config: self.config,
            channel: channel.clone(),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(run_scheduler(scheduler, rx));
        tracing::info!(session_id = %ctx.session_id, "dashboard session opened");

        DashboardSession {
            inner: Arc::new(SessionInner {
                ctx,
                sender,
                channel,
                arbiters: ArbiterRegistry::new(),
                shutdown,
                task: Mutex::new(Some(task)),
            }),
        }
    }
}

impl fmt::Debug for DashboardSessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardSessionBuilder")
            .field("backend", &self.backend.name())
            .field("workspace", &self.workspace)
            .field("dashboard_ref", &self.dashboard_ref)
            .field("locale", &self.locale)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct SessionInner {
    ctx: Arc<DashboardContext>,
    sender: mpsc::Sender<SchedulerMessage>,
    channel: EventChannel,
    arbiters: ArbiterRegistry,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running dashboard session.
///
/// Cheap to clone; clones address the same scheduler, event channel, and
/// arbiters. The scheduler stops when [`close`](DashboardSession::close) is
/// called or every handle is dropped.
#[derive(Clone)]
pub struct DashboardSession {
    inner: Arc<SessionInner>,
}

impl DashboardSession {
    /// Start building a session over `backend`.
    pub fn builder(backend: impl Backend) -> DashboardSessionBuilder {
        DashboardSessionBuilder::new(backend)
    }

    /// The read-only context routines of this session run with.
    pub fn context(&self) -> &Arc<DashboardContext> {
        &self.inner.ctx
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Queue a command without waiting for its outcome.
    ///
    /// An absent or empty correlation id is replaced with a fresh UUID v4.
    /// Waits only while the queue is full.
    ///
    /// # Arguments
    ///
    /// * `command` - The command, or a bare [`DashboardCommand`](crate::DashboardCommand).
    ///
    /// # Returns
    ///
    /// The correlation id every event for the command will carry.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::SessionClosed`] -- the session has been closed;
    ///   nothing was queued.
    pub async fn dispatch(&self, command: impl Into<Command>) -> Result<String, DispatchError> {
        let mut command = command.into();
        let correlation_id = resolve_correlation_id(&mut command);
        self.enqueue(command, correlation_id.clone()).await?;
        Ok(correlation_id)
    }

    /// Queue a command and wait for the event that answers it.
    ///
    /// Subscribes before queueing, so the answer cannot be missed. Resolves
    /// once, on the first event for this command's correlation id whose
    /// type is in `event_types`, or on the command's terminal event if that
    /// comes first. The subscription is removed on every path.
    ///
    /// # Arguments
    ///
    /// * `command` - The command to run.
    /// * `event_types` - Event types the caller is waiting for.
    ///
    /// # Returns
    ///
    /// The first matching event.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::SessionClosed`] -- the session was closed before
    ///   the command was queued.
    /// * [`DispatchError::UnexpectedEvent`] -- the command finished with an
    ///   event outside `event_types`, for example `CommandFailed`.
    pub async fn dispatch_and_wait_for(
        &self,
        command: impl Into<Command>,
        event_types: &[EventType],
    ) -> Result<DashboardEvent, DispatchError> {
        let mut command = command.into();
        let correlation_id = resolve_correlation_id(&mut command);

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let awaited = event_types.to_vec();
        let _subscription = {
            let correlation_id = correlation_id.clone();
            let awaited = awaited.clone();
            self.inner.channel.subscribe(
                move |event| event.correlation_id.as_deref() == Some(correlation_id.as_str()),
                move |event| {
                    if (awaited.contains(&event.event_type()) || event.is_terminal())
                        && let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take()
                    {
                        let _ = tx.send(event.clone());
                    }
                },
            )
        };

        self.enqueue(command, correlation_id).await?;

        let event = tokio::select! {
            biased;
            event = rx => event.map_err(|_| DispatchError::SessionClosed)?,
            () = self.inner.sender.closed() => return Err(DispatchError::SessionClosed),
        };
        if awaited.contains(&event.event_type()) {
            Ok(event)
        } else {
            Err(DispatchError::UnexpectedEvent(Box::new(event)))
        }
    }

    /// Snapshot of the state after every command queued so far.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::SessionClosed`] -- the session has been closed.
    pub async fn state(&self) -> Result<DashboardState, DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::SessionClosed);
        }
        let (reply, rx) = oneshot::channel();
        self.inner
            .sender
            .send(SchedulerMessage::GetState { reply })
            .await
            .map_err(|_| DispatchError::SessionClosed)?;
        rx.await.map_err(|_| DispatchError::SessionClosed)
    }

    /// Run `selector` against a fresh [`state`](Self::state) snapshot.
    ///
    /// # Errors
    ///
    /// * [`DispatchError::SessionClosed`] -- the session has been closed.
    pub async fn select<S: Selector>(&self, selector: &S) -> Result<S::Output, DispatchError> {
        let state = self.state().await?;
        Ok(selector.select(&state))
    }

    /// Register `handler` for events matching `predicate`.
    ///
    /// Handlers run on the scheduler task, in registration order, while
    /// the next command waits. Keep them short.
    pub fn subscribe<P, H>(&self, predicate: P, handler: H) -> Subscription
    where
        P: Fn(&DashboardEvent) -> bool + Send + Sync + 'static,
        H: Fn(&DashboardEvent) + Send + Sync + 'static,
    {
        self.inner.channel.subscribe(predicate, handler)
    }

    /// Events matching `predicate` as an async stream.
    pub fn event_stream<P>(&self, predicate: P) -> EventStream
    where
        P: Fn(&DashboardEvent) -> bool + Send + Sync + 'static,
    {
        self.inner.channel.stream(predicate)
    }

    /// The session's arbiter for resource `name`, created on first use.
    pub fn arbiter<P: Clone + Send + 'static>(&self, name: &str) -> Arbiter<P> {
        self.inner.arbiters.arbiter(name)
    }

    /// Tear the session down.
    ///
    /// The running routine, if any, is cancelled and rolled back; commands
    /// still queued are answered with `Cancelled`. Returns once the
    /// scheduler has stopped. Later calls return immediately.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "scheduler task failed");
            }
            tracing::info!(session_id = %self.inner.ctx.session_id, "dashboard session closed");
        }
    }

    async fn enqueue(&self, command: Command, correlation_id: String) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::SessionClosed);
        }
        tracing::debug!(
            command_type = command.command_type(),
            correlation_id = %correlation_id,
            "command queued"
        );
        self.inner
            .sender
            .send(SchedulerMessage::Execute {
                command,
                correlation_id,
            })
            .await
            .map_err(|_| DispatchError::SessionClosed)
    }
}

impl fmt::Debug for DashboardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardSession")
            .field("session_id", &self.inner.ctx.session_id)
            .field("closed", &self.is_closed())
            .field("arbiters", &self.inner.arbiters)
            .finish_non_exhaustive()
    }
}

/// Return the command's correlation id, generating one when it is absent
/// or empty.
fn resolve_correlation_id(command: &mut Command) -> String {
    match &command.correlation_id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => {
            let id = Uuid::new_v4().to_string();
            command.correlation_id = Some(id.clone());
            id
        }
    }
}
