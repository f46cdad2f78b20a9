//! Synchronous publish/subscribe for dashboard events.
//!
//! `publish` delivers an event to every subscriber registered at the moment
//! of publishing, in registration order, on the publishing task. A
//! subscriber added while an event is being delivered does not see that
//! event; a subscriber removed during delivery is not called afterwards.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::event::DashboardEvent;

type Predicate = Box<dyn Fn(&DashboardEvent) -> bool + Send + Sync>;
type Handler = Box<dyn Fn(&DashboardEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    active: AtomicBool,
    predicate: Predicate,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    subscribers: Vec<Arc<Subscriber>>,
}

/// The event channel of one dashboard session.
///
/// `Clone` is cheap and clones publish to the same subscribers.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for events matching `predicate`.
    ///
    /// The subscription lasts until the returned guard is dropped or
    /// [`Subscription::unsubscribe`] is called.
    pub fn subscribe<P, H>(&self, predicate: P, handler: H) -> Subscription
    where
        P: Fn(&DashboardEvent) -> bool + Send + Sync + 'static,
        H: Fn(&DashboardEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            predicate: Box::new(predicate),
            handler: Box::new(handler),
        });
        self.lock().subscribers.push(Arc::clone(&subscriber));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            subscriber: Some(subscriber),
        }
    }

    /// Deliver `event` to the current subscribers.
    ///
    /// The subscriber list is snapshotted and the lock released before any
    /// handler runs, so handlers may subscribe, unsubscribe, or publish.
    pub fn publish(&self, event: &DashboardEvent) {
        let snapshot = self.lock().subscribers.clone();
        tracing::trace!(
            event_type = %event.event_type(),
            subscribers = snapshot.len(),
            "publishing event"
        );
        for subscriber in snapshot {
            if subscriber.active.load(Ordering::Acquire) && (subscriber.predicate)(event) {
                (subscriber.handler)(event);
            }
        }
    }

    /// Events matching `predicate` as an async stream.
    ///
    /// The stream owns its subscription; dropping the stream unsubscribes.
    /// It ends once every clone of the channel has been dropped. Events are
    /// buffered without bound.
    pub fn stream<P>(&self, predicate: P) -> EventStream
    where
        P: Fn(&DashboardEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(predicate, move |event| {
            let _ = tx.send(event.clone());
        });
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
            _subscription: subscription,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Guard for a registered subscriber. Dropping it unsubscribes.
#[must_use = "the subscriber is removed as soon as the subscription is dropped"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    subscriber: Option<Arc<Subscriber>>,
}

impl Subscription {
    /// Remove the subscriber. Equivalent to dropping the guard.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(subscriber) = self.subscriber.take() else {
            return;
        };
        // Stops delivery from publish snapshots already in flight.
        subscriber.active.store(false, Ordering::Release);
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .retain(|s| s.id != subscriber.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.subscriber.as_ref().map(|s| s.id))
            .finish()
    }
}

/// Async stream of events returned by [`EventChannel::stream`].
pub struct EventStream {
    inner: UnboundedReceiverStream<DashboardEvent>,
    _subscription: Subscription,
}

impl tokio_stream::Stream for EventStream {
    type Item = DashboardEvent;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<DashboardEvent>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;
    use crate::event::{EventPayload, EventType};
    use crate::testing::{RecordingBackend, test_context};

    fn renamed(title: &str) -> DashboardEvent {
        DashboardEvent {
            ctx: test_context(RecordingBackend::new()),
            correlation_id: Some(format!("c-{title}")),
            payload: EventPayload::DashboardRenamed {
                title: title.into(),
            },
        }
    }

    fn title(event: &DashboardEvent) -> String {
        match &event.payload {
            EventPayload::DashboardRenamed { title } => title.clone(),
            other => format!("{:?}", other.event_type()),
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let channel = EventChannel::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = (0..3)
            .map(|i| {
                let log = Arc::clone(&log);
                channel.subscribe(|_| true, move |_| log.lock().expect("lock").push(i))
            })
            .collect();

        channel.publish(&renamed("a"));
        assert_eq!(*log.lock().expect("lock"), vec![0, 1, 2]);
        drop(subs);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn predicate_filters_events() {
        let channel = EventChannel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = Arc::clone(&seen);
            channel.subscribe(
                |e| e.event_type() == EventType::DashboardRenamed,
                move |e| seen.lock().expect("lock").push(title(e)),
            )
        };

        channel.publish(&renamed("x"));
        channel.publish(&DashboardEvent {
            payload: EventPayload::LayoutSectionMoved { from: 0, to: 1 },
            ..renamed("y")
        });
        assert_eq!(*seen.lock().expect("lock"), vec!["x".to_string()]);
    }

    #[test]
    fn subscriber_added_during_delivery_misses_current_event() {
        let channel = EventChannel::new();
        let late_calls = Arc::new(AtomicU64::new(0));
        let late_subs = Arc::new(Mutex::new(Vec::new()));

        let _outer = {
            let channel = channel.clone();
            let late_calls = Arc::clone(&late_calls);
            let late_subs = Arc::clone(&late_subs);
            channel.clone().subscribe(
                |_| true,
                move |_| {
                    let late_calls = Arc::clone(&late_calls);
                    let sub = channel.subscribe(
                        |_| true,
                        move |_| {
                            late_calls.fetch_add(1, Ordering::SeqCst);
                        },
                    );
                    late_subs.lock().expect("lock").push(sub);
                },
            )
        };

        channel.publish(&renamed("first"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        channel.publish(&renamed("second"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_removed_during_delivery_is_not_called() {
        let channel = EventChannel::new();
        let victim_calls = Arc::new(AtomicU64::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let _killer = {
            let victim = Arc::clone(&victim);
            channel.subscribe(
                |_| true,
                move |_| {
                    if let Some(sub) = victim.lock().expect("lock").take() {
                        sub.unsubscribe();
                    }
                },
            )
        };
        let sub = {
            let victim_calls = Arc::clone(&victim_calls);
            channel.subscribe(
                |_| true,
                move |_| {
                    victim_calls.fetch_add(1, Ordering::SeqCst);
                },
            )
        };
        *victim.lock().expect("lock") = Some(sub);

        channel.publish(&renamed("a"));
        assert_eq!(victim_calls.load(Ordering::SeqCst), 0);
        assert_eq!(channel.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn stream_yields_matching_events() {
        let channel = EventChannel::new();
        let mut stream = channel.stream(|e| e.correlation_id.as_deref() == Some("c-b"));

        channel.publish(&renamed("a"));
        channel.publish(&renamed("b"));

        let event = stream.next().await.expect("stream should yield");
        assert_eq!(title(&event), "b");
    }
}
