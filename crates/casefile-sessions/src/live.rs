use std::sync::atomic::{AtomicU64, Ordering};

use casefile_domain::event::Event;
use casefile_domain::session::Session;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;

/// Capacity of a subscriber's bounded channel (spec §4.1 `subscribe`).
pub const SUBSCRIBER_CAPACITY: usize = 100;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

struct Inner {
    session: Session,
    subscribers: Vec<Subscriber>,
}

/// The live counterpart of a persisted `Session`: adds the runtime-only
/// fields spec §3 calls out (`subscribers`, `cancel_signal`,
/// `idle_finalizer_handle`, `lock`) around the pure data in
/// `casefile_domain::Session`.
///
/// `inner` is the session lock referenced throughout spec §4.1/§5: every
/// mutation of `event_log`, `subscribers`, or status fields happens while
/// holding it, and it is always released before a (possibly slow)
/// subscriber send is attempted.
pub struct LiveSession {
    inner: Mutex<Inner>,
    next_subscriber_id: AtomicU64,
    /// `sessions.max_event_log` (spec §6.4), resolved once at construction
    /// — every session in a process shares the same configured cap.
    max_event_log: usize,
    pub cancel: CancelToken,
    /// Handle for the idle-eviction timer (spec §4.4); cancelled and
    /// replaced whenever a follow-up or cancellation interrupts it.
    pub idle_finalizer: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LiveSession {
    pub fn new(session: Session, max_event_log: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session,
                subscribers: Vec::new(),
            }),
            next_subscriber_id: AtomicU64::new(0),
            max_event_log,
            cancel: CancelToken::new(),
            idle_finalizer: Mutex::new(None),
        }
    }

    /// A consistent point-in-time copy of the persisted fields.
    pub fn snapshot(&self) -> Session {
        self.inner.lock().session.clone()
    }

    /// Apply a mutation under the session lock. Used by the manager and
    /// bridge to update status, `thread_id`, `turn_count`, `diagnosis`,
    /// and similar fields without leaking the lock type.
    pub fn mutate<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut inner = self.inner.lock();
        f(&mut inner.session)
    }

    /// `push_event` (spec §4.1): append under the lock, snapshot the
    /// subscriber set, then deliver outside the lock so a slow or dead
    /// subscriber can never hold up the append path.
    pub fn push_event(&self, event: Event) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.session.append_event(event.clone(), self.max_event_log);
            inner
                .subscribers
                .iter()
                .map(|s| (s.id, s.tx.clone()))
                .collect::<Vec<_>>()
        };

        let mut overflowed = Vec::new();
        for (id, tx) in snapshot {
            if tx.try_send(event.clone()).is_err() {
                overflowed.push(id);
            }
        }

        if !overflowed.is_empty() {
            let session_id = {
                let mut inner = self.inner.lock();
                inner
                    .subscribers
                    .retain(|s| !overflowed.contains(&s.id));
                inner.session.id.clone()
            };
            casefile_domain::trace::TraceEvent::SubscriberOverflow {
                session_id,
                dropped_events: overflowed.len(),
            }
            .emit();
        }
    }

    /// `subscribe(since_index)` (spec §4.1): clamp the offset, snapshot
    /// history, and register a fresh bounded channel under the same lock
    /// that protects the log — this is what guarantees no event pushed
    /// after registration is ever missed (spec §4.5 "Replay-live
    /// boundary").
    pub fn subscribe(&self, since_index: usize) -> (Vec<Event>, mpsc::Receiver<Event>, u64) {
        let mut inner = self.inner.lock();
        let len = inner.session.event_log.len();
        let from = since_index.min(len);
        let history = inner.session.event_log[from..].to_vec();

        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        inner.subscribers.push(Subscriber { id, tx });

        (history, rx, id)
    }

    /// `unsubscribe` (spec §4.1): safe to call concurrently with
    /// `push_event` — both only ever take the same lock briefly.
    pub fn unsubscribe(&self, id: u64) {
        self.inner.lock().subscribers.retain(|s| s.id != id);
    }

    /// `event_count()` (spec §4.1).
    pub fn event_count(&self) -> usize {
        self.inner.lock().session.event_log.len()
    }
}
