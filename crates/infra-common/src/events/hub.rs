use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// An event that can be fanned out through a [`NotificationHub`].
///
/// Every notification belongs to exactly one kind; subscribers register per kind.
pub trait Notification: Clone + Send + 'static {
    /// The category used to route this notification
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + 'static;

    /// Category of this notification
    fn kind(&self) -> Self::Kind;
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of one subscription.
///
/// Handles are unique across every hub in the process so a subscription that
/// was migrated to another hub keeps the same handle there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Allocate a fresh handle
    pub fn next() -> Self {
        SubscriptionHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Who created a subscription.
///
/// Migration between hubs filters on this tag: subscriptions made by the
/// coordinator are re-established by the coordinator itself and never copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// External caller (dialer UI, tests, services)
    Client,
    /// The call coordinator's own per-phone listener
    Coordinator,
    /// Wiring internal to a component
    Internal,
}

struct Subscriber<E: Notification> {
    handle: SubscriptionHandle,
    kind: E::Kind,
    origin: Origin,
    tx: mpsc::UnboundedSender<E>,
}

impl<E: Notification> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            kind: self.kind,
            origin: self.origin,
            tx: self.tx.clone(),
        }
    }
}

/// A subscription created by [`NotificationHub::subscribe`]
#[derive(Debug)]
pub struct Subscription<E> {
    /// Handle to pass to [`NotificationHub::unsubscribe`]
    pub handle: SubscriptionHandle,
    /// Receiving end of the subscription
    pub rx: mpsc::UnboundedReceiver<E>,
}

/// Tagged subscriber table with per-kind fan-out.
///
/// Delivery is synchronous with respect to the caller of [`notify`](Self::notify):
/// the event is queued on each matching subscriber's channel, in subscription
/// order, before `notify` returns. Subscribers whose receiver was dropped are
/// pruned on the next delivery attempt.
pub struct NotificationHub<E: Notification> {
    name: String,
    subscribers: Vec<Subscriber<E>>,
}

impl<E: Notification> NotificationHub<E> {
    /// Create an empty hub; `name` only appears in logs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Vec::new(),
        }
    }

    /// Subscribe to a single kind on a fresh channel
    pub fn subscribe(&mut self, kind: E::Kind, origin: Origin) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe_with(&[kind], origin, tx);
        Subscription { handle, rx }
    }

    /// Subscribe to several kinds, delivering into an existing channel.
    ///
    /// Duplicate kinds in `kinds` are registered once.
    pub fn subscribe_with(
        &mut self,
        kinds: &[E::Kind],
        origin: Origin,
        tx: mpsc::UnboundedSender<E>,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle::next();
        for kind in kinds {
            if self.subscribers.iter().any(|s| s.handle == handle && s.kind == *kind) {
                continue;
            }
            self.subscribers.push(Subscriber {
                handle,
                kind: *kind,
                origin,
                tx: tx.clone(),
            });
        }
        debug!(hub = %self.name, %handle, ?origin, kinds = kinds.len(), "Subscribed");
        handle
    }

    /// Remove every entry belonging to `handle`; returns whether anything was removed
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.handle != handle);
        let removed = before != self.subscribers.len();
        if removed {
            debug!(hub = %self.name, %handle, "Unsubscribed");
        }
        removed
    }

    /// Remove a single kind from a subscription
    pub fn unsubscribe_kind(&mut self, handle: SubscriptionHandle, kind: E::Kind) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| !(s.handle == handle && s.kind == kind));
        before != self.subscribers.len()
    }

    /// Deliver `event` to every subscriber of its kind, returning how many received it
    pub fn notify(&mut self, event: E) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for sub in self.subscribers.iter().filter(|s| s.kind == kind) {
            if sub.tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(sub.handle);
            }
        }

        if !closed.is_empty() {
            self.subscribers.retain(|s| !(s.kind == kind && closed.contains(&s.handle)));
            debug!(hub = %self.name, ?kind, pruned = closed.len(), "Pruned closed subscribers");
        }

        trace!(hub = %self.name, ?kind, delivered, "Notified");
        delivered
    }

    /// Copy subscriptions from `other`, skipping coordinator-origin entries and
    /// entries already present here. Returns the number of entries copied.
    pub fn migrate_from(&mut self, other: &NotificationHub<E>) -> usize {
        let mut copied = 0;
        for sub in other.subscribers.iter().filter(|s| s.origin != Origin::Coordinator) {
            let exists = self
                .subscribers
                .iter()
                .any(|s| s.handle == sub.handle && s.kind == sub.kind);
            if !exists && !sub.tx.is_closed() {
                self.subscribers.push(sub.clone());
                copied += 1;
            }
        }
        debug!(from = %other.name, to = %self.name, copied, "Migrated subscriptions");
        copied
    }

    /// Number of live entries for `kind`
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.subscribers.iter().filter(|s| s.kind == kind).count()
    }

    /// Whether `handle` is registered for `kind`
    pub fn is_subscribed(&self, handle: SubscriptionHandle, kind: E::Kind) -> bool {
        self.subscribers.iter().any(|s| s.handle == handle && s.kind == kind)
    }

    /// Total number of entries across all kinds
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<E: Notification> fmt::Debug for NotificationHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHub")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
