//! Coordinator state and the phone registry

use std::collections::HashMap;
use std::fmt;
use telephony_infra_common::{NotificationHub, Origin, Subscription, SubscriptionHandle};
use telephony_phone_core::{
    CallRef, CallSlot, EventKind, PhoneArena, PhoneError, PhoneEvent, PhoneId, PhoneResult,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Aggregates every registered phone into one call-control surface.
///
/// The coordinator owns no phone state. It keeps phone ids in registration
/// order, flattened per-slot call handles, the default phone, and one
/// listener per phone whose events it re-publishes on its own hub.
pub struct CallCoordinator {
    pub(crate) phones: Vec<PhoneId>,
    pub(crate) ringing_calls: Vec<CallRef>,
    pub(crate) foreground_calls: Vec<CallRef>,
    pub(crate) background_calls: Vec<CallRef>,
    pub(crate) default_phone: Option<PhoneId>,
    listeners: HashMap<PhoneId, SubscriptionHandle>,
    events_tx: mpsc::UnboundedSender<PhoneEvent>,
    pub(crate) events_rx: mpsc::UnboundedReceiver<PhoneEvent>,
    pub(crate) hub: NotificationHub<PhoneEvent>,
}

impl CallCoordinator {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            phones: Vec::new(),
            ringing_calls: Vec::new(),
            foreground_calls: Vec::new(),
            background_calls: Vec::new(),
            default_phone: None,
            listeners: HashMap::new(),
            events_tx,
            events_rx,
            hub: NotificationHub::new("coordinator"),
        }
    }

    /// Register a phone.
    ///
    /// Returns `Ok(false)` without touching anything when the phone is
    /// already registered. The first phone registered becomes the default.
    pub fn register_phone(&mut self, arena: &mut PhoneArena, phone: PhoneId) -> PhoneResult<bool> {
        if self.is_registered(phone) {
            debug!(%phone, "Phone already registered");
            return Ok(false);
        }
        let session = arena.get_mut(phone)?;
        let handle = session
            .hub_mut()
            .subscribe_with(&EventKind::ALL, Origin::Coordinator, self.events_tx.clone());

        self.listeners.insert(phone, handle);
        self.phones.push(phone);
        self.ringing_calls.push(CallRef::new(phone, CallSlot::Ringing));
        self.foreground_calls.push(CallRef::new(phone, CallSlot::Foreground));
        self.background_calls.push(CallRef::new(phone, CallSlot::Background));
        if self.default_phone.is_none() {
            self.default_phone = Some(phone);
        }

        info!(%phone, radio_class = %session.radio_class(), sub = %session.sub_id(), registered = self.phones.len(), "Phone registered");
        Ok(true)
    }

    /// Unregister a phone and, first, any IMS phone attached to it.
    ///
    /// Returns `Ok(false)` when the phone was not registered.
    pub fn unregister_phone(&mut self, arena: &mut PhoneArena, phone: PhoneId) -> PhoneResult<bool> {
        if !self.is_registered(phone) {
            debug!(%phone, "Phone not registered");
            return Ok(false);
        }

        let ims = arena.get(phone).ok().and_then(|s| s.ims_phone());
        if let Some(ims) = ims {
            self.unregister_phone(arena, ims)?;
        }

        if let Some(handle) = self.listeners.remove(&phone) {
            match arena.get_mut(phone) {
                Ok(session) => {
                    session.hub_mut().unsubscribe(handle);
                }
                Err(_) => warn!(%phone, "Unregistering a phone that no longer exists"),
            }
        }

        self.phones.retain(|p| *p != phone);
        self.ringing_calls.retain(|c| c.phone != phone);
        self.foreground_calls.retain(|c| c.phone != phone);
        self.background_calls.retain(|c| c.phone != phone);

        if self.default_phone == Some(phone) {
            self.default_phone = self.phones.first().copied();
            info!(old = %phone, new = ?self.default_phone, "Default phone changed");
        }

        info!(%phone, registered = self.phones.len(), "Phone unregistered");
        Ok(true)
    }

    /// Attach `ims` to `parent` and register it.
    ///
    /// Client subscriptions on the parent carry over to the IMS phone.
    pub fn register_ims_phone(
        &mut self,
        arena: &mut PhoneArena,
        parent: PhoneId,
        ims: PhoneId,
    ) -> PhoneResult<bool> {
        if !self.is_registered(parent) {
            return Err(PhoneError::NotRegistered(parent));
        }
        arena.attach_ims(parent, ims)?;
        self.register_phone(arena, ims)
    }

    /// Unregister and detach the IMS phone of `parent`, if any
    pub fn unregister_ims_phone(
        &mut self,
        arena: &mut PhoneArena,
        parent: PhoneId,
    ) -> PhoneResult<Option<PhoneId>> {
        let Some(ims) = arena.get(parent)?.ims_phone() else {
            return Ok(None);
        };
        self.unregister_phone(arena, ims)?;
        arena.detach_ims(parent)
    }

    pub fn is_registered(&self, phone: PhoneId) -> bool {
        self.phones.contains(&phone)
    }

    /// Registered phones in registration order
    pub fn phones(&self) -> &[PhoneId] {
        &self.phones
    }

    pub fn default_phone(&self) -> Option<PhoneId> {
        self.default_phone
    }

    pub fn ringing_calls(&self) -> &[CallRef] {
        &self.ringing_calls
    }

    pub fn foreground_calls(&self) -> &[CallRef] {
        &self.foreground_calls
    }

    pub fn background_calls(&self) -> &[CallRef] {
        &self.background_calls
    }

    /// Listen for one kind of event from every registered phone
    pub fn subscribe(&mut self, kind: EventKind) -> Subscription<PhoneEvent> {
        self.hub.subscribe(kind, Origin::Client)
    }

    /// Listen for several kinds on an existing channel
    pub fn subscribe_with(
        &mut self,
        kinds: &[EventKind],
        tx: mpsc::UnboundedSender<PhoneEvent>,
    ) -> SubscriptionHandle {
        self.hub.subscribe_with(kinds, Origin::Client, tx)
    }

    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.hub.unsubscribe(handle)
    }

    pub fn unsubscribe_kind(&mut self, handle: SubscriptionHandle, kind: EventKind) -> bool {
        self.hub.unsubscribe_kind(handle, kind)
    }

    pub fn hub(&self) -> &NotificationHub<PhoneEvent> {
        &self.hub
    }
}

impl Default for CallCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCoordinator")
            .field("phones", &self.phones)
            .field("default_phone", &self.default_phone)
            .field("subscribers", &self.hub.len())
            .finish()
    }
}
