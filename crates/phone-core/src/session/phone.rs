//! Session state and request plumbing

use crate::call::{Call, CallSlot, CallState};
use crate::connection::{Connection, ConnectionId, ConnectionRef};
use crate::error::{PhoneError, PhoneResult};
use crate::events::{PhoneEvent, PhoneNotification};
use crate::mmi::{MmiCode, MmiId};
use crate::radio::{
    Completion, RadioEvent, RadioLink, RadioRequest, RadioResult, RequestToken,
};
use crate::settings::PhoneSettings;
use crate::types::{PhoneId, PhoneState, RadioClass, ServiceState, SubId, SuppService};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use telephony_infra_common::dispatch::{QueueHandle, ScheduledTask, TimerId};
use telephony_infra_common::NotificationHub;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Work item on the phone task queue
#[derive(Debug)]
pub struct PhoneDispatch {
    pub phone: PhoneId,
    pub task: PhoneTask,
}

impl PhoneDispatch {
    /// Wrap a radio event for `phone`
    pub fn radio(phone: PhoneId, event: RadioEvent) -> Self {
        Self {
            phone,
            task: PhoneTask::Radio(event),
        }
    }
}

#[derive(Debug)]
pub enum PhoneTask {
    Radio(RadioEvent),
    EcmTimerExpired(TimerId),
    PostDialPause {
        connection: ConnectionId,
        timer: TimerId,
    },
}

/// What a dial turned into
#[derive(Debug)]
pub enum DialOutcome {
    /// A new outgoing connection
    Connection {
        connection: ConnectionRef,
        completion: Completion,
    },
    /// Routed to supplementary-service processing; no connection exists
    Mmi(MmiId),
    /// Consumed as an in-call supplementary-service command
    InCallMmi,
}

impl DialOutcome {
    pub fn connection(&self) -> Option<ConnectionRef> {
        match self {
            DialOutcome::Connection { connection, .. } => Some(*connection),
            _ => None,
        }
    }
}

/// Follow-up work attached to an outstanding radio request
#[derive(Debug)]
pub(crate) enum RequestPurpose {
    Plain,
    Dial { connection: ConnectionId },
    CdmaThreeWay { connection: ConnectionId },
    CdmaAcceptWaiting { connection: ConnectionId },
    /// Failure raises a supplementary-service failure notification
    SuppService(SuppService),
    PostDialDtmf { connection: ConnectionId },
    Ss { mmi: MmiId },
    Ussd { mmi: MmiId },
    CancelUssd { mmi: MmiId },
    ExitEcm,
}

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) purpose: RequestPurpose,
    pub(crate) reply: Option<oneshot::Sender<RadioResult>>,
}

/// A dial held back until emergency callback mode has been exited
#[derive(Debug)]
pub(crate) struct DeferredDial {
    pub(crate) connection: ConnectionId,
    pub(crate) request: RadioRequest,
    pub(crate) reply: oneshot::Sender<RadioResult>,
}

#[derive(Debug, Default)]
pub(crate) struct EcmState {
    pub(crate) active: bool,
    pub(crate) timer: Option<ScheduledTask>,
    /// Timer was cancelled for an emergency call and must restart on idle
    pub(crate) timer_cancelled: bool,
    pub(crate) deferred_dial: Option<DeferredDial>,
}

/// One radio's call-control state machine
pub struct PhoneSession {
    pub(crate) id: PhoneId,
    pub(crate) sub: SubId,
    pub(crate) class: RadioClass,
    pub(crate) service_state: ServiceState,
    pub(crate) radio: Box<dyn RadioLink>,
    pub(crate) calls: [Call; 3],
    pub(crate) pending_mo: Option<ConnectionId>,
    pub(crate) hangup_pending_mo: bool,
    pub(crate) pending_mmis: IndexMap<MmiId, MmiCode>,
    pub(crate) pending_requests: HashMap<RequestToken, PendingRequest>,
    next_token: u64,
    pub(crate) ecm: EcmState,
    pub(crate) post_dial_timers: HashMap<ConnectionId, ScheduledTask>,
    pub(crate) hub: NotificationHub<PhoneEvent>,
    pub(crate) queue: QueueHandle<PhoneDispatch>,
    ims: Option<PhoneId>,
    parent: Option<PhoneId>,
    pub(crate) muted: bool,
    pub(crate) settings: PhoneSettings,
    last_state: PhoneState,
}

impl PhoneSession {
    pub fn new(
        id: PhoneId,
        sub: SubId,
        class: RadioClass,
        radio: Box<dyn RadioLink>,
        queue: QueueHandle<PhoneDispatch>,
        settings: PhoneSettings,
    ) -> Self {
        info!(phone = %id, %sub, radio_class = %class, "Creating phone session");
        Self {
            id,
            sub,
            class,
            service_state: ServiceState::OutOfService,
            radio,
            calls: [
                Call::new(CallSlot::Ringing),
                Call::new(CallSlot::Foreground),
                Call::new(CallSlot::Background),
            ],
            pending_mo: None,
            hangup_pending_mo: false,
            pending_mmis: IndexMap::new(),
            pending_requests: HashMap::new(),
            next_token: 1,
            ecm: EcmState::default(),
            post_dial_timers: HashMap::new(),
            hub: NotificationHub::new(format!("{}", id)),
            queue,
            ims: None,
            parent: None,
            muted: false,
            settings,
            last_state: PhoneState::Idle,
        }
    }

    pub fn id(&self) -> PhoneId {
        self.id
    }

    pub fn sub_id(&self) -> SubId {
        self.sub
    }

    pub fn radio_class(&self) -> RadioClass {
        self.class
    }

    pub fn service_state(&self) -> ServiceState {
        self.service_state
    }

    pub fn settings(&self) -> &PhoneSettings {
        &self.settings
    }

    pub fn call(&self, slot: CallSlot) -> &Call {
        &self.calls[slot.index()]
    }

    pub(crate) fn call_mut(&mut self, slot: CallSlot) -> &mut Call {
        &mut self.calls[slot.index()]
    }

    pub fn ringing_call(&self) -> &Call {
        self.call(CallSlot::Ringing)
    }

    pub fn foreground_call(&self) -> &Call {
        self.call(CallSlot::Foreground)
    }

    pub fn background_call(&self) -> &Call {
        self.call(CallSlot::Background)
    }

    /// Coarse state: ringing beats off-hook beats idle
    pub fn phone_state(&self) -> PhoneState {
        if self.ringing_call().is_ringing() {
            PhoneState::Ringing
        } else if self.pending_mo.is_some()
            || !self.foreground_call().is_idle()
            || !self.background_call().is_idle()
        {
            PhoneState::OffHook
        } else {
            PhoneState::Idle
        }
    }

    /// Whether any slot holds a live call
    pub fn is_in_call(&self) -> bool {
        self.calls.iter().any(|c| !c.is_idle())
    }

    pub fn is_in_ecm(&self) -> bool {
        self.ecm.active
    }

    pub fn get_mute(&self) -> bool {
        self.muted
    }

    /// Connection and the slot it currently sits in
    pub fn connection(&self, id: ConnectionId) -> Option<(CallSlot, &Connection)> {
        CallSlot::ALL
            .into_iter()
            .find_map(|slot| self.call(slot).get(id).map(|c| (slot, c)))
    }

    pub(crate) fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.calls.iter_mut().find_map(|call| call.get_mut(id))
    }

    pub(crate) fn require_connection(&self, id: ConnectionId) -> PhoneResult<(CallSlot, &Connection)> {
        self.connection(id)
            .ok_or_else(|| PhoneError::UnknownConnection(id.to_string()))
    }

    pub(crate) fn connection_by_index(&self, index: u32) -> Option<ConnectionId> {
        self.calls
            .iter()
            .flat_map(|call| call.connections())
            .find(|c| c.driver_index() == Some(index) && c.state() != CallState::Disconnected)
            .map(Connection::id)
    }

    /// Move a connection to `slot` if it is not already there
    pub(crate) fn move_connection(&mut self, id: ConnectionId, slot: CallSlot) {
        let Some((current, _)) = self.connection(id) else {
            return;
        };
        if current == slot {
            return;
        }
        if let Some(conn) = self.call_mut(current).take(id) {
            debug!(phone = %self.id, connection = %id, from = ?current, to = ?slot, "Moving connection");
            self.call_mut(slot).push(conn);
        }
    }

    pub fn connection_ref(&self, id: ConnectionId) -> ConnectionRef {
        ConnectionRef::new(self.id, id)
    }

    pub fn ims_phone(&self) -> Option<PhoneId> {
        self.ims
    }

    /// The CS session this IMS session augments
    pub fn parent_phone(&self) -> Option<PhoneId> {
        self.parent
    }

    pub(crate) fn set_ims_phone(&mut self, ims: Option<PhoneId>) {
        self.ims = ims;
    }

    pub(crate) fn set_parent_phone(&mut self, parent: Option<PhoneId>) {
        self.parent = parent;
    }

    pub fn hub(&self) -> &NotificationHub<PhoneEvent> {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut NotificationHub<PhoneEvent> {
        &mut self.hub
    }

    pub fn queue(&self) -> &QueueHandle<PhoneDispatch> {
        &self.queue
    }

    pub(crate) fn notify(&mut self, payload: PhoneNotification) {
        self.hub.notify(PhoneEvent::new(self.id, payload));
    }

    pub(crate) fn notify_supp_service_failed(&mut self, service: SuppService) {
        debug!(phone = %self.id, ?service, "Supplementary service failed");
        self.notify(PhoneNotification::SuppServiceFailed(service));
    }

    /// Send a request to the radio and remember what to do with its answer
    pub(crate) fn submit(&mut self, request: RadioRequest, purpose: RequestPurpose) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.submit_with(request, purpose, Some(tx));
        rx
    }

    pub(crate) fn submit_with(
        &mut self,
        request: RadioRequest,
        purpose: RequestPurpose,
        reply: Option<oneshot::Sender<RadioResult>>,
    ) -> RequestToken {
        let token = RequestToken(self.next_token);
        self.next_token += 1;
        debug!(phone = %self.id, %token, request = request.name(), "Submitting radio request");
        self.pending_requests
            .insert(token, PendingRequest { purpose, reply });
        self.radio.submit(token, request);
        token
    }

    /// Number of requests still waiting for the radio
    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    /// Recompute the coarse state and run idle transitions
    pub(crate) fn update_phone_state(&mut self) {
        let state = self.phone_state();
        if state == self.last_state {
            return;
        }
        debug!(phone = %self.id, from = ?self.last_state, to = ?state, "Phone state changed");
        self.last_state = state;

        if state == PhoneState::Idle && self.ecm.active && self.ecm.timer_cancelled {
            self.handle_ecm_timer(crate::session::EcmTimerAction::Restart);
        }
    }
}

impl fmt::Debug for PhoneSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhoneSession")
            .field("id", &self.id)
            .field("sub", &self.sub)
            .field("class", &self.class)
            .field("service_state", &self.service_state)
            .field("ringing", &self.ringing_call().state())
            .field("foreground", &self.foreground_call().state())
            .field("background", &self.background_call().state())
            .field("ecm", &self.ecm.active)
            .finish()
    }
}
