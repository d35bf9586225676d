//! Cross-radio behaviour of the call coordinator
//!
//! Every test runs through a `TelephonyService` with recording radios, so
//! radio events take the same queue-and-pump path they take in production:
//! - registry order, default phone re-designation, idempotent registration
//! - aggregate state priority
//! - dial gating and the hold/hang-up of calls on other radios
//! - the answer matrix across two radios
//! - conference/transfer eligibility and soft failures
//! - the new-ringing collision guard
//! - IMS overlays

use pretty_assertions::assert_eq;
use telephony_call_engine::prelude::*;
use telephony_infra_common::Origin;
use telephony_phone_core::radio::{DriverCallState as D, RadioPowerState};
use telephony_phone_core::testing::RecordingRadio;
use telephony_phone_core::{
    DialOutcome, DriverCall, PhoneDispatch, PhoneNotification, RadioError, RadioEvent,
    RadioRequest, SuppService,
};

struct Phone {
    id: PhoneId,
    radio: RecordingRadio,
}

fn service() -> TelephonyService {
    TelephonyService::new(TelephonyConfig::default()).unwrap()
}

fn post(service: &mut TelephonyService, phone: PhoneId, event: RadioEvent) {
    service
        .phone_queue()
        .post(PhoneDispatch::radio(phone, event))
        .unwrap();
    service.process_pending();
}

fn add(service: &mut TelephonyService, sub: i32, class: RadioClass) -> Phone {
    let radio = RecordingRadio::new();
    let id = service
        .add_phone(SubId(sub), class, Box::new(radio.clone()))
        .unwrap();
    post(service, id, RadioEvent::ServiceStateChanged(ServiceState::InService));
    Phone { id, radio }
}

fn calls(service: &mut TelephonyService, phone: &Phone, calls: Vec<DriverCall>) {
    post(service, phone.id, RadioEvent::CallStateChanged { calls, fail_cause: None });
}

fn active(number: &str) -> DriverCall {
    DriverCall::new(1, D::Active, number, true)
}

fn held(index: u32, number: &str) -> DriverCall {
    DriverCall::new(index, D::Holding, number, true)
}

fn incoming(index: u32, number: &str) -> DriverCall {
    DriverCall::new(index, D::Incoming, number, true)
}

fn ringing_ref(phone: &Phone) -> CallRef {
    CallRef::new(phone.id, CallSlot::Ringing)
}

fn held_ref(phone: &Phone) -> CallRef {
    CallRef::new(phone.id, CallSlot::Background)
}

fn slots(phones: &[PhoneId], slot: CallSlot) -> Vec<CallRef> {
    phones.iter().map(|p| CallRef::new(*p, slot)).collect()
}

// ---- registry ----

#[test]
fn test_flattened_lists_follow_registration_order() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Cdma);
    let c = add(&mut service, 3, RadioClass::Gsm);

    let coordinator = service.coordinator();
    assert_eq!(coordinator.phones(), &[a.id, b.id, c.id]);
    assert_eq!(coordinator.ringing_calls(), slots(&[a.id, b.id, c.id], CallSlot::Ringing).as_slice());

    service.remove_phone(b.id).unwrap();

    let coordinator = service.coordinator();
    assert_eq!(coordinator.phones(), &[a.id, c.id]);
    assert_eq!(coordinator.ringing_calls(), slots(&[a.id, c.id], CallSlot::Ringing).as_slice());
    assert_eq!(coordinator.foreground_calls(), slots(&[a.id, c.id], CallSlot::Foreground).as_slice());
    assert_eq!(coordinator.background_calls(), slots(&[a.id, c.id], CallSlot::Background).as_slice());

    let d = add(&mut service, 4, RadioClass::Gsm);
    assert_eq!(service.coordinator().phones(), &[a.id, c.id, d.id]);
}

#[test]
fn test_default_phone_moves_to_first_remaining() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    let c = add(&mut service, 3, RadioClass::Gsm);
    assert_eq!(service.coordinator().default_phone(), Some(a.id));

    service.remove_phone(b.id).unwrap();
    assert_eq!(service.coordinator().default_phone(), Some(a.id));

    service.remove_phone(a.id).unwrap();
    assert_eq!(service.coordinator().default_phone(), Some(c.id));

    service.remove_phone(c.id).unwrap();
    assert_eq!(service.coordinator().default_phone(), None);
    assert!(service.coordinator().phones().is_empty());
}

#[test]
fn test_registering_twice_is_a_no_op() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let listeners = service.arena().get(a.id).unwrap().hub().len();

    let (coordinator, arena) = service.parts_mut();
    assert!(!coordinator.register_phone(arena, a.id).unwrap());

    assert_eq!(service.coordinator().phones(), &[a.id]);
    assert_eq!(service.coordinator().ringing_calls().len(), 1);
    assert_eq!(service.arena().get(a.id).unwrap().hub().len(), listeners);
}

#[test]
fn test_events_from_unregistered_phone_are_not_forwarded() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let mut rings = {
        let (coordinator, _) = service.parts_mut();
        coordinator.subscribe(EventKind::NewRingingConnection)
    };

    let (coordinator, arena) = service.parts_mut();
    assert!(coordinator.unregister_phone(arena, a.id).unwrap());
    calls(&mut service, &a, vec![incoming(1, "5550000")]);

    assert!(rings.rx.try_recv().is_err());
    assert_eq!(service.arena().get(a.id).unwrap().phone_state(), PhoneState::Ringing);
}

// ---- aggregate state ----

#[test]
fn test_ringing_masks_offhook_in_combined_state() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);

    calls(&mut service, &a, vec![active("5551111")]);
    assert_eq!(service.coordinator().get_state(service.arena()), PhoneState::OffHook);

    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    let coordinator = service.coordinator();
    let arena = service.arena();
    assert_eq!(coordinator.get_state(arena), PhoneState::Ringing);
    assert_eq!(coordinator.get_state_for(arena, SubId(1)), PhoneState::OffHook);
    assert_eq!(coordinator.get_state_for(arena, SubId(2)), PhoneState::Ringing);
    assert_eq!(coordinator.first_active_ringing_call(arena), Some(ringing_ref(&b)));
    assert_eq!(coordinator.ringing_phone(arena), Some(b.id));
    assert_eq!(coordinator.fg_phone(arena), Some(a.id));
}

#[test]
fn test_service_state_prefers_in_service() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Cdma);

    post(&mut service, a.id, RadioEvent::RadioPower(RadioPowerState::Off));
    assert_eq!(service.coordinator().get_service_state(service.arena()), ServiceState::InService);

    post(&mut service, b.id, RadioEvent::ServiceStateChanged(ServiceState::EmergencyOnly));
    assert_eq!(service.coordinator().get_service_state(service.arena()), ServiceState::EmergencyOnly);
    assert_eq!(
        service.coordinator().get_service_state_for(service.arena(), SubId(7)),
        ServiceState::OutOfService
    );
}

#[test]
fn test_idle_lookup_falls_back_to_default_phone() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    add(&mut service, 2, RadioClass::Gsm);

    let coordinator = service.coordinator();
    let arena = service.arena();
    assert!(!coordinator.has_active_fg_call(arena));
    assert_eq!(coordinator.active_fg_call(arena), Some(CallRef::new(a.id, CallSlot::Foreground)));
    assert_eq!(coordinator.active_fg_call_state(arena), CallState::Idle);
}

#[test]
fn test_call_info_snapshot() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111")]);

    let call = service.coordinator().active_fg_call(service.arena()).unwrap();
    let snapshot = service.coordinator().call_info(service.arena(), call).unwrap();
    assert_eq!(snapshot.info.state, CallState::Active);
    assert_eq!(snapshot.info.connections.len(), 1);
    assert_eq!(snapshot.radio_class, RadioClass::Gsm);
    assert_eq!(snapshot.sub, SubId(1));
}

// ---- dial ----

#[test]
fn test_dial_rejected_while_powered_off() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    post(&mut service, a.id, RadioEvent::RadioPower(RadioPowerState::Off));

    let (coordinator, arena) = service.parts_mut();
    assert!(!coordinator.can_dial(arena, a.id));
    let err = coordinator
        .dial(arena, a.id, "5551234", VideoState::AudioOnly)
        .unwrap_err();
    assert!(err.is_call_state());
    assert!(a.radio.is_empty());
}

#[test]
fn test_ringing_anywhere_vetoes_dial() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    assert!(!coordinator.can_dial(arena, a.id));
    assert!(coordinator
        .dial(arena, a.id, "5551234", VideoState::AudioOnly)
        .unwrap_err()
        .is_call_state());
}

#[test]
fn test_other_radio_busy_does_not_gate_dial() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    calls(&mut service, &b, vec![active("5552222")]);

    let (coordinator, arena) = service.parts_mut();
    assert!(coordinator.can_dial(arena, a.id));
    let outcome = coordinator
        .dial(arena, a.id, "5551234", VideoState::AudioOnly)
        .unwrap();
    assert!(matches!(outcome, DialOutcome::Connection { .. }));
    // Different subscription: the call on B is left alone
    assert!(b.radio.is_empty());
}

#[test]
fn test_dial_allowed_while_alerting_but_not_while_dialing() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);

    let (coordinator, arena) = service.parts_mut();
    coordinator.dial(arena, a.id, "5551234", VideoState::AudioOnly).unwrap();
    assert_eq!(coordinator.active_fg_call_state(arena), CallState::Dialing);
    assert!(!coordinator.can_dial(arena, a.id));
    assert!(coordinator
        .dial(arena, a.id, "5556789", VideoState::AudioOnly)
        .unwrap_err()
        .is_call_state());

    calls(&mut service, &a, vec![DriverCall::new(1, D::Alerting, "5551234", false)]);

    let (coordinator, arena) = service.parts_mut();
    assert_eq!(coordinator.active_fg_call_state(arena), CallState::Alerting);
    assert!(coordinator.can_dial(arena, a.id));
    assert!(coordinator.dial(arena, a.id, "5556789", VideoState::AudioOnly).is_ok());
    assert_eq!(a.radio.count(|r| matches!(r, RadioRequest::Dial { .. })), 2);
}

#[test]
fn test_pending_dial_on_other_phone_of_subscription_does_not_gate_dial() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Gsm);

    let (coordinator, arena) = service.parts_mut();
    coordinator.dial(arena, a.id, "5551111", VideoState::AudioOnly).unwrap();
    assert_eq!(coordinator.active_fg_call_state_for(arena, SubId(1)), CallState::Dialing);
    assert!(!coordinator.can_dial(arena, a.id));
    assert!(coordinator.can_dial(arena, b.id));

    coordinator.dial(arena, b.id, "5552222", VideoState::AudioOnly).unwrap();

    // The dialing call on A is neither held nor hung up
    assert!(matches!(a.radio.requests()[..], [RadioRequest::Dial { .. }]));
    assert!(matches!(b.radio.requests()[..], [RadioRequest::Dial { .. }]));
}

#[test]
fn test_dial_holds_active_call_on_other_phone_of_subscription() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111")]);

    let (coordinator, arena) = service.parts_mut();
    coordinator.dial(arena, b.id, "5552222", VideoState::AudioOnly).unwrap();

    assert_eq!(a.radio.requests(), vec![RadioRequest::SwitchWaitingOrHoldingAndActive]);
    assert!(matches!(b.radio.requests()[..], [RadioRequest::Dial { .. }]));
}

#[test]
fn test_dial_hangs_up_active_call_when_other_phone_has_held_call() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111"), held(2, "5553333")]);

    let (coordinator, arena) = service.parts_mut();
    coordinator.dial(arena, b.id, "5552222", VideoState::AudioOnly).unwrap();

    assert_eq!(a.radio.requests(), vec![RadioRequest::HangupForegroundResumeBackground]);
    assert!(matches!(b.radio.requests()[..], [RadioRequest::Dial { .. }]));
}

#[test]
fn test_in_call_command_accepted_when_dial_is_gated() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111"), incoming(2, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    let outcome = coordinator.dial(arena, a.id, "2", VideoState::AudioOnly).unwrap();
    assert!(matches!(outcome, DialOutcome::InCallMmi));
}

#[test]
fn test_dial_on_unregistered_phone() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let (coordinator, arena) = service.parts_mut();
    coordinator.unregister_phone(arena, a.id).unwrap();

    let err = coordinator.dial(arena, a.id, "5551234", VideoState::AudioOnly).unwrap_err();
    assert_eq!(err, PhoneError::NotRegistered(a.id));
}

// ---- answering ----

#[test]
fn test_accept_other_phone_without_held_call_swaps_first() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111")]);
    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    coordinator.accept_call(arena, ringing_ref(&b), VideoState::AudioOnly).unwrap();

    assert_eq!(a.radio.requests(), vec![RadioRequest::SwitchWaitingOrHoldingAndActive]);
    assert_eq!(b.radio.requests(), vec![RadioRequest::SetMute(false), RadioRequest::AcceptCall]);
}

#[test]
fn test_accept_other_phone_with_held_call_hangs_up_first() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111"), held(2, "5553333")]);
    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    coordinator.accept_call(arena, ringing_ref(&b), VideoState::AudioOnly).unwrap();

    assert_eq!(a.radio.requests(), vec![RadioRequest::HangupForegroundResumeBackground]);
    assert_eq!(b.radio.requests(), vec![RadioRequest::SetMute(false), RadioRequest::AcceptCall]);
}

#[test]
fn test_accept_same_phone_with_held_call_hangs_up_first() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    calls(
        &mut service,
        &a,
        vec![
            active("5551111"),
            held(2, "5553333"),
            DriverCall::new(3, D::Waiting, "5552222", true),
        ],
    );

    let (coordinator, arena) = service.parts_mut();
    coordinator.accept_call(arena, ringing_ref(&a), VideoState::AudioOnly).unwrap();

    // With a call waiting, the active call is released connection by
    // connection so the waiting call is not answered implicitly
    assert_eq!(
        a.radio.requests(),
        vec![
            RadioRequest::HangupConnection { index: 1 },
            RadioRequest::SetMute(false),
            RadioRequest::SwitchWaitingOrHoldingAndActive,
        ]
    );
}

#[test]
fn test_accept_same_phone_without_held_call_accepts_directly() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    calls(
        &mut service,
        &a,
        vec![active("5551111"), DriverCall::new(2, D::Waiting, "5552222", true)],
    );

    let (coordinator, arena) = service.parts_mut();
    coordinator.accept_call(arena, ringing_ref(&a), VideoState::AudioOnly).unwrap();

    assert_eq!(
        a.radio.requests(),
        vec![RadioRequest::SetMute(false), RadioRequest::SwitchWaitingOrHoldingAndActive]
    );
}

#[test]
fn test_accept_requires_ringing_slot() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let (coordinator, arena) = service.parts_mut();

    let err = coordinator
        .accept_call(arena, CallRef::new(a.id, CallSlot::Foreground), VideoState::AudioOnly)
        .unwrap_err();
    assert!(err.is_call_state());
}

#[test]
fn test_switch_touches_active_and_held_phones() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111")]);
    calls(&mut service, &b, vec![held(1, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    let completions = coordinator.switch_holding_and_active(arena, Some(held_ref(&b))).unwrap();

    assert_eq!(completions.len(), 2);
    assert_eq!(a.radio.requests(), vec![RadioRequest::SwitchWaitingOrHoldingAndActive]);
    assert_eq!(b.radio.requests(), vec![RadioRequest::SwitchWaitingOrHoldingAndActive]);
}

// ---- conference and transfer ----

#[test]
fn test_conference_same_phone() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111"), held(2, "5553333")]);

    let (coordinator, arena) = service.parts_mut();
    assert!(coordinator.can_conference(arena, held_ref(&a)));
    coordinator.conference(arena, held_ref(&a)).unwrap();

    assert_eq!(a.radio.requests(), vec![RadioRequest::Conference]);
}

#[test]
fn test_conference_across_radio_classes_fails_softly() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Cdma);
    calls(&mut service, &a, vec![active("5551111")]);
    calls(&mut service, &b, vec![held(1, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    let mut failures = coordinator.subscribe(EventKind::SuppServiceFailed);
    assert!(!coordinator.can_conference(arena, held_ref(&b)));

    let mut completion = coordinator.conference(arena, held_ref(&b)).unwrap();

    assert_eq!(completion.try_recv().unwrap(), Err(RadioError::GenericFailure));
    let event = failures.rx.try_recv().unwrap();
    assert_eq!(event.payload, PhoneNotification::SuppServiceFailed(SuppService::Conference));
    assert!(a.radio.is_empty());
    assert!(b.radio.is_empty());
}

#[test]
fn test_transfer_across_phones_fails_softly() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111")]);
    calls(&mut service, &b, vec![held(1, "5552222")]);

    let (coordinator, arena) = service.parts_mut();
    let mut failures = coordinator.subscribe(EventKind::SuppServiceFailed);
    assert!(!coordinator.can_transfer(arena, held_ref(&b)));

    let mut completion = coordinator.explicit_call_transfer(arena, held_ref(&b)).unwrap();

    assert_eq!(completion.try_recv().unwrap(), Err(RadioError::GenericFailure));
    assert_eq!(
        failures.rx.try_recv().unwrap().payload,
        PhoneNotification::SuppServiceFailed(SuppService::Transfer)
    );
}

#[test]
fn test_transfer_on_one_gsm_phone() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    calls(&mut service, &a, vec![active("5551111"), held(2, "5553333")]);

    let (coordinator, arena) = service.parts_mut();
    assert!(coordinator.can_transfer(arena, held_ref(&a)));
    coordinator.explicit_call_transfer(arena, held_ref(&a)).unwrap();

    assert_eq!(a.radio.requests(), vec![RadioRequest::ExplicitCallTransfer]);
}

// ---- collision guard ----

#[test]
fn test_incoming_call_while_dialing_is_hung_up() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Gsm);
    let mut rings = {
        let (coordinator, arena) = service.parts_mut();
        coordinator.dial(arena, a.id, "5551234", VideoState::AudioOnly).unwrap();
        coordinator.subscribe(EventKind::NewRingingConnection)
    };

    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    assert!(rings.rx.try_recv().is_err());
    assert_eq!(b.radio.requests(), vec![RadioRequest::HangupConnection { index: 1 }]);
}

#[test]
fn test_second_ringing_call_on_subscription_is_hung_up() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 1, RadioClass::Gsm);
    let mut rings = {
        let (coordinator, _) = service.parts_mut();
        coordinator.subscribe(EventKind::NewRingingConnection)
    };

    calls(&mut service, &a, vec![incoming(1, "5551111")]);
    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    let first = rings.rx.try_recv().unwrap();
    assert_eq!(first.phone, a.id);
    assert!(rings.rx.try_recv().is_err());
    assert!(a.radio.is_empty());
    assert_eq!(b.radio.requests(), vec![RadioRequest::HangupConnection { index: 1 }]);
}

#[test]
fn test_ringing_on_other_subscription_is_forwarded() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    let mut rings = {
        let (coordinator, _) = service.parts_mut();
        coordinator.subscribe(EventKind::NewRingingConnection)
    };

    calls(&mut service, &a, vec![incoming(1, "5551111")]);
    calls(&mut service, &b, vec![incoming(1, "5552222")]);

    assert_eq!(rings.rx.try_recv().unwrap().phone, a.id);
    assert_eq!(rings.rx.try_recv().unwrap().phone, b.id);
    assert!(b.radio.is_empty());
}

// ---- IMS overlays ----

#[test]
fn test_ims_phone_inherits_client_subscriptions() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let client = {
        let (_, arena) = service.parts_mut();
        arena
            .get_mut(a.id)
            .unwrap()
            .hub_mut()
            .subscribe(EventKind::Disconnect, Origin::Client)
    };

    let ims_radio = RecordingRadio::new();
    let ims = service
        .add_ims_phone(a.id, RadioClass::Ims, Box::new(ims_radio.clone()))
        .unwrap();

    let session = service.arena().get(ims).unwrap();
    assert_eq!(session.parent_phone(), Some(a.id));
    assert_eq!(session.sub_id(), SubId(1));
    assert!(session.hub().is_subscribed(client.handle, EventKind::Disconnect));
    // The client entry plus the coordinator's own listener
    assert_eq!(session.hub().subscriber_count(EventKind::Disconnect), 2);
    assert_eq!(service.coordinator().phones(), &[a.id, ims]);
}

#[test]
fn test_dial_stays_on_parent_until_ims_in_service() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let ims_radio = RecordingRadio::new();
    service
        .add_ims_phone(a.id, RadioClass::Ims, Box::new(ims_radio.clone()))
        .unwrap();

    let (coordinator, arena) = service.parts_mut();
    coordinator.dial(arena, a.id, "5551234", VideoState::AudioOnly).unwrap();

    assert_eq!(a.radio.count(|r| matches!(r, RadioRequest::Dial { .. })), 1);
    assert!(ims_radio.is_empty());
}

#[test]
fn test_dial_routes_over_ims_in_service() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let ims_radio = RecordingRadio::new();
    let ims = service
        .add_ims_phone(a.id, RadioClass::Ims, Box::new(ims_radio.clone()))
        .unwrap();
    post(&mut service, ims, RadioEvent::ServiceStateChanged(ServiceState::InService));

    let (coordinator, arena) = service.parts_mut();
    let outcome = coordinator.dial(arena, a.id, "5556789", VideoState::AudioOnly).unwrap();

    let DialOutcome::Connection { connection, .. } = outcome else {
        panic!("expected a connection");
    };
    assert_eq!(connection.phone, ims);
    assert_eq!(ims_radio.count(|r| matches!(r, RadioRequest::Dial { .. })), 1);
    assert!(a.radio.is_empty());
}

#[test]
fn test_removing_parent_removes_ims_phone() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);
    let ims = service
        .add_ims_phone(a.id, RadioClass::Ims, Box::new(RecordingRadio::new()))
        .unwrap();

    service.remove_phone(a.id).unwrap();

    assert_eq!(service.coordinator().phones(), &[b.id]);
    assert_eq!(service.coordinator().default_phone(), Some(b.id));
    assert!(!service.arena().contains(ims));
    assert!(!service.arena().contains(a.id));
}

#[test]
fn test_ims_phone_needs_registered_parent() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let (coordinator, arena) = service.parts_mut();
    coordinator.unregister_phone(arena, a.id).unwrap();

    let err = service
        .add_ims_phone(a.id, RadioClass::Ims, Box::new(RecordingRadio::new()))
        .unwrap_err();
    assert_eq!(err, PhoneError::NotRegistered(a.id));
    assert_eq!(service.arena().len(), 1);
}

#[test]
fn test_unregister_ims_phone_detaches_it() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let ims = service
        .add_ims_phone(a.id, RadioClass::Ims, Box::new(RecordingRadio::new()))
        .unwrap();

    let (coordinator, arena) = service.parts_mut();
    assert_eq!(coordinator.unregister_ims_phone(arena, a.id).unwrap(), Some(ims));
    assert_eq!(coordinator.phones(), &[a.id]);
    assert_eq!(arena.get(a.id).unwrap().ims_phone(), None);
    assert_eq!(coordinator.unregister_ims_phone(arena, a.id).unwrap(), None);
}

// ---- audio ----

#[test]
fn test_mute_and_dtmf_follow_active_phone() {
    let mut service = service();
    let a = add(&mut service, 1, RadioClass::Gsm);
    let b = add(&mut service, 2, RadioClass::Gsm);

    let (coordinator, arena) = service.parts_mut();
    assert!(coordinator.send_dtmf(arena, '5').unwrap().is_none());
    assert!(coordinator.set_mute(arena, true).unwrap().is_none());

    calls(&mut service, &b, vec![active("5552222")]);

    let (coordinator, arena) = service.parts_mut();
    assert!(coordinator.send_dtmf(arena, '5').unwrap().is_some());
    assert!(coordinator.set_mute(arena, true).unwrap().is_some());
    assert_eq!(
        coordinator.send_dtmf(arena, 'x').unwrap_err(),
        PhoneError::InvalidDtmf('x')
    );

    assert!(a.radio.is_empty());
    assert_eq!(
        b.radio.requests(),
        vec![RadioRequest::SendDtmf('5'), RadioRequest::SetMute(true)]
    );
    assert!(service.coordinator().get_mute(service.arena()));
}
