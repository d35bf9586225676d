//! Supplementary-service and USSD handling on GSM-family phones

use pretty_assertions::assert_eq;
use telephony_infra_common::Origin;
use telephony_phone_core::mmi::{CfReason, MmiAction, SsService};
use telephony_phone_core::radio::{DriverCallState as D, UssdMode};
use telephony_phone_core::testing::session;
use telephony_phone_core::*;

fn mmi_of(outcome: DialOutcome) -> MmiId {
    match outcome {
        DialOutcome::Mmi(id) => id,
        other => panic!("expected an MMI, got {other:?}"),
    }
}

fn complete_event(event: PhoneEvent) -> (MmiId, MmiState, Option<String>, bool) {
    match event.payload {
        PhoneNotification::MmiComplete {
            mmi,
            state,
            message,
            is_ussd_request,
        } => (mmi, state, message, is_ussd_request),
        other => panic!("expected MmiComplete, got {other:?}"),
    }
}

#[test]
fn test_service_interrogation_round_trip() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let mut initiated = phone.hub_mut().subscribe(EventKind::MmiInitiate, Origin::Client);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);

    let id = mmi_of(phone.dial("*#21#", VideoState::AudioOnly).unwrap());

    assert_eq!(
        initiated.rx.try_recv().unwrap().payload,
        PhoneNotification::MmiInitiate(id)
    );
    match radio.requests().last() {
        Some(RadioRequest::SupplementaryService(req)) => {
            assert_eq!(req.service, SsService::CallForwarding(CfReason::Unconditional));
            assert_eq!(req.action, MmiAction::Interrogate);
        }
        other => panic!("unexpected request {other:?}"),
    }
    assert_eq!(phone.phone_state(), PhoneState::Idle);

    phone.handle_radio_event(RadioEvent::Response {
        token: radio.last_token().unwrap(),
        result: Ok(RadioResponse::ServiceInfo("Forwarding disabled".into())),
    });

    let (mmi, state, message, _) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(mmi, id);
    assert_eq!(state, MmiState::Complete);
    assert_eq!(message.as_deref(), Some("Forwarding disabled"));
    assert!(phone.mmi(id).is_none());
}

#[test]
fn test_service_failure_message() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);

    phone.dial("*43#", VideoState::AudioOnly).unwrap();
    phone.handle_radio_event(RadioEvent::Response {
        token: radio.last_token().unwrap(),
        result: Err(RadioError::FdnCheckFailure),
    });

    let (_, state, message, _) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(state, MmiState::Failed);
    assert_eq!(message.as_deref(), Some("Blocked by fixed dialing numbers"));
}

#[test]
fn test_password_mismatch_fails_locally() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);

    phone
        .dial("**03*330*1111*2222*3333#", VideoState::AudioOnly)
        .unwrap();

    let (_, state, message, _) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(state, MmiState::Failed);
    assert_eq!(message.as_deref(), Some("Passwords do not match"));
    assert!(radio.is_empty());
}

#[test]
fn test_ussd_notify_completes_session() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);

    let id = mmi_of(phone.dial("*100#", VideoState::AudioOnly).unwrap());
    assert_eq!(radio.requests(), vec![RadioRequest::SendUssd("*100#".into())]);
    assert!(phone.mmi(id).unwrap().is_pending_ussd());

    phone.handle_radio_event(RadioEvent::Response {
        token: radio.last_token().unwrap(),
        result: Ok(RadioResponse::Done),
    });
    assert!(completed.rx.try_recv().is_err());

    phone.handle_radio_event(RadioEvent::Ussd {
        mode: UssdMode::Notify,
        message: Some("Balance 5.00".into()),
    });

    let (mmi, state, message, is_request) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(mmi, id);
    assert_eq!(state, MmiState::Complete);
    assert_eq!(message.as_deref(), Some("Balance 5.00"));
    assert!(!is_request);
    assert_eq!(phone.pending_mmis().count(), 0);
}

#[test]
fn test_ussd_request_and_response() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);

    let first = mmi_of(phone.dial("*100#", VideoState::AudioOnly).unwrap());
    phone.handle_radio_event(RadioEvent::Ussd {
        mode: UssdMode::Request,
        message: Some("1. Balance 2. Bundles".into()),
    });

    let (mmi, state, _, is_request) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(mmi, first);
    assert_eq!(state, MmiState::Pending);
    assert!(is_request);

    let reply = phone.send_ussd_response("1").unwrap();
    assert_eq!(radio.requests().last(), Some(&RadioRequest::SendUssd("1".into())));
    assert!(phone.mmi(first).is_none());

    phone.handle_radio_event(RadioEvent::Ussd {
        mode: UssdMode::Notify,
        message: Some("Balance 5.00".into()),
    });
    let (mmi, state, _, _) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(mmi, reply);
    assert_eq!(state, MmiState::Complete);
}

#[test]
fn test_network_initiated_ussd() {
    let (mut phone, _radio, _queue) = session(RadioClass::Gsm);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);

    phone.handle_radio_event(RadioEvent::Ussd {
        mode: UssdMode::Notify,
        message: Some("Welcome".into()),
    });

    let (_, state, message, _) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(state, MmiState::Complete);
    assert_eq!(message.as_deref(), Some("Welcome"));
}

#[test]
fn test_cancel_pending_ussd() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let mut completed = phone.hub_mut().subscribe(EventKind::MmiComplete, Origin::Client);
    let id = mmi_of(phone.dial("*100#", VideoState::AudioOnly).unwrap());

    phone.cancel_mmi(id).unwrap();
    assert_eq!(radio.requests().last(), Some(&RadioRequest::CancelUssd));

    phone.handle_radio_event(RadioEvent::Response {
        token: radio.last_token().unwrap(),
        result: Ok(RadioResponse::Done),
    });
    let (_, state, _, _) = complete_event(completed.rx.try_recv().unwrap());
    assert_eq!(state, MmiState::Cancelled);
}

#[test]
fn test_temporary_clir_dials_number() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);

    let outcome = phone.dial("*31#5551234", VideoState::AudioOnly).unwrap();

    assert!(outcome.connection().is_some());
    assert_eq!(
        radio.requests(),
        vec![RadioRequest::Dial {
            address: "5551234".into(),
            clir: ClirMode::Suppression,
            video: VideoState::AudioOnly,
            emergency: false,
        }]
    );
}

#[test]
fn test_emergency_number_is_never_mmi() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    let outcome = phone.dial("112", VideoState::AudioOnly).unwrap();
    assert!(outcome.connection().is_some());
    assert!(matches!(
        radio.requests()[0],
        RadioRequest::Dial { emergency: true, .. }
    ));
}

#[test]
fn test_cdma_does_not_parse_mmi() {
    let (mut phone, radio, _queue) = session(RadioClass::Cdma);
    let outcome = phone.dial("*100#", VideoState::AudioOnly).unwrap();
    assert!(outcome.connection().is_some());
    assert!(matches!(radio.requests()[0], RadioRequest::Dial { .. }));
}

#[test]
fn test_in_call_hangup_command() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    phone.handle_radio_event(RadioEvent::CallStateChanged {
        calls: vec![DriverCall::new(1, D::Active, "5551234", false)],
        fail_cause: None,
    });
    radio.take();

    let outcome = phone.dial("1", VideoState::AudioOnly).unwrap();

    assert!(matches!(outcome, DialOutcome::InCallMmi));
    assert_eq!(
        radio.requests(),
        vec![RadioRequest::HangupForegroundResumeBackground]
    );
}

#[test]
fn test_in_call_release_without_waiting_call_fails() {
    let (mut phone, radio, _queue) = session(RadioClass::Gsm);
    phone.handle_radio_event(RadioEvent::CallStateChanged {
        calls: vec![DriverCall::new(1, D::Active, "5551234", false)],
        fail_cause: None,
    });
    let mut failures = phone
        .hub_mut()
        .subscribe(EventKind::SuppServiceFailed, Origin::Client);
    radio.take();

    assert!(matches!(
        phone.dial("0", VideoState::AudioOnly).unwrap(),
        DialOutcome::InCallMmi
    ));
    assert_eq!(
        failures.rx.try_recv().unwrap().payload,
        PhoneNotification::SuppServiceFailed(SuppService::Reject)
    );
    assert!(radio.is_empty());
}

#[test]
fn test_in_call_separate_unknown_index() {
    let (mut phone, _radio, _queue) = session(RadioClass::Gsm);
    phone.handle_radio_event(RadioEvent::CallStateChanged {
        calls: vec![DriverCall::new(1, D::Active, "5551234", false)],
        fail_cause: None,
    });
    let mut failures = phone
        .hub_mut()
        .subscribe(EventKind::SuppServiceFailed, Origin::Client);

    phone.dial("27", VideoState::AudioOnly).unwrap();
    assert_eq!(
        failures.rx.try_recv().unwrap().payload,
        PhoneNotification::SuppServiceFailed(SuppService::Separate)
    );
}
