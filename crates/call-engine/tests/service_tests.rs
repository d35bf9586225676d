//! Telephony service wiring: configuration, queues, SMS binding and the run loop

use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;
use telephony_call_engine::prelude::*;
use telephony_phone_core::radio::RadioPowerState;
use telephony_phone_core::testing::RecordingRadio;
use telephony_phone_core::{PhoneDispatch, RadioEvent, RadioRequest};
use telephony_sms_core::testing::{RecordingPrompter, RecordingTransport};
use telephony_sms_core::{
    SendFailure, SmsEvent, SmsEventKind, SmsFailure, SmsRequest, SmsTask,
};

const APP: &str = "com.example.messenger";

fn service_with_phone() -> (TelephonyService, PhoneId) {
    let mut service = TelephonyService::new(TelephonyConfig::default()).unwrap();
    let phone = service
        .add_phone(SubId(1), RadioClass::Gsm, Box::new(RecordingRadio::new()))
        .unwrap();
    post(&mut service, phone, RadioEvent::ServiceStateChanged(ServiceState::InService));
    (service, phone)
}

fn post(service: &mut TelephonyService, phone: PhoneId, event: RadioEvent) {
    service
        .phone_queue()
        .post(PhoneDispatch::radio(phone, event))
        .unwrap();
    service.process_pending();
}

fn enable_sms(service: &mut TelephonyService, phone: PhoneId) -> (RecordingTransport, RecordingPrompter) {
    let transport = RecordingTransport::new();
    let prompter = RecordingPrompter::new();
    service
        .enable_sms(phone, Box::new(transport.clone()), Box::new(prompter.clone()))
        .unwrap();
    (transport, prompter)
}

#[test]
fn test_builder_loads_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[phone]\nmax_connections_per_call = 3\n\n[sms]\nmax_send_retries = 1").unwrap();

    let service = TelephonyServiceBuilder::new()
        .with_config_file(file.path())
        .build()
        .unwrap();

    assert_eq!(service.config().phone.max_connections_per_call, 3);
    assert_eq!(service.config().sms.max_send_retries, 1);
}

#[test]
fn test_builder_rejects_config_and_file_together() {
    let err = TelephonyServiceBuilder::new()
        .with_config(TelephonyConfig::default())
        .with_config_file("/nonexistent/telephony.toml")
        .build()
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[test]
fn test_builder_without_file_uses_defaults() {
    let service = TelephonyServiceBuilder::default().build().unwrap();
    assert_eq!(service.config().phone.ecm_exit_timer_secs, 300);
    assert!(service.coordinator().phones().is_empty());
}

#[test]
fn test_sms_requires_enabling() {
    let (mut service, _phone) = service_with_phone();
    let err = service
        .send_sms(SmsRequest::text(APP, "+15551234567", "hi"))
        .unwrap_err();
    assert!(matches!(err, EngineError::SmsDisabled));
}

#[test]
fn test_sms_follows_bound_phone_service_state() {
    let (mut service, phone) = service_with_phone();
    enable_sms(&mut service, phone);
    assert_eq!(service.sms().unwrap().service_state(), ServiceState::InService);

    post(&mut service, phone, RadioEvent::RadioPower(RadioPowerState::Off));

    assert_eq!(service.sms().unwrap().service_state(), ServiceState::PowerOff);
}

#[test]
fn test_send_failure_while_radio_off_is_final() {
    let (mut service, phone) = service_with_phone();
    let (transport, _prompter) = enable_sms(&mut service, phone);
    let mut failed = service.sms_mut().unwrap().subscribe(SmsEventKind::SendFailed);

    let message = service
        .send_sms(SmsRequest::text(APP, "+15551234567", "hi"))
        .unwrap()
        .messages[0];
    assert_eq!(transport.attempts(message), 1);

    post(&mut service, phone, RadioEvent::RadioPower(RadioPowerState::Off));
    service
        .sms_queue()
        .post(SmsTask::SendComplete {
            message,
            result: Err(SendFailure::Retry),
        })
        .unwrap();
    service.process_pending();

    match failed.rx.try_recv().unwrap() {
        SmsEvent::SendFailed { message: id, failure, .. } => {
            assert_eq!(id, message);
            assert_eq!(failure, SmsFailure::RadioOff);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(transport.attempts(message), 1);
}

#[test]
fn test_removing_bound_phone_disables_sms() {
    let (mut service, phone) = service_with_phone();
    enable_sms(&mut service, phone);
    assert_eq!(service.sms_phone(), Some(phone));

    service.remove_phone(phone).unwrap();

    assert!(service.sms().is_none());
    assert!(service.arena().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_drives_sms_retry_timer() {
    let (mut service, phone) = service_with_phone();
    let (transport, _prompter) = enable_sms(&mut service, phone);

    let message = service
        .send_sms(SmsRequest::text(APP, "+15551234567", "hi"))
        .unwrap()
        .messages[0];
    service
        .sms_queue()
        .post(SmsTask::SendComplete {
            message,
            result: Err(SendFailure::Retry),
        })
        .unwrap();

    service.run(tokio::time::sleep(Duration::from_secs(5))).await;

    assert_eq!(transport.attempts(message), 2);
    assert_eq!(service.sms().unwrap().tracker(message).unwrap().retry_count(), 1);
}

#[tokio::test]
async fn test_run_processes_radio_events_until_shutdown() {
    let (mut service, phone) = service_with_phone();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let queue = service.phone_queue();
    queue
        .post(PhoneDispatch::radio(phone, RadioEvent::RadioPower(RadioPowerState::Off)))
        .unwrap();
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        let _ = stop_tx.send(());
    });

    service
        .run(async move {
            let _ = stop_rx.await;
        })
        .await;

    assert_eq!(
        service.coordinator().get_service_state(service.arena()),
        ServiceState::PowerOff
    );
}

#[test]
fn test_process_pending_arms_timers_without_a_runtime() {
    let mut config = TelephonyConfig::default();
    config.phone.ecm_exit_timer_secs = 1;
    let mut service = TelephonyService::new(config).unwrap();
    let radio = RecordingRadio::new();
    let phone = service
        .add_phone(SubId(1), RadioClass::Cdma, Box::new(radio.clone()))
        .unwrap();

    post(&mut service, phone, RadioEvent::EmergencyCallbackModeEntered);
    assert!(service.arena().get(phone).unwrap().is_in_ecm());

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while radio.count(|r| matches!(r, RadioRequest::ExitEmergencyCallbackMode)) == 0 {
        assert!(std::time::Instant::now() < deadline, "exit timer never fired");
        std::thread::sleep(Duration::from_millis(20));
        service.process_pending();
    }
}

#[test]
fn test_failed_ims_attach_keeps_existing_overlay() {
    let (mut service, parent) = service_with_phone();
    let ims = service
        .add_ims_phone(parent, RadioClass::Ims, Box::new(RecordingRadio::new()))
        .unwrap();

    let err = service
        .add_ims_phone(parent, RadioClass::Gsm, Box::new(RecordingRadio::new()))
        .unwrap_err();

    assert!(matches!(err, PhoneError::Unsupported { .. }));
    assert_eq!(service.arena().len(), 2);
    assert_eq!(service.arena().get(parent).unwrap().ims_phone(), Some(ims));
    assert_eq!(service.coordinator().phones(), &[parent, ims]);
}

