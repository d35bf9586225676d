//! Drives one outgoing call through a loopback modem and prints the call
//! snapshots as JSON.
//!
//! ```text
//! telephony-demo [config.toml] [number]
//! ```

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use telephony_call_engine::prelude::*;
use telephony_infra_common::QueueHandle;
use telephony_phone_core::{
    DriverCall, DriverCallState, PhoneDispatch, RadioEvent, RadioLink, RadioRequest,
    RadioResponse, RequestToken,
};
use tracing::{info, warn};

/// Modem that accepts every request and keeps a one-call list
struct LoopbackRadio {
    phone: Arc<OnceCell<PhoneId>>,
    queue: QueueHandle<PhoneDispatch>,
    calls: Vec<DriverCall>,
}

impl LoopbackRadio {
    fn post(&self, phone: PhoneId, event: RadioEvent) {
        if let Err(e) = self.queue.post(PhoneDispatch::radio(phone, event)) {
            warn!("Loopback radio could not post: {}", e);
        }
    }
}

impl RadioLink for LoopbackRadio {
    fn submit(&mut self, token: RequestToken, request: RadioRequest) {
        let Some(phone) = self.phone.get().copied() else {
            warn!(%token, "Request before the phone id is known");
            return;
        };
        info!(%phone, request = request.name(), "Loopback radio request");

        match request {
            RadioRequest::Dial { address, .. } => {
                self.calls = vec![DriverCall::new(1, DriverCallState::Alerting, address, false)];
            }
            RadioRequest::HangupConnection { .. }
            | RadioRequest::HangupForegroundResumeBackground
            | RadioRequest::HangupWaitingOrBackground => self.calls.clear(),
            _ => {}
        }

        self.post(phone, RadioEvent::Response { token, result: Ok(RadioResponse::Done) });
        self.post(
            phone,
            RadioEvent::CallStateChanged {
                calls: self.calls.clone(),
                fail_cause: Some(16),
            },
        );
    }
}

fn print_foreground(service: &TelephonyService, label: &str) -> Result<()> {
    let coordinator = service.coordinator();
    let Some(call) = coordinator.active_fg_call(service.arena()) else {
        println!("{label}: no foreground call");
        return Ok(());
    };
    let snapshot = coordinator.call_info(service.arena(), call)?;
    println!("{label}: {}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next();
    let number = args.next().unwrap_or_else(|| "+15551234567".to_string());

    let mut builder = TelephonyServiceBuilder::new();
    if let Some(path) = config_path {
        builder = builder.with_config_file(path);
    }
    let mut service = builder.build().context("building telephony service")?;
    service.init_logging().context("installing logging")?;

    let phone_cell = Arc::new(OnceCell::new());
    let radio = LoopbackRadio {
        phone: phone_cell.clone(),
        queue: service.phone_queue(),
        calls: Vec::new(),
    };
    let phone = service
        .add_phone(SubId(1), RadioClass::Gsm, Box::new(radio))
        .context("adding phone")?;
    let _ = phone_cell.set(phone);

    service
        .phone_queue()
        .post(PhoneDispatch::radio(phone, RadioEvent::ServiceStateChanged(ServiceState::InService)))?;
    service.process_pending();

    let (coordinator, arena) = service.parts_mut();
    let mut updates = coordinator.subscribe(EventKind::PreciseCallStateChanged);
    coordinator
        .dial(arena, phone, &number, VideoState::AudioOnly)
        .with_context(|| format!("dialing {number}"))?;
    service.process_pending();
    print_foreground(&service, "dialing")?;

    service.phone_queue().post(PhoneDispatch::radio(
        phone,
        RadioEvent::CallStateChanged {
            calls: vec![DriverCall::new(1, DriverCallState::Active, number.as_str(), false)],
            fail_cause: None,
        },
    ))?;
    service.process_pending();
    print_foreground(&service, "answered")?;

    let (coordinator, arena) = service.parts_mut();
    let call = CallRef::new(phone, CallSlot::Foreground);
    let _ = coordinator.hangup_call(arena, call)?;
    service.process_pending();
    println!("state after hangup: {:?}", service.coordinator().get_state(service.arena()));

    let mut seen = 0;
    while updates.rx.try_recv().is_ok() {
        seen += 1;
    }
    println!("precise call state updates: {seen}");
    Ok(())
}
