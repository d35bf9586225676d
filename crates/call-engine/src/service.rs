//! # Telephony service
//!
//! [`TelephonyService`] owns everything the coordinator works on: the
//! [`PhoneArena`], the [`CallCoordinator`], the phone task queue and, once
//! enabled, one [`SmsDispatcher`] bound to a phone.
//!
//! All state changes happen on the task that drives the service, either by
//! calling [`process_pending`](TelephonyService::process_pending) after
//! posting work or by awaiting [`run`](TelephonyService::run). Radio drivers,
//! SMS transports and timers only post onto the queues returned by
//! [`phone_queue`](TelephonyService::phone_queue) and
//! [`sms_queue`](TelephonyService::sms_queue).
//!
//! ```no_run
//! use telephony_call_engine::{TelephonyConfig, TelephonyServiceBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut service = TelephonyServiceBuilder::new()
//!     .with_config(TelephonyConfig::default())
//!     .build()?;
//! service.init_logging()?;
//!
//! let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
//! # drop(stop_tx);
//! service.run(async move { let _ = stop_rx.await; }).await;
//! # Ok(())
//! # }
//! ```

use crate::config::TelephonyConfig;
use crate::coordinator::CallCoordinator;
use crate::error::{EngineError, EngineResult};
use std::future::Future;
use std::path::PathBuf;
use telephony_infra_common::errors::{Error as InfraError, ErrorExt};
use telephony_infra_common::logging::{log_welcome, setup_logging, LogContext};
use telephony_infra_common::{QueueHandle, TaskQueue};
use tokio::runtime::{Handle, Runtime};
use telephony_phone_core::{
    PhoneArena, PhoneDispatch, PhoneError, PhoneId, PhoneResult, PhoneSession, RadioClass,
    RadioLink, SubId,
};
use telephony_sms_core::{
    ConfirmationDecision, ConfirmationPrompter, MessageId, SmsDispatcher, SmsRequest, SmsTask,
    SmsTransport, Submission,
};
use tracing::{debug, info, warn, Level};

struct SmsBinding {
    phone: PhoneId,
    dispatcher: SmsDispatcher,
}

/// The telephony event loop and its state
pub struct TelephonyService {
    config: TelephonyConfig,
    arena: PhoneArena,
    coordinator: CallCoordinator,
    phone_queue: TaskQueue<PhoneDispatch>,
    sms_queue: TaskQueue<SmsTask>,
    sms: Option<SmsBinding>,
    log_context: LogContext,
    /// Timer runtime owned when the service was built outside tokio
    timer_runtime: Option<Runtime>,
}

enum Next {
    Phone(PhoneDispatch),
    Sms(SmsTask),
    Stop,
}

impl TelephonyService {
    /// Create the service.
    ///
    /// Timers (ECM exit, post-dial pauses, SMS retries) run on the calling
    /// tokio runtime. Outside a runtime the service starts a one-thread
    /// runtime of its own, so [`process_pending`](Self::process_pending)
    /// works from plain synchronous code.
    pub fn new(config: TelephonyConfig) -> EngineResult<Self> {
        config.validate()?;
        let (runtime, timer_runtime) = match Handle::try_current() {
            Ok(handle) => (handle, None),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("telephony-timers")
                    .enable_time()
                    .build()
                    .map_err(|e| {
                        InfraError::internal(e.to_string())
                            .with_context("telephony-service", "start timer runtime")
                    })?;
                debug!("Started private timer runtime");
                (runtime.handle().clone(), Some(runtime))
            }
        };
        info!(own_timer_runtime = timer_runtime.is_some(), "Creating telephony service");
        Ok(Self {
            config,
            arena: PhoneArena::new(),
            coordinator: CallCoordinator::new(),
            phone_queue: TaskQueue::with_runtime("phone", runtime.clone()),
            sms_queue: TaskQueue::with_runtime("sms", runtime),
            sms: None,
            log_context: LogContext::new("telephony-service"),
            timer_runtime,
        })
    }

    /// Install the global subscriber described by the logging config
    pub fn init_logging(&self) -> EngineResult<()> {
        setup_logging(&self.config.logging)?;
        log_welcome(&self.config.logging.app_name, env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    pub fn config(&self) -> &TelephonyConfig {
        &self.config
    }

    /// Create a phone session on `radio` and register it with the coordinator
    pub fn add_phone(
        &mut self,
        sub: SubId,
        class: RadioClass,
        radio: Box<dyn RadioLink>,
    ) -> PhoneResult<PhoneId> {
        let phone = self.insert_session(sub, class, radio);
        if let Err(e) = self.coordinator.register_phone(&mut self.arena, phone) {
            self.rollback_session(phone, "add_phone");
            return Err(e);
        }
        Ok(phone)
    }

    /// Create an IMS overlay for `parent`, attach and register it.
    ///
    /// The overlay shares the parent's subscription.
    pub fn add_ims_phone(
        &mut self,
        parent: PhoneId,
        class: RadioClass,
        radio: Box<dyn RadioLink>,
    ) -> PhoneResult<PhoneId> {
        if !self.coordinator.is_registered(parent) {
            return Err(PhoneError::NotRegistered(parent));
        }
        let sub = self.arena.get(parent)?.sub_id();
        let ims = self.insert_session(sub, class, radio);
        if let Err(e) = self.coordinator.register_ims_phone(&mut self.arena, parent, ims) {
            let attached = self.arena.get(parent).is_ok_and(|p| p.ims_phone() == Some(ims));
            if attached {
                if let Err(cleanup) = self.arena.detach_ims(parent) {
                    let ctx = LogContext::with_operation("telephony-service", "add_ims_phone")
                        .with_field("parent", parent)
                        .with_field("ims", ims);
                    ctx.in_scope(Level::WARN, || warn!(error = %cleanup, "Rollback could not detach IMS phone"));
                }
            }
            self.rollback_session(ims, "add_ims_phone");
            return Err(e);
        }
        Ok(ims)
    }

    /// Unregister a phone and drop its session, along with any IMS overlay
    pub fn remove_phone(&mut self, phone: PhoneId) -> PhoneResult<()> {
        let ims = self.arena.get(phone)?.ims_phone();
        self.coordinator.unregister_phone(&mut self.arena, phone)?;

        for id in ims.into_iter().chain(std::iter::once(phone)) {
            if self.sms.as_ref().is_some_and(|b| b.phone == id) {
                warn!(phone = %id, "Removing the phone SMS is bound to; SMS disabled");
                self.sms = None;
            }
            self.arena.remove(id)?;
        }
        Ok(())
    }

    /// Bind an SMS dispatcher to `phone`.
    ///
    /// The dispatcher follows that phone's service state from then on.
    pub fn enable_sms(
        &mut self,
        phone: PhoneId,
        transport: Box<dyn SmsTransport>,
        prompter: Box<dyn ConfirmationPrompter>,
    ) -> EngineResult<()> {
        let state = self.arena.get(phone)?.service_state();
        let mut dispatcher = SmsDispatcher::new(
            self.config.sms.clone(),
            transport,
            prompter,
            self.sms_queue.handle(),
        )?;
        dispatcher.set_service_state(state);
        if self.sms.replace(SmsBinding { phone, dispatcher }).is_some() {
            warn!(%phone, "Replacing existing SMS dispatcher");
        }
        info!(%phone, "SMS enabled");
        Ok(())
    }

    pub fn sms(&self) -> Option<&SmsDispatcher> {
        self.sms.as_ref().map(|b| &b.dispatcher)
    }

    pub fn sms_mut(&mut self) -> Option<&mut SmsDispatcher> {
        self.sms.as_mut().map(|b| &mut b.dispatcher)
    }

    pub fn sms_phone(&self) -> Option<PhoneId> {
        self.sms.as_ref().map(|b| b.phone)
    }

    pub fn send_sms(&mut self, request: SmsRequest) -> EngineResult<Submission> {
        let dispatcher = self.sms_mut().ok_or(EngineError::SmsDisabled)?;
        Ok(dispatcher.send(request))
    }

    pub fn confirm_sms(
        &mut self,
        message: MessageId,
        decision: ConfirmationDecision,
    ) -> EngineResult<()> {
        let dispatcher = self.sms_mut().ok_or(EngineError::SmsDisabled)?;
        dispatcher.confirm(message, decision)?;
        Ok(())
    }

    /// Producer handle for radio events and phone timers
    pub fn phone_queue(&self) -> QueueHandle<PhoneDispatch> {
        self.phone_queue.handle()
    }

    /// Producer handle for SMS send results and status reports
    pub fn sms_queue(&self) -> QueueHandle<SmsTask> {
        self.sms_queue.handle()
    }

    pub fn coordinator(&self) -> &CallCoordinator {
        &self.coordinator
    }

    pub fn arena(&self) -> &PhoneArena {
        &self.arena
    }

    /// Both halves at once, for coordinator operations that mutate sessions
    pub fn parts_mut(&mut self) -> (&mut CallCoordinator, &mut PhoneArena) {
        (&mut self.coordinator, &mut self.arena)
    }

    /// Run every task that is ready on both queues.
    ///
    /// Phone events are fanned out by the coordinator after each task so
    /// the ringing collision guard sees the state that produced them.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Some(dispatch) = self.phone_queue.try_next() {
                self.handle_phone(dispatch);
            } else if let Some(task) = self.sms_queue.try_next() {
                self.handle_sms(task);
            } else {
                break;
            }
            handled += 1;
        }
        // Notifications emitted by direct calls, outside any queued task
        self.after_task();
        handled
    }

    /// Drive the service until `shutdown` resolves
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(phones = self.coordinator.phones().len(), "Telephony service running");

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => Next::Stop,
                task = self.phone_queue.next() => task.map_or(Next::Stop, Next::Phone),
                task = self.sms_queue.next() => task.map_or(Next::Stop, Next::Sms),
            };
            match next {
                Next::Phone(dispatch) => self.handle_phone(dispatch),
                Next::Sms(task) => self.handle_sms(task),
                Next::Stop => break,
            }
        }

        info!("Telephony service stopped");
    }

    fn handle_phone(&mut self, dispatch: PhoneDispatch) {
        let ctx = self.log_context.clone().with_field("phone", dispatch.phone);
        ctx.in_scope(Level::DEBUG, || self.arena.dispatch(dispatch));
        self.after_task();
    }

    fn handle_sms(&mut self, task: SmsTask) {
        match self.sms.as_mut() {
            Some(binding) => binding.dispatcher.handle_task(task),
            None => warn!(?task, "Dropping SMS task, SMS not enabled"),
        }
    }

    fn after_task(&mut self) {
        let forwarded = self.coordinator.pump(&mut self.arena);
        if forwarded > 0 {
            debug!(forwarded, "Coordinator pumped phone events");
        }
        self.sync_sms_service_state();
    }

    fn sync_sms_service_state(&mut self) {
        let Some(binding) = self.sms.as_mut() else {
            return;
        };
        let Ok(session) = self.arena.get(binding.phone) else {
            return;
        };
        let state = session.service_state();
        if binding.dispatcher.service_state() != state {
            binding.dispatcher.set_service_state(state);
        }
    }

    /// Drop a session whose registration failed
    fn rollback_session(&mut self, phone: PhoneId, operation: &str) {
        if self.coordinator.is_registered(phone) {
            if let Err(cleanup) = self.coordinator.unregister_phone(&mut self.arena, phone) {
                let ctx = LogContext::with_operation("telephony-service", operation).with_field("phone", phone);
                ctx.in_scope(Level::WARN, || warn!(error = %cleanup, "Rollback could not unregister phone"));
            }
        }
        match self.arena.remove(phone) {
            Ok(_) => debug!(%phone, operation, "Rolled back phone session"),
            Err(cleanup) => {
                let ctx = LogContext::with_operation("telephony-service", operation).with_field("phone", phone);
                ctx.in_scope(Level::WARN, || warn!(error = %cleanup, "Rollback could not remove phone session"));
            }
        }
    }

    fn insert_session(&mut self, sub: SubId, class: RadioClass, radio: Box<dyn RadioLink>) -> PhoneId {
        let queue = self.phone_queue.handle();
        let settings = self.config.phone.clone();
        self.arena
            .insert_with(|id| PhoneSession::new(id, sub, class, radio, queue, settings))
    }
}

impl Drop for TelephonyService {
    fn drop(&mut self) {
        // Must not block: the service may be dropped inside an async context
        if let Some(runtime) = self.timer_runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TelephonyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelephonyService")
            .field("coordinator", &self.coordinator)
            .field("sms_phone", &self.sms_phone())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TelephonyService`]
pub struct TelephonyServiceBuilder {
    config: Option<TelephonyConfig>,
    config_path: Option<PathBuf>,
}

impl TelephonyServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            config_path: None,
        }
    }

    /// Use this configuration as is
    pub fn with_config(mut self, config: TelephonyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a TOML file plus environment overrides
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn build(self) -> EngineResult<TelephonyService> {
        let config = match (self.config, self.config_path) {
            (Some(config), None) => config,
            (None, path) => TelephonyConfig::load(path.as_deref())?,
            (Some(_), Some(_)) => {
                return Err(EngineError::configuration(
                    "both a configuration and a configuration file were provided",
                ))
            }
        };
        TelephonyService::new(config)
    }
}

impl Default for TelephonyServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_sms_task_dropped_while_disabled() {
        let mut service = TelephonyService::new(TelephonyConfig::default()).unwrap();
        service
            .sms_queue()
            .post(SmsTask::StatusReport {
                message_ref: 7,
                status: telephony_sms_core::DeliveryStatus::Complete,
            })
            .unwrap();

        assert_eq!(service.process_pending(), 1);
        assert!(service.sms().is_none());
        assert!(logs_contain("Dropping SMS task, SMS not enabled"));
    }
}
