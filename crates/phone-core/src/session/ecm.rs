//! Emergency callback mode
//!
//! After an emergency call a CDMA radio enters callback mode and stays there
//! until the exit timer fires or the user places a non-emergency call. An
//! emergency call placed while in the mode cancels the timer; the timer is
//! restarted once the phone is idle again.

use super::phone::{PhoneDispatch, PhoneSession, PhoneTask, RequestPurpose};
use crate::call::CallState;
use crate::cause::DisconnectCause;
use crate::error::{PhoneError, PhoneResult};
use crate::events::PhoneNotification;
use crate::radio::{resolved, Completion, RadioError, RadioRequest, RadioResponse, RadioResult};
use crate::types::RadioClass;
use telephony_infra_common::dispatch::TimerId;
use tracing::{debug, info, warn};

/// What to do with the exit timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcmTimerAction {
    /// Stop the countdown (an emergency call is in progress)
    Cancel,
    /// Start the countdown again from the full delay
    Restart,
}

impl PhoneSession {
    pub fn handle_ecm_timer(&mut self, action: EcmTimerAction) {
        if !self.ecm.active {
            debug!(phone = %self.id, ?action, "Not in emergency callback mode");
            return;
        }
        match action {
            EcmTimerAction::Cancel => {
                if let Some(timer) = self.ecm.timer.take() {
                    timer.cancel();
                }
                self.ecm.timer_cancelled = true;
                self.notify(PhoneNotification::EcmTimerReset(true));
            }
            EcmTimerAction::Restart => {
                self.schedule_ecm_exit();
                self.ecm.timer_cancelled = false;
                self.notify(PhoneNotification::EcmTimerReset(false));
            }
        }
    }

    fn schedule_ecm_exit(&mut self) {
        let phone = self.id;
        let delay = self.settings.ecm_exit_delay();
        let armed = self.queue.post_delayed_with(delay, move |timer| PhoneDispatch {
            phone,
            task: PhoneTask::EcmTimerExpired(timer),
        });
        // Replacing the old task aborts it
        match armed {
            Ok(timer) => {
                self.ecm.timer = Some(timer);
                debug!(phone = %self.id, ?delay, "Emergency callback exit timer armed");
            }
            Err(e) => {
                self.ecm.timer = None;
                warn!(phone = %self.id, error = %e, "Emergency callback exit timer not armed; mode lasts until an explicit exit");
            }
        }
    }

    /// The radio reported entry into callback mode
    pub(crate) fn enter_emergency_callback_mode(&mut self) {
        if self.class != RadioClass::Cdma {
            warn!(phone = %self.id, radio_class = %self.class, "Ignoring callback mode on non-CDMA radio");
            return;
        }
        if self.ecm.active {
            return;
        }
        info!(phone = %self.id, "Entered emergency callback mode");
        self.ecm.active = true;
        self.ecm.timer_cancelled = false;
        self.schedule_ecm_exit();
        self.notify(PhoneNotification::EmergencyCallbackModeChanged(true));
    }

    /// Ask the radio to leave callback mode
    pub fn exit_emergency_callback_mode(&mut self) -> PhoneResult<Completion> {
        if self.class != RadioClass::Cdma {
            return Err(PhoneError::unsupported("emergency callback mode", self.class));
        }
        if !self.ecm.active {
            return Ok(resolved(Ok(RadioResponse::Done)));
        }
        Ok(self.submit(RadioRequest::ExitEmergencyCallbackMode, RequestPurpose::ExitEcm))
    }

    pub(crate) fn on_ecm_timer_expired(&mut self, timer: TimerId) {
        let current = self.ecm.timer.as_ref().map(|t| t.id());
        if current != Some(timer) {
            debug!(phone = %self.id, %timer, "Stale callback mode timer");
            return;
        }
        self.ecm.timer = None;
        info!(phone = %self.id, "Emergency callback mode timed out");
        let _ = self.submit(RadioRequest::ExitEmergencyCallbackMode, RequestPurpose::ExitEcm);
    }

    /// Clear callback mode state without talking to the radio
    pub(crate) fn leave_ecm(&mut self) {
        if !self.ecm.active {
            return;
        }
        self.ecm.active = false;
        self.ecm.timer_cancelled = false;
        if let Some(timer) = self.ecm.timer.take() {
            timer.cancel();
        }
        info!(phone = %self.id, "Left emergency callback mode");
        self.notify(PhoneNotification::EmergencyCallbackModeChanged(false));
        if let Some(deferred) = self.ecm.deferred_dial.take() {
            self.disconnect_local(deferred.connection, DisconnectCause::Local);
            let _ = deferred.reply.send(Err(RadioError::GenericFailure));
        }
    }

    pub(crate) fn on_exit_ecm_response(&mut self, result: &RadioResult) {
        let deferred = self.ecm.deferred_dial.take();
        match result {
            Ok(_) => {
                self.leave_ecm();
                if let Some(deferred) = deferred {
                    let alive = self
                        .connection(deferred.connection)
                        .is_some_and(|(_, c)| c.state() != CallState::Disconnected);
                    if alive {
                        debug!(phone = %self.id, connection = %deferred.connection, "Placing deferred dial");
                        self.submit_with(
                            deferred.request,
                            RequestPurpose::Dial {
                                connection: deferred.connection,
                            },
                            Some(deferred.reply),
                        );
                    } else {
                        let _ = deferred.reply.send(Err(RadioError::GenericFailure));
                    }
                }
            }
            Err(err) => {
                warn!(phone = %self.id, %err, "Failed to exit emergency callback mode");
                if let Some(deferred) = deferred {
                    self.disconnect_local(deferred.connection, DisconnectCause::ErrorUnspecified);
                    self.after_local_change();
                    let _ = deferred.reply.send(Err(err.clone()));
                }
            }
        }
    }
}
