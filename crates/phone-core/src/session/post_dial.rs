//! Post-dial string processing

use super::phone::{PhoneDispatch, PhoneSession, PhoneTask, RequestPurpose};
use crate::call::CallState;
use crate::connection::{ConnectionId, PostDialState};
use crate::dial_string::{self, PAUSE, WAIT, WILD};
use crate::error::{PhoneError, PhoneResult};
use crate::events::PhoneNotification;
use crate::radio::RadioRequest;
use crate::types::RadioClass;
use std::time::Duration;
use telephony_infra_common::dispatch::TimerId;
use tracing::{debug, trace, warn};

impl PhoneSession {
    /// Begin post-dial processing for a connection that just became active
    pub(crate) fn start_post_dial(&mut self, id: ConnectionId) {
        let Some(conn) = self.connection_mut(id) else {
            return;
        };
        if conn.is_incoming() || conn.post_dial_state() != PostDialState::NotStarted {
            return;
        }
        if conn.remaining_post_dial().is_empty() {
            conn.set_post_dial_state(PostDialState::Complete);
            return;
        }
        debug!(phone = %self.id, connection = %id, "Starting post-dial");
        self.process_next_post_dial_char(id);
    }

    fn process_next_post_dial_char(&mut self, id: ConnectionId) {
        loop {
            let Some(conn) = self.connection_mut(id) else {
                return;
            };
            if conn.state() != CallState::Active
                || conn.post_dial_state() == PostDialState::Cancelled
            {
                return;
            }

            let Some(c) = conn.next_post_dial_char() else {
                conn.set_post_dial_state(PostDialState::Complete);
                self.notify_post_dial(id, None, PostDialState::Complete);
                return;
            };

            let state = match c {
                c if dial_string::is_dtmf(c) => PostDialState::Started,
                PAUSE => PostDialState::Pause,
                WAIT => PostDialState::Wait,
                WILD => PostDialState::WildWait,
                other => {
                    trace!(phone = %self.id, connection = %id, character = %other, "Skipping post-dial character");
                    continue;
                }
            };
            conn.set_post_dial_state(state);
            self.notify_post_dial(id, Some(c), state);

            match state {
                PostDialState::Started => {
                    let _ = self.submit(
                        RadioRequest::SendDtmf(c),
                        RequestPurpose::PostDialDtmf { connection: id },
                    );
                }
                PostDialState::Pause => self.schedule_post_dial_pause(id),
                _ => {}
            }
            return;
        }
    }

    fn schedule_post_dial_pause(&mut self, id: ConnectionId) {
        let delay = Duration::from_millis(match self.class {
            RadioClass::Cdma => self.settings.cdma_pause_delay_ms,
            _ => self.settings.gsm_pause_delay_ms,
        });
        let phone = self.id;
        let armed = self.queue.post_delayed_with(delay, move |timer| PhoneDispatch {
            phone,
            task: PhoneTask::PostDialPause {
                connection: id,
                timer,
            },
        });
        match armed {
            Ok(task) => {
                self.post_dial_timers.insert(id, task);
            }
            Err(e) => {
                warn!(phone = %self.id, connection = %id, error = %e, "Post-dial pause skipped");
                self.process_next_post_dial_char(id);
            }
        }
    }

    fn notify_post_dial(&mut self, id: ConnectionId, character: Option<char>, state: PostDialState) {
        let connection = self.connection_ref(id);
        self.notify(PhoneNotification::PostDialCharacter {
            connection,
            character,
            state,
        });
    }

    pub(crate) fn continue_post_dial_after_dtmf(&mut self, id: ConnectionId) {
        let started = self
            .connection(id)
            .is_some_and(|(_, c)| c.post_dial_state() == PostDialState::Started);
        if started {
            self.process_next_post_dial_char(id);
        }
    }

    pub(crate) fn on_post_dial_pause_elapsed(&mut self, id: ConnectionId, timer: TimerId) {
        let current = self.post_dial_timers.get(&id).map(|t| t.id());
        if current != Some(timer) {
            debug!(phone = %self.id, connection = %id, %timer, "Stale post-dial pause");
            return;
        }
        self.post_dial_timers.remove(&id);
        let paused = self
            .connection(id)
            .is_some_and(|(_, c)| c.post_dial_state() == PostDialState::Pause);
        if paused {
            self.process_next_post_dial_char(id);
        }
    }

    /// Resume after a `;`
    pub fn proceed_after_wait_char(&mut self, id: ConnectionId) -> PhoneResult<()> {
        self.require_post_dial_state(id, PostDialState::Wait)?;
        self.process_next_post_dial_char(id);
        Ok(())
    }

    /// Resume after an `N`, splicing `text` in at the current position
    pub fn proceed_after_wild_char(&mut self, id: ConnectionId, text: &str) -> PhoneResult<()> {
        self.require_post_dial_state(id, PostDialState::WildWait)?;
        let digits = dial_string::strip_separators(text);
        if let Some(conn) = self.connection_mut(id) {
            conn.insert_post_dial(&digits);
        }
        self.process_next_post_dial_char(id);
        Ok(())
    }

    /// Stop post-dial processing for good
    pub fn cancel_post_dial(&mut self, id: ConnectionId) -> PhoneResult<()> {
        let (_, conn) = self.require_connection(id)?;
        if matches!(
            conn.post_dial_state(),
            PostDialState::Complete | PostDialState::Cancelled
        ) {
            return Ok(());
        }
        self.post_dial_timers.remove(&id);
        if let Some(conn) = self.connection_mut(id) {
            conn.set_post_dial_state(PostDialState::Cancelled);
        }
        self.notify_post_dial(id, None, PostDialState::Cancelled);
        Ok(())
    }

    fn require_post_dial_state(&self, id: ConnectionId, expected: PostDialState) -> PhoneResult<()> {
        let (_, conn) = self.require_connection(id)?;
        if conn.post_dial_state() != expected {
            return Err(PhoneError::call_state(format!(
                "post-dial is {:?}, not {:?}",
                conn.post_dial_state(),
                expected
            )));
        }
        Ok(())
    }
}
