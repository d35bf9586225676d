//! Fan-out of phone events to coordinator subscribers

use super::CallCoordinator;
use telephony_phone_core::{ConnectionRef, PhoneArena, PhoneEvent, PhoneNotification};
use tracing::{debug, trace, warn};

impl CallCoordinator {
    /// Forward every event the registered phones have published since the
    /// last call. Returns how many events were taken off the listener.
    pub fn pump(&mut self, arena: &mut PhoneArena) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            self.handle_phone_event(arena, event);
        }
        handled
    }

    fn handle_phone_event(&mut self, arena: &mut PhoneArena, event: PhoneEvent) {
        if !self.is_registered(event.phone) {
            debug!(phone = %event.phone, "Dropping event from unregistered phone");
            return;
        }

        if let PhoneNotification::NewRingingConnection(connection) = &event.payload {
            if self.should_hang_up_ringing(arena, *connection) {
                return;
            }
        }

        let delivered = self.hub.notify(event);
        trace!(delivered, "Forwarded phone event");
    }

    /// Hang up a new incoming connection the user could not be shown: the
    /// subscription's foreground call is still dialing, or another ringing
    /// call already exists.
    fn should_hang_up_ringing(&mut self, arena: &mut PhoneArena, connection: ConnectionRef) -> bool {
        let Ok(session) = arena.get(connection.phone) else {
            return false;
        };
        let sub = session.sub_id();
        let dialing = self.active_fg_call_state_for(arena, sub).is_dialing();
        let ringing = self.ringing_count_for(arena, sub);
        if !dialing && ringing <= 1 {
            return false;
        }

        warn!(phone = %connection.phone, connection = %connection.connection, dialing, ringing, "Hanging up colliding incoming call");
        if let Ok(session) = arena.get_mut(connection.phone) {
            if let Err(err) = session.hangup_connection(connection.connection) {
                warn!(phone = %connection.phone, error = %err, "Failed to hang up colliding call");
            }
        }
        true
    }
}
