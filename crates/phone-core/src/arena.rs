//! Owner of every phone session
//!
//! Sessions refer to each other (a circuit-switched phone and its IMS
//! overlay) only by [`PhoneId`]; the arena resolves those ids.

use crate::call::{Call, CallRef};
use crate::error::{PhoneError, PhoneResult};
use crate::session::{PhoneDispatch, PhoneSession};
use crate::types::PhoneId;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct PhoneArena {
    slots: Vec<Option<PhoneSession>>,
}

impl PhoneArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and store the session built for it
    pub fn insert_with<F>(&mut self, build: F) -> PhoneId
    where
        F: FnOnce(PhoneId) -> PhoneSession,
    {
        let id = PhoneId(self.slots.len());
        self.slots.push(Some(build(id)));
        id
    }

    /// Remove a session; its id is never reused
    pub fn remove(&mut self, id: PhoneId) -> PhoneResult<PhoneSession> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(PhoneError::UnknownPhone(id))
    }

    pub fn get(&self, id: PhoneId) -> PhoneResult<&PhoneSession> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(PhoneError::UnknownPhone(id))
    }

    pub fn get_mut(&mut self, id: PhoneId) -> PhoneResult<&mut PhoneSession> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(PhoneError::UnknownPhone(id))
    }

    /// Resolve a call handle
    pub fn call(&self, call: CallRef) -> PhoneResult<&Call> {
        Ok(self.get(call.phone)?.call(call.slot))
    }

    pub fn contains(&self, id: PhoneId) -> bool {
        self.get(id).is_ok()
    }

    /// Borrow two different sessions mutably
    pub fn pair_mut(
        &mut self,
        a: PhoneId,
        b: PhoneId,
    ) -> PhoneResult<(&mut PhoneSession, &mut PhoneSession)> {
        if a == b {
            return Err(PhoneError::call_state("cannot borrow the same phone twice"));
        }
        let (low, high, swapped) = if a.0 < b.0 { (a, b, false) } else { (b, a, true) };
        if high.0 >= self.slots.len() {
            return Err(PhoneError::UnknownPhone(high));
        }
        let (head, tail) = self.slots.split_at_mut(high.0);
        let first = head[low.0].as_mut().ok_or(PhoneError::UnknownPhone(low))?;
        let second = tail[0].as_mut().ok_or(PhoneError::UnknownPhone(high))?;
        Ok(if swapped { (second, first) } else { (first, second) })
    }

    /// Ids of all live sessions in creation order
    pub fn ids(&self) -> Vec<PhoneId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| PhoneId(i))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhoneSession> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one queued task on the phone it targets
    pub fn dispatch(&mut self, dispatch: PhoneDispatch) {
        match self.get_mut(dispatch.phone) {
            Ok(session) => session.handle_task(dispatch.task),
            Err(_) => warn!(phone = %dispatch.phone, "Dropping task for removed phone"),
        }
    }

    /// Link an IMS overlay to its circuit-switched parent.
    ///
    /// Client subscriptions on the parent are copied onto the overlay so
    /// listeners keep hearing from whichever radio carries the call.
    pub fn attach_ims(&mut self, parent: PhoneId, ims: PhoneId) -> PhoneResult<usize> {
        let (parent_session, ims_session) = self.pair_mut(parent, ims)?;
        if !ims_session.radio_class().is_overlay() {
            return Err(PhoneError::unsupported(
                "attach as IMS overlay",
                ims_session.radio_class(),
            ));
        }
        parent_session.set_ims_phone(Some(ims));
        ims_session.set_parent_phone(Some(parent));
        let migrated = ims_session.hub_mut().migrate_from(parent_session.hub());
        info!(%parent, %ims, migrated, "IMS phone attached");
        Ok(migrated)
    }

    /// Undo [`attach_ims`](Self::attach_ims); returns the detached overlay
    pub fn detach_ims(&mut self, parent: PhoneId) -> PhoneResult<Option<PhoneId>> {
        let Some(ims) = self.get(parent)?.ims_phone() else {
            return Ok(None);
        };
        self.get_mut(parent)?.set_ims_phone(None);
        if let Ok(session) = self.get_mut(ims) {
            session.set_parent_phone(None);
        }
        debug!(%parent, %ims, "IMS phone detached");
        Ok(Some(ims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PhoneSettings;
    use crate::testing::RecordingRadio;
    use crate::radio::RadioEvent;
    use crate::types::{RadioClass, ServiceState, SubId};
    use telephony_infra_common::TaskQueue;
    use tracing_test::traced_test;

    fn add(arena: &mut PhoneArena, queue: &TaskQueue<PhoneDispatch>, class: RadioClass) -> PhoneId {
        let handle = queue.handle();
        arena.insert_with(|id| {
            PhoneSession::new(
                id,
                SubId(1),
                class,
                Box::new(RecordingRadio::new()),
                handle,
                PhoneSettings::default(),
            )
        })
    }

    #[test]
    fn test_ids_not_reused() {
        let queue = TaskQueue::new("test");
        let mut arena = PhoneArena::new();
        let a = add(&mut arena, &queue, RadioClass::Gsm);
        arena.remove(a).unwrap();
        let b = add(&mut arena, &queue, RadioClass::Gsm);
        assert_ne!(a, b);
        assert!(arena.get(a).is_err());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_pair_mut_order() {
        let queue = TaskQueue::new("test");
        let mut arena = PhoneArena::new();
        let a = add(&mut arena, &queue, RadioClass::Gsm);
        let b = add(&mut arena, &queue, RadioClass::Ims);
        let (x, y) = arena.pair_mut(b, a).unwrap();
        assert_eq!(x.id(), b);
        assert_eq!(y.id(), a);
        assert!(arena.pair_mut(a, a).is_err());
    }

    #[test]
    fn test_attach_requires_overlay() {
        let queue = TaskQueue::new("test");
        let mut arena = PhoneArena::new();
        let a = add(&mut arena, &queue, RadioClass::Gsm);
        let b = add(&mut arena, &queue, RadioClass::Cdma);
        assert!(arena.attach_ims(a, b).is_err());

        let ims = add(&mut arena, &queue, RadioClass::Ims);
        arena.attach_ims(a, ims).unwrap();
        assert_eq!(arena.get(a).unwrap().ims_phone(), Some(ims));
        assert_eq!(arena.get(ims).unwrap().parent_phone(), Some(a));
        assert_eq!(arena.detach_ims(a).unwrap(), Some(ims));
        assert_eq!(arena.get(a).unwrap().ims_phone(), None);
    }

    #[test]
    #[traced_test]
    fn test_dispatch_to_removed_phone_is_dropped() {
        let queue = TaskQueue::new("test");
        let mut arena = PhoneArena::new();
        let a = add(&mut arena, &queue, RadioClass::Gsm);
        arena.remove(a).unwrap();

        arena.dispatch(PhoneDispatch::radio(
            a,
            RadioEvent::ServiceStateChanged(ServiceState::InService),
        ));

        assert!(arena.is_empty());
        assert!(logs_contain("Dropping task for removed phone"));
    }
}
