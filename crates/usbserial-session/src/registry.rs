//! Session registry
//!
//! Maps device ids to open sessions. An `open` in flight holds an `Opening`
//! slot for its device; anyone else touching that device waits until the
//! slot resolves, so one device can never end up with two transports.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use usbserial_core::DeviceId;

use crate::session::{Session, SessionState};

enum Slot {
    Opening(SessionState),
    Open(Arc<Session>),
}

/// Result of trying to reserve a device for opening
pub enum Reservation<'a> {
    /// A session is already open for the device
    Existing(Arc<Session>),
    /// The caller now owns the device's slot until it commits or drops
    Reserved(OpenTicket<'a>),
}

/// Thread-safe map from device id to session
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<DeviceId, Slot>>,
    changed: Condvar,
}

impl SessionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `device_id` for opening
    ///
    /// Waits while another open of the same device is in flight.
    pub fn reserve(&self, device_id: DeviceId) -> Reservation<'_> {
        let mut slots = self.slots.lock();
        loop {
            match slots.get(&device_id) {
                Some(Slot::Open(session)) => return Reservation::Existing(session.clone()),
                Some(Slot::Opening(_)) => self.changed.wait(&mut slots),
                None => {
                    slots.insert(device_id, Slot::Opening(SessionState::Probing));
                    return Reservation::Reserved(OpenTicket {
                        registry: self,
                        device_id,
                        committed: false,
                    });
                }
            }
        }
    }

    /// The open session for `device_id`
    ///
    /// Does not wait for an open in flight; a device still opening has no
    /// session yet.
    pub fn get(&self, device_id: DeviceId) -> Option<Arc<Session>> {
        match self.slots.lock().get(&device_id) {
            Some(Slot::Open(session)) => Some(session.clone()),
            _ => None,
        }
    }

    /// Remove and return the open session for `device_id`
    ///
    /// Waits for an open in flight to resolve first, so a close issued
    /// during an open closes the session that open produces.
    pub fn remove(&self, device_id: DeviceId) -> Option<Arc<Session>> {
        let mut slots = self.slots.lock();
        loop {
            match slots.get(&device_id) {
                Some(Slot::Opening(_)) => self.changed.wait(&mut slots),
                Some(Slot::Open(_)) => {
                    return match slots.remove(&device_id) {
                        Some(Slot::Open(session)) => Some(session),
                        _ => None,
                    };
                }
                None => return None,
            }
        }
    }

    /// Remove every open session
    ///
    /// Opens in flight are left alone.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        let mut slots = self.slots.lock();
        let ids: Vec<DeviceId> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Open(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| match slots.remove(&id) {
                Some(Slot::Open(session)) => Some(session),
                _ => None,
            })
            .collect()
    }

    /// Current state of `device_id`
    pub fn state(&self, device_id: DeviceId) -> SessionState {
        match self.slots.lock().get(&device_id) {
            Some(Slot::Opening(phase)) => *phase,
            Some(Slot::Open(session)) => session.state(),
            None => SessionState::Closed,
        }
    }

    /// Ids of all open sessions, sorted
    pub fn open_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Open(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }
}

/// Exclusive right to open one device
///
/// Dropping the ticket without committing frees the slot again.
pub struct OpenTicket<'a> {
    registry: &'a SessionRegistry,
    device_id: DeviceId,
    committed: bool,
}

impl OpenTicket<'_> {
    /// Device this ticket is for
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Record the phase the open has reached
    pub fn set_phase(&self, phase: SessionState) {
        log::debug!("device {}: {}", self.device_id, phase);
        if let Some(slot) = self.registry.slots.lock().get_mut(&self.device_id) {
            *slot = Slot::Opening(phase);
        }
    }

    /// Publish the opened session
    pub fn commit(mut self, session: Arc<Session>) {
        self.registry
            .slots
            .lock()
            .insert(self.device_id, Slot::Open(session));
        self.committed = true;
        self.registry.changed.notify_all();
    }
}

impl Drop for OpenTicket<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        log::debug!("device {}: open abandoned", self.device_id);
        self.registry.slots.lock().remove(&self.device_id);
        self.registry.changed.notify_all();
    }
}
