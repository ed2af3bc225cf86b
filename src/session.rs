// src/session.rs
//! Collaborators the decoder reads from: device identities, last known
//! positions, acknowledgment settings and the reply channel of a frame

use crate::protocol::position::{DeviceId, Position};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};
use tracing::{debug, info};

/// Maps the serial number embedded in a frame to a device handle.
pub trait IdentityRegistry: Send + Sync {
    fn identify(&self, unique_id: &str) -> Option<DeviceId>;
}

/// Read access to the last stored position of each device.
pub trait PositionStore: Send + Sync {
    fn last_position(&self, device_id: DeviceId) -> Option<Position>;
}

/// Per-protocol acknowledgment switch.
pub trait AckSettings: Send + Sync {
    fn ack_enabled(&self, protocol: &str) -> bool;
}

/// Where replies to the device are written.
pub trait ReplyChannel {
    fn write_reply(&mut self, reply: &str);
}

/// Collects replies so an async connection can flush them after decoding.
impl ReplyChannel for Vec<String> {
    fn write_reply(&mut self, reply: &str) {
        self.push(reply.to_string());
    }
}

/// In-memory registry, optionally registering unknown devices on first contact
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, DeviceId>>>,
    next_id: AtomicU64,
    auto_register: bool,
}

impl DeviceRegistry {
    pub fn new(auto_register: bool) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            auto_register,
        }
    }

    /// Register a known device, returning its id
    pub fn register(&self, unique_id: &str) -> DeviceId {
        let mut devices = match self.devices.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *devices
            .entry(unique_id.to_string())
            .or_insert_with(|| DeviceId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn device_count(&self) -> usize {
        self.devices.read().map(|devices| devices.len()).unwrap_or(0)
    }

    /// Unique id registered for a device handle
    pub fn unique_id(&self, device_id: DeviceId) -> Option<String> {
        let devices = self.devices.read().ok()?;
        devices
            .iter()
            .find(|(_, id)| **id == device_id)
            .map(|(unique_id, _)| unique_id.clone())
    }
}

impl IdentityRegistry for DeviceRegistry {
    fn identify(&self, unique_id: &str) -> Option<DeviceId> {
        let known = self
            .devices
            .read()
            .ok()
            .and_then(|devices| devices.get(unique_id).copied());

        match known {
            Some(id) => Some(id),
            None if self.auto_register => {
                let id = self.register(unique_id);
                info!(unique_id, device_id = %id, "Registered new device");
                Some(id)
            }
            None => {
                debug!(unique_id, "Unknown device");
                None
            }
        }
    }
}

/// In-memory last known position per device
#[derive(Clone, Default)]
pub struct LastPositionStore {
    positions: Arc<RwLock<HashMap<DeviceId, Position>>>,
}

impl LastPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a position if it carries a fresh fix
    pub fn update(&self, position: &Position) -> bool {
        if !position.valid {
            return false;
        }
        let mut positions = match self.positions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        positions.insert(position.device_id, position.clone());
        true
    }

    /// All stored positions ordered by device id
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .positions
            .read()
            .map(|positions| positions.values().cloned().collect())
            .unwrap_or_default();
        positions.sort_by_key(|position| position.device_id);
        positions
    }
}

impl PositionStore for LastPositionStore {
    fn last_position(&self, device_id: DeviceId) -> Option<Position> {
        self.positions.read().ok()?.get(&device_id).cloned()
    }
}
