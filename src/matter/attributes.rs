//! Shared presence attribute state and the Matter-backed attribute sink.
//!
//! The bridge writes through [`MatterPresenceSink`]; the cluster handlers
//! running on the Matter thread read the same [`PresenceAttributes`]. Each
//! attribute carries a version counter so handlers can bump their `Dataver`
//! when the value changed, and an optional notifier that wakes the Matter
//! subscription processor on every change.

use super::notifier::ClusterNotifier;
use crate::bridge::AttributeSink;
use crate::error::SinkError;
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

/// Trait for attributes with change detection.
///
/// The version number is incremented each time the value changes. Handlers
/// compare versions to detect changes and update their `Dataver`.
pub trait Sensor: Send + Sync {
    fn version(&self) -> u32;
}

/// Occupancy attribute (OccupancySensing bit 0).
pub struct OccupancyAttribute {
    state: AtomicBool,
    version: AtomicU32,
    /// Set by the Matter stack once it is serving
    notifier: RwLock<Option<ClusterNotifier>>,
}

impl OccupancyAttribute {
    pub fn new(initial: bool) -> Self {
        Self {
            state: AtomicBool::new(initial),
            version: AtomicU32::new(0),
            notifier: RwLock::new(None),
        }
    }

    pub fn get(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Store a value. If it changed, increments the version and notifies
    /// subscriptions.
    pub fn set(&self, value: bool) {
        let old = self.state.swap(value, Ordering::SeqCst);
        if old != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            if let Some(notifier) = self.notifier.read().as_ref() {
                notifier.notify();
            }
        }
    }

    pub fn set_notifier(&self, notifier: ClusterNotifier) {
        *self.notifier.write() = Some(notifier);
    }
}

impl Sensor for OccupancyAttribute {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Illuminance attribute (IlluminanceMeasurement MeasuredValue).
pub struct IlluminanceAttribute {
    value: AtomicU16,
    version: AtomicU32,
    notifier: RwLock<Option<ClusterNotifier>>,
}

impl IlluminanceAttribute {
    pub fn new(initial: u16) -> Self {
        Self {
            value: AtomicU16::new(initial),
            version: AtomicU32::new(0),
            notifier: RwLock::new(None),
        }
    }

    pub fn get(&self) -> u16 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u16) {
        let old = self.value.swap(value, Ordering::SeqCst);
        if old != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            if let Some(notifier) = self.notifier.read().as_ref() {
                notifier.notify();
            }
        }
    }

    pub fn set_notifier(&self, notifier: ClusterNotifier) {
        *self.notifier.write() = Some(notifier);
    }
}

impl Sensor for IlluminanceAttribute {
    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Presence attributes shared between the bridge and the Matter stack.
pub struct PresenceAttributes {
    pub occupancy: OccupancyAttribute,
    pub illuminance: IlluminanceAttribute,
    /// Endpoint the attributes are bound to, once the sink has begun
    endpoint: RwLock<Option<u16>>,
    /// Set while the Matter data model is serving the attributes
    online: AtomicBool,
}

impl PresenceAttributes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            occupancy: OccupancyAttribute::new(false),
            illuminance: IlluminanceAttribute::new(0),
            endpoint: RwLock::new(None),
            online: AtomicBool::new(false),
        })
    }

    pub fn endpoint_id(&self) -> Option<u16> {
        *self.endpoint.read()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Called by the Matter stack when it starts or stops serving.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

/// Attribute sink writing into [`PresenceAttributes`].
///
/// Must be bound to a non-zero endpoint with [`begin`](Self::begin) before
/// any write, and only reports ready while the Matter stack is online.
pub struct MatterPresenceSink {
    attributes: Arc<PresenceAttributes>,
}

impl MatterPresenceSink {
    pub fn new(attributes: Arc<PresenceAttributes>) -> Self {
        Self { attributes }
    }

    /// Bind the sink to `endpoint_id` with initial attribute values.
    ///
    /// Endpoint 0 is the root endpoint and is rejected.
    pub fn begin(
        &mut self,
        endpoint_id: u16,
        occupancy: bool,
        illuminance: u16,
    ) -> Result<(), SinkError> {
        if endpoint_id == 0 {
            return Err(SinkError::InvalidEndpoint(endpoint_id));
        }
        let mut endpoint = self.attributes.endpoint.write();
        if let Some(bound) = *endpoint {
            return Err(SinkError::AlreadyBound(bound));
        }

        self.attributes.occupancy.set(occupancy);
        self.attributes.illuminance.set(illuminance);
        *endpoint = Some(endpoint_id);
        info!("Presence sensor bound to endpoint {}", endpoint_id);
        Ok(())
    }

    /// Stop accepting writes.
    pub fn end(&mut self) {
        *self.attributes.endpoint.write() = None;
    }

    fn check_started(&self) -> Result<(), SinkError> {
        if self.attributes.endpoint_id().is_none() || !self.attributes.is_online() {
            return Err(SinkError::NotStarted);
        }
        Ok(())
    }
}

impl AttributeSink for MatterPresenceSink {
    fn is_ready(&self) -> bool {
        self.check_started().is_ok()
    }

    fn set_occupancy(&mut self, occupied: bool) -> Result<(), SinkError> {
        self.check_started()?;
        self.attributes.occupancy.set(occupied);
        Ok(())
    }

    fn set_illuminance(&mut self, value: u16) -> Result<(), SinkError> {
        self.check_started()?;
        self.attributes.illuminance.set(value);
        Ok(())
    }

    fn get_occupancy(&self) -> bool {
        self.attributes.occupancy.get()
    }

    fn get_illuminance(&self) -> u16 {
        self.attributes.illuminance.get()
    }
}
