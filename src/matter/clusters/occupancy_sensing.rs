//! OccupancySensing cluster handler for the presence radar.
//!
//! The OccupancySensing cluster (0x0406) reports whether the room is occupied.
//! Reads state from the shared [`PresenceAttributes`] written by the bridge.
//!
//! Uses version tracking to detect changes and notify subscribers automatically.

use super::super::attributes::PresenceAttributes;
use super::sync_dataver_with_sensor;
use rs_matter::dm::{
    Access, Attribute, Cluster, Dataver, Handler, NonBlockingHandler, Quality, ReadContext,
    ReadReply, Reply, WriteContext,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::tlv::TLVWrite;
use rs_matter::{attribute_enum, attributes, with};
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use strum::FromRepr;

/// Matter Cluster ID for OccupancySensing
pub const CLUSTER_ID: u32 = 0x0406;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 1;

/// Occupancy sensor type enum values
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum OccupancySensorType {
    Pir = 0x00,
    Ultrasonic = 0x01,
    PirAndUltrasonic = 0x02,
    PhysicalContact = 0x03,
}

impl OccupancySensorType {
    /// Bit in the OccupancySensorTypeBitmap attribute.
    pub fn bitmap(self) -> u8 {
        match self {
            OccupancySensorType::Pir => 0x01,
            OccupancySensorType::Ultrasonic => 0x02,
            OccupancySensorType::PirAndUltrasonic => 0x03,
            OccupancySensorType::PhysicalContact => 0x04,
        }
    }
}

/// Attribute IDs for the OccupancySensing cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum OccupancySensingAttribute {
    /// Bitmap8 where bit 0 indicates sensed occupancy
    Occupancy = 0x0000,
    OccupancySensorType = 0x0001,
    OccupancySensorTypeBitmap = 0x0002,
}

attribute_enum!(OccupancySensingAttribute);

/// Cluster metadata definition
pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: 0,
    attributes: attributes!(
        Attribute::new(
            OccupancySensingAttribute::Occupancy as _,
            Access::RV,
            Quality::NONE
        ),
        Attribute::new(
            OccupancySensingAttribute::OccupancySensorType as _,
            Access::RV,
            Quality::FIXED
        ),
        Attribute::new(
            OccupancySensingAttribute::OccupancySensorTypeBitmap as _,
            Access::RV,
            Quality::FIXED
        ),
    ),
    commands: &[],
    with_attrs: with!(all),
    with_cmds: with!(all),
};

/// Handler that serves a read-only OccupancySensing cluster.
///
/// The radar is exposed as a PIR-type sensor, which is what controllers
/// expect for generic motion/presence devices.
pub struct OccupancySensingHandler {
    dataver: Dataver,
    attributes: Arc<PresenceAttributes>,
    last_sensor_version: AtomicU32,
    sensor_type: OccupancySensorType,
}

impl OccupancySensingHandler {
    /// Cluster definition for use in the data model
    pub const CLUSTER: Cluster<'static> = CLUSTER;

    pub fn new(dataver: Dataver, attributes: Arc<PresenceAttributes>) -> Self {
        Self {
            dataver,
            attributes,
            last_sensor_version: AtomicU32::new(0),
            sensor_type: OccupancySensorType::Pir,
        }
    }

    fn read_impl(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        // Check if occupancy changed and bump dataver to notify subscribers
        sync_dataver_with_sensor(
            &self.attributes.occupancy,
            &self.last_sensor_version,
            &self.dataver,
        );

        let attr = ctx.attr();

        let Some(mut writer) = reply.with_dataver(self.dataver.get())? else {
            return Ok(()); // No update needed
        };

        // Global attributes
        if attr.is_system() {
            return CLUSTER.read(attr, writer);
        }

        let tag = writer.tag();
        {
            let mut tw = writer.writer();

            match attr.attr_id.try_into()? {
                OccupancySensingAttribute::Occupancy => {
                    let occupancy_bitmap: u8 = if self.attributes.occupancy.get() {
                        0x01
                    } else {
                        0x00
                    };
                    tw.u8(tag, occupancy_bitmap)?;
                }
                OccupancySensingAttribute::OccupancySensorType => {
                    tw.u8(tag, self.sensor_type as u8)?;
                }
                OccupancySensingAttribute::OccupancySensorTypeBitmap => {
                    tw.u8(tag, self.sensor_type.bitmap())?;
                }
            }
        }

        writer.complete()
    }

    fn write_impl(&self, _ctx: impl WriteContext) -> Result<(), Error> {
        // Cluster is read-only
        Err(ErrorCode::UnsupportedAccess.into())
    }
}

impl Handler for OccupancySensingHandler {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        self.read_impl(ctx, reply)
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        self.write_impl(ctx)
    }
}

impl NonBlockingHandler for OccupancySensingHandler {}
