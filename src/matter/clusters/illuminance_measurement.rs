//! IlluminanceMeasurement cluster handler.
//!
//! The IlluminanceMeasurement cluster (0x0400) reports ambient light.
//! MeasuredValue carries the radar's raw light level (0-255); the sensor
//! declares no measurement bounds, so Min/MaxMeasuredValue read as null.

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

/// Matter Cluster ID for IlluminanceMeasurement
pub const CLUSTER_ID: u32 = 0x0400;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 3;

/// Attribute IDs for the IlluminanceMeasurement cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum IlluminanceMeasurementAttribute {
    MeasuredValue = 0x0000,
    MinMeasuredValue = 0x0001,
    MaxMeasuredValue = 0x0002,
    Tolerance = 0x0003,
}

attribute_enum!(IlluminanceMeasurementAttribute);

/// Cluster metadata definition
pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: 0,
    attributes: attributes!(
        Attribute::new(
            IlluminanceMeasurementAttribute::MeasuredValue as _,
            Access::RV,
            Quality::NULLABLE
        ),
        Attribute::new(
            IlluminanceMeasurementAttribute::MinMeasuredValue as _,
            Access::RV,
            Quality::NULLABLE
        ),
        Attribute::new(
            IlluminanceMeasurementAttribute::MaxMeasuredValue as _,
            Access::RV,
            Quality::NULLABLE
        ),
        Attribute::new(
            IlluminanceMeasurementAttribute::Tolerance as _,
            Access::RV,
            Quality::NONE
        ),
    ),
    commands: &[],
    with_attrs: with!(all),
    with_cmds: with!(all),
};

/// Handler that serves a read-only IlluminanceMeasurement cluster.
pub struct IlluminanceMeasurementHandler {
    dataver: Dataver,
    attributes: Arc<PresenceAttributes>,
    last_sensor_version: AtomicU32,
}

impl IlluminanceMeasurementHandler {
    /// Cluster definition for use in the data model
    pub const CLUSTER: Cluster<'static> = CLUSTER;

    pub fn new(dataver: Dataver, attributes: Arc<PresenceAttributes>) -> Self {
        Self {
            dataver,
            attributes,
            last_sensor_version: AtomicU32::new(0),
        }
    }

    fn read_impl(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        sync_dataver_with_sensor(
            &self.attributes.illuminance,
            &self.last_sensor_version,
            &self.dataver,
        );

        let attr = ctx.attr();

        let Some(mut writer) = reply.with_dataver(self.dataver.get())? else {
            return Ok(());
        };

        // Global attributes
        if attr.is_system() {
            return CLUSTER.read(attr, writer);
        }

        let tag = writer.tag();
        {
            let mut tw = writer.writer();

            match attr.attr_id.try_into()? {
                IlluminanceMeasurementAttribute::MeasuredValue => {
                    tw.u16(tag, self.attributes.illuminance.get())?;
                }
                IlluminanceMeasurementAttribute::MinMeasuredValue
                | IlluminanceMeasurementAttribute::MaxMeasuredValue => {
                    tw.null(tag)?;
                }
                IlluminanceMeasurementAttribute::Tolerance => {
                    tw.u16(tag, 0)?;
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

impl Handler for IlluminanceMeasurementHandler {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        self.read_impl(ctx, reply)
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        self.write_impl(ctx)
    }
}

impl NonBlockingHandler for IlluminanceMeasurementHandler {}
