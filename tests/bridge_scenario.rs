//! End-to-end: scripted LD2410 byte stream in, Matter attribute values out.

use presence_matter_bridge::bridge::{PollLoop, PresenceCache, TickOutcome};
use presence_matter_bridge::error::{BridgeError, LinkError};
use presence_matter_bridge::matter::attributes::Sensor;
use presence_matter_bridge::matter::{MatterPresenceSink, PresenceAttributes};
use presence_matter_bridge::sensor::frame::{
    CMD_FOOTER, CMD_HEADER, DATA_FOOTER, DATA_HEADER, command,
};
use presence_matter_bridge::sensor::{LinkConfig, SensorLink, SerialTransport};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory radar: acknowledges every command and lets the test queue
/// data frames.
#[derive(Clone, Default)]
struct FakeRadar {
    rx: Rc<RefCell<VecDeque<u8>>>,
    silent: bool,
}

impl FakeRadar {
    fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    fn send(&self, bytes: &[u8]) {
        self.rx.borrow_mut().extend(bytes);
    }
}

impl SerialTransport for FakeRadar {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.borrow_mut();
        let n = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.silent {
            return Ok(());
        }
        let cmd = u16::from_le_bytes([data[6], data[7]]);
        let reply: Vec<u8> = match cmd {
            command::READ_FIRMWARE => vec![0x00, 0x01, 0x07, 0x02, 0x16, 0x24, 0x06, 0x22],
            _ => vec![],
        };
        self.send(&ack(cmd, &reply));
        Ok(())
    }
}

fn wrap(header: [u8; 4], payload: &[u8], footer: [u8; 4]) -> Vec<u8> {
    let mut frame = header.to_vec();
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&footer);
    frame
}

fn ack(cmd: u16, data: &[u8]) -> Vec<u8> {
    let mut payload = (cmd | 0x0100).to_le_bytes().to_vec();
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(data);
    wrap(CMD_HEADER, &payload, CMD_FOOTER)
}

/// Engineering-mode report with 8/8 gates.
fn report(present: bool, light: u8) -> Vec<u8> {
    let state = if present { 0x03 } else { 0x00 };
    let mut payload = vec![0x01, 0xAA, state, 0x50, 0x00, 0x40, 0x78, 0x00, 0x30, 0x96, 0x00];
    payload.extend_from_slice(&[0x08, 0x08]);
    payload.extend_from_slice(&[0; 18]);
    payload.extend_from_slice(&[light, present as u8, 0x55, 0x00]);
    wrap(DATA_HEADER, &payload, DATA_FOOTER)
}

fn link_config() -> LinkConfig {
    LinkConfig {
        handshake_timeout: Duration::from_millis(20),
        ..LinkConfig::default()
    }
}

fn online_sink() -> (Arc<PresenceAttributes>, MatterPresenceSink) {
    let attributes = PresenceAttributes::new();
    let mut sink = MatterPresenceSink::new(attributes.clone());
    sink.begin(1, false, 0).unwrap();
    attributes.set_online(true);
    (attributes, sink)
}

#[test]
fn test_three_tick_scenario() {
    let radar = FakeRadar::default();
    let link = SensorLink::initialize(radar.clone(), &link_config()).unwrap();
    assert!(link.enhanced());

    let (attributes, sink) = online_sink();
    let interval = Duration::from_millis(10);
    let mut poll = PollLoop::with_interval(link, PresenceCache::new(), sink, interval);
    let t0 = Instant::now();

    // tick 1: vacant, light 10 -> only illuminance changes
    radar.send(&report(false, 10));
    assert!(matches!(poll.tick(t0), Ok(TickOutcome::Reconciled(_))));
    assert!(!attributes.occupancy.get());
    assert_eq!(attributes.illuminance.get(), 10);
    assert_eq!(attributes.occupancy.version(), 0);
    assert_eq!(attributes.illuminance.version(), 1);

    // tick 2: someone arrives
    radar.send(&report(true, 10));
    assert!(matches!(
        poll.tick(t0 + interval),
        Ok(TickOutcome::Reconciled(_))
    ));
    assert!(attributes.occupancy.get());
    assert_eq!(attributes.occupancy.version(), 1);
    assert_eq!(attributes.illuminance.version(), 1);

    // tick 3: nothing changed, nothing written
    radar.send(&report(true, 10));
    assert!(matches!(
        poll.tick(t0 + interval * 2),
        Ok(TickOutcome::Reconciled(_))
    ));
    assert_eq!(attributes.occupancy.version(), 1);
    assert_eq!(attributes.illuminance.version(), 1);

    let state = poll.cache().state();
    assert!(state.initialized);
    assert!(state.occupancy);
    assert_eq!(state.illuminance, 10);
}

#[test]
fn test_readings_dropped_until_matter_is_online() {
    let radar = FakeRadar::default();
    let link = SensorLink::initialize(radar.clone(), &link_config()).unwrap();

    let attributes = PresenceAttributes::new();
    let mut sink = MatterPresenceSink::new(attributes.clone());
    sink.begin(1, false, 0).unwrap();
    let mut poll = PollLoop::with_interval(
        link,
        PresenceCache::new(),
        sink,
        Duration::from_millis(10),
    );
    let t0 = Instant::now();

    radar.send(&report(true, 42));
    assert_eq!(poll.tick(t0), Err(BridgeError::SinkNotReady));
    assert!(!attributes.occupancy.get());
    assert!(!poll.cache().state().initialized);

    attributes.set_online(true);
    radar.send(&report(true, 42));
    assert!(poll.tick(t0 + Duration::from_millis(10)).is_ok());
    assert!(attributes.occupancy.get());
    assert_eq!(attributes.illuminance.get(), 42);
}

#[test]
fn test_corrupt_bytes_between_reports_are_skipped() {
    let radar = FakeRadar::default();
    let link = SensorLink::initialize(radar.clone(), &link_config()).unwrap();
    let (attributes, sink) = online_sink();
    let mut poll = PollLoop::new(link, PresenceCache::new(), sink);
    let before = poll.link().stats();

    let mut noise = vec![0x00, 0xF4, 0x13, 0x37];
    noise.extend_from_slice(&report(true, 7));
    radar.send(&noise);

    assert!(poll.tick(Instant::now()).is_ok());
    assert!(attributes.occupancy.get());
    assert_eq!(attributes.illuminance.get(), 7);
    let after = poll.link().stats();
    assert_eq!(after.frames_decoded - before.frames_decoded, 1);
    assert_eq!(after.bytes_discarded - before.bytes_discarded, 4);
}

#[test]
fn test_silent_sensor_fails_handshake() {
    let result = SensorLink::initialize(FakeRadar::silent(), &link_config());
    match result {
        Err(e @ LinkError::HandshakeFailed(_)) => assert!(e.is_fatal()),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("silent sensor must not initialize"),
    }
}
