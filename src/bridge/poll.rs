//! Cadence-bounded poll loop driving the sensor link and the cache.

use super::Reading;
use super::cache::PresenceCache;
use super::sink::AttributeSink;
use crate::error::Result;
use crate::sensor::{SensorLink, SerialTransport};
use std::time::{Duration, Instant};

/// One reporting cycle.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// What a call to [`PollLoop::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The cadence has not elapsed; nothing was touched.
    NotDue,
    /// The cadence elapsed but no data frame was available.
    NoData,
    /// A reading was reconciled against the sink.
    Reconciled(Reading),
}

/// Drives [`SensorLink`] and [`PresenceCache`] on a fixed cadence.
///
/// `tick` is meant to be called as often as the host's loop spins. It never
/// blocks and does real work at most once per interval.
pub struct PollLoop<T: SerialTransport, S: AttributeSink> {
    link: SensorLink<T>,
    cache: PresenceCache,
    sink: S,
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl<T: SerialTransport, S: AttributeSink> PollLoop<T, S> {
    pub fn new(link: SensorLink<T>, cache: PresenceCache, sink: S) -> Self {
        Self::with_interval(link, cache, sink, DEFAULT_INTERVAL)
    }

    pub fn with_interval(
        link: SensorLink<T>,
        cache: PresenceCache,
        sink: S,
        interval: Duration,
    ) -> Self {
        Self {
            link,
            cache,
            sink,
            interval,
            next_deadline: None,
        }
    }

    /// Run one scheduling step.
    ///
    /// The next deadline moves to `now + interval` whenever the cadence
    /// elapsed, whether or not a frame was available, so a sensor dropout
    /// cannot compress the cadence once frames come back. Before the first
    /// reconcile the cache adopts the values the sink already holds. A
    /// reconcile error is returned to the caller; the reading it belonged to
    /// is not kept.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome> {
        if let Some(deadline) = self.next_deadline
            && now < deadline
        {
            return Ok(TickOutcome::NotDue);
        }
        self.next_deadline = Some(now + self.interval);

        match self.link.poll() {
            Some(kind) if kind.is_data() => {}
            _ => return Ok(TickOutcome::NoData),
        }

        let reading = Reading {
            presence: self.link.last_presence(),
            light_level: self.link.last_light_level(),
            timestamp: now,
        };
        if !self.cache.state().initialized {
            self.cache.sync_from_sink(&self.sink)?;
        }
        self.cache.reconcile(&reading, &mut self.sink)?;
        Ok(TickOutcome::Reconciled(reading))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn link(&self) -> &SensorLink<T> {
        &self.link
    }

    pub fn cache(&self) -> &PresenceCache {
        &self.cache
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::sink::recording::{RecordingSink, SinkCall};
    use crate::error::BridgeError;
    use crate::sensor::frame::tests::engineering_frame;
    use crate::sensor::link::tests::{sensor, test_config};
    use crate::sensor::transport::mock::MockTransport;

    fn poll_loop(sink: RecordingSink) -> (PollLoop<MockTransport, RecordingSink>, MockTransport) {
        let transport = sensor(&[]);
        let link = SensorLink::initialize(transport.clone(), &test_config()).unwrap();
        (
            PollLoop::new(link, PresenceCache::new(), sink),
            transport,
        )
    }

    #[test]
    fn test_three_tick_scenario() {
        let (mut poll, transport) = poll_loop(RecordingSink::ready());
        let t0 = Instant::now();
        let interval = poll.interval();

        transport.push(&engineering_frame(0x00, 10));
        assert!(matches!(poll.tick(t0), Ok(TickOutcome::Reconciled(_))));
        assert_eq!(poll.sink().calls, vec![SinkCall::Illuminance(10)]);

        transport.push(&engineering_frame(0x01, 10));
        poll.tick(t0 + interval).unwrap();
        assert_eq!(
            poll.sink().calls,
            vec![SinkCall::Illuminance(10), SinkCall::Occupancy(true)]
        );

        transport.push(&engineering_frame(0x01, 10));
        poll.tick(t0 + interval * 2).unwrap();
        assert_eq!(poll.sink().calls.len(), 2);
    }

    #[test]
    fn test_dropout_makes_no_sink_calls() {
        let (mut poll, _transport) = poll_loop(RecordingSink::ready());
        let t0 = Instant::now();
        for i in 0..50 {
            assert_eq!(
                poll.tick(t0 + poll.interval() * i).unwrap(),
                TickOutcome::NoData
            );
        }
        assert!(poll.sink().calls.is_empty());
        assert_eq!(poll.cache().state(), Default::default());
    }

    #[test]
    fn test_ticks_inside_interval_do_nothing() {
        let (mut poll, transport) = poll_loop(RecordingSink::ready());
        let t0 = Instant::now();
        for _ in 0..5 {
            transport.push(&engineering_frame(0x01, 20));
        }

        assert!(matches!(poll.tick(t0), Ok(TickOutcome::Reconciled(_))));
        let step = poll.interval() / 4;
        for i in 1..4 {
            assert_eq!(poll.tick(t0 + step * i).unwrap(), TickOutcome::NotDue);
        }
        // the remaining frames are still buffered, untouched
        assert_eq!(poll.link().stats().frames_dropped, 0);
        assert!(matches!(
            poll.tick(t0 + poll.interval()),
            Ok(TickOutcome::Reconciled(_))
        ));
    }

    #[test]
    fn test_cadence_is_at_most_once_per_interval() {
        let (mut poll, transport) = poll_loop(RecordingSink::ready());
        let t0 = Instant::now();
        let interval = poll.interval();
        for _ in 0..100 {
            transport.push(&engineering_frame(0x01, 5));
        }

        // tick every millisecond over ten intervals
        let mut attempts = 0;
        let total = interval * 10;
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            if let Ok(TickOutcome::Reconciled(_)) = poll.tick(t0 + elapsed) {
                attempts += 1;
            }
            elapsed += Duration::from_millis(1);
        }
        assert!(attempts <= 10, "{} reconciles in 10 intervals", attempts);
    }

    #[test]
    fn test_dropout_does_not_shorten_cadence() {
        let (mut poll, transport) = poll_loop(RecordingSink::ready());
        let t0 = Instant::now();
        let interval = poll.interval();

        // sensor silent for a late tick, then frames return
        assert_eq!(poll.tick(t0 + interval * 7).unwrap(), TickOutcome::NoData);
        transport.push(&engineering_frame(0x01, 5));
        transport.push(&engineering_frame(0x01, 6));
        assert_eq!(
            poll.tick(t0 + interval * 7 + interval / 2).unwrap(),
            TickOutcome::NotDue
        );
        assert!(matches!(
            poll.tick(t0 + interval * 8),
            Ok(TickOutcome::Reconciled(_))
        ));
    }

    #[test]
    fn test_first_reading_adopts_values_held_by_sink() {
        let (mut poll, transport) = poll_loop(RecordingSink {
            occupancy: true,
            illuminance: 120,
            ..RecordingSink::ready()
        });
        let t0 = Instant::now();

        transport.push(&engineering_frame(0x01, 120));
        assert!(matches!(poll.tick(t0), Ok(TickOutcome::Reconciled(_))));
        assert!(poll.sink().calls.is_empty());
        assert!(poll.cache().state().initialized);

        transport.push(&engineering_frame(0x00, 120));
        poll.tick(t0 + poll.interval()).unwrap();
        assert_eq!(poll.sink().calls, vec![SinkCall::Occupancy(false)]);
    }

    #[test]
    fn test_sink_not_ready_is_reported_and_reading_dropped() {
        let (mut poll, transport) = poll_loop(RecordingSink::default());
        let t0 = Instant::now();

        transport.push(&engineering_frame(0x01, 33));
        assert_eq!(poll.tick(t0), Err(BridgeError::SinkNotReady));
        assert_eq!(poll.cache().state(), Default::default());
        assert!(poll.sink().calls.is_empty());

        // nothing is queued: without a new frame the next tick has no data
        assert_eq!(
            poll.tick(t0 + poll.interval()).unwrap(),
            TickOutcome::NoData
        );
    }
}
