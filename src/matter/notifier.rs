//! Cluster change notifier for live Matter subscription updates.
//!
//! When the bridge writes a new occupancy or illuminance value, the Matter
//! subscription processor is woken right away so controllers receive the
//! report without waiting for the subscription's max interval.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Signal raised by attribute writes, awaited by the Matter thread.
pub type ChangeSignal = Signal<CriticalSectionRawMutex, ()>;

/// Notifies Matter subscriptions when one cluster's data changed.
#[derive(Clone, Copy)]
pub struct ClusterNotifier {
    signal: &'static ChangeSignal,
    endpoint_id: u16,
    cluster_id: u32,
}

impl ClusterNotifier {
    pub fn new(signal: &'static ChangeSignal, endpoint_id: u16, cluster_id: u32) -> Self {
        Self {
            signal,
            endpoint_id,
            cluster_id,
        }
    }

    pub fn endpoint_id(&self) -> u16 {
        self.endpoint_id
    }

    pub fn cluster_id(&self) -> u32 {
        self.cluster_id
    }

    /// Mark the cluster as changed. Non-blocking; repeated calls before the
    /// Matter thread wakes collapse into one report.
    pub fn notify(&self) {
        self.signal.signal(());
    }

    /// Wait until the cluster is marked as changed.
    pub async fn changed(&self) {
        self.signal.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SIGNAL: ChangeSignal = Signal::new();

    #[test]
    fn test_notify_collapses_until_consumed() {
        let notifier = ClusterNotifier::new(&SIGNAL, 1, 0x0406);
        assert_eq!(notifier.endpoint_id(), 1);
        assert_eq!(notifier.cluster_id(), 0x0406);
        assert!(!SIGNAL.signaled());

        notifier.notify();
        notifier.notify();
        assert!(SIGNAL.signaled());

        futures_lite::future::block_on(notifier.changed());
        assert!(!SIGNAL.signaled());
    }
}
