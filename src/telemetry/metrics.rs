//! Metrics collection for link statistics.
//!
//! Thread-safe counters covering framing, negotiation, and compression
//! health of a single PPP link.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-link statistics.
#[derive(Debug, Default)]
pub struct LinkStats {
    /// Frames received intact.
    pub rx_frames: Counter,
    /// Payload bytes received.
    pub rx_bytes: Counter,
    /// Frames queued for transmit.
    pub tx_frames: Counter,
    /// Wire bytes queued for transmit.
    pub tx_bytes: Counter,
    /// Frames dropped for a bad FCS.
    pub fcs_errors: Counter,
    /// Frames dropped for other framing faults.
    pub frame_errors: Counter,
    /// Frames for protocols we rejected.
    pub protocol_rejects: Counter,
    /// CCP decompression failures.
    pub desyncs: Counter,
    /// CCP Reset-Request exchanges initiated or served.
    pub resets: Counter,
    /// VJ decompression failures.
    pub vj_errors: Counter,
    /// Packets dropped before delivery or transmit.
    pub drops: Counter,
}

impl LinkStats {
    /// Creates new link statistics initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a received frame.
    pub fn record_rx(&self, bytes: usize) {
        self.rx_frames.inc();
        self.rx_bytes.add(bytes as u64);
    }

    /// Records a queued transmit frame.
    pub fn record_tx(&self, bytes: usize) {
        self.tx_frames.inc();
        self.tx_bytes.add(bytes as u64);
    }

    /// Exports all counters as key-value pairs.
    pub fn export(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("rx_frames", self.rx_frames.get()),
            ("rx_bytes", self.rx_bytes.get()),
            ("tx_frames", self.tx_frames.get()),
            ("tx_bytes", self.tx_bytes.get()),
            ("fcs_errors", self.fcs_errors.get()),
            ("frame_errors", self.frame_errors.get()),
            ("protocol_rejects", self.protocol_rejects.get()),
            ("desyncs", self.desyncs.get()),
            ("resets", self.resets.get()),
            ("vj_errors", self.vj_errors.get()),
            ("drops", self.drops.get()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.add(10);
        assert_eq!(counter.get(), 11);
    }

    #[test]
    fn test_link_stats() {
        let stats = LinkStats::new();

        stats.record_rx(100);
        stats.record_rx(200);
        stats.record_tx(150);
        stats.fcs_errors.inc();

        assert_eq!(stats.rx_frames.get(), 2);
        assert_eq!(stats.rx_bytes.get(), 300);
        assert_eq!(stats.tx_frames.get(), 1);
        assert_eq!(stats.tx_bytes.get(), 150);
        assert!(stats.export().contains(&("fcs_errors", 1)));
    }
}
