//! Accumulation of decoded fragments into complete scans.

use crate::driver::{DecodedPacket, Packet, Point};
use std::time::Duration;

/// A finalized scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// Per-wrapper sequence number, starting at 0.
    pub sequence: u64,
    /// Generation of the driver that decoded every point in this cloud.
    pub driver_generation: u64,
    pub frame_id: String,
    /// Stamp of the first packet of the scan.
    pub stamp: Duration,
    pub points: Vec<Point>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// The raw packets that made up one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPackets {
    /// Sequence number of the matching [`PointCloud`].
    pub sequence: u64,
    pub frame_id: String,
    pub packets: Vec<Packet>,
}

/// What a pushed packet did to the scan in progress.
#[derive(Debug)]
pub(crate) enum ScanProgress {
    Pending,
    Complete(PointCloud, Option<ScanPackets>),
    /// The scan hit the packet limit without a boundary and was dropped.
    Overflow { discarded_points: usize },
}

/// Collects the fragments of the scan in progress.
#[derive(Debug, Default)]
pub(crate) struct ScanAssembler {
    points: Vec<Point>,
    packets: Vec<Packet>,
    stamp: Option<Duration>,
    record_packets: bool,
    num_packets: usize,
    max_packets: usize,
    next_sequence: u64,
}

impl ScanAssembler {
    pub fn new(record_packets: bool, max_packets: usize) -> Self {
        Self {
            record_packets,
            max_packets,
            ..Self::default()
        }
    }

    /// Add one decoded packet.
    ///
    /// A scan still open after `max_packets` packets is discarded, so a
    /// decoder that never reports a boundary cannot grow it without bound.
    pub fn push(
        &mut self,
        packet: Packet,
        decoded: DecodedPacket,
        frame_id: &str,
        driver_generation: u64,
    ) -> ScanProgress {
        self.stamp.get_or_insert(packet.stamp);
        self.points.extend(decoded.points);
        self.num_packets += 1;
        if self.record_packets {
            self.packets.push(packet);
        }

        if !decoded.scan_complete {
            if self.num_packets >= self.max_packets {
                let discarded_points = self.discard();
                return ScanProgress::Overflow { discarded_points };
            }
            return ScanProgress::Pending;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let cloud = PointCloud {
            sequence,
            driver_generation,
            frame_id: frame_id.to_string(),
            stamp: self.stamp.take().unwrap_or_default(),
            points: std::mem::take(&mut self.points),
        };
        let packets = self.record_packets.then(|| ScanPackets {
            sequence,
            frame_id: frame_id.to_string(),
            packets: std::mem::take(&mut self.packets),
        });
        self.num_packets = 0;

        ScanProgress::Complete(cloud, packets)
    }

    /// Drop the scan in progress. Returns the number of discarded points.
    pub fn discard(&mut self) -> usize {
        let dropped = self.points.len();
        self.points.clear();
        self.packets.clear();
        self.stamp = None;
        self.num_packets = 0;
        dropped
    }

    /// Number of points accumulated so far.
    pub fn pending_points(&self) -> usize {
        self.points.len()
    }
}
