//! Core data types for the positioning system

use crate::core::constants::ANCHOR_COUNT;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

/// 2D point in map/display units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Output of one solver invocation, and of the smoothing filter
pub type PositionEstimate = Point2;

/// Fixed UWB anchor at a known map coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub position: Point2,
    /// Radio short address as reported in telemetry (`0x....`), if known
    pub address: Option<u32>,
}

impl Anchor {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            address: None,
        }
    }

    pub fn with_address(mut self, address: u32) -> Self {
        self.address = Some(address);
        self
    }
}

/// Returned when an anchor set does not have exactly four entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} anchors, found {found}", expected = ANCHOR_COUNT)]
pub struct AnchorCountError {
    pub found: usize,
}

/// The four reference anchors of a session. The first one is the
/// reference for the linearised range equations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorConfiguration {
    anchors: [Anchor; ANCHOR_COUNT],
}

impl AnchorConfiguration {
    pub fn new(anchors: [Anchor; ANCHOR_COUNT]) -> Self {
        Self { anchors }
    }

    /// Build a configuration from bare coordinates, in anchor order
    pub fn from_points(points: [(f64, f64); ANCHOR_COUNT]) -> Self {
        Self::new(points.map(|(x, y)| Anchor::new(x, y)))
    }

    pub fn anchors(&self) -> &[Anchor; ANCHOR_COUNT] {
        &self.anchors
    }

    pub fn reference(&self) -> &Anchor {
        &self.anchors[0]
    }

    pub fn positions(&self) -> [Point2; ANCHOR_COUNT] {
        self.anchors.map(|a| a.position)
    }

    /// Addresses of all anchors, or `None` if any anchor has no address
    pub fn addresses(&self) -> Option<[u32; ANCHOR_COUNT]> {
        let mut out = [0u32; ANCHOR_COUNT];
        for (slot, anchor) in out.iter_mut().zip(self.anchors.iter()) {
            *slot = anchor.address?;
        }
        Some(out)
    }

    /// True when the anchors are coincident or collinear, i.e. the
    /// difference vectors relative to the reference do not span the plane.
    pub fn is_degenerate(&self) -> bool {
        let r = self.anchors[0].position;
        let diffs: Vec<(f64, f64)> = self.anchors[1..]
            .iter()
            .map(|a| (a.position.x - r.x, a.position.y - r.y))
            .collect();

        let scale = diffs
            .iter()
            .map(|(dx, dy)| dx.abs().max(dy.abs()))
            .fold(0.0f64, f64::max);
        if scale == 0.0 {
            return true;
        }

        // Largest 2x2 minor of the difference matrix, normalised by scale
        let mut max_cross = 0.0f64;
        for i in 0..diffs.len() {
            for j in (i + 1)..diffs.len() {
                let cross = diffs[i].0 * diffs[j].1 - diffs[i].1 * diffs[j].0;
                max_cross = max_cross.max(cross.abs());
            }
        }
        max_cross / (scale * scale) < 1e-9
    }
}

impl TryFrom<&[Anchor]> for AnchorConfiguration {
    type Error = AnchorCountError;

    fn try_from(anchors: &[Anchor]) -> Result<Self, Self::Error> {
        let anchors: [Anchor; ANCHOR_COUNT] = anchors
            .try_into()
            .map_err(|_| AnchorCountError { found: anchors.len() })?;
        Ok(Self::new(anchors))
    }
}

/// One distance per anchor, in anchor order (device units)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceVector([u32; ANCHOR_COUNT]);

impl DistanceVector {
    pub fn new(distances: [u32; ANCHOR_COUNT]) -> Self {
        Self(distances)
    }

    pub fn as_array(&self) -> &[u32; ANCHOR_COUNT] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// Every distance lies in `(0, max_range]`
    pub fn is_within_range(&self, max_range: u32) -> bool {
        self.0.iter().all(|&d| d > 0 && d <= max_range)
    }
}

/// A raw telemetry line as read from the radio
#[derive(Debug, Clone, PartialEq)]
pub struct RangingSample {
    pub line: String,
    pub received_at: Instant,
}

impl RangingSample {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            received_at: Instant::now(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }
}
