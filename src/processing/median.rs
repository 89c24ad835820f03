//! Sliding-window median smoothing of position estimates

use crate::core::{PositionEstimate, DEFAULT_HISTORY_CAPACITY};
use std::collections::VecDeque;

/// Bounded FIFO of recent estimates, reporting the component-wise median.
///
/// x and y are filtered independently (not a geometric median), which is
/// enough to reject the occasional wild multilateration result.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    history: VecDeque<PositionEstimate>,
    capacity: usize,
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MedianFilter {
    /// Create a filter keeping at most `capacity` estimates (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an estimate, evicting the oldest once full.
    /// Non-finite estimates are ignored.
    pub fn push(&mut self, estimate: PositionEstimate) {
        if !estimate.is_finite() {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(estimate);
    }

    /// Component-wise median of the window, or `None` before the first push
    pub fn current(&self) -> Option<PositionEstimate> {
        if self.history.is_empty() {
            return None;
        }
        let xs: Vec<f64> = self.history.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.history.iter().map(|p| p.y).collect();
        Some(PositionEstimate::new(median(xs), median(ys)))
    }

    /// Push and return the updated median
    pub fn update(&mut self, estimate: PositionEstimate) -> Option<PositionEstimate> {
        self.push(estimate);
        self.current()
    }

    /// Change the window length. Shrinking drops the oldest entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Median of a non-empty set; mean of the two middle values for even counts
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
