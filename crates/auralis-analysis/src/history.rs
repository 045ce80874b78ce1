//! Bounded FIFO histories.
//!
//! Every rolling buffer in the engine (ODF, BPM, confidence, transient
//! history, note labels) is a fixed-capacity FIFO that evicts its oldest entry.

use std::collections::VecDeque;

/// Fixed-capacity FIFO. Pushing into a full history evicts the oldest value.
#[derive(Debug, Clone)]
pub struct History<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.values.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.values.back()
    }
}

impl<T: Clone> History<T> {
    /// Copy out the contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }

    /// Copy out the newest `n` values, oldest first.
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.values.len().saturating_sub(n);
        self.values.iter().skip(skip).cloned().collect()
    }
}

impl History<f32> {
    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> f32 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f32>()
            / self.values.len() as f32;
        variance.sqrt()
    }

    pub fn median(&self) -> f32 {
        median(&self.to_vec())
    }
}

/// Median of a slice (mean of the two middle values for even lengths, 0 when empty).
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}
