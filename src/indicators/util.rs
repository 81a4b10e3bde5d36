//! Shared O(1)-amortised building blocks for the incremental indicators:
//! a fixed-capacity ring buffer with running sum/sum-of-squares, and a
//! monotonic deque for sliding-window max/min.

use std::collections::VecDeque;

/// Fixed-capacity ring buffer that tracks a running sum (and, optionally,
/// sum of squares) so that sliding-window mean/variance are O(1) per push.
#[derive(Debug, Clone)]
pub struct RingSum {
    cap: usize,
    buf: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RingSum {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Pushes a value, evicting the oldest if at capacity. Returns the
    /// evicted value, if any.
    pub fn push(&mut self, v: f64) -> Option<f64> {
        self.buf.push_back(v);
        self.sum += v;
        self.sum_sq += v * v;
        if self.buf.len() > self.cap {
            let old = self.buf.pop_front().unwrap();
            self.sum -= old;
            self.sum_sq -= old * old;
            Some(old)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.buf.len() as f64
    }

    /// Sample variance (ddof=1), matching the batch reference convention.
    pub fn sample_variance(&self) -> f64 {
        let n = self.buf.len() as f64;
        if n < 2.0 {
            return 0.0;
        }
        let mean = self.mean();
        ((self.sum_sq - n * mean * mean) / (n - 1.0)).max(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.buf.iter()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }
}

/// Monotonic deque of `(value, index)` kept decreasing (for max) or
/// increasing (for min); front is the O(1) window extremum, expired
/// entries are popped lazily on `push`.
#[derive(Debug, Clone)]
pub struct MonotonicDeque {
    window: usize,
    decreasing: bool, // true => tracks max, false => tracks min
    deque: VecDeque<(f64, usize)>,
}

impl MonotonicDeque {
    pub fn new_max(window: usize) -> Self {
        Self {
            window,
            decreasing: true,
            deque: VecDeque::new(),
        }
    }

    pub fn new_min(window: usize) -> Self {
        Self {
            window,
            decreasing: false,
            deque: VecDeque::new(),
        }
    }

    pub fn push(&mut self, idx: usize, v: f64) {
        while let Some(&(back_v, _)) = self.deque.back() {
            let evict = if self.decreasing { back_v <= v } else { back_v >= v };
            if evict {
                self.deque.pop_back();
            } else {
                break;
            }
        }
        self.deque.push_back((v, idx));
        while let Some(&(_, front_idx)) = self.deque.front() {
            if idx - front_idx >= self.window {
                self.deque.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn extreme(&self) -> Option<f64> {
        self.deque.front().map(|&(v, _)| v)
    }

    /// `(value, index)` of the current window extremum.
    pub fn extreme_entry(&self) -> Option<(f64, usize)> {
        self.deque.front().copied()
    }

    pub fn reset(&mut self) {
        self.deque.clear();
    }
}
