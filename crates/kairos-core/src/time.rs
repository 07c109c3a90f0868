// Copyright 2026 the kairos authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The nanosecond time model and the monotonic clock seam.
//!
//! All pacing arithmetic is carried out in signed integer nanoseconds so that
//! differences (which are frequently negative: "how late was this frame")
//! need no special casing. The [`Clock`] trait is the seam that lets tests
//! drive the scheduler with a manually advanced clock instead of real sleeps.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// A point or span on the runtime's monotonic timeline, in nanoseconds.
pub type TimeNs = i64;

/// Nanoseconds in one millisecond.
pub const NS_PER_MS: TimeNs = 1_000_000;

/// Nanoseconds in one second.
pub const NS_PER_S: TimeNs = 1_000_000_000;

/// Converts whole milliseconds to nanoseconds.
pub const fn ms_to_ns(ms: i64) -> TimeNs {
    ms * NS_PER_MS
}

/// Converts nanoseconds to fractional milliseconds, for log output.
pub fn ns_to_ms_f(ns: TimeNs) -> f64 {
    ns as f64 / NS_PER_MS as f64
}

/// A source of monotonic time and precise deadline sleeps.
///
/// Production code uses [`MonotonicClock`]; tests substitute a manual clock
/// so that pacing logic can be exercised deterministically without wall-time
/// sleeps.
pub trait Clock: Send + Sync {
    /// Returns the current time on this clock's monotonic timeline.
    fn now_ns(&self) -> TimeNs;

    /// Blocks the calling thread until `deadline_ns` on this clock.
    ///
    /// Returns immediately if the deadline is already in the past.
    fn sleep_until(&self, deadline_ns: TimeNs) {
        let remaining = deadline_ns - self.now_ns();
        if remaining > 0 {
            std::thread::sleep(Duration::from_nanos(remaining as u64));
        }
    }
}

/// The production clock, anchored to a [`std::time::Instant`] taken at
/// construction so that the zero point is process-local and values stay well
/// inside `i64` range.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose timeline starts now, at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> TimeNs {
        let elapsed = self.origin.elapsed();
        elapsed.as_secs() as i64 * NS_PER_S + i64::from(elapsed.subsec_nanos())
    }
}

/// A manually advanced clock for deterministic tests.
///
/// `sleep_until` advances the clock instead of blocking, so scheduler loops
/// run as fast as the test can drive them.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock starting at `start_ns`.
    pub fn new(start_ns: TimeNs) -> Self {
        Self {
            now: AtomicI64::new(start_ns),
        }
    }

    /// Moves the clock forward by `delta_ns`.
    pub fn advance(&self, delta_ns: TimeNs) {
        self.now.fetch_add(delta_ns, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time. Never moves backwards.
    pub fn set(&self, now_ns: TimeNs) {
        self.now.fetch_max(now_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> TimeNs {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, deadline_ns: TimeNs) {
        self.now.fetch_max(deadline_ns, Ordering::SeqCst);
    }
}
