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

//! Numeric configuration knobs for the pacers and the scheduler.
//!
//! There is no file format here: these are plain structs with sensible
//! defaults. Embedders that keep settings on disk can deserialize them
//! through serde into whatever layer they already have.

use crate::time::{ms_to_ns, TimeNs};
use serde::{Deserialize, Serialize};

/// Tuning for one application session's pacer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppPacerConfig {
    /// Floor for the app-time budget; predictions never allot less.
    pub min_app_time_ns: TimeNs,
    /// Safety margin added between predicted GPU completion and display.
    pub margin_ns: TimeNs,
    /// IIR coefficient applied when an observed duration came in over the
    /// current estimate (the frame ran late). Higher adapts faster.
    pub alpha_late: f64,
    /// IIR coefficient applied when the observed duration came in under the
    /// current estimate.
    pub alpha_early: f64,
    /// Cost estimates used before any frame has completed.
    pub default_cpu_time_ns: TimeNs,
    /// See `default_cpu_time_ns`.
    pub default_draw_time_ns: TimeNs,
    /// See `default_cpu_time_ns`.
    pub default_wait_time_ns: TimeNs,
}

impl Default for AppPacerConfig {
    fn default() -> Self {
        Self {
            min_app_time_ns: ms_to_ns(1),
            margin_ns: ms_to_ns(2),
            alpha_late: 0.8,
            alpha_early: 0.8,
            default_cpu_time_ns: ms_to_ns(2),
            default_draw_time_ns: ms_to_ns(2),
            default_wait_time_ns: ms_to_ns(1),
        }
    }
}

/// Tuning for the feedback-driven compositor pacer.
///
/// The fractional knobs are proportions of the nominal frame period, so one
/// config transfers between 72 Hz and 144 Hz panels unchanged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisplayTimingConfig {
    /// Nominal display period.
    pub frame_period_ns: TimeNs,
    /// Scan-out-to-photons offset: display time = present time + this.
    pub present_offset_ns: TimeNs,
    /// Target slack between GPU completion and the present deadline.
    pub margin_ns: TimeNs,
    /// Initial app-time budget, as a fraction of the frame period.
    pub app_time_fraction: f64,
    /// Hard ceiling on the app-time budget, as a fraction of the period.
    pub app_time_max_fraction: f64,
    /// Budget growth step on a missed present, as a fraction of the period.
    pub adjust_missed_fraction: f64,
    /// Budget step and dead-band half-width for non-missed frames, as a
    /// fraction of the period.
    pub adjust_non_miss_fraction: f64,
    /// Slop handed to the display-timing extension with each present.
    pub present_slop_ns: TimeNs,
}

impl DisplayTimingConfig {
    /// A config for the given display period with the canonical fractions.
    pub fn for_period(frame_period_ns: TimeNs) -> Self {
        Self {
            frame_period_ns,
            present_offset_ns: ms_to_ns(4),
            margin_ns: ms_to_ns(1),
            app_time_fraction: 0.10,
            app_time_max_fraction: 0.30,
            adjust_missed_fraction: 0.04,
            adjust_non_miss_fraction: 0.02,
            present_slop_ns: 500_000,
        }
    }
}

impl Default for DisplayTimingConfig {
    fn default() -> Self {
        // 60 Hz nominal.
        Self::for_period(16_666_666)
    }
}

/// Tuning for the open-loop pacer used when no present feedback exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FakePacerConfig {
    /// Assumed display period.
    pub frame_period_ns: TimeNs,
    /// Floor for the compositor-time budget.
    pub min_comp_time_ns: TimeNs,
    /// Compositor-time budget as a fraction of the frame period.
    pub comp_time_fraction: f64,
    /// Present-to-photons offset added to the predicted present time.
    pub present_to_display_offset_ns: TimeNs,
}

impl FakePacerConfig {
    /// A config for the given display period with the canonical fractions.
    pub fn for_period(frame_period_ns: TimeNs) -> Self {
        Self {
            frame_period_ns,
            min_comp_time_ns: ms_to_ns(2),
            comp_time_fraction: 0.20,
            present_to_display_offset_ns: ms_to_ns(4),
        }
    }
}

impl Default for FakePacerConfig {
    fn default() -> Self {
        Self::for_period(16_666_666)
    }
}

/// Tuning for the multi-client scheduler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MultiConfig {
    /// Maximum concurrently connected client sessions.
    pub max_clients: usize,
    /// Maximum layers one client may submit per frame.
    pub max_layers: usize,
    /// Poll interval for the `layer_commit` backpressure wait.
    pub commit_poll_interval_ns: TimeNs,
    /// Capacity of the telemetry event channel; events beyond it are dropped.
    pub telemetry_buffer_size: usize,
}

impl Default for MultiConfig {
    fn default() -> Self {
        Self {
            max_clients: 64,
            max_layers: 16,
            commit_poll_interval_ns: ms_to_ns(1),
            telemetry_buffer_size: 1024,
        }
    }
}
