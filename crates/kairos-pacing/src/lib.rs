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

//! # Kairos Pacing
//!
//! The two pacer families of the runtime: the per-application [`AppPacer`]
//! that predicts wake-up and display times for one client and learns its
//! rendering cost, and the system-wide [`CompositorPacer`] implementations
//! that predict present times: [`DisplayTimingPacer`] adaptively tuned by
//! real presentation feedback, and [`FakePacer`] open-loop off a fixed period.

#![warn(missing_docs)]

pub mod app;
pub mod display_timing;
pub mod fake;
pub mod record;

pub use app::{AppFramePrediction, AppPacer};
pub use display_timing::DisplayTimingPacer;
pub use fake::FakePacer;

use kairos_core::compositor::{FramePoint, PresentFeedback};
use kairos_core::error::PacingResult;
use kairos_core::time::TimeNs;

/// The result of one [`CompositorPacer::predict`] call.
#[derive(Debug, Clone, Copy)]
pub struct CompositorPrediction {
    /// Identifier for the new system frame.
    pub frame_id: i64,
    /// When the scheduler should wake up to collect and composite.
    pub wake_up_ns: TimeNs,
    /// The present time to request from the display.
    pub desired_present_ns: TimeNs,
    /// Acceptable slop around the desired present time.
    pub present_slop_ns: TimeNs,
    /// When photons reach the eye (present time plus scan-out offset).
    pub predicted_display_ns: TimeNs,
    /// The display period in effect for this prediction.
    pub predicted_display_period_ns: TimeNs,
    /// Lower bound on the display period, for clients that query capability.
    pub min_display_period_ns: TimeNs,
}

/// Predicts present timing for the whole system and adapts to feedback.
///
/// Exactly one implementation is active at a time. The vblank/offset
/// mutators only mean something for the open-loop variant; the default
/// implementations log and ignore, mirroring a backend that has real
/// feedback and needs no external resync.
pub trait CompositorPacer: Send {
    /// Predicts timing for the next system frame. Never fails: with no
    /// history it falls back to a clean-slate guess.
    fn predict(&mut self, now_ns: TimeNs) -> CompositorPrediction;

    /// Records that the system frame `frame_id` passed `point` at `when_ns`.
    fn mark_point(&mut self, frame_id: i64, point: FramePoint, when_ns: TimeNs)
        -> PacingResult<()>;

    /// Feeds measured presentation timing back into the pacer.
    ///
    /// Feedback for a frame whose record has been evicted is logged and
    /// ignored, so it can never corrupt a different live frame's record.
    fn info(&mut self, feedback: &PresentFeedback) -> PacingResult<()>;

    /// The current app-time budget handed to frame producers.
    fn app_time_ns(&self) -> TimeNs;

    /// Resynchronizes the pacer to an externally observed vblank.
    fn update_vblank_from_display_control(&mut self, last_vblank_ns: TimeNs) {
        let _ = last_vblank_ns;
        log::debug!("Vblank resync not supported by this pacer; ignoring");
    }

    /// Applies an externally measured present-to-display offset.
    fn update_present_offset(&mut self, frame_id: i64, present_offset_ns: TimeNs) {
        let _ = (frame_id, present_offset_ns);
        log::debug!("Present-offset correction not supported by this pacer; ignoring");
    }
}
