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

//! The seam between the scheduler and the real rendering backend.
//!
//! The scheduler drives exactly one [`NativeCompositor`]; everything behind
//! it (Vulkan, distortion, swapchain allocation, display protocols) is out
//! of scope and consumed as opaque success/failure operations.

use crate::error::CompositorError;
use crate::layer::{EnvBlendMode, LayerEntry};
use crate::time::TimeNs;

/// The view configuration a session renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewType {
    /// Single view, e.g. a companion window.
    Mono,
    /// Two views, one per eye.
    Stereo,
}

/// A named point in a frame's lifetime, reported to `mark_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePoint {
    /// The producing thread woke up to start the frame.
    WakeUp,
    /// CPU-side frame work began.
    Begin,
    /// The frame's layer list was handed to the backend.
    Submit,
}

impl FramePoint {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FramePoint::WakeUp => "wake_up",
            FramePoint::Begin => "begin",
            FramePoint::Submit => "submit",
        }
    }
}

/// Timing handed back by the backend for one predicted frame.
#[derive(Debug, Clone, Copy)]
pub struct FramePrediction {
    /// Identifier correlating this prediction with later `mark_frame` calls.
    pub frame_id: i64,
    /// When the producer should wake up to start rendering.
    pub wake_up_ns: TimeNs,
    /// When GPU work is expected to complete.
    pub predicted_gpu_done_ns: TimeNs,
    /// When photons from this frame reach the eye.
    pub predicted_display_ns: TimeNs,
    /// Current display period.
    pub predicted_display_period_ns: TimeNs,
}

/// Measured presentation timing for one committed frame, in the shape the
/// display-timing extensions expose it: what we asked for, what actually
/// happened, and how much slack the GPU left before the deadline.
#[derive(Debug, Clone, Copy)]
pub struct PresentFeedback {
    /// The frame this feedback belongs to.
    pub frame_id: i64,
    /// The present time the scheduler requested.
    pub desired_present_ns: TimeNs,
    /// The present time the display actually used.
    pub actual_present_ns: TimeNs,
    /// The earliest the display could have presented.
    pub earliest_present_ns: TimeNs,
    /// Slack between GPU completion and the present deadline.
    pub present_margin_ns: TimeNs,
    /// When GPU work for the frame finished.
    pub gpu_done_ns: TimeNs,
    /// When this feedback was observed.
    pub when_ns: TimeNs,
}

/// The real compositor the scheduler commits merged frames to.
///
/// One implementation wraps the actual rendering pipeline; a headless
/// implementation in `kairos-multi` records calls for tests and bring-up.
/// All methods are called from the scheduler thread only, except
/// `begin_session`/`end_session` which the scheduler also serializes.
pub trait NativeCompositor: Send {
    /// Predicts timing for the next frame from real display state.
    fn predict_frame(&mut self) -> Result<FramePrediction, CompositorError>;

    /// Records that `frame_id` passed `point` at `when_ns`.
    fn mark_frame(
        &mut self,
        frame_id: i64,
        point: FramePoint,
        when_ns: TimeNs,
    ) -> Result<(), CompositorError>;

    /// Begins CPU-side work for `frame_id`.
    fn begin_frame(&mut self, frame_id: i64) -> Result<(), CompositorError>;

    /// Abandons `frame_id` without presenting it.
    fn discard_frame(&mut self, frame_id: i64) -> Result<(), CompositorError>;

    /// Opens the layer list for `frame_id`.
    fn layer_begin(
        &mut self,
        frame_id: i64,
        display_time_ns: TimeNs,
        env_blend_mode: EnvBlendMode,
    ) -> Result<(), CompositorError>;

    /// Appends one layer to the open layer list. Dispatch on
    /// [`crate::layer::LayerData`] happens behind this call.
    fn layer_entry(&mut self, entry: &LayerEntry) -> Result<(), CompositorError>;

    /// Commits the open layer list for presentation.
    fn layer_commit(&mut self, frame_id: i64) -> Result<(), CompositorError>;

    /// Starts a display session. Called exactly once per Stopped→Running
    /// transition of the scheduler's session state machine.
    fn begin_session(&mut self, view_type: ViewType) -> Result<(), CompositorError>;

    /// Ends the display session. Called exactly once per Running→Stopped
    /// transition.
    fn end_session(&mut self) -> Result<(), CompositorError>;
}
