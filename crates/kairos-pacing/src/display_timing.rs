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

//! The feedback-driven compositor pacer.
//!
//! Uses real presentation feedback (desired/actual/earliest present time and
//! present margin) to adaptively size the app-time budget. The controller is
//! deliberately a deadband bang-bang loop, not PID: a step up on every miss,
//! a step toward the target margin otherwise, and no change inside the dead
//! band. Simple and stable beats optimal here.

use crate::record::FrameRing;
use crate::{CompositorPacer, CompositorPrediction};
use kairos_core::compositor::{FramePoint, PresentFeedback};
use kairos_core::config::DisplayTimingConfig;
use kairos_core::error::{format_late_by, PacingError, PacingResult};
use kairos_core::time::{ms_to_ns, ns_to_ms_f, TimeNs};

/// In-flight system frames tracked by the pacer.
const COMP_FRAME_RING_SIZE: usize = 16;

/// Never tune the app-time budget below this, no matter how much margin the
/// GPU reports; a zero budget would starve every producer.
const APP_TIME_FLOOR_NS: TimeNs = ms_to_ns(1);

/// Lifecycle of one system frame, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CompFrameState {
    /// Predicted, scheduler not yet awake.
    #[default]
    Predicted,
    /// Scheduler woke up for the frame.
    Woke,
    /// Compositor CPU work began.
    Began,
    /// Frame was submitted for presentation.
    Submitted,
    /// Presentation feedback arrived; terminal.
    Info,
}

impl CompFrameState {
    fn name(&self) -> &'static str {
        match self {
            CompFrameState::Predicted => "Predicted",
            CompFrameState::Woke => "Woke",
            CompFrameState::Began => "Began",
            CompFrameState::Submitted => "Submitted",
            CompFrameState::Info => "Info",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CompFrameRecord {
    state: CompFrameState,
    desired_present_ns: TimeNs,
    predicted_display_ns: TimeNs,
    /// App-time budget in effect when this frame was predicted.
    app_time_at_predict_ns: TimeNs,
    woke_ns: TimeNs,
    began_ns: TimeNs,
    submitted_ns: TimeNs,
    actual_present_ns: TimeNs,
    info_ns: TimeNs,
}

/// Adaptive pacer fed by real presentation timing.
#[derive(Debug)]
pub struct DisplayTimingPacer {
    config: DisplayTimingConfig,
    /// The adaptively tuned budget handed to frame production.
    app_time_ns: TimeNs,
    next_frame_id: i64,
    ring: FrameRing<CompFrameRecord, COMP_FRAME_RING_SIZE>,
    /// Most recent prediction, kept outside the ring so eviction cannot lose
    /// the walk baseline: `(frame_id, desired_present_ns)`.
    last_predicted: Option<(i64, TimeNs)>,
    /// Most recent completed frame: `(frame_id, actual_present_ns)`.
    last_info: Option<(i64, TimeNs)>,
}

impl DisplayTimingPacer {
    /// Creates a pacer with the initial app-time budget at
    /// `app_time_fraction` of the frame period.
    pub fn new(config: DisplayTimingConfig) -> Self {
        let app_time_ns = fraction_of(config.frame_period_ns, config.app_time_fraction);
        Self {
            config,
            app_time_ns,
            next_frame_id: 0,
            ring: FrameRing::new(),
            last_predicted: None,
            last_info: None,
        }
    }

    /// App time plus the target margin: the lead the producer side needs
    /// before the chosen present time.
    fn total_app_time(&self) -> TimeNs {
        self.app_time_ns + self.config.margin_ns
    }

    /// Picks the baseline present time the walk starts from.
    fn walk_baseline(&self, now_ns: TimeNs) -> TimeNs {
        let period = self.config.frame_period_ns;
        match (self.last_predicted, self.last_info) {
            // Clean slate: nothing presented, nothing predicted. Guess far
            // enough out that the first real feedback can pull us in.
            (None, None) => now_ns + 10 * period,
            // Predictions outstanding but no feedback yet: one period past
            // the previous desired present, so bootstrap predictions keep
            // advancing instead of re-targeting the same present slot.
            (Some((_, desired)), None) => desired + period,
            (Some((predicted_id, _)), Some((info_id, actual))) => {
                if predicted_id == info_id {
                    // No new prediction since the last completed frame: a
                    // frame was very likely missed. Walk from the last known
                    // real present time.
                    actual
                } else {
                    // Extrapolate the completed frame's present forward by
                    // the id gap, clamped so a long feedback stall cannot
                    // fling the baseline into the far future.
                    let diff_id = (predicted_id - info_id).max(1);
                    actual + diff_id * period
                }
            }
            // Feedback without a prediction cannot normally happen; recover
            // from the real present time.
            (None, Some((_, actual))) => actual,
        }
    }

    /// The deadband controller from the module docs.
    fn adjust_app_time(&mut self, feedback: &PresentFeedback) {
        let period = self.config.frame_period_ns;
        let app_time_max = fraction_of(period, self.config.app_time_max_fraction);
        let step_missed = fraction_of(period, self.config.adjust_missed_fraction);
        let step = fraction_of(period, self.config.adjust_non_miss_fraction);

        let miss_ns = feedback.actual_present_ns - feedback.desired_present_ns;
        if miss_ns.abs() > self.config.present_slop_ns {
            // Missed present: always grow, never shrink on a miss.
            let previous = self.app_time_ns;
            self.app_time_ns = (self.app_time_ns + step_missed).min(app_time_max);
            log::debug!(
                "Frame {} presented {}; app time {:.3}ms -> {:.3}ms",
                feedback.frame_id,
                format_late_by(feedback.desired_present_ns, feedback.actual_present_ns),
                ns_to_ms_f(previous),
                ns_to_ms_f(self.app_time_ns),
            );
            return;
        }

        let excess_margin = feedback.present_margin_ns - self.config.margin_ns;
        if excess_margin.abs() <= step {
            // Inside the dead band; leave the budget alone.
            return;
        }

        let previous = self.app_time_ns;
        if excess_margin > 0 {
            // Plenty of slack: approach the deadline.
            self.app_time_ns = (self.app_time_ns - step).max(APP_TIME_FLOOR_NS);
        } else {
            // Margin too thin: back off from the deadline.
            self.app_time_ns = (self.app_time_ns + step).min(app_time_max);
        }
        log::trace!(
            "Frame {} margin {:.3}ms (target {:.3}ms); app time {:.3}ms -> {:.3}ms",
            feedback.frame_id,
            ns_to_ms_f(feedback.present_margin_ns),
            ns_to_ms_f(self.config.margin_ns),
            ns_to_ms_f(previous),
            ns_to_ms_f(self.app_time_ns),
        );
    }
}

impl CompositorPacer for DisplayTimingPacer {
    fn predict(&mut self, now_ns: TimeNs) -> CompositorPrediction {
        let period = self.config.frame_period_ns;
        let total = self.total_app_time();

        // Walk forward whole periods until the present time leaves the full
        // producer budget after `now`.
        let mut desired_present_ns = self.walk_baseline(now_ns);
        while desired_present_ns <= now_ns + total {
            desired_present_ns += period;
        }

        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;

        let predicted_display_ns = desired_present_ns + self.config.present_offset_ns;
        let record = self.ring.claim(frame_id);
        record.state = CompFrameState::Predicted;
        record.desired_present_ns = desired_present_ns;
        record.predicted_display_ns = predicted_display_ns;
        record.app_time_at_predict_ns = self.app_time_ns;
        self.last_predicted = Some((frame_id, desired_present_ns));

        CompositorPrediction {
            frame_id,
            wake_up_ns: desired_present_ns - total,
            desired_present_ns,
            present_slop_ns: self.config.present_slop_ns,
            predicted_display_ns,
            predicted_display_period_ns: period,
            min_display_period_ns: period,
        }
    }

    fn mark_point(
        &mut self,
        frame_id: i64,
        point: FramePoint,
        when_ns: TimeNs,
    ) -> PacingResult<()> {
        let record = self
            .ring
            .get_mut(frame_id)
            .ok_or(PacingError::FrameNotFound { frame_id })?;

        match (record.state, point) {
            (CompFrameState::Predicted, FramePoint::WakeUp) => {
                record.state = CompFrameState::Woke;
                record.woke_ns = when_ns;
                Ok(())
            }
            (CompFrameState::Woke, FramePoint::Begin) => {
                record.state = CompFrameState::Began;
                record.began_ns = when_ns;
                Ok(())
            }
            (CompFrameState::Began, FramePoint::Submit) => {
                record.state = CompFrameState::Submitted;
                record.submitted_ns = when_ns;
                Ok(())
            }
            (state, point) => Err(PacingError::InvalidTransition {
                frame_id,
                from: state.name(),
                point: point.name(),
            }),
        }
    }

    fn info(&mut self, feedback: &PresentFeedback) -> PacingResult<()> {
        let Some(record) = self.ring.get_mut(feedback.frame_id) else {
            // Evicted by wraparound: stale data, never an error.
            log::warn!(
                "Discarding stale present feedback for evicted frame {}",
                feedback.frame_id
            );
            return Ok(());
        };

        if record.state != CompFrameState::Submitted {
            return Err(PacingError::InvalidTransition {
                frame_id: feedback.frame_id,
                from: record.state.name(),
                point: "info",
            });
        }
        record.state = CompFrameState::Info;
        record.actual_present_ns = feedback.actual_present_ns;
        record.info_ns = feedback.when_ns;
        self.last_info = Some((feedback.frame_id, feedback.actual_present_ns));

        self.adjust_app_time(feedback);
        Ok(())
    }

    fn app_time_ns(&self) -> TimeNs {
        self.app_time_ns
    }
}

fn fraction_of(period_ns: TimeNs, fraction: f64) -> TimeNs {
    (period_ns as f64 * fraction) as TimeNs
}
