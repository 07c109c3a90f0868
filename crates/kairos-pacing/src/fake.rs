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

//! The open-loop compositor pacer.
//!
//! Used when the backend exposes no presentation feedback at all: presents
//! are predicted purely off a fixed frame period and a configured
//! compositor-time budget. External code can still resync the cadence to an
//! observed vblank or correct the present-to-display offset, which is why
//! this variant implements the two optional mutators.

use crate::record::FrameRing;
use crate::{CompositorPacer, CompositorPrediction};
use kairos_core::compositor::{FramePoint, PresentFeedback};
use kairos_core::config::FakePacerConfig;
use kairos_core::error::{PacingError, PacingResult};
use kairos_core::time::{ns_to_ms_f, TimeNs};

const FAKE_FRAME_RING_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FakeFrameState {
    #[default]
    Predicted,
    Woke,
    Began,
    Submitted,
}

impl FakeFrameState {
    fn name(&self) -> &'static str {
        match self {
            FakeFrameState::Predicted => "Predicted",
            FakeFrameState::Woke => "Woke",
            FakeFrameState::Began => "Began",
            FakeFrameState::Submitted => "Submitted",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FakeFrameRecord {
    state: FakeFrameState,
    predicted_present_ns: TimeNs,
    woke_ns: TimeNs,
    began_ns: TimeNs,
    submitted_ns: TimeNs,
}

/// Open-loop periodic pacer with a fixed compositor-time budget.
#[derive(Debug)]
pub struct FakePacer {
    config: FakePacerConfig,
    /// Present-to-display offset; starts at the configured value and may be
    /// corrected externally via `update_present_offset`.
    present_offset_ns: TimeNs,
    /// The present time handed out last, the base the next one walks from.
    last_present_ns: Option<TimeNs>,
    next_frame_id: i64,
    ring: FrameRing<FakeFrameRecord, FAKE_FRAME_RING_SIZE>,
}

impl FakePacer {
    /// Creates an open-loop pacer for the configured period.
    pub fn new(config: FakePacerConfig) -> Self {
        Self {
            config,
            present_offset_ns: config.present_to_display_offset_ns,
            last_present_ns: None,
            next_frame_id: 0,
            ring: FrameRing::new(),
        }
    }

    /// The compositor-time budget: a fixed fraction of the frame period,
    /// floored at the configured minimum.
    fn comp_time_ns(&self) -> TimeNs {
        let fraction =
            (self.config.frame_period_ns as f64 * self.config.comp_time_fraction) as TimeNs;
        fraction.max(self.config.min_comp_time_ns)
    }
}

impl CompositorPacer for FakePacer {
    fn predict(&mut self, now_ns: TimeNs) -> CompositorPrediction {
        let period = self.config.frame_period_ns;
        let comp_time = self.comp_time_ns();

        // One period after the previous present, advanced by whole periods
        // until the compositor has its full budget before the deadline.
        let mut present_ns = match self.last_present_ns {
            Some(last) => last + period,
            None => now_ns,
        };
        while present_ns < now_ns + comp_time {
            present_ns += period;
        }
        self.last_present_ns = Some(present_ns);

        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;

        let record = self.ring.claim(frame_id);
        record.state = FakeFrameState::Predicted;
        record.predicted_present_ns = present_ns;

        CompositorPrediction {
            frame_id,
            wake_up_ns: present_ns - comp_time,
            desired_present_ns: present_ns,
            present_slop_ns: 0,
            predicted_display_ns: present_ns + self.present_offset_ns,
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
            (FakeFrameState::Predicted, FramePoint::WakeUp) => {
                record.state = FakeFrameState::Woke;
                record.woke_ns = when_ns;
                Ok(())
            }
            (FakeFrameState::Woke, FramePoint::Begin) => {
                record.state = FakeFrameState::Began;
                record.began_ns = when_ns;
                Ok(())
            }
            (FakeFrameState::Began, FramePoint::Submit) => {
                record.state = FakeFrameState::Submitted;
                record.submitted_ns = when_ns;
                // Submission is terminal here: no feedback will ever come to
                // consume the record.
                self.ring.recycle(frame_id);
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
        // Open loop by definition: record nothing, adjust nothing. Seeing
        // feedback here usually means the backend grew real timing support
        // and should be driven by the display-timing pacer instead.
        log::debug!(
            "Open-loop pacer ignoring present feedback for frame {}",
            feedback.frame_id
        );
        Ok(())
    }

    fn app_time_ns(&self) -> TimeNs {
        // Everything up to the compositor's own slice belongs to the apps.
        self.config.frame_period_ns - self.comp_time_ns()
    }

    fn update_vblank_from_display_control(&mut self, last_vblank_ns: TimeNs) {
        log::debug!(
            "Resyncing open-loop cadence to vblank at {:.3}ms",
            ns_to_ms_f(last_vblank_ns)
        );
        self.last_present_ns = Some(last_vblank_ns);
    }

    fn update_present_offset(&mut self, frame_id: i64, present_offset_ns: TimeNs) {
        log::debug!(
            "Frame {frame_id}: measured present offset {:.3}ms (was {:.3}ms)",
            ns_to_ms_f(present_offset_ns),
            ns_to_ms_f(self.present_offset_ns)
        );
        self.present_offset_ns = present_offset_ns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::time::ms_to_ns;

    const PERIOD: TimeNs = 16_666_666;

    #[test]
    fn presents_advance_by_whole_periods() {
        let mut p = FakePacer::new(FakePacerConfig::for_period(PERIOD));
        let now = ms_to_ns(100);

        let a = p.predict(now);
        let b = p.predict(now);
        let c = p.predict(now);
        assert_eq!(b.desired_present_ns - a.desired_present_ns, PERIOD);
        assert_eq!(c.desired_present_ns - b.desired_present_ns, PERIOD);
        assert_eq!(a.predicted_display_ns, a.desired_present_ns + ms_to_ns(4));
    }

    #[test]
    fn wake_up_leaves_the_comp_time_budget() {
        let mut p = FakePacer::new(FakePacerConfig::for_period(PERIOD));
        let comp_time = p.comp_time_ns();
        assert_eq!(comp_time, (PERIOD as f64 * 0.20) as TimeNs);

        let now = ms_to_ns(100);
        let pred = p.predict(now);
        assert_eq!(pred.desired_present_ns - pred.wake_up_ns, comp_time);
        assert!(pred.wake_up_ns >= now);
    }

    #[test]
    fn comp_time_is_floored_for_fast_panels() {
        // 500 Hz: 20% of the period would be only 0.4ms.
        let p = FakePacer::new(FakePacerConfig::for_period(2_000_000));
        assert_eq!(p.comp_time_ns(), ms_to_ns(2));
    }

    #[test]
    fn vblank_resync_shifts_the_cadence() {
        let mut p = FakePacer::new(FakePacerConfig::for_period(PERIOD));
        let now = ms_to_ns(100);
        let _ = p.predict(now);

        // An observed vblank 3ms into the old cadence.
        let vblank = ms_to_ns(100) + ms_to_ns(3);
        p.update_vblank_from_display_control(vblank);

        let pred = p.predict(now + PERIOD);
        assert_eq!((pred.desired_present_ns - vblank) % PERIOD, 0);
    }

    #[test]
    fn present_offset_correction_applies_to_later_frames() {
        let mut p = FakePacer::new(FakePacerConfig::for_period(PERIOD));
        let a = p.predict(ms_to_ns(100));
        p.update_present_offset(a.frame_id, ms_to_ns(6));
        let b = p.predict(ms_to_ns(100));
        assert_eq!(b.predicted_display_ns, b.desired_present_ns + ms_to_ns(6));
    }

    #[test]
    fn submit_is_terminal() {
        let mut p = FakePacer::new(FakePacerConfig::for_period(PERIOD));
        let pred = p.predict(ms_to_ns(100));
        p.mark_point(pred.frame_id, FramePoint::WakeUp, pred.wake_up_ns)
            .unwrap();
        p.mark_point(pred.frame_id, FramePoint::Begin, pred.wake_up_ns)
            .unwrap();
        p.mark_point(pred.frame_id, FramePoint::Submit, pred.desired_present_ns)
            .unwrap();
        assert!(matches!(
            p.mark_point(pred.frame_id, FramePoint::Submit, pred.desired_present_ns),
            Err(PacingError::FrameNotFound { .. })
        ));
    }
}
