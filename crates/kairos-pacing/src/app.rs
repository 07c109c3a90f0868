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

//! The per-application pacer.
//!
//! One instance per connected session. It predicts when the application
//! should wake up and which display time to target, tracks each in-flight
//! frame through a small state machine, and learns the application's real
//! CPU/draw/wait costs from completed frames so slow applications get a
//! whole multiple of the display period instead of an impossible budget.

use crate::record::FrameRing;
use kairos_core::compositor::FramePoint;
use kairos_core::config::AppPacerConfig;
use kairos_core::error::{PacingError, PacingResult};
use kairos_core::time::{ns_to_ms_f, TimeNs};

/// In-flight frames tracked per application. Applications run at most a
/// couple of frames deep, so a small ring is plenty.
const APP_FRAME_RING_SIZE: usize = 8;

/// Lifecycle of one application frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AppFrameState {
    /// Freshly predicted, application not yet awake.
    #[default]
    Predicted,
    /// Application thread woke up.
    WokeUp,
    /// Application began CPU-side frame work.
    Begun,
    /// Application submitted its layers; awaiting GPU completion.
    Delivered,
}

impl AppFrameState {
    fn name(&self) -> &'static str {
        match self {
            AppFrameState::Predicted => "Predicted",
            AppFrameState::WokeUp => "WokeUp",
            AppFrameState::Begun => "Begun",
            AppFrameState::Delivered => "Delivered",
        }
    }
}

/// Ring-buffer payload for one application frame.
#[derive(Debug, Clone, Copy, Default)]
struct AppFrameRecord {
    state: AppFrameState,
    /// When we told the application to wake up.
    predicted_wake_up_ns: TimeNs,
    /// When GPU work should complete for the frame to make its deadline.
    predicted_gpu_done_ns: TimeNs,
    /// The display time handed out by `predict`.
    predicted_display_ns: TimeNs,
    /// When the application actually woke up.
    wake_up_ns: TimeNs,
    /// When CPU-side work began.
    begin_ns: TimeNs,
    /// When layers were delivered.
    delivered_ns: TimeNs,
    /// Display time the application reported at delivery. May differ from
    /// the predicted one.
    display_time_ns: TimeNs,
}

/// The timing sample last pushed in by the scheduler.
#[derive(Debug, Clone, Copy)]
struct TimingInput {
    predicted_display_ns: TimeNs,
    predicted_display_period_ns: TimeNs,
    /// Compositor-side time between the scheduler waking and the display
    /// deadline; the application must finish this much earlier.
    extra_ns: TimeNs,
}

/// The result of one [`AppPacer::predict`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppFramePrediction {
    /// Identifier for the new frame.
    pub frame_id: i64,
    /// When the application should wake up.
    pub wake_up_ns: TimeNs,
    /// The display time to render for.
    pub predicted_display_ns: TimeNs,
    /// The effective display period for this application (a whole multiple
    /// of the system period when the application is slow).
    pub predicted_display_period_ns: TimeNs,
}

/// Predicts frame timing for one application session and learns its costs.
#[derive(Debug)]
pub struct AppPacer {
    config: AppPacerConfig,
    /// Learned CPU-side cost, exponentially filtered.
    cpu_time_ns: TimeNs,
    /// Learned draw/submit cost.
    draw_time_ns: TimeNs,
    /// Learned GPU wait cost.
    wait_time_ns: TimeNs,
    last_input: Option<TimingInput>,
    /// Display time handed out by the most recent prediction; later
    /// predictions never go backwards past it.
    last_returned_ns: TimeNs,
    next_frame_id: i64,
    ring: FrameRing<AppFrameRecord, APP_FRAME_RING_SIZE>,
}

impl AppPacer {
    /// Creates a pacer with the configured default cost estimates.
    pub fn new(config: AppPacerConfig) -> Self {
        Self {
            config,
            cpu_time_ns: config.default_cpu_time_ns,
            draw_time_ns: config.default_draw_time_ns,
            wait_time_ns: config.default_wait_time_ns,
            last_input: None,
            last_returned_ns: 0,
            next_frame_id: 0,
            ring: FrameRing::new(),
        }
    }

    /// The scheduler pushes the system's timing into this pacer every tick.
    pub fn info(
        &mut self,
        predicted_display_ns: TimeNs,
        predicted_display_period_ns: TimeNs,
        extra_ns: TimeNs,
    ) {
        if predicted_display_period_ns <= 0 {
            log::warn!("Ignoring timing sample with non-positive period");
            return;
        }
        self.last_input = Some(TimingInput {
            predicted_display_ns,
            predicted_display_period_ns,
            extra_ns,
        });
    }

    /// Predicts the next frame: wake-up time, display time, display period.
    ///
    /// Returns [`PacingError::NotReady`] until the first [`info`](Self::info)
    /// sample arrives, since the display period is unknown before then.
    pub fn predict(&mut self, now_ns: TimeNs) -> PacingResult<AppFramePrediction> {
        let input = self.last_input.ok_or(PacingError::NotReady)?;

        let period = self.calc_period(&input);
        let total = self.total_time(&input);

        // Start at the system's display time and step forward whole periods
        // until the slot both clears the previous prediction by half a
        // period (robustness against jittered samples) and leaves the full
        // budget of lead time before the deadline.
        let mut predict_ns = input.predicted_display_ns;
        while predict_ns <= self.last_returned_ns + period / 2 || predict_ns - total <= now_ns {
            predict_ns += period;
        }
        self.last_returned_ns = predict_ns;

        let wake_up_ns = predict_ns - total;
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;

        let record = self.ring.claim(frame_id);
        record.state = AppFrameState::Predicted;
        record.predicted_wake_up_ns = wake_up_ns;
        record.predicted_gpu_done_ns = predict_ns - self.config.margin_ns - input.extra_ns;
        record.predicted_display_ns = predict_ns;

        log::trace!(
            "App frame {frame_id}: wake {:.3}ms before display, period {:.3}ms",
            ns_to_ms_f(total),
            ns_to_ms_f(period)
        );

        Ok(AppFramePrediction {
            frame_id,
            wake_up_ns,
            predicted_display_ns: predict_ns,
            predicted_display_period_ns: period,
        })
    }

    /// Records that the application passed `point` for `frame_id`.
    ///
    /// Only `WakeUp` (from `Predicted`) and `Begin` (from `WokeUp`) are legal
    /// here; delivery and GPU completion have their own entry points.
    pub fn mark_point(
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
            (AppFrameState::Predicted, FramePoint::WakeUp) => {
                record.state = AppFrameState::WokeUp;
                record.wake_up_ns = when_ns;
                Ok(())
            }
            (AppFrameState::WokeUp, FramePoint::Begin) => {
                record.state = AppFrameState::Begun;
                record.begin_ns = when_ns;
                Ok(())
            }
            (state, point) => Err(PacingError::InvalidTransition {
                frame_id,
                from: state.name(),
                point: point.name(),
            }),
        }
    }

    /// Abandons a woken or begun frame; a clean state reset, not an abort of
    /// in-flight GPU work.
    pub fn mark_discarded(&mut self, frame_id: i64, when_ns: TimeNs) -> PacingResult<()> {
        let record = self
            .ring
            .get_mut(frame_id)
            .ok_or(PacingError::FrameNotFound { frame_id })?;

        match record.state {
            AppFrameState::WokeUp | AppFrameState::Begun => {
                log::debug!(
                    "App frame {frame_id} discarded {:.3}ms after wake-up",
                    ns_to_ms_f(when_ns - record.wake_up_ns)
                );
                self.ring.recycle(frame_id);
                Ok(())
            }
            state => Err(PacingError::InvalidTransition {
                frame_id,
                from: state.name(),
                point: "discard",
            }),
        }
    }

    /// Records that the application delivered its layers, targeting
    /// `display_time_ns` (which may differ from the predicted display time).
    pub fn mark_delivered(
        &mut self,
        frame_id: i64,
        when_ns: TimeNs,
        display_time_ns: TimeNs,
    ) -> PacingResult<()> {
        let record = self
            .ring
            .get_mut(frame_id)
            .ok_or(PacingError::FrameNotFound { frame_id })?;

        match record.state {
            AppFrameState::Begun => {
                record.state = AppFrameState::Delivered;
                record.delivered_ns = when_ns;
                record.display_time_ns = display_time_ns;
                Ok(())
            }
            state => Err(PacingError::InvalidTransition {
                frame_id,
                from: state.name(),
                point: "delivered",
            }),
        }
    }

    /// Records GPU completion and feeds the observed stage durations through
    /// the asymmetric IIR filter, then recycles the frame's slot.
    pub fn mark_gpu_done(&mut self, frame_id: i64, when_ns: TimeNs) -> PacingResult<()> {
        let record = *self
            .ring
            .get(frame_id)
            .ok_or(PacingError::FrameNotFound { frame_id })?;

        if record.state != AppFrameState::Delivered {
            return Err(PacingError::InvalidTransition {
                frame_id,
                from: record.state.name(),
                point: "gpu_done",
            });
        }

        // Negative diff means the GPU finished later than the slot we
        // budgeted for, so adapt with the "late" coefficient.
        let diff_ns = record.predicted_gpu_done_ns - when_ns;
        let alpha = if diff_ns < 0 {
            self.config.alpha_late
        } else {
            self.config.alpha_early
        };

        let observed_cpu = record.begin_ns - record.wake_up_ns;
        let observed_draw = record.delivered_ns - record.begin_ns;
        let observed_wait = when_ns - record.delivered_ns;

        self.cpu_time_ns = filter_ns(self.cpu_time_ns, observed_cpu, alpha);
        self.draw_time_ns = filter_ns(self.draw_time_ns, observed_draw, alpha);
        self.wait_time_ns = filter_ns(self.wait_time_ns, observed_wait, alpha);

        log::trace!(
            "App frame {frame_id} gpu done {:.3}ms {} budget; costs now cpu {:.3} draw {:.3} wait {:.3} (ms)",
            ns_to_ms_f(diff_ns.abs()),
            if diff_ns < 0 { "over" } else { "under" },
            ns_to_ms_f(self.cpu_time_ns),
            ns_to_ms_f(self.draw_time_ns),
            ns_to_ms_f(self.wait_time_ns),
        );

        self.ring.recycle(frame_id);
        Ok(())
    }

    /// The learned `(cpu, draw, wait)` cost estimates, for diagnostics.
    pub fn learned_times_ns(&self) -> (TimeNs, TimeNs, TimeNs) {
        (self.cpu_time_ns, self.draw_time_ns, self.wait_time_ns)
    }

    /// Display time handed out by the most recent prediction.
    pub fn last_returned_ns(&self) -> TimeNs {
        self.last_returned_ns
    }

    /// The display period, multiplied upward until it exceeds the largest
    /// learned cost. A frame that takes 20 ms cannot hit every 16.6 ms slot;
    /// giving it every second slot keeps its cadence honest.
    fn calc_period(&self, input: &TimingInput) -> TimeNs {
        let base = input.predicted_display_period_ns;
        let biggest = self
            .cpu_time_ns
            .max(self.draw_time_ns)
            .max(self.wait_time_ns);
        let mut period = base;
        while period < biggest {
            period += base;
        }
        period
    }

    /// Application time plus margin plus the compositor-side share.
    fn total_time(&self, input: &TimingInput) -> TimeNs {
        let app_time =
            (self.cpu_time_ns + self.draw_time_ns + self.wait_time_ns).max(self.config.min_app_time_ns);
        app_time + self.config.margin_ns + input.extra_ns
    }
}

/// One step of the exponential filter: move `alpha` of the way from the
/// current estimate toward the observation.
fn filter_ns(current: TimeNs, observed: TimeNs, alpha: f64) -> TimeNs {
    current + ((observed - current) as f64 * alpha) as TimeNs
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::time::ms_to_ns;

    const PERIOD_60HZ: TimeNs = 16_600_000;

    /// Builds a pacer that has received one timing sample, as it always has
    /// in practice before an application can predict.
    fn primed_pacer(now_ns: TimeNs) -> AppPacer {
        let mut pacer = AppPacer::new(AppPacerConfig::default());
        pacer.info(now_ns + PERIOD_60HZ, PERIOD_60HZ, ms_to_ns(1));
        pacer
    }

    #[test]
    fn predict_before_any_sample_is_not_ready() {
        let mut pacer = AppPacer::new(AppPacerConfig::default());
        assert_eq!(pacer.predict(ms_to_ns(100)), Err(PacingError::NotReady));
    }

    // Scenario: fresh pacer at 16.6ms, no completed frames. The first
    // prediction must come from the default cost estimates and must not
    // fail or hand out a wake-up time in the past.
    #[test]
    fn first_predict_uses_default_costs() {
        let now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);

        let prediction = pacer.predict(now).expect("one sample is enough");
        assert_eq!(prediction.frame_id, 0);
        assert_eq!(prediction.predicted_display_period_ns, PERIOD_60HZ);
        assert!(prediction.wake_up_ns > now, "never wake up in the past");
        // defaults: cpu 2 + draw 2 + wait 1 + margin 2 + extra 1 = 8ms of lead.
        assert_eq!(
            prediction.predicted_display_ns - prediction.wake_up_ns,
            ms_to_ns(8)
        );
    }

    #[test]
    fn successive_predictions_are_strictly_monotonic() {
        let now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);

        let mut last = 0;
        for i in 0..32 {
            let p = pacer.predict(now + i * PERIOD_60HZ / 4).unwrap();
            assert!(
                p.predicted_display_ns > last + PERIOD_60HZ / 2,
                "display time must clear the previous one by half a period"
            );
            assert!(p.wake_up_ns >= now + i * PERIOD_60HZ / 4);
            last = p.predicted_display_ns;
        }
    }

    #[test]
    fn state_machine_rejects_out_of_order_marks() {
        let now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);
        let p = pacer.predict(now).unwrap();

        // Begin before WakeUp.
        assert!(matches!(
            pacer.mark_point(p.frame_id, FramePoint::Begin, p.wake_up_ns),
            Err(PacingError::InvalidTransition { .. })
        ));
        // GPU-done before delivery.
        assert!(matches!(
            pacer.mark_gpu_done(p.frame_id, p.wake_up_ns),
            Err(PacingError::InvalidTransition { .. })
        ));
        // Discard before wake-up is also illegal.
        assert!(matches!(
            pacer.mark_discarded(p.frame_id, p.wake_up_ns),
            Err(PacingError::InvalidTransition { .. })
        ));

        // The legal order goes through.
        pacer
            .mark_point(p.frame_id, FramePoint::WakeUp, p.wake_up_ns)
            .unwrap();
        pacer
            .mark_point(p.frame_id, FramePoint::Begin, p.wake_up_ns + ms_to_ns(1))
            .unwrap();
        pacer
            .mark_delivered(
                p.frame_id,
                p.wake_up_ns + ms_to_ns(3),
                p.predicted_display_ns,
            )
            .unwrap();
        pacer
            .mark_gpu_done(p.frame_id, p.wake_up_ns + ms_to_ns(4))
            .unwrap();

        // Fully consumed: the slot is recycled.
        assert!(matches!(
            pacer.mark_gpu_done(p.frame_id, p.wake_up_ns + ms_to_ns(5)),
            Err(PacingError::FrameNotFound { .. })
        ));
    }

    #[test]
    fn unknown_frame_id_is_not_found() {
        let now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);
        assert_eq!(
            pacer.mark_point(42, FramePoint::WakeUp, now),
            Err(PacingError::FrameNotFound { frame_id: 42 })
        );
    }

    /// Runs one full frame with the given observed stage durations.
    fn run_frame(pacer: &mut AppPacer, now_ns: TimeNs, cpu: TimeNs, draw: TimeNs, wait: TimeNs) {
        let p = pacer.predict(now_ns).unwrap();
        let wake = p.wake_up_ns;
        pacer.mark_point(p.frame_id, FramePoint::WakeUp, wake).unwrap();
        pacer
            .mark_point(p.frame_id, FramePoint::Begin, wake + cpu)
            .unwrap();
        pacer
            .mark_delivered(p.frame_id, wake + cpu + draw, p.predicted_display_ns)
            .unwrap();
        pacer
            .mark_gpu_done(p.frame_id, wake + cpu + draw + wait)
            .unwrap();
    }

    #[test]
    fn iir_converges_to_constant_observations() {
        let mut now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);

        let (cpu, draw, wait) = (ms_to_ns(4), ms_to_ns(3), ms_to_ns(2));
        for _ in 0..20 {
            run_frame(&mut pacer, now, cpu, draw, wait);
            now += PERIOD_60HZ;
            pacer.info(now + PERIOD_60HZ, PERIOD_60HZ, ms_to_ns(1));
        }

        // Geometric convergence at rate (1 - alpha) = 0.2: after 20 frames
        // the estimates are within microseconds of the observations.
        let (c, d, w) = pacer.learned_times_ns();
        assert!((c - cpu).abs() < 10_000, "cpu estimate {c} vs {cpu}");
        assert!((d - draw).abs() < 10_000, "draw estimate {d} vs {draw}");
        assert!((w - wait).abs() < 10_000, "wait estimate {w} vs {wait}");
    }

    #[test]
    fn slow_app_gets_a_whole_multiple_of_the_period() {
        let mut now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);

        // Draw takes ~2.2 periods; the learned cost pushes the effective
        // period to three display periods.
        for _ in 0..20 {
            run_frame(&mut pacer, now, ms_to_ns(2), 37_000_000, ms_to_ns(1));
            now += 3 * PERIOD_60HZ;
            pacer.info(now + PERIOD_60HZ, PERIOD_60HZ, ms_to_ns(1));
        }

        let p = pacer.predict(now).unwrap();
        assert_eq!(p.predicted_display_period_ns, 3 * PERIOD_60HZ);
    }

    #[test]
    fn discard_resets_the_slot_for_reuse() {
        let now = ms_to_ns(1000);
        let mut pacer = primed_pacer(now);
        let p = pacer.predict(now).unwrap();
        pacer
            .mark_point(p.frame_id, FramePoint::WakeUp, p.wake_up_ns)
            .unwrap();
        pacer.mark_discarded(p.frame_id, p.wake_up_ns + ms_to_ns(1)).unwrap();

        assert!(matches!(
            pacer.mark_point(p.frame_id, FramePoint::Begin, now),
            Err(PacingError::FrameNotFound { .. })
        ));

        // The pacer keeps handing out predictions afterwards.
        let p2 = pacer.predict(now + PERIOD_60HZ).unwrap();
        assert!(p2.predicted_display_ns > p.predicted_display_ns);
    }
}
