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

//! The per-client session handle.
//!
//! [`ClientSession`] is the application-facing side of the scheduler: it
//! runs on the client's own thread and talks to the scheduler thread only
//! through the shared state in [`ClientShared`]. Frame timing comes from a
//! private [`AppPacer`] the scheduler feeds every tick, and finished layer
//! lists travel through the triple-buffered [`SlotPair`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use kairos_core::compositor::FramePoint;
use kairos_core::config::MultiConfig;
use kairos_core::error::{PacingError, PacingResult};
use kairos_core::event::{ClientEvent, ClientEventQueue};
use kairos_core::layer::{EnvBlendMode, LayerEntry};
use kairos_core::telemetry::PacingEvent;
use kairos_core::time::{Clock, TimeNs};
use kairos_pacing::{AppFramePrediction, AppPacer};

use crate::scheduler::Wakeup;
use crate::slot::{LayerSlot, SlotPair};

/// Scheduler-visible state of one client, guarded by its own mutex.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClientState {
    /// Whether the client's layers are composited this tick.
    pub visible: bool,
    /// Whether the client has input focus.
    pub focused: bool,
    /// Composition order. Lower values are composited first (farther back).
    pub z_order: i64,
    /// Whether the client has begun its session.
    pub session_active: bool,
    /// Set when the session handle is dropped; the scheduler prunes the
    /// client on its next tick.
    pub disconnected: bool,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            visible: false,
            focused: false,
            z_order: 0,
            session_active: false,
            disconnected: false,
        }
    }
}

/// State shared between one client thread and the scheduler thread.
pub(crate) struct ClientShared {
    /// Stable index assigned at connect time, used for telemetry.
    pub index: usize,
    /// The scheduled/delivered halves of the triple buffer.
    pub slots: Mutex<SlotPair>,
    /// Scheduler -> client notifications.
    pub events: ClientEventQueue,
    pub state: Mutex<ClientState>,
    /// The client's frame-timing model. The scheduler pushes a timing
    /// sample in every tick; the client predicts and marks from its side.
    pub pacer: Mutex<AppPacer>,
    /// Display-time target of the system frame currently in production,
    /// stored by the scheduler before it sleeps so a client racing to
    /// commit knows the slot it is aiming for.
    pub next_frame_display_ns: AtomicI64,
}

impl ClientShared {
    pub fn new(index: usize, config: &MultiConfig, pacer: AppPacer) -> Self {
        Self {
            index,
            slots: Mutex::new(SlotPair::new(config.max_layers)),
            events: ClientEventQueue::new(),
            state: Mutex::new(ClientState::default()),
            pacer: Mutex::new(pacer),
            next_frame_display_ns: AtomicI64::new(0),
        }
    }
}

/// A connected application session.
///
/// Owned by the client thread. Dropping it disconnects the client; the
/// scheduler removes it on the next tick.
pub struct ClientSession {
    shared: Arc<ClientShared>,
    clock: Arc<dyn Clock>,
    config: MultiConfig,
    telemetry: crossbeam_channel::Sender<PacingEvent>,
    wakeup: Arc<Wakeup>,
    /// The in-progress layer slot, exclusively owned between `layer_begin`
    /// and `layer_commit`; swapped into the shared pair at commit.
    progress: LayerSlot,
    /// Frame id and display time of the layer list currently open.
    open_frame: Option<(i64, TimeNs)>,
}

impl ClientSession {
    pub(crate) fn new(
        shared: Arc<ClientShared>,
        clock: Arc<dyn Clock>,
        config: MultiConfig,
        telemetry: crossbeam_channel::Sender<PacingEvent>,
        wakeup: Arc<Wakeup>,
    ) -> Self {
        let progress = LayerSlot::with_capacity(config.max_layers);
        Self {
            shared,
            clock,
            config,
            telemetry,
            wakeup,
            progress,
            open_frame: None,
        }
    }

    /// The index assigned at connect time.
    pub fn index(&self) -> usize {
        self.shared.index
    }

    /// Begins the client's session, making it eligible for composition.
    ///
    /// The scheduler picks the change up on its next state evaluation and
    /// begins the native session if this is the first active client.
    pub fn begin_session(&self) -> PacingResult<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.session_active {
                log::warn!("Client {}: begin_session while already active", self.shared.index);
                return Ok(());
            }
            state.session_active = true;
        }
        self.wakeup.notify();
        Ok(())
    }

    /// Ends the client's session.
    pub fn end_session(&self) -> PacingResult<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if !state.session_active {
                return Err(PacingError::SessionNotActive);
            }
            state.session_active = false;
        }
        self.wakeup.notify();
        Ok(())
    }

    /// Predicts the next frame and sleeps until its wake-up time.
    ///
    /// Blocks the calling client thread; the scheduler keeps running. Fails
    /// with [`PacingError::NotReady`] until the scheduler has pushed the
    /// first timing sample (one tick after connecting).
    pub fn wait_frame(&self) -> PacingResult<AppFramePrediction> {
        let prediction = {
            let mut pacer = self.shared.pacer.lock().unwrap();
            pacer.predict(self.clock.now_ns())?
        };
        // Sleep outside the pacer lock so the scheduler's timing broadcast
        // is never blocked on a sleeping client.
        self.clock.sleep_until(prediction.wake_up_ns);
        let mut pacer = self.shared.pacer.lock().unwrap();
        pacer.mark_point(prediction.frame_id, FramePoint::WakeUp, self.clock.now_ns())?;
        Ok(prediction)
    }

    /// Marks the start of CPU-side rendering work for `frame_id`.
    pub fn begin_frame(&self, frame_id: i64) -> PacingResult<()> {
        let mut pacer = self.shared.pacer.lock().unwrap();
        pacer.mark_point(frame_id, FramePoint::Begin, self.clock.now_ns())
    }

    /// Abandons a waited or begun frame without submitting layers.
    pub fn discard_frame(&mut self, frame_id: i64) -> PacingResult<()> {
        {
            let mut pacer = self.shared.pacer.lock().unwrap();
            pacer.mark_discarded(frame_id, self.clock.now_ns())?;
        }
        // A half-built layer list dies with its frame.
        if matches!(self.open_frame, Some((open_id, _)) if open_id == frame_id) {
            self.open_frame = None;
            self.progress.clear();
        }
        let _ = self.telemetry.try_send(PacingEvent::FrameDiscarded {
            client_index: self.shared.index,
            frame_id,
        });
        Ok(())
    }

    /// Opens the layer list for `frame_id`, to be shown at `display_time_ns`.
    pub fn layer_begin(
        &mut self,
        frame_id: i64,
        display_time_ns: TimeNs,
        env_blend_mode: EnvBlendMode,
    ) -> PacingResult<()> {
        if let Some((open_id, _)) = self.open_frame {
            log::warn!(
                "Client {}: layer_begin for frame {frame_id} discards open frame {open_id}",
                self.shared.index
            );
        }
        self.progress.clear();
        self.progress.display_time_ns = display_time_ns;
        self.progress.env_blend_mode = env_blend_mode;
        self.open_frame = Some((frame_id, display_time_ns));
        Ok(())
    }

    /// Appends one layer to the open layer list.
    pub fn layer_push(&mut self, entry: LayerEntry) -> PacingResult<()> {
        let (frame_id, _) = self.open_frame.ok_or(PacingError::NotReady)?;
        if self.progress.layers.len() >= self.config.max_layers {
            return Err(PacingError::CapacityExceeded {
                limit: self.config.max_layers,
            });
        }
        log::trace!(
            "Client {}: frame {frame_id} layer {} ({})",
            self.shared.index,
            self.progress.layers.len(),
            entry.data.kind()
        );
        self.progress.layers.push(entry);
        Ok(())
    }

    /// Commits the open layer list, handing it to the scheduler.
    ///
    /// Blocks while the previously committed frame still sits unconsumed in
    /// the scheduled slot, polling at the configured interval. The wait is
    /// bounded by the scheduler's broadcast display target: once the
    /// scheduled frame's display time is at or before that target, the
    /// scheduler either takes it this tick or has skipped it, and the new
    /// frame may replace it. This is the sole backpressure keeping a client
    /// at most one frame ahead.
    pub fn layer_commit(&mut self) -> PacingResult<()> {
        let (frame_id, display_time_ns) = self.open_frame.take().ok_or(PacingError::NotReady)?;
        {
            let mut pacer = self.shared.pacer.lock().unwrap();
            pacer.mark_delivered(frame_id, self.clock.now_ns(), display_time_ns)?;
        }
        self.progress.active = true;

        loop {
            {
                let mut slots = self.shared.slots.lock().unwrap();
                let target_ns = self.shared.next_frame_display_ns.load(Ordering::Acquire);
                if !slots.scheduled.active || slots.scheduled.display_time_ns <= target_ns {
                    slots.publish(&mut self.progress);
                    break;
                }
            }
            let now_ns = self.clock.now_ns();
            self.clock.sleep_until(now_ns + self.config.commit_poll_interval_ns);
        }
        self.wakeup.notify();
        Ok(())
    }

    /// Reports GPU completion for `frame_id`, closing the pacing loop so the
    /// pacer can learn the frame's true cost.
    pub fn notify_gpu_done(&self, frame_id: i64) -> PacingResult<()> {
        let mut pacer = self.shared.pacer.lock().unwrap();
        pacer.mark_gpu_done(frame_id, self.clock.now_ns())
    }

    /// The display-time target the scheduler most recently broadcast for
    /// the frame it is producing. Zero until the first tick.
    pub fn next_frame_display_ns(&self) -> TimeNs {
        self.shared.next_frame_display_ns.load(Ordering::Acquire)
    }

    /// Removes and returns the oldest pending scheduler notification.
    pub fn poll_event(&self) -> Option<ClientEvent> {
        self.shared.events.poll()
    }

    /// Whether the scheduler currently composites this client's layers.
    pub fn is_visible(&self) -> bool {
        self.shared.state.lock().unwrap().visible
    }

    /// Whether this client has input focus.
    pub fn is_focused(&self) -> bool {
        self.shared.state.lock().unwrap().focused
    }

    /// Sets the client's composition depth. Lower values are composited
    /// first.
    pub fn set_z_order(&self, z_order: i64) {
        self.shared.state.lock().unwrap().z_order = z_order;
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        let drained = self.shared.events.drain();
        if drained > 0 {
            log::debug!(
                "Client {}: dropped with {drained} unpolled events",
                self.shared.index
            );
        }
        {
            // Release swapchain references now rather than when the
            // scheduler gets around to pruning.
            let mut slots = self.shared.slots.lock().unwrap();
            slots.scheduled.clear();
            slots.delivered.clear();
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.session_active = false;
            state.disconnected = true;
        }
        self.wakeup.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::config::AppPacerConfig;
    use kairos_core::layer::{LayerData, Swapchain, SwapchainRef};
    use kairos_core::time::{ms_to_ns, ManualClock};

    struct TestSwapchain;
    impl Swapchain for TestSwapchain {
        fn id(&self) -> u64 {
            7
        }
    }

    fn test_session() -> (ClientSession, Arc<ClientShared>, Arc<ManualClock>) {
        let config = MultiConfig::default();
        let clock = Arc::new(ManualClock::new(0));
        let shared = Arc::new(ClientShared::new(
            0,
            &config,
            AppPacer::new(AppPacerConfig::default()),
        ));
        let (telemetry, _rx) = crossbeam_channel::bounded(16);
        let session = ClientSession::new(
            Arc::clone(&shared),
            clock.clone(),
            config,
            telemetry,
            Arc::new(Wakeup::new()),
        );
        (session, shared, clock)
    }

    fn cube_entry() -> LayerEntry {
        let sc: SwapchainRef = Arc::new(TestSwapchain);
        LayerEntry::with_one(sc, LayerData::Cube)
    }

    #[test]
    fn wait_frame_before_first_timing_sample_is_not_ready() {
        let (session, _shared, _clock) = test_session();
        assert!(matches!(session.wait_frame(), Err(PacingError::NotReady)));
    }

    #[test]
    fn commit_without_open_layer_list_is_not_ready() {
        let (mut session, _shared, _clock) = test_session();
        assert!(matches!(session.layer_commit(), Err(PacingError::NotReady)));
    }

    #[test]
    fn layer_push_enforces_the_layer_limit() {
        let (mut session, _shared, _clock) = test_session();
        session
            .layer_begin(0, ms_to_ns(16), EnvBlendMode::Opaque)
            .unwrap();
        for _ in 0..MultiConfig::default().max_layers {
            session.layer_push(cube_entry()).unwrap();
        }
        assert!(matches!(
            session.layer_push(cube_entry()),
            Err(PacingError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn commit_publishes_into_the_scheduled_slot() {
        let (mut session, shared, clock) = test_session();

        // Prime the pacer the way the scheduler does every tick.
        shared
            .pacer
            .lock()
            .unwrap()
            .info(ms_to_ns(16), ms_to_ns(16), ms_to_ns(4));

        let prediction = session.wait_frame().unwrap();
        session.begin_frame(prediction.frame_id).unwrap();
        clock.advance(ms_to_ns(1));
        session
            .layer_begin(
                prediction.frame_id,
                prediction.predicted_display_ns,
                EnvBlendMode::Opaque,
            )
            .unwrap();
        session.layer_push(cube_entry()).unwrap();
        session.layer_commit().unwrap();

        let slots = shared.slots.lock().unwrap();
        assert!(slots.scheduled.active);
        assert_eq!(slots.scheduled.display_time_ns, prediction.predicted_display_ns);
        assert_eq!(slots.scheduled.layers.len(), 1);
    }

    #[test]
    fn discard_clears_a_half_built_layer_list() {
        let (mut session, shared, clock) = test_session();
        shared
            .pacer
            .lock()
            .unwrap()
            .info(ms_to_ns(16), ms_to_ns(16), ms_to_ns(4));

        let prediction = session.wait_frame().unwrap();
        clock.advance(ms_to_ns(1));
        session
            .layer_begin(
                prediction.frame_id,
                prediction.predicted_display_ns,
                EnvBlendMode::Opaque,
            )
            .unwrap();
        session.layer_push(cube_entry()).unwrap();
        session.discard_frame(prediction.frame_id).unwrap();

        assert!(matches!(session.layer_commit(), Err(PacingError::NotReady)));
    }

    #[test]
    fn end_session_without_begin_fails() {
        let (session, _shared, _clock) = test_session();
        assert!(matches!(
            session.end_session(),
            Err(PacingError::SessionNotActive)
        ));
    }

    #[test]
    fn drop_marks_the_client_disconnected() {
        let (session, shared, _clock) = test_session();
        session.begin_session().unwrap();
        drop(session);
        let state = shared.state.lock().unwrap();
        assert!(state.disconnected);
        assert!(!state.session_active);
    }
}
