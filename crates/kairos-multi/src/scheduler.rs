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

//! The multi-client frame scheduler.
//!
//! One dedicated thread owns the native compositor and the system-wide
//! pacer. Every tick it predicts the next frame, sleeps to its wake-up
//! time, broadcasts the timing into each client's pacer, migrates each
//! client's newest delivered layers, and commits a single merged layer
//! list back to the native compositor in z order.
//!
//! Client threads never touch the native compositor; everything crosses
//! over through [`ClientShared`] and the two channels (presentation
//! feedback in, telemetry out).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};

use kairos_core::compositor::{FramePoint, NativeCompositor, PresentFeedback, ViewType};
use kairos_core::config::{AppPacerConfig, MultiConfig};
use kairos_core::error::{PacingError, PacingResult};
use kairos_core::event::ClientEvent;
use kairos_core::layer::{EnvBlendMode, LayerEntry};
use kairos_core::telemetry::PacingEvent;
use kairos_core::time::{Clock, TimeNs};
use kairos_pacing::{AppPacer, CompositorPacer, CompositorPrediction};

use crate::client::{ClientSession, ClientShared};
use crate::session::{advance, SessionAction, SessionState};

/// Condvar-backed doorbell the client side rings to get the scheduler out
/// of its idle park. Every path that can change the session state rings
/// it: begin/end session, commit, disconnect, feedback, and stop.
pub(crate) struct Wakeup {
    pending: Mutex<bool>,
    condvar: Condvar,
}

impl Wakeup {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        *self.pending.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    /// Parks until notified, consuming the pending flag. A notify that
    /// landed before the wait returns immediately; none is ever lost.
    pub fn wait(&self) {
        let guard = self.pending.lock().unwrap();
        let mut guard = self
            .condvar
            .wait_while(guard, |pending| !*pending)
            .unwrap();
        *guard = false;
    }
}

/// The connected-client table.
struct Registry {
    clients: Vec<Arc<ClientShared>>,
    /// Indices are never reused, so telemetry from a disconnected client
    /// can never be confused with its successor's.
    next_index: usize,
}

/// State shared between the scheduler thread, the public handle, and every
/// client session.
pub(crate) struct Shared {
    config: MultiConfig,
    app_config: AppPacerConfig,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
    wakeup: Arc<Wakeup>,
    running: AtomicBool,
    telemetry_tx: Sender<PacingEvent>,
    feedback_tx: Sender<PresentFeedback>,
    feedback_rx: Receiver<PresentFeedback>,
}

impl Shared {
    /// Publishes a telemetry event. Drops it when the buffer is full; the
    /// tick never blocks on a slow listener.
    fn emit(&self, event: PacingEvent) {
        if self.telemetry_tx.try_send(event).is_err() {
            log::trace!("Telemetry buffer full or disconnected; event dropped");
        }
    }
}

/// The state owned by the scheduler thread itself.
struct SchedulerCore {
    shared: Arc<Shared>,
    native: Box<dyn NativeCompositor>,
    pacer: Box<dyn CompositorPacer>,
    session: SessionState,
}

impl SchedulerCore {
    /// Warm start: opens the native session before any client exists, so
    /// the first client to connect does not pay for pipeline bring-up.
    fn startup(&mut self) -> anyhow::Result<()> {
        self.native
            .begin_session(ViewType::Stereo)
            .context("beginning warm-start session")?;
        Ok(())
    }

    /// Prunes disconnected clients and steps the session state machine,
    /// issuing the native begin/end calls the transitions demand.
    fn evaluate_session(&mut self) -> anyhow::Result<SessionState> {
        let active_sessions = {
            let mut registry = self.shared.registry.lock().unwrap();
            registry.clients.retain(|client| {
                let state = client.state.lock().unwrap();
                if state.disconnected {
                    log::info!("Client {} disconnected", client.index);
                }
                !state.disconnected
            });
            registry
                .clients
                .iter()
                .filter(|client| client.state.lock().unwrap().session_active)
                .count()
        };

        loop {
            let (next, action) = advance(self.session, active_sessions);
            match action {
                Some(SessionAction::BeginSession) => {
                    self.native
                        .begin_session(ViewType::Stereo)
                        .context("beginning native session")?;
                    // Resync the pacer off the display's own prediction so
                    // the first frame after an idle stretch lands on a real
                    // vblank instead of free-running from stale state.
                    let prediction = self
                        .native
                        .predict_frame()
                        .context("predicting frame after session begin")?;
                    self.pacer
                        .update_vblank_from_display_control(prediction.predicted_display_ns);
                }
                Some(SessionAction::EndSession) => {
                    self.native.end_session().context("ending native session")?;
                }
                None => {}
            }
            if next == self.session {
                break;
            }
            log::info!(
                "Session state {} -> {} ({active_sessions} active)",
                self.session.name(),
                next.name()
            );
            self.session = next;
            self.shared.emit(PacingEvent::SessionStateChange {
                state: next.name(),
                active_sessions,
            });
        }
        Ok(self.session)
    }

    /// Feeds queued presentation feedback into the pacer and reports the
    /// misses and budget changes it caused.
    fn drain_feedback(&mut self) {
        while let Ok(feedback) = self.shared.feedback_rx.try_recv() {
            let previous_ns = self.pacer.app_time_ns();
            if let Err(e) = self.pacer.info(&feedback) {
                log::warn!(
                    "Present feedback for frame {} rejected: {e}",
                    feedback.frame_id
                );
                continue;
            }
            let late_by_ns = feedback.actual_present_ns - feedback.desired_present_ns;
            if late_by_ns > 0 {
                self.shared.emit(PacingEvent::PresentMissed {
                    frame_id: feedback.frame_id,
                    late_by_ns,
                });
            }
            let app_time_ns = self.pacer.app_time_ns();
            if app_time_ns != previous_ns {
                self.shared.emit(PacingEvent::AppTimeAdjusted {
                    app_time_ns,
                    previous_ns,
                });
            }
        }
    }

    /// Pushes the system frame's timing into every connected client's
    /// pacer, whether or not the client is visible.
    fn broadcast_timing(&self, prediction: &CompositorPrediction, extra_ns: TimeNs) {
        let registry = self.shared.registry.lock().unwrap();
        for client in &registry.clients {
            client.pacer.lock().unwrap().info(
                prediction.predicted_display_ns,
                prediction.predicted_display_period_ns,
                extra_ns,
            );
        }
    }

    /// Migrates every client's scheduled frame whose display time has
    /// arrived, then gathers the delivered layers of visible clients in z
    /// order (lower z first).
    ///
    /// Hidden clients migrate too: when one becomes visible again, its
    /// newest frame is the one shown, never a stale predecessor.
    fn collect_layers(&self, prediction: &CompositorPrediction) -> Vec<LayerEntry> {
        let registry = self.shared.registry.lock().unwrap();

        let mut visible: Vec<(i64, Arc<ClientShared>)> = Vec::new();
        for client in &registry.clients {
            let mut slots = client.slots.lock().unwrap();
            if let Some(display_time_ns) = slots.migrate(
                prediction.predicted_display_ns,
                prediction.predicted_display_period_ns,
            ) {
                self.shared.emit(PacingEvent::ClientFrameDelivered {
                    client_index: client.index,
                    display_time_ns,
                });
            }
            let has_frame = slots.delivered.active;
            drop(slots);

            let state = client.state.lock().unwrap();
            if state.session_active && state.visible && has_frame {
                visible.push((state.z_order, Arc::clone(client)));
            }
        }

        // Stable sort: connect order breaks z ties.
        visible.sort_by_key(|(z_order, _)| *z_order);

        let mut merged = Vec::new();
        for (_, client) in visible {
            let slots = client.slots.lock().unwrap();
            for entry in &slots.delivered.layers {
                if merged.len() >= self.shared.config.max_layers {
                    log::warn!(
                        "Merged frame capped at {} layers; dropping the rest",
                        self.shared.config.max_layers
                    );
                    return merged;
                }
                merged.push(entry.clone());
            }
        }
        merged
    }

    /// One scheduler tick: predict, sleep, broadcast, collect, commit.
    fn tick(&mut self) -> anyhow::Result<()> {
        let was_stopped = self.session == SessionState::Stopped;
        if self.evaluate_session()? == SessionState::Stopped {
            // The tick that wound the session down returns without parking;
            // only an already-idle tick suspends on the doorbell.
            if was_stopped {
                self.shared.wakeup.wait();
            }
            return Ok(());
        }

        self.drain_feedback();

        let clock = Arc::clone(&self.shared.clock);
        let prediction = self.pacer.predict(clock.now_ns());

        // Publish the new display target before sleeping, so a client
        // racing to commit during the sleep already knows the slot the
        // coming tick aims for.
        let client_count = {
            let registry = self.shared.registry.lock().unwrap();
            for client in &registry.clients {
                client
                    .next_frame_display_ns
                    .store(prediction.predicted_display_ns, Ordering::Release);
            }
            registry.clients.len()
        };
        self.shared.emit(PacingEvent::FramePredicted {
            frame_id: prediction.frame_id,
            predicted_display_ns: prediction.predicted_display_ns,
            client_count,
        });

        clock.sleep_until(prediction.wake_up_ns);
        let woke_ns = clock.now_ns();
        self.pacer
            .mark_point(prediction.frame_id, FramePoint::WakeUp, woke_ns)
            .context("marking wake-up")?;
        self.native
            .mark_frame(prediction.frame_id, FramePoint::WakeUp, woke_ns)
            .context("marking native wake-up")?;

        // Compositor lead time: how much earlier than the photon deadline a
        // producer handing frames to this tick chain must finish.
        let extra_ns = prediction.predicted_display_ns - woke_ns;
        self.broadcast_timing(&prediction, extra_ns);

        self.native
            .begin_frame(prediction.frame_id)
            .context("beginning native frame")?;
        let begin_ns = clock.now_ns();
        self.pacer
            .mark_point(prediction.frame_id, FramePoint::Begin, begin_ns)
            .context("marking begin")?;
        self.native
            .mark_frame(prediction.frame_id, FramePoint::Begin, begin_ns)
            .context("marking native begin")?;

        let layers = self.collect_layers(&prediction);
        self.native
            .layer_begin(
                prediction.frame_id,
                prediction.predicted_display_ns,
                EnvBlendMode::Opaque,
            )
            .context("opening layer list")?;
        for entry in &layers {
            self.native.layer_entry(entry).context("appending layer")?;
        }
        self.native
            .layer_commit(prediction.frame_id)
            .context("committing layer list")?;

        let submit_ns = clock.now_ns();
        self.pacer
            .mark_point(prediction.frame_id, FramePoint::Submit, submit_ns)
            .context("marking submit")?;
        self.native
            .mark_frame(prediction.frame_id, FramePoint::Submit, submit_ns)
            .context("marking native submit")?;
        Ok(())
    }
}

fn run(mut core: SchedulerCore) {
    log::info!("Scheduler thread running");
    if let Err(e) = core.startup() {
        log::error!("Warm start failed: {e:#}");
    }
    while core.shared.running.load(Ordering::SeqCst) {
        // A failed tick skips one frame; the thread keeps serving.
        if let Err(e) = core.tick() {
            log::error!("Scheduler tick failed: {e:#}");
        }
    }
    if core.session != SessionState::Stopped {
        if let Err(e) = core.native.end_session() {
            log::error!("Ending session at shutdown failed: {e}");
        }
    }
    log::info!("Scheduler thread stopped");
}

/// Public handle to the scheduler: connects clients, forwards presentation
/// feedback, and owns the thread lifecycle.
pub struct MultiClientScheduler {
    shared: Arc<Shared>,
    /// Present until `start` moves it into the thread.
    core: Option<SchedulerCore>,
    handle: Option<JoinHandle<()>>,
}

impl MultiClientScheduler {
    /// Creates a scheduler over the given native compositor and pacer.
    ///
    /// Returns the telemetry receiver alongside; events are dropped, not
    /// queued without bound, when the receiver falls behind.
    pub fn new(
        config: MultiConfig,
        app_config: AppPacerConfig,
        native: Box<dyn NativeCompositor>,
        pacer: Box<dyn CompositorPacer>,
        clock: Arc<dyn Clock>,
    ) -> (Self, Receiver<PacingEvent>) {
        let (telemetry_tx, telemetry_rx) = crossbeam_channel::bounded(config.telemetry_buffer_size);
        let (feedback_tx, feedback_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            config,
            app_config,
            clock,
            registry: Mutex::new(Registry {
                clients: Vec::new(),
                next_index: 0,
            }),
            wakeup: Arc::new(Wakeup::new()),
            running: AtomicBool::new(false),
            telemetry_tx,
            feedback_tx,
            feedback_rx,
        });
        let core = SchedulerCore {
            shared: Arc::clone(&shared),
            native,
            pacer,
            session: SessionState::WarmStart,
        };
        (
            Self {
                shared,
                core: Some(core),
                handle: None,
            },
            telemetry_rx,
        )
    }

    /// Spawns the scheduler thread. Fails if already started.
    pub fn start(&mut self) -> anyhow::Result<()> {
        let core = self
            .core
            .take()
            .context("scheduler thread already started")?;
        self.shared.running.store(true, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("kairos-scheduler".to_string())
            .spawn(move || run(core))
            .context("spawning scheduler thread")?;
        self.handle = Some(handle);
        log::info!("Multi-client scheduler started");
        Ok(())
    }

    /// Signals the thread to stop and joins it. Idempotent.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wakeup.notify();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Scheduler thread panicked");
            }
        }
    }

    /// Connects a new client, handing back its session handle.
    pub fn connect(&self) -> PacingResult<ClientSession> {
        let mut registry = self.shared.registry.lock().unwrap();
        registry
            .clients
            .retain(|client| !client.state.lock().unwrap().disconnected);
        if registry.clients.len() >= self.shared.config.max_clients {
            return Err(PacingError::CapacityExceeded {
                limit: self.shared.config.max_clients,
            });
        }
        let index = registry.next_index;
        registry.next_index += 1;
        let client = Arc::new(ClientShared::new(
            index,
            &self.shared.config,
            AppPacer::new(self.shared.app_config),
        ));
        registry.clients.push(Arc::clone(&client));
        log::info!("Client {index} connected ({} total)", registry.clients.len());
        Ok(ClientSession::new(
            client,
            Arc::clone(&self.shared.clock),
            self.shared.config,
            self.shared.telemetry_tx.clone(),
            Arc::clone(&self.shared.wakeup),
        ))
    }

    /// Number of connected clients, disconnected-but-unpruned ones excluded.
    pub fn client_count(&self) -> usize {
        self.shared
            .registry
            .lock()
            .unwrap()
            .clients
            .iter()
            .filter(|client| !client.state.lock().unwrap().disconnected)
            .count()
    }

    /// Queues presentation feedback from the display path. Consumed at the
    /// top of the next tick.
    pub fn push_present_feedback(&self, feedback: PresentFeedback) {
        if self.shared.feedback_tx.send(feedback).is_err() {
            log::error!("Present feedback channel closed");
        }
        self.shared.wakeup.notify();
    }

    /// Sets a client's visibility and focus, notifying it of the change.
    pub fn set_client_state(
        &self,
        index: usize,
        visible: bool,
        focused: bool,
    ) -> PacingResult<()> {
        let registry = self.shared.registry.lock().unwrap();
        let client = registry
            .clients
            .iter()
            .find(|client| client.index == index)
            .ok_or(PacingError::ClientNotFound { index })?;
        let mut state = client.state.lock().unwrap();
        if state.visible != visible || state.focused != focused {
            state.visible = visible;
            state.focused = focused;
            client.events.push(ClientEvent::StateChange { visible, focused });
        }
        Ok(())
    }

    /// Broadcasts a main-application visibility change to every client.
    /// Used while a system overlay takes over the display.
    pub fn set_main_app_visibility(&self, visible: bool) {
        let registry = self.shared.registry.lock().unwrap();
        for client in &registry.clients {
            client.events.push(ClientEvent::OverlayChange { visible });
        }
    }

    /// Broadcasts a display refresh-rate change to every client.
    pub fn notify_display_refresh_changed(&self, display_period_ns: TimeNs) {
        let registry = self.shared.registry.lock().unwrap();
        for client in &registry.clients {
            client
                .events
                .push(ClientEvent::DisplayRefreshChange { display_period_ns });
        }
    }
}

impl Drop for MultiClientScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{CallLog, HeadlessCall, HeadlessCompositor};
    use kairos_core::config::FakePacerConfig;
    use kairos_core::layer::{LayerData, Swapchain, SwapchainRef};
    use kairos_core::time::{ms_to_ns, ManualClock};
    use kairos_pacing::FakePacer;

    struct TestSwapchain(u64);
    impl Swapchain for TestSwapchain {
        fn id(&self) -> u64 {
            self.0
        }
    }

    fn test_scheduler() -> (
        MultiClientScheduler,
        Receiver<PacingEvent>,
        Arc<ManualClock>,
        CallLog,
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let (native, call_log) = HeadlessCompositor::new(ms_to_ns(16), clock.clone());
        let pacer = FakePacer::new(FakePacerConfig::for_period(ms_to_ns(16)));
        let (scheduler, telemetry_rx) = MultiClientScheduler::new(
            MultiConfig::default(),
            AppPacerConfig::default(),
            Box::new(native),
            Box::new(pacer),
            clock.clone(),
        );
        (scheduler, telemetry_rx, clock, call_log)
    }

    /// Runs one frame through a client: wait, begin, submit one cube layer
    /// backed by a swapchain with the given id.
    fn submit_frame(session: &mut ClientSession, swapchain_id: u64) {
        let prediction = session.wait_frame().unwrap();
        session.begin_frame(prediction.frame_id).unwrap();
        session
            .layer_begin(
                prediction.frame_id,
                prediction.predicted_display_ns,
                EnvBlendMode::Opaque,
            )
            .unwrap();
        let sc: SwapchainRef = Arc::new(TestSwapchain(swapchain_id));
        session
            .layer_push(LayerEntry::with_one(sc, LayerData::Cube))
            .unwrap();
        session.layer_commit().unwrap();
    }

    fn entry_ids(call_log: &CallLog) -> Vec<u64> {
        call_log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                HeadlessCall::LayerEntry { swapchain_ids, .. } => Some(swapchain_ids[0]),
                _ => None,
            })
            .collect()
    }

    /// Ticks until `predicate` on the call log holds, up to `max` ticks.
    fn tick_until(core: &mut SchedulerCore, call_log: &CallLog, max: usize, predicate: impl Fn(&[HeadlessCall]) -> bool) {
        for _ in 0..max {
            core.tick().unwrap();
            if predicate(&call_log.lock().unwrap()) {
                return;
            }
        }
        panic!("condition not reached within {max} ticks");
    }

    #[test]
    fn clients_are_composited_back_to_front_by_z_order() {
        let (mut scheduler, _telemetry, _clock, call_log) = test_scheduler();
        let mut core = scheduler.core.take().unwrap();
        core.startup().unwrap();

        let mut front = scheduler.connect().unwrap();
        let mut back = scheduler.connect().unwrap();
        front.begin_session().unwrap();
        back.begin_session().unwrap();
        front.set_z_order(1);
        back.set_z_order(0);
        scheduler.set_client_state(front.index(), true, true).unwrap();
        scheduler.set_client_state(back.index(), true, false).unwrap();

        // First tick primes both client pacers and broadcasts the target.
        core.tick().unwrap();
        assert!(front.next_frame_display_ns() > 0);
        assert_eq!(front.next_frame_display_ns(), back.next_frame_display_ns());
        submit_frame(&mut front, 11);
        submit_frame(&mut back, 22);

        tick_until(&mut core, &call_log, 8, |calls| {
            calls
                .iter()
                .filter(|call| matches!(call, HeadlessCall::LayerEntry { .. }))
                .count()
                >= 2
        });

        // Connected front first, but back has the lower z, so back's layer
        // is appended first every tick both are shown.
        let ids = entry_ids(&call_log);
        assert_eq!(ids[0], 22);
        assert_eq!(ids[1], 11);
    }

    #[test]
    fn hidden_client_still_migrates_and_reappears_with_its_newest_frame() {
        let (mut scheduler, _telemetry, _clock, call_log) = test_scheduler();
        let mut core = scheduler.core.take().unwrap();
        core.startup().unwrap();

        let mut session = scheduler.connect().unwrap();
        session.begin_session().unwrap();
        scheduler.set_client_state(session.index(), true, true).unwrap();

        core.tick().unwrap();
        submit_frame(&mut session, 1);
        tick_until(&mut core, &call_log, 8, |calls| {
            calls
                .iter()
                .any(|call| matches!(call, HeadlessCall::LayerEntry { .. }))
        });
        assert_eq!(entry_ids(&call_log), vec![1]);

        // Hide the client, then submit a newer frame while hidden.
        scheduler.set_client_state(session.index(), false, false).unwrap();
        submit_frame(&mut session, 2);
        let shown_before_hide = entry_ids(&call_log).len();
        for _ in 0..4 {
            core.tick().unwrap();
        }
        assert_eq!(
            entry_ids(&call_log).len(),
            shown_before_hide,
            "hidden client contributes no layers"
        );

        // On unhide the frame submitted while hidden is the one shown.
        scheduler.set_client_state(session.index(), true, true).unwrap();
        tick_until(&mut core, &call_log, 8, |calls| {
            entry_ids_of(calls).len() > shown_before_hide
        });
        assert_eq!(*entry_ids(&call_log).last().unwrap(), 2);
    }

    fn entry_ids_of(calls: &[HeadlessCall]) -> Vec<u64> {
        calls
            .iter()
            .filter_map(|call| match call {
                HeadlessCall::LayerEntry { swapchain_ids, .. } => Some(swapchain_ids[0]),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn native_session_begins_and_ends_exactly_once_per_transition() {
        let (mut scheduler, _telemetry, _clock, call_log) = test_scheduler();
        let mut core = scheduler.core.take().unwrap();
        core.startup().unwrap();

        // No clients: the warm-start session winds down.
        core.tick().unwrap();
        assert_eq!(core.session, SessionState::Stopped);

        let session = scheduler.connect().unwrap();
        session.begin_session().unwrap();
        core.tick().unwrap();
        assert_eq!(core.session, SessionState::Running);

        session.end_session().unwrap();
        core.tick().unwrap();
        assert_eq!(core.session, SessionState::Stopped);

        let calls = call_log.lock().unwrap();
        let begins = calls
            .iter()
            .filter(|call| matches!(call, HeadlessCall::BeginSession { .. }))
            .count();
        let ends = calls
            .iter()
            .filter(|call| matches!(call, HeadlessCall::EndSession))
            .count();
        assert_eq!(begins, 2, "warm start plus one real transition");
        assert_eq!(ends, 2);
        // The begin after idle reseeds the pacer from the display.
        assert!(calls
            .windows(2)
            .any(|pair| matches!(pair[0], HeadlessCall::BeginSession { .. })
                && pair[1] == HeadlessCall::PredictFrame));
    }

    #[test]
    fn idle_park_releases_on_a_doorbell_ring() {
        let (mut scheduler, _telemetry, _clock, _call_log) = test_scheduler();
        let mut core = scheduler.core.take().unwrap();
        core.startup().unwrap();

        // No clients: the warm-start wind-down tick returns without parking.
        core.tick().unwrap();
        assert_eq!(core.session, SessionState::Stopped);

        // A notify that landed before the idle tick lets it straight through.
        core.shared.wakeup.notify();
        core.tick().unwrap();
        assert_eq!(core.session, SessionState::Stopped);

        // Beginning a session rings the doorbell and gives the next tick a
        // session to run.
        let session = scheduler.connect().unwrap();
        session.begin_session().unwrap();
        core.tick().unwrap();
        assert_eq!(core.session, SessionState::Running);
    }

    #[test]
    fn telemetry_reports_predictions_and_session_changes() {
        let (mut scheduler, telemetry, _clock, _call_log) = test_scheduler();
        let mut core = scheduler.core.take().unwrap();
        core.startup().unwrap();

        let session = scheduler.connect().unwrap();
        session.begin_session().unwrap();
        core.tick().unwrap();
        core.tick().unwrap();

        let events: Vec<PacingEvent> = telemetry.try_iter().collect();
        assert!(events
            .iter()
            .any(|event| matches!(event, PacingEvent::SessionStateChange { state, .. } if *state == "running")));
        assert!(events.iter().any(|event| matches!(
            event,
            PacingEvent::FramePredicted { client_count: 1, .. }
        )));
    }

    #[test]
    fn feedback_misses_surface_as_telemetry() {
        let (mut scheduler, telemetry, _clock, _call_log) = test_scheduler();
        let mut core = scheduler.core.take().unwrap();
        core.startup().unwrap();
        let session = scheduler.connect().unwrap();
        session.begin_session().unwrap();
        core.tick().unwrap();

        // Feedback for an unknown frame is swallowed by the pacer; a late
        // present still counts as a miss.
        scheduler.push_present_feedback(PresentFeedback {
            frame_id: 0,
            desired_present_ns: ms_to_ns(16),
            actual_present_ns: ms_to_ns(18),
            earliest_present_ns: ms_to_ns(16),
            present_margin_ns: 0,
            gpu_done_ns: ms_to_ns(15),
            when_ns: ms_to_ns(18),
        });
        core.tick().unwrap();

        let events: Vec<PacingEvent> = telemetry.try_iter().collect();
        assert!(events.iter().any(|event| matches!(
            event,
            PacingEvent::PresentMissed {
                frame_id: 0,
                late_by_ns,
            } if *late_by_ns == ms_to_ns(2)
        )));
    }

    #[test]
    fn connect_beyond_capacity_is_rejected() {
        let clock = Arc::new(ManualClock::new(0));
        let (native, _call_log) = HeadlessCompositor::new(ms_to_ns(16), clock.clone());
        let pacer = FakePacer::new(FakePacerConfig::for_period(ms_to_ns(16)));
        let config = MultiConfig {
            max_clients: 2,
            ..MultiConfig::default()
        };
        let (scheduler, _telemetry) = MultiClientScheduler::new(
            config,
            AppPacerConfig::default(),
            Box::new(native),
            Box::new(pacer),
            clock,
        );

        let first = scheduler.connect().unwrap();
        let _second = scheduler.connect().unwrap();
        assert!(matches!(
            scheduler.connect(),
            Err(PacingError::CapacityExceeded { limit: 2 })
        ));

        // A disconnect frees the slot even before the thread prunes.
        drop(first);
        assert!(scheduler.connect().is_ok());
    }
}
