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

//! Integration tests for the scheduler thread's lifecycle.
//!
//! These run the real thread against the wall clock with a short fake
//! display period, so they assert call-log shape rather than exact tick
//! counts.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kairos_core::config::{AppPacerConfig, FakePacerConfig, MultiConfig};
use kairos_core::error::PacingError;
use kairos_core::telemetry::PacingEvent;
use kairos_core::time::{ms_to_ns, Clock, MonotonicClock};
use kairos_multi::{HeadlessCall, HeadlessCompositor, MultiClientScheduler};
use kairos_pacing::FakePacer;

/// Helper: a started scheduler over a 1 ms fake display.
fn running_scheduler() -> (
    MultiClientScheduler,
    crossbeam_channel::Receiver<PacingEvent>,
    kairos_multi::headless::CallLog,
) {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let (native, call_log) = HeadlessCompositor::new(ms_to_ns(1), Arc::clone(&clock));
    let pacer = FakePacer::new(FakePacerConfig::for_period(ms_to_ns(1)));
    let (mut scheduler, telemetry) = MultiClientScheduler::new(
        MultiConfig::default(),
        AppPacerConfig::default(),
        Box::new(native),
        Box::new(pacer),
        clock,
    );
    scheduler.start().expect("scheduler should start once");
    (scheduler, telemetry, call_log)
}

// ─────────────────────────────────────────────────────────────────────────────
// Thread lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_session_begin_end_calls_stay_balanced() {
    let (mut scheduler, telemetry, call_log) = running_scheduler();

    let session = scheduler.connect().expect("connect should succeed");
    session.begin_session().expect("begin_session");
    thread::sleep(Duration::from_millis(25));
    session.end_session().expect("end_session");
    thread::sleep(Duration::from_millis(25));
    scheduler.stop();

    let calls = call_log.lock().unwrap();
    let begins = calls
        .iter()
        .filter(|call| matches!(call, HeadlessCall::BeginSession { .. }))
        .count();
    let ends = calls
        .iter()
        .filter(|call| matches!(call, HeadlessCall::EndSession))
        .count();
    assert_eq!(begins, ends, "every native session begin must be ended");
    assert!(begins >= 1, "the warm-start session must have been opened");

    // Frames were committed while the session ran.
    assert!(calls
        .iter()
        .any(|call| matches!(call, HeadlessCall::LayerCommit { .. })));

    // And telemetry saw the predictions driving them.
    let events: Vec<PacingEvent> = telemetry.try_iter().collect();
    assert!(events
        .iter()
        .any(|event| matches!(event, PacingEvent::FramePredicted { .. })));
}

#[test]
fn test_start_twice_fails_and_stop_is_idempotent() {
    let (mut scheduler, _telemetry, _call_log) = running_scheduler();
    assert!(scheduler.start().is_err());
    scheduler.stop();
    scheduler.stop();
}

#[test]
fn test_dropping_the_last_client_winds_the_session_down() {
    let (mut scheduler, _telemetry, call_log) = running_scheduler();

    let session = scheduler.connect().expect("connect should succeed");
    session.begin_session().expect("begin_session");
    thread::sleep(Duration::from_millis(15));
    assert_eq!(scheduler.client_count(), 1);

    // No explicit end_session: the drop disconnects, and the scheduler
    // winds the native session down on its own.
    drop(session);
    thread::sleep(Duration::from_millis(25));
    assert_eq!(scheduler.client_count(), 0);
    scheduler.stop();

    let calls = call_log.lock().unwrap();
    let begins = calls
        .iter()
        .filter(|call| matches!(call, HeadlessCall::BeginSession { .. }))
        .count();
    let ends = calls
        .iter()
        .filter(|call| matches!(call, HeadlessCall::EndSession))
        .count();
    assert_eq!(begins, ends);
}

// ─────────────────────────────────────────────────────────────────────────────
// Capacity
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_connects_beyond_max_clients_are_rejected() {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let (native, _call_log) = HeadlessCompositor::new(ms_to_ns(1), Arc::clone(&clock));
    let pacer = FakePacer::new(FakePacerConfig::for_period(ms_to_ns(1)));
    let config = MultiConfig {
        max_clients: 1,
        ..MultiConfig::default()
    };
    let (scheduler, _telemetry) = MultiClientScheduler::new(
        config,
        AppPacerConfig::default(),
        Box::new(native),
        Box::new(pacer),
        clock,
    );

    let _only = scheduler.connect().expect("first connect fits");
    assert!(matches!(
        scheduler.connect(),
        Err(PacingError::CapacityExceeded { limit: 1 })
    ));
}
