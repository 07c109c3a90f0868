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

//! The scheduler-global session state machine.
//!
//! State is purely a function of the active-session count; the scheduler
//! evaluates the transition table at the top of every tick and applies the
//! returned action, so the native compositor's begin/end-session calls
//! happen exactly once per transition.

/// The scheduler's display-session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state: the native session was begun at startup to warm the
    /// pipeline before any client connects.
    WarmStart,
    /// At least one client session is active and frames are being committed.
    Running,
    /// Transient: the last client left, the native session must be ended.
    Stopping,
    /// No clients; the scheduler thread parks on the condition variable.
    Stopped,
}

impl SessionState {
    /// Human-readable name for logs and telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::WarmStart => "warm_start",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        }
    }
}

/// A native-compositor call mandated by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Call `begin_session` on the native compositor.
    BeginSession,
    /// Call `end_session` on the native compositor.
    EndSession,
}

/// One step of the transition table.
///
/// Returns the next state and the action it requires, if any. Callers loop
/// until the state stops changing, since `Stopping` resolves in the same
/// tick it is entered.
pub fn advance(state: SessionState, active_sessions: usize) -> (SessionState, Option<SessionAction>) {
    match (state, active_sessions) {
        // The warm-start session is already open: either adopt it or wind
        // it down.
        (SessionState::WarmStart, 0) => (SessionState::Stopping, None),
        (SessionState::WarmStart, _) => (SessionState::Running, None),

        (SessionState::Running, 0) => (SessionState::Stopping, None),
        (SessionState::Running, _) => (SessionState::Running, None),

        (SessionState::Stopping, _) => (SessionState::Stopped, Some(SessionAction::EndSession)),

        (SessionState::Stopped, 0) => (SessionState::Stopped, None),
        (SessionState::Stopped, _) => (SessionState::Running, Some(SessionAction::BeginSession)),
    }
}
