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

//! Event types for runtime-wide pacing telemetry.
//!
//! The scheduler publishes these over a bounded channel; whoever embeds the
//! runtime decides whether to record, aggregate, or ignore them. Publishing
//! drops events rather than blocking the scheduler tick.

use crate::time::TimeNs;
use serde::Serialize;

/// A high-level telemetry event produced by the pacing subsystem.
#[derive(Debug, Clone, Serialize)]
pub enum PacingEvent {
    /// A system frame was predicted.
    FramePredicted {
        /// The predicted frame's id.
        frame_id: i64,
        /// The predicted display time.
        predicted_display_ns: TimeNs,
        /// Number of clients that received the broadcast.
        client_count: usize,
    },
    /// The display missed the desired present time for a frame.
    PresentMissed {
        /// The frame whose present was late.
        frame_id: i64,
        /// How late the actual present was.
        late_by_ns: TimeNs,
    },
    /// The adaptive controller changed the app-time budget.
    AppTimeAdjusted {
        /// The new app-time budget.
        app_time_ns: TimeNs,
        /// The previous budget.
        previous_ns: TimeNs,
    },
    /// An application discarded a frame it had started.
    FrameDiscarded {
        /// The client's slot index.
        client_index: usize,
        /// The discarded frame's id.
        frame_id: i64,
    },
    /// A client's scheduled frame migrated to the delivered slot.
    ClientFrameDelivered {
        /// The client's slot index.
        client_index: usize,
        /// The display time the client targeted.
        display_time_ns: TimeNs,
    },
    /// The scheduler's session state changed.
    SessionStateChange {
        /// Human-readable name of the new state.
        state: &'static str,
        /// Active client sessions at the time of the transition.
        active_sessions: usize,
    },
}
