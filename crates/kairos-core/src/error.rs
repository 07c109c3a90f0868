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

//! Defines the hierarchy of error types for the pacing subsystem.
//!
//! Usage-contract violations (state-machine steps skipped, evicted frame ids)
//! surface as typed errors at every public entry point rather than aborting:
//! the scheduler thread logs them and keeps serving the other clients.

use crate::time::TimeNs;
use std::fmt;

/// A specialized `Result` type for pacing operations.
pub type PacingResult<T> = Result<T, PacingError>;

/// An error produced by a pacer or by the multi-client scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacingError {
    /// Prediction was requested before any timing sample arrived, so the
    /// display period is still unknown.
    NotReady,
    /// A `mark_*` call arrived out of order for the frame's state machine.
    InvalidTransition {
        /// The frame whose record was addressed.
        frame_id: i64,
        /// The state the record was actually in.
        from: &'static str,
        /// The point the caller tried to mark.
        point: &'static str,
    },
    /// The frame id was never issued, or its ring-buffer slot has been
    /// recycled for a newer frame.
    FrameNotFound {
        /// The requested frame id.
        frame_id: i64,
    },
    /// A connect or layer submission exceeded a configured capacity bound.
    CapacityExceeded {
        /// The configured limit that was hit.
        limit: usize,
    },
    /// The session this operation addressed is not active.
    SessionNotActive,
    /// The addressed client is not connected.
    ClientNotFound {
        /// The client index that was addressed.
        index: usize,
    },
}

impl fmt::Display for PacingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacingError::NotReady => {
                write!(f, "no timing sample received yet; display period unknown")
            }
            PacingError::InvalidTransition {
                frame_id,
                from,
                point,
            } => {
                write!(
                    f,
                    "frame {frame_id}: cannot mark '{point}' from state '{from}'"
                )
            }
            PacingError::FrameNotFound { frame_id } => {
                write!(f, "frame {frame_id} not found (never issued or evicted)")
            }
            PacingError::CapacityExceeded { limit } => {
                write!(f, "capacity exceeded (limit {limit})")
            }
            PacingError::SessionNotActive => write!(f, "session is not active"),
            PacingError::ClientNotFound { index } => {
                write!(f, "client {index} is not connected")
            }
        }
    }
}

impl std::error::Error for PacingError {}

/// An opaque failure reported by the native compositor backend.
///
/// The scheduler treats these as external faults: it logs them and continues
/// the tick, never letting a backend hiccup take down client sessions.
#[derive(Debug, Clone)]
pub struct CompositorError {
    /// Which backend operation failed.
    pub operation: &'static str,
    /// Backend-specific detail, already formatted.
    pub detail: String,
}

impl CompositorError {
    /// Creates a new error for `operation` with a formatted detail message.
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self {
            operation,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compositor {} failed: {}", self.operation, self.detail)
    }
}

impl std::error::Error for CompositorError {}

/// Timestamp-bearing helper used in a few diagnostics, kept here so error
/// formatting does not pull in the pacing crates.
pub fn format_late_by(deadline_ns: TimeNs, actual_ns: TimeNs) -> String {
    let diff = actual_ns - deadline_ns;
    if diff >= 0 {
        format!("{:.3}ms late", crate::time::ns_to_ms_f(diff))
    } else {
        format!("{:.3}ms early", crate::time::ns_to_ms_f(-diff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ms_to_ns;

    #[test]
    fn display_formatting() {
        let err = PacingError::InvalidTransition {
            frame_id: 7,
            from: "Predicted",
            point: "Begin",
        };
        assert_eq!(
            err.to_string(),
            "frame 7: cannot mark 'Begin' from state 'Predicted'"
        );

        let err = PacingError::CapacityExceeded { limit: 64 };
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn late_by_formatting() {
        assert_eq!(format_late_by(ms_to_ns(10), ms_to_ns(12)), "2.000ms late");
        assert_eq!(format_late_by(ms_to_ns(12), ms_to_ns(10)), "2.000ms early");
    }
}
