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

//! A native compositor that records every call instead of rendering.
//!
//! Used for bring-up without a display and for asserting the scheduler's
//! call sequences in tests. Timing comes from the provided clock, so tests
//! drive it with a [`ManualClock`](kairos_core::time::ManualClock).

use std::sync::{Arc, Mutex};

use kairos_core::compositor::{FramePoint, FramePrediction, NativeCompositor, ViewType};
use kairos_core::error::CompositorError;
use kairos_core::layer::{EnvBlendMode, LayerEntry};
use kairos_core::time::{Clock, TimeNs};

/// One recorded call. Layer entries keep only the data needed for
/// assertions, not the swapchain references themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessCall {
    /// `predict_frame` was called.
    PredictFrame,
    /// `mark_frame` was called.
    MarkFrame {
        /// The frame being marked.
        frame_id: i64,
        /// The point it passed.
        point: FramePoint,
    },
    /// `begin_frame` was called.
    BeginFrame {
        /// The frame being begun.
        frame_id: i64,
    },
    /// `discard_frame` was called.
    DiscardFrame {
        /// The frame being discarded.
        frame_id: i64,
    },
    /// `layer_begin` was called.
    LayerBegin {
        /// The frame whose layer list opened.
        frame_id: i64,
        /// The display time the list targets.
        display_time_ns: TimeNs,
        /// The environment blend mode for the list.
        env_blend_mode: EnvBlendMode,
    },
    /// `layer_entry` was called.
    LayerEntry {
        /// The layer kind tag.
        kind: &'static str,
        /// Ids of the swapchains the entry referenced.
        swapchain_ids: Vec<u64>,
    },
    /// `layer_commit` was called.
    LayerCommit {
        /// The frame being committed.
        frame_id: i64,
    },
    /// `begin_session` was called.
    BeginSession {
        /// The session's view configuration.
        view_type: ViewType,
    },
    /// `end_session` was called.
    EndSession,
}

/// Shared handle to the recorded call sequence.
pub type CallLog = Arc<Mutex<Vec<HeadlessCall>>>;

/// The recording compositor. Enforces session pairing and open-layer-list
/// ordering so scheduler bugs surface as errors rather than silent logs.
pub struct HeadlessCompositor {
    frame_period_ns: TimeNs,
    clock: Arc<dyn Clock>,
    calls: CallLog,
    next_frame_id: i64,
    session_open: bool,
    layer_list_open: Option<i64>,
}

impl HeadlessCompositor {
    /// Creates a compositor faking a display with the given period, and the
    /// log handle callers keep for assertions.
    pub fn new(frame_period_ns: TimeNs, clock: Arc<dyn Clock>) -> (Self, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let compositor = Self {
            frame_period_ns,
            clock,
            calls: Arc::clone(&calls),
            next_frame_id: 0,
            session_open: false,
            layer_list_open: None,
        };
        (compositor, calls)
    }

    fn record(&self, call: HeadlessCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NativeCompositor for HeadlessCompositor {
    fn predict_frame(&mut self) -> Result<FramePrediction, CompositorError> {
        self.record(HeadlessCall::PredictFrame);
        let now_ns = self.clock.now_ns();
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        Ok(FramePrediction {
            frame_id,
            wake_up_ns: now_ns,
            predicted_gpu_done_ns: now_ns + self.frame_period_ns,
            predicted_display_ns: now_ns + 2 * self.frame_period_ns,
            predicted_display_period_ns: self.frame_period_ns,
        })
    }

    fn mark_frame(
        &mut self,
        frame_id: i64,
        point: FramePoint,
        _when_ns: TimeNs,
    ) -> Result<(), CompositorError> {
        self.record(HeadlessCall::MarkFrame { frame_id, point });
        Ok(())
    }

    fn begin_frame(&mut self, frame_id: i64) -> Result<(), CompositorError> {
        self.record(HeadlessCall::BeginFrame { frame_id });
        Ok(())
    }

    fn discard_frame(&mut self, frame_id: i64) -> Result<(), CompositorError> {
        self.record(HeadlessCall::DiscardFrame { frame_id });
        self.layer_list_open = None;
        Ok(())
    }

    fn layer_begin(
        &mut self,
        frame_id: i64,
        display_time_ns: TimeNs,
        env_blend_mode: EnvBlendMode,
    ) -> Result<(), CompositorError> {
        self.record(HeadlessCall::LayerBegin {
            frame_id,
            display_time_ns,
            env_blend_mode,
        });
        self.layer_list_open = Some(frame_id);
        Ok(())
    }

    fn layer_entry(&mut self, entry: &LayerEntry) -> Result<(), CompositorError> {
        if self.layer_list_open.is_none() {
            return Err(CompositorError::new(
                "layer_entry",
                "no layer list is open",
            ));
        }
        let swapchain_ids = entry
            .swapchains
            .iter()
            .flatten()
            .map(|swapchain| swapchain.id())
            .collect();
        self.record(HeadlessCall::LayerEntry {
            kind: entry.data.kind(),
            swapchain_ids,
        });
        Ok(())
    }

    fn layer_commit(&mut self, frame_id: i64) -> Result<(), CompositorError> {
        match self.layer_list_open.take() {
            Some(open_id) if open_id == frame_id => {
                self.record(HeadlessCall::LayerCommit { frame_id });
                Ok(())
            }
            Some(open_id) => Err(CompositorError::new(
                "layer_commit",
                format!("committing frame {frame_id} while frame {open_id} is open"),
            )),
            None => Err(CompositorError::new("layer_commit", "no layer list is open")),
        }
    }

    fn begin_session(&mut self, view_type: ViewType) -> Result<(), CompositorError> {
        if self.session_open {
            return Err(CompositorError::new(
                "begin_session",
                "a session is already open",
            ));
        }
        self.session_open = true;
        self.record(HeadlessCall::BeginSession { view_type });
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), CompositorError> {
        if !self.session_open {
            return Err(CompositorError::new("end_session", "no session is open"));
        }
        self.session_open = false;
        self.record(HeadlessCall::EndSession);
        Ok(())
    }
}
