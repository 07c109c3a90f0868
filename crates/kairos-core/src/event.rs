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

//! Per-client event delivery.
//!
//! The scheduler publishes state changes into each client's queue; the
//! client drains them from its own thread via `poll_events`. Publishing
//! never blocks and never fails visibly; a disconnected client is simply
//! no longer listening.

/// A state change delivered to one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The session's visibility and/or focus changed.
    StateChange {
        /// Whether the session's layers are composited.
        visible: bool,
        /// Whether the session receives input focus.
        focused: bool,
    },
    /// The overlay composition layer toggled.
    OverlayChange {
        /// Whether the overlay is now visible.
        visible: bool,
    },
    /// The display's refresh rate changed.
    DisplayRefreshChange {
        /// The new display period in nanoseconds.
        display_period_ns: i64,
    },
}

/// A single-client event queue.
///
/// Unbounded on purpose: client state changes are rare, and dropping one
/// would desynchronize the client's view of its own visibility.
#[derive(Debug)]
pub struct ClientEventQueue {
    sender: flume::Sender<ClientEvent>,
    receiver: flume::Receiver<ClientEvent>,
}

impl ClientEventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Enqueues an event for the client. Called from the scheduler side.
    pub fn push(&self, event: ClientEvent) {
        log::trace!("Queueing client event: {event:?}");
        if let Err(e) = self.sender.send(event) {
            log::error!("Failed to queue client event: {e}. Receiver likely dropped.");
        }
    }

    /// Removes and returns the oldest pending event, if any. Called from the
    /// client's own thread.
    pub fn poll(&self) -> Option<ClientEvent> {
        self.receiver.try_recv().ok()
    }

    /// Discards all pending events. Used when tearing a client down.
    pub fn drain(&self) -> usize {
        let mut drained = 0;
        while self.receiver.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// Number of events waiting to be polled.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true when no events are pending.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for ClientEventQueue {
    fn default() -> Self {
        Self::new()
    }
}
