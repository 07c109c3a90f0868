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

//! Triple-buffered layer hand-off between a client thread and the scheduler.
//!
//! Each client owns three layer slots: `progress` (being written, touched
//! only by the client's own thread), `scheduled` (handed off, awaiting its
//! display time), and `delivered` (what the scheduler actually composites).
//! Only the `scheduled`/`delivered` pair is shared, behind one per-client
//! mutex held for struct swaps only, never across rendering or GPU work.
//! Swapchain references travel with the slot contents; clearing a slot is
//! what releases them.

use kairos_core::layer::{EnvBlendMode, LayerEntry};
use kairos_core::time::TimeNs;
use std::mem;

/// One frame's worth of layers from one client.
#[derive(Debug, Default)]
pub struct LayerSlot {
    /// The display time the client rendered for.
    pub display_time_ns: TimeNs,
    /// Blend mode for the whole submission.
    pub env_blend_mode: EnvBlendMode,
    /// Layers in submission order, bottom first.
    pub layers: Vec<LayerEntry>,
    /// Whether this slot currently holds a frame.
    pub active: bool,
}

impl LayerSlot {
    /// Creates an inactive slot with capacity for `max_layers`, so steady
    /// state never reallocates.
    pub fn with_capacity(max_layers: usize) -> Self {
        Self {
            display_time_ns: 0,
            env_blend_mode: EnvBlendMode::default(),
            layers: Vec::with_capacity(max_layers),
            active: false,
        }
    }

    /// Empties the slot, releasing every swapchain reference it held.
    pub fn clear(&mut self) {
        self.display_time_ns = 0;
        self.env_blend_mode = EnvBlendMode::default();
        self.layers.clear();
        self.active = false;
    }
}

/// The shared half of a client's triple buffer, kept behind the per-client
/// slot lock.
#[derive(Debug)]
pub struct SlotPair {
    /// Handed off by the client, waiting for its display time.
    pub scheduled: LayerSlot,
    /// Collected by the scheduler; composited while its client is visible.
    pub delivered: LayerSlot,
}

impl SlotPair {
    /// Creates an empty pair sized for `max_layers`.
    pub fn new(max_layers: usize) -> Self {
        Self {
            scheduled: LayerSlot::with_capacity(max_layers),
            delivered: LayerSlot::with_capacity(max_layers),
        }
    }

    /// Moves `progress` into the scheduled position, returning the storage
    /// of the previous scheduled slot (cleared) for reuse as the client's
    /// next progress buffer. Called from the client thread with the slot
    /// lock held.
    pub fn publish(&mut self, progress: &mut LayerSlot) {
        self.scheduled.clear();
        mem::swap(progress, &mut self.scheduled);
    }

    /// Moves the scheduled frame into the delivered position if its display
    /// time has arrived: at or before `predicted_display_ns`, with half a
    /// display period of tolerance. Returns the display time on migration.
    ///
    /// Runs for every client regardless of visibility, so a frame submitted
    /// while hidden is still the one shown when the client becomes visible
    /// again, not a stale predecessor.
    pub fn migrate(
        &mut self,
        predicted_display_ns: TimeNs,
        display_period_ns: TimeNs,
    ) -> Option<TimeNs> {
        if !self.scheduled.active {
            return None;
        }
        if self.scheduled.display_time_ns > predicted_display_ns + display_period_ns / 2 {
            // Rendered for a future slot; keep it scheduled.
            return None;
        }
        self.delivered.clear();
        mem::swap(&mut self.scheduled, &mut self.delivered);
        Some(self.delivered.display_time_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_core::layer::{LayerData, Swapchain, SwapchainRef};
    use std::sync::Arc;

    struct TestSwapchain(u64);
    impl Swapchain for TestSwapchain {
        fn id(&self) -> u64 {
            self.0
        }
    }

    fn slot_with_frame(display_time_ns: TimeNs, swapchain: &SwapchainRef) -> LayerSlot {
        let mut slot = LayerSlot::with_capacity(4);
        slot.display_time_ns = display_time_ns;
        slot.layers
            .push(LayerEntry::with_one(Arc::clone(swapchain), LayerData::Cube));
        slot.active = true;
        slot
    }

    #[test]
    fn publish_swaps_progress_into_scheduled() {
        let sc: SwapchainRef = Arc::new(TestSwapchain(1));
        let mut pair = SlotPair::new(4);
        let mut progress = slot_with_frame(100, &sc);

        pair.publish(&mut progress);
        assert!(pair.scheduled.active);
        assert_eq!(pair.scheduled.display_time_ns, 100);
        assert!(!progress.active, "returned storage is clear for reuse");
        assert!(progress.layers.is_empty());
    }

    #[test]
    fn publish_releases_the_overwritten_frame() {
        let old: SwapchainRef = Arc::new(TestSwapchain(1));
        let new: SwapchainRef = Arc::new(TestSwapchain(2));
        let mut pair = SlotPair::new(4);

        let mut progress = slot_with_frame(100, &old);
        pair.publish(&mut progress);
        assert_eq!(Arc::strong_count(&old), 2);

        let mut progress = slot_with_frame(200, &new);
        pair.publish(&mut progress);
        assert_eq!(Arc::strong_count(&old), 1, "old frame's swapchains released");
        assert_eq!(Arc::strong_count(&new), 2);
    }

    #[test]
    fn migrate_respects_the_display_time_gate() {
        let sc: SwapchainRef = Arc::new(TestSwapchain(1));
        let mut pair = SlotPair::new(4);
        let mut progress = slot_with_frame(1_000_000, &sc);
        pair.publish(&mut progress);

        // Scheduled for well past this tick: stays put.
        assert_eq!(pair.migrate(0, 100), None);
        assert!(pair.scheduled.active);

        // Within half a period of the predicted display: migrates.
        assert_eq!(pair.migrate(999_960, 100), Some(1_000_000));
        assert!(!pair.scheduled.active);
        assert!(pair.delivered.active);
        assert_eq!(pair.delivered.layers.len(), 1);
    }

    #[test]
    fn migrate_on_empty_scheduled_is_a_no_op() {
        let mut pair = SlotPair::new(4);
        assert_eq!(pair.migrate(1_000_000, 100), None);
        assert!(!pair.delivered.active);
    }
}
