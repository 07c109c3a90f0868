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

//! Fixed-size storage for in-flight frame records.
//!
//! Frame ids grow forever; slots are reused at `id % N`. Every read compares
//! the stored id against the requested one, so a request for a frame that has
//! been evicted by wraparound yields "not present" instead of aliased data
//! from an unrelated frame.

/// Sentinel id for an empty slot.
const EMPTY_ID: i64 = -1;

/// A fixed-size circular buffer of per-frame records keyed by frame id.
#[derive(Debug, Clone)]
pub struct FrameRing<R, const N: usize> {
    ids: [i64; N],
    records: [R; N],
}

impl<R: Default + Copy, const N: usize> FrameRing<R, N> {
    /// Creates a ring with every slot empty.
    pub fn new() -> Self {
        Self {
            ids: [EMPTY_ID; N],
            records: [R::default(); N],
        }
    }

    fn slot(frame_id: i64) -> usize {
        debug_assert!(frame_id >= 0, "frame ids are non-negative");
        (frame_id as usize) % N
    }

    /// Claims the slot for `frame_id`, overwriting whatever was there, and
    /// returns the fresh record for initialization.
    ///
    /// If the evicted slot still held a live record, the previous frame was
    /// never consumed; that is worth a log line but not an error, since a
    /// stalled producer is exactly the case eviction exists for.
    pub fn claim(&mut self, frame_id: i64) -> &mut R {
        let idx = Self::slot(frame_id);
        if self.ids[idx] != EMPTY_ID {
            log::debug!(
                "Evicting unconsumed frame record {} for new frame {}",
                self.ids[idx],
                frame_id
            );
        }
        self.ids[idx] = frame_id;
        self.records[idx] = R::default();
        &mut self.records[idx]
    }

    /// Returns the record for `frame_id`, or `None` if it was never issued
    /// or its slot has been recycled.
    pub fn get(&self, frame_id: i64) -> Option<&R> {
        if frame_id < 0 {
            return None;
        }
        let idx = Self::slot(frame_id);
        (self.ids[idx] == frame_id).then(|| &self.records[idx])
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, frame_id: i64) -> Option<&mut R> {
        if frame_id < 0 {
            return None;
        }
        let idx = Self::slot(frame_id);
        (self.ids[idx] == frame_id).then(|| &mut self.records[idx])
    }

    /// Releases the slot for `frame_id` once the record is fully consumed or
    /// discarded. A no-op if the slot has already been recycled.
    pub fn recycle(&mut self, frame_id: i64) {
        if frame_id < 0 {
            return;
        }
        let idx = Self::slot(frame_id);
        if self.ids[idx] == frame_id {
            self.ids[idx] = EMPTY_ID;
            self.records[idx] = R::default();
        }
    }
}

impl<R: Default + Copy, const N: usize> Default for FrameRing<R, N> {
    fn default() -> Self {
        Self::new()
    }
}
