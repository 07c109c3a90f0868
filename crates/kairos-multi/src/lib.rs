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

//! # Kairos Multi
//!
//! The multi-client frame scheduler: a dedicated thread that predicts frames
//! from the real display through a [`kairos_pacing::CompositorPacer`],
//! collects each connected session's most recently delivered layers through
//! a triple-buffered hand-off, and commits one merged frame per tick to the
//! native compositor.

#![warn(missing_docs)]

pub mod client;
pub mod headless;
pub mod scheduler;
pub mod session;
pub mod slot;

pub use client::ClientSession;
pub use headless::{HeadlessCall, HeadlessCompositor};
pub use scheduler::MultiClientScheduler;
pub use session::SessionState;
