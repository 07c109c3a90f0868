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

//! # Kairos Core
//!
//! Foundational crate containing traits, core types, and interface contracts
//! that define the pacing runtime's architecture: the nanosecond time model,
//! the layer/swapchain data model, the native-compositor seam, per-client
//! events, configuration knobs, and the error taxonomy.

#![warn(missing_docs)]

pub mod compositor;
pub mod config;
pub mod error;
pub mod event;
pub mod layer;
pub mod telemetry;
pub mod time;

pub use compositor::{NativeCompositor, PresentFeedback, ViewType};
pub use error::{CompositorError, PacingError, PacingResult};
pub use time::{Clock, MonotonicClock, TimeNs};
