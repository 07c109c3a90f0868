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

//! The layer and swapchain data model handed from clients to the scheduler.
//!
//! Swapchains are out-of-scope GPU resources; this crate only moves
//! reference-counted handles between slots. Layer payloads are a closed sum
//! type so that per-type dispatch in the scheduler is a `match`, not a
//! runtime type code.

use std::fmt;
use std::sync::Arc;

/// Upper bound on swapchain handles a single layer entry can reference
/// (stereo projection with depth uses all four).
pub const SWAPCHAINS_PER_LAYER: usize = 4;

/// An opaque, reference-counted handle to a backend swapchain.
///
/// The pacing core never touches images; it only keeps swapchains alive while
/// a layer slot references them and releases them when the slot is cleared.
pub trait Swapchain: Send + Sync {
    /// A stable identifier for logging and test assertions.
    fn id(&self) -> u64;
}

/// Shared ownership of a swapchain. Moving a `SwapchainRef` between slots is
/// a move of ownership, never a copy of the underlying resource.
pub type SwapchainRef = Arc<dyn Swapchain>;

impl fmt::Debug for dyn Swapchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Swapchain({})", self.id())
    }
}

/// How a layer's content is blended with the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvBlendMode {
    /// Layer fully replaces the environment.
    #[default]
    Opaque,
    /// Layer is added on top of the environment.
    Additive,
    /// Layer alpha-blends with the environment.
    AlphaBlend,
}

/// A plain 2D extent, used by the quad-family layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent2D {
    /// Width in meters.
    pub width: f32,
    /// Height in meters.
    pub height: f32,
}

/// Per-type layer payload.
///
/// Geometric parameters are deliberately minimal: the rendering backend owns
/// the full per-view transforms, this core only needs enough to route each
/// entry to the right backend call.
#[derive(Debug, Clone)]
pub enum LayerData {
    /// Two projection views, one swapchain image per eye.
    StereoProjection {
        /// Field-of-view half-angles per view, packed `[left, right]` as
        /// `(angle_left, angle_right, angle_up, angle_down)` radians.
        fovs: [(f32, f32, f32, f32); 2],
    },
    /// Stereo projection plus per-view depth images for reprojection.
    StereoProjectionDepth {
        /// Field-of-view half-angles per view, as in `StereoProjection`.
        fovs: [(f32, f32, f32, f32); 2],
        /// Near plane of the depth range, meters.
        near_z: f32,
        /// Far plane of the depth range, meters.
        far_z: f32,
    },
    /// A flat quad in world or view space.
    Quad {
        /// Quad size.
        size: Extent2D,
    },
    /// A cube map around the viewer.
    Cube,
    /// A curved cylindrical section.
    Cylinder {
        /// Cylinder radius, meters.
        radius: f32,
        /// Central angle subtended by the cylinder, radians.
        central_angle: f32,
        /// Height/width aspect of the mapped region.
        aspect_ratio: f32,
    },
    /// KHR equirect, revision 1 parameterization.
    Equirect1 {
        /// Sphere radius, meters.
        radius: f32,
    },
    /// KHR equirect, revision 2 parameterization.
    Equirect2 {
        /// Sphere radius, meters.
        radius: f32,
        /// Central horizontal angle, radians.
        central_horizontal_angle: f32,
        /// Upper vertical angle, radians.
        upper_vertical_angle: f32,
        /// Lower vertical angle, radians.
        lower_vertical_angle: f32,
    },
}

impl LayerData {
    /// Short tag for logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            LayerData::StereoProjection { .. } => "stereo_projection",
            LayerData::StereoProjectionDepth { .. } => "stereo_projection_depth",
            LayerData::Quad { .. } => "quad",
            LayerData::Cube => "cube",
            LayerData::Cylinder { .. } => "cylinder",
            LayerData::Equirect1 { .. } => "equirect1",
            LayerData::Equirect2 { .. } => "equirect2",
        }
    }
}

/// One layer as submitted by a client: the payload plus the swapchains it
/// samples from.
#[derive(Debug, Clone)]
pub struct LayerEntry {
    /// Swapchain handles referenced by this layer. Unused slots are `None`.
    pub swapchains: [Option<SwapchainRef>; SWAPCHAINS_PER_LAYER],
    /// The typed payload.
    pub data: LayerData,
}

impl LayerEntry {
    /// Creates an entry with a single color swapchain.
    pub fn with_one(swapchain: SwapchainRef, data: LayerData) -> Self {
        Self {
            swapchains: [Some(swapchain), None, None, None],
            data,
        }
    }

    /// Creates an entry referencing several swapchains in order.
    ///
    /// Panics if more than [`SWAPCHAINS_PER_LAYER`] handles are given; that
    /// bound is structural, not a tunable.
    pub fn with_many(swapchains: &[SwapchainRef], data: LayerData) -> Self {
        assert!(
            swapchains.len() <= SWAPCHAINS_PER_LAYER,
            "a layer references at most {SWAPCHAINS_PER_LAYER} swapchains"
        );
        let mut slots: [Option<SwapchainRef>; SWAPCHAINS_PER_LAYER] = [None, None, None, None];
        for (slot, sc) in slots.iter_mut().zip(swapchains.iter()) {
            *slot = Some(Arc::clone(sc));
        }
        Self {
            swapchains: slots,
            data,
        }
    }
}
