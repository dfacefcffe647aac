//! Material palette entries shared by the GPU material buffer (§3.4/§6.1).
//!
//! The palette holds up to 256 entries of 32 bytes each; entry 0 is always
//! the default diffuse material and is what an unset `Material` component
//! resolves to.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Maximum number of distinct materials addressable by a palette index.
pub const MAX_PALETTE_ENTRIES: usize = 256;

/// A single material palette entry, laid out for direct upload to the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Material {
    /// Base color, linear RGB.
    pub base_color: [f32; 3],
    /// Surface roughness in `[0, 1]`.
    pub roughness: f32,
    /// Metallic factor in `[0, 1]`.
    pub metallic: f32,
    /// Emission intensity multiplier applied to `base_color`.
    pub emission: f32,
    /// Reserved for future use; keeps the entry at a 32-byte stride.
    pub _padding: [f32; 2],
}

impl Default for Material {
    /// The palette's entry 0: a neutral, non-metallic diffuse gray.
    fn default() -> Self {
        Self {
            base_color: [0.8, 0.8, 0.8],
            roughness: 1.0,
            metallic: 0.0,
            emission: 0.0,
            _padding: [0.0, 0.0],
        }
    }
}

impl Material {
    /// Construct a material from a base color and roughness/metallic pair.
    #[inline]
    pub const fn new(base_color: [f32; 3], roughness: f32, metallic: f32) -> Self {
        Self {
            base_color,
            roughness,
            metallic,
            emission: 0.0,
            _padding: [0.0, 0.0],
        }
    }

    /// Return a copy with the given emission intensity.
    #[inline]
    pub const fn with_emission(mut self, emission: f32) -> Self {
        self.emission = emission;
        self
    }
}
