//! Entity system for the Voxelicous engine.
//!
//! Uses hecs as the ECS backend. Components are intentionally a closed set:
//! a voxel entity carries whichever of these are relevant to it, addressed
//! by its [`MortonKey`] rather than a free-form transform.

use glam::Vec3;
pub use hecs::{Entity, World};

/// Scalar occupancy/density of a voxel entity. `Density > 0.0` is the
/// convention used by "all solid" spatial queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density(pub f32);

/// Material palette index, distinct from [`voxelicous_core::material::Material`]
/// (the palette entry itself): this is the index a voxel entity points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialId(pub u32);

/// Emissive brightness multiplier, independent of [`Emission`]'s color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionIntensity(pub f32);

/// Base color, `vec3` in linear space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub Vec3);

/// Surface normal, `vec3`, expected unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal(pub Vec3);

/// Emissive color, `vec3`, scaled by [`EmissionIntensity`] when present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission(pub Vec3);

/// The entity's position encoded as a Morton (Z-order) key, derived from its
/// world position and the world's voxel size at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MortonKey(pub u64);

/// Optional back-reference to the brick or volume that owns this entity,
/// for code that walks from an entity to its containing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrickRef(pub u32);
