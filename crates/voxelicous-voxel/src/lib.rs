//! Sparse voxel octree storage and ray traversal for the Voxelicous engine.
//!
//! - [`attributes`]: named, typed attribute columns over brick-sized slots (C2).
//! - [`dxt`]: DXT-style block compression for brick color/normal attributes (C5).
//! - [`octree`]: the bit-packed octree representation, builder, ESVO ray
//!   traversal, brick DDA, and LOD termination (C6-C9).

pub mod attributes;
pub mod dxt;
pub mod octree;

pub use attributes::{AttributeRegistry, AttributeType, AttributeValue, BrickView, BRICK_EDGE, BRICK_VOXELS};
pub use dxt::{encode_color_block, encode_colors_bulk, encode_normal_block, encode_normals_bulk, ColorBlock, NormalBlock, BLOCK_TEXELS};
pub use octree::{
    build, cast_in_brick, cast_ray, group_by_brick, unsupported_variant, BrickCoord, BrickHit, BuildConfig, ChildDescriptor, GpuBuffers, LodParams,
    MissReason, Octree, OctreeAccess, OctreeConfig, RayHit, RayOutcome, RayStats, SolidVoxel, StructureKind, TraversalState, VoxelData,
};
