//! Sparse voxel octree: representation (C7), builder (C6), ray traversal
//! (C8), brick-local DDA (C9), screen-space LOD termination, and binary
//! export.

pub mod brick_dda;
pub mod builder;
pub mod descriptor;
pub mod export;
pub mod lod;
pub mod traversal;

pub use brick_dda::{cast_in_brick, BrickHit, MAX_STEPS as BRICK_MAX_STEPS};
pub use builder::{build, group_by_brick, BrickCoord, BuildConfig, SolidVoxel};
pub use descriptor::{ChildDescriptor, GpuBuffers, Octree, OctreeConfig, VoxelData, EMPTY_LOOKUP, FLAG_COLORS_COMPRESSED, FLAG_LOD_ENABLED, FLAG_NORMALS_COMPRESSED};
pub use lod::{esvo_scale_to_world_size, esvo_t_to_world_distance, LodParams};
pub use traversal::{cast_ray, unsupported_variant, MissReason, OctreeAccess, RayHit, RayOutcome, RayStats, StructureKind, TraversalState, CAST_STACK_DEPTH};
