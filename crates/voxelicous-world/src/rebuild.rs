//! The C3 -> C6 seam: rebuilding an octree directly from a [`VoxelWorld`]'s
//! current solid entities, per the §2 data-flow diagram ("entities -> voxel
//! world -> rebuild").

use glam::Vec3;
use voxelicous_core::Result;
use voxelicous_voxel::{build, AttributeRegistry, BuildConfig, Octree};

use crate::entity_store::VoxelWorld;

/// Rebuild an octree from `world`'s current solid voxels.
///
/// Thin wrapper around [`VoxelWorld::query_solid_voxels`] and
/// [`voxelicous_voxel::build`]: callers that only have a world handle (not a
/// hand-built `SolidVoxel` slice) go through this instead of reaching into
/// the entity store themselves.
pub fn build_from_world(world: &VoxelWorld, world_min: Vec3, world_max: Vec3, config: &BuildConfig, registry: &AttributeRegistry) -> Result<Octree> {
    let voxels = world.query_solid_voxels();
    build(&voxels, world_min, world_max, config, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_store::EntityComponents;
    use voxelicous_voxel::{AttributeType, AttributeValue};

    #[test]
    fn builds_octree_from_world_entities() {
        let world = VoxelWorld::new(1.0);
        world
            .create(
                Vec3::new(8.0, 8.0, 8.0),
                EntityComponents {
                    density: Some(1.0),
                    material: Some(2),
                    color: Some(Vec3::ONE),
                    normal: Some(Vec3::Z),
                    ..Default::default()
                },
            )
            .unwrap();
        // Not solid: must not show up in the rebuilt tree.
        world
            .create(
                Vec3::new(2.0, 2.0, 2.0),
                EntityComponents {
                    density: Some(0.0),
                    ..Default::default()
                },
            )
            .unwrap();

        let registry = AttributeRegistry::new();
        registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };

        let octree = build_from_world(&world, Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap();
        assert_eq!(octree.bricks.len(), 1);
    }
}
