//! Bottom-up Morton-sorted octree builder (C6).
//!
//! Consumes a flat list of solid voxels (as produced by a voxel world's
//! `query_solid_voxels`, §4.3, or `voxelicous_world::build_from_world`) plus
//! world bounds and emits a complete [`Octree`]:
//! bricks materialized through the attribute registry (C2), optionally
//! compressed through C5, Morton-sorted, and assembled into a BFS-flattened
//! descriptor hierarchy (C7) ready for C8 traversal.

use std::collections::VecDeque;

use glam::Vec3;
use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::{debug, info, instrument};
use voxelicous_core::morton;
use voxelicous_core::{Error, Material, Result};

use crate::attributes::{AttributeRegistry, AttributeType, AttributeValue, BrickView, BRICK_EDGE, BRICK_VOXELS};
use crate::dxt::{encode_colors_bulk, encode_normals_bulk, ColorBlock, NormalBlock};

use super::descriptor::{ChildDescriptor, Octree, OctreeConfig, EMPTY_LOOKUP, FLAG_COLORS_COMPRESSED, FLAG_NORMALS_COMPRESSED};

/// One solid voxel handed to the builder: world position plus the
/// attributes that get baked into its brick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolidVoxel {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    /// Nonzero material palette index; 0 is reserved to mean "empty".
    pub material: u8,
}

/// Builder parameters (§10), mirroring the reference builder's defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildConfig {
    /// Total octree depth, root to voxel, including the brick's own levels.
    pub max_levels: u32,
    /// `log2` of the brick edge; the brick storage (C2) fixes the edge at 8,
    /// so this must be `3`.
    pub brick_depth: u32,
    pub error_threshold: f32,
    pub enable_compression: bool,
    /// `0` means "use the global `rayon` pool".
    pub num_threads: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_levels: 16,
            brick_depth: 3,
            error_threshold: 0.001,
            enable_compression: false,
            num_threads: 0,
        }
    }
}

/// A brick's grid coordinate, hashed via its Morton encoding rather than a
/// derived structural hash (§4.6.1) -- cheap and collision-free by
/// construction over the representable coordinate range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrickCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BrickCoord {
    fn morton(self) -> u64 {
        morton::encode(self.x, self.y, self.z).unwrap_or(u64::MAX)
    }
}

impl std::hash::Hash for BrickCoord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.morton().hash(state);
    }
}

/// Whether `v` is an exact power of two: a normalized `f32` whose mantissa
/// bits are all zero. Used to reject world extents (e.g. `17.0`) that are
/// not a power-of-two-aligned cube, per §4.6/§7's `InvalidBounds` contract.
fn is_power_of_two_f32(v: f32) -> bool {
    v.is_finite() && v > 0.0 && (v.to_bits() & 0x007F_FFFF) == 0
}

/// Group voxel indices by the brick cell they fall into.
///
/// `bricks_per_axis` clamps each coordinate into `[0, bricks_per_axis)`: a
/// voxel sitting exactly on (or, from float error, just past) `world_max`
/// otherwise produces a brick coordinate one past the grid's last valid
/// index, which would later index `brick_grid_lookup` out of bounds.
///
/// Exposed independently of [`build`] so incremental insertion workflows
/// ("insert many, compact once") can reuse the same grouping stage 2 of the
/// builder uses rather than re-deriving it.
pub fn group_by_brick(voxels: &[SolidVoxel], world_min: Vec3, brick_world_size: f32, bricks_per_axis: u32) -> HashMap<BrickCoord, Vec<usize>> {
    let max = bricks_per_axis as i32 - 1;
    let mut groups: HashMap<BrickCoord, Vec<usize>> = HashMap::new();
    for (i, voxel) in voxels.iter().enumerate() {
        let rel = (voxel.position - world_min) / brick_world_size;
        let coord = BrickCoord {
            x: (rel.x.floor() as i32).clamp(0, max),
            y: (rel.y.floor() as i32).clamp(0, max),
            z: (rel.z.floor() as i32).clamp(0, max),
        };
        groups.entry(coord).or_default().push(i);
    }
    groups
}

struct MaterializedBrick {
    occupancy: [u8; BRICK_VOXELS],
    colors: Vec<Vec3>,
    normals: Vec<Vec3>,
}

fn ensure_attr(registry: &AttributeRegistry, name: &str, ty: AttributeType, default: AttributeValue) -> Result<usize> {
    if let Some(index) = registry.attribute_index(name) {
        return Ok(index);
    }
    registry.add_attribute(name, ty, default)
}

fn materialize_brick(
    coord: BrickCoord,
    members: &[usize],
    voxels: &[SolidVoxel],
    world_min: Vec3,
    voxel_size: f32,
    registry: &AttributeRegistry,
    material_attr: usize,
    color_attr: usize,
    normal_attr: usize,
) -> Result<MaterializedBrick> {
    let brick_min = world_min + Vec3::new(coord.x as f32, coord.y as f32, coord.z as f32) * voxel_size * BRICK_EDGE as f32;
    let brick_id = registry.allocate_brick();
    let view = registry.brick(brick_id)?;

    for &member in members {
        let voxel = &voxels[member];
        let local = ((voxel.position - brick_min) / voxel_size).floor();
        let lx = (local.x as i32).clamp(0, BRICK_EDGE as i32 - 1) as u32;
        let ly = (local.y as i32).clamp(0, BRICK_EDGE as i32 - 1) as u32;
        let lz = (local.z as i32).clamp(0, BRICK_EDGE as i32 - 1) as u32;
        let idx = BrickView::local_index(lx, ly, lz);
        view.set_u32(material_attr, idx, voxel.material as u32)?;
        view.set_vec3(color_attr, idx, voxel.color.to_array())?;
        view.set_vec3(normal_attr, idx, voxel.normal.to_array())?;
    }

    let mut occupancy = [0u8; BRICK_VOXELS];
    let mut colors = vec![Vec3::ZERO; BRICK_VOXELS];
    let mut normals = vec![Vec3::Z; BRICK_VOXELS];
    for i in 0..BRICK_VOXELS {
        let material = view.get_u32(material_attr, i)?;
        if material != 0 {
            occupancy[i] = material as u8;
            colors[i] = Vec3::from(view.get_vec3(color_attr, i)?);
            normals[i] = Vec3::from(view.get_vec3(normal_attr, i)?);
        }
    }

    registry.free_brick(brick_id)?;

    Ok(MaterializedBrick { occupancy, colors, normals })
}

/// Build a complete [`Octree`] from a flat voxel list (§4.6).
///
/// `registry` is used as scratch workspace for per-brick attribute
/// materialization (C2); its `material`/`color`/`normal` attributes are
/// registered on demand if the caller hasn't already added them.
#[instrument(level = "debug", skip(voxels, registry), fields(voxel_count = voxels.len()))]
pub fn build(voxels: &[SolidVoxel], world_min: Vec3, world_max: Vec3, config: &BuildConfig, registry: &AttributeRegistry) -> Result<Octree> {
    if config.brick_depth != 3 {
        return Err(Error::invalid_bounds(config.max_levels, config.brick_depth));
    }
    if config.max_levels <= config.brick_depth {
        return Err(Error::invalid_bounds(config.max_levels, config.brick_depth));
    }

    let extent = world_max - world_min;
    if extent.x <= 0.0 || extent.y <= 0.0 || extent.z <= 0.0 {
        return Err(Error::invalid_bounds(config.max_levels, config.brick_depth));
    }
    let uniform = (extent.x - extent.y).abs() < 1e-4 && (extent.y - extent.z).abs() < 1e-4;
    if !uniform || !is_power_of_two_f32(extent.x) {
        return Err(Error::invalid_bounds(config.max_levels, config.brick_depth));
    }

    let levels_above_brick = config.max_levels - config.brick_depth;
    let bricks_per_axis = 1u32 << levels_above_brick;
    let voxel_size = extent.x / (1u64 << config.max_levels) as f32;
    let brick_world_size = voxel_size * BRICK_EDGE as f32;

    let mut base_config = OctreeConfig {
        world_min: world_min.to_array(),
        _pad0: 0.0,
        world_extent: extent.to_array(),
        _pad1: 0.0,
        voxel_size,
        max_levels: config.max_levels,
        brick_depth: config.brick_depth,
        bricks_per_axis,
        flags: 0,
        _reserved: [0; 3],
    };

    if voxels.is_empty() {
        debug!("building empty octree, no solid voxels");
        return Ok(Octree {
            descriptors: Vec::new(),
            bricks: Vec::new(),
            colors_compressed: None,
            normals_compressed: None,
            brick_grid_lookup: vec![EMPTY_LOOKUP; (bricks_per_axis as usize).pow(3)],
            materials: vec![Material::default()],
            config: base_config,
        });
    }

    let material_attr = ensure_attr(registry, "material", AttributeType::U32, AttributeValue::U32(0))?;
    let color_attr = ensure_attr(registry, "color", AttributeType::Vec3, AttributeValue::Vec3([0.0, 0.0, 0.0]))?;
    let normal_attr = ensure_attr(registry, "normal", AttributeType::Vec3, AttributeValue::Vec3([0.0, 0.0, 1.0]))?;

    let groups = group_by_brick(voxels, world_min, brick_world_size, bricks_per_axis);
    let mut brick_coords: Vec<BrickCoord> = groups.keys().copied().collect();
    brick_coords.par_sort_unstable_by_key(|c| c.morton());

    let materialized: Vec<MaterializedBrick> = brick_coords
        .par_iter()
        .map(|coord| {
            let members = &groups[coord];
            materialize_brick(*coord, members, voxels, world_min, voxel_size, registry, material_attr, color_attr, normal_attr)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut bricks: Vec<[u8; BRICK_VOXELS]> = Vec::with_capacity(materialized.len());
    let mut colors_compressed: Vec<ColorBlock> = Vec::new();
    let mut normals_compressed: Vec<NormalBlock> = Vec::new();
    for brick in &materialized {
        bricks.push(brick.occupancy);
        if config.enable_compression {
            colors_compressed.extend(encode_colors_bulk(&brick.colors));
            normals_compressed.extend(encode_normals_bulk(&brick.normals));
        }
    }

    let mut brick_grid_lookup = vec![EMPTY_LOOKUP; (bricks_per_axis as usize).pow(3)];
    let mut brick_coord_to_index: HashMap<(i32, i32, i32), u32> = HashMap::new();
    for (i, coord) in brick_coords.iter().enumerate() {
        brick_coord_to_index.insert((coord.x, coord.y, coord.z), i as u32);
        let lookup_idx = coord.x as usize
            + coord.y as usize * bricks_per_axis as usize
            + coord.z as usize * bricks_per_axis as usize * bricks_per_axis as usize;
        brick_grid_lookup[lookup_idx] = i as u32;
    }

    let descriptors = build_hierarchy(&brick_coords, &brick_coord_to_index, levels_above_brick);

    base_config.flags = if config.enable_compression {
        FLAG_COLORS_COMPRESSED | FLAG_NORMALS_COMPRESSED
    } else {
        0
    };

    info!(bricks = brick_coords.len(), descriptors = descriptors.len(), "octree rebuilt");

    Ok(Octree {
        descriptors,
        bricks,
        colors_compressed: config.enable_compression.then_some(colors_compressed),
        normals_compressed: config.enable_compression.then_some(normals_compressed),
        brick_grid_lookup,
        materials: vec![Material::default()],
        config: base_config,
    })
}

fn octant_of(coord: (i32, i32, i32)) -> u8 {
    (coord.0 & 1) as u8 | (((coord.1 & 1) as u8) << 1) | (((coord.2 & 1) as u8) << 2)
}

fn child_coord(parent: (i32, i32, i32), octant: u8) -> (i32, i32, i32) {
    (
        parent.0 * 2 + (octant & 1) as i32,
        parent.1 * 2 + ((octant >> 1) & 1) as i32,
        parent.2 * 2 + ((octant >> 2) & 1) as i32,
    )
}

struct PendingNode {
    level: u32,
    coord: (i32, i32, i32),
    index: u32,
}

/// Fold Morton-sorted occupied brick coordinates into a BFS-flattened
/// descriptor array, root first (§4.6 stage 5).
fn build_hierarchy(
    brick_coords: &[BrickCoord],
    brick_coord_to_index: &HashMap<(i32, i32, i32), u32>,
    levels_above_brick: u32,
) -> Vec<ChildDescriptor> {
    // level_occupancy[L - 1] maps a level-L coordinate to which of its 8
    // octants are occupied at level L-1 (bricks, when L == 1).
    let mut level_occupancy: Vec<HashMap<(i32, i32, i32), [bool; 8]>> = Vec::with_capacity(levels_above_brick as usize);
    let mut prev_coords: Vec<(i32, i32, i32)> = brick_coords.iter().map(|c| (c.x, c.y, c.z)).collect();

    for _ in 0..levels_above_brick {
        let mut map: HashMap<(i32, i32, i32), [bool; 8]> = HashMap::new();
        for coord in &prev_coords {
            let parent = (coord.0 >> 1, coord.1 >> 1, coord.2 >> 1);
            let octant = octant_of(*coord);
            map.entry(parent).or_insert([false; 8])[octant as usize] = true;
        }
        prev_coords = map.keys().copied().collect();
        level_occupancy.push(map);
    }

    let root_level = levels_above_brick;
    let mut descriptors = vec![ChildDescriptor::new(0, 0, 0)];
    let mut queue = VecDeque::new();
    queue.push_back(PendingNode {
        level: root_level,
        coord: (0, 0, 0),
        index: 0,
    });

    while let Some(PendingNode { level, coord, index }) = queue.pop_front() {
        let slots = level_occupancy[(level - 1) as usize]
            .get(&coord)
            .expect("occupied cell must be present in its level's occupancy map");

        let mut valid_mask = 0u8;
        let mut leaf_mask = 0u8;
        let mut occupied_octants = Vec::with_capacity(8);
        for octant in 0u8..8 {
            if slots[octant as usize] {
                valid_mask |= 1 << octant;
                occupied_octants.push(octant);
                if level == 1 {
                    leaf_mask |= 1 << octant;
                }
            }
        }

        let child_pointer = if level == 1 {
            let first_child = child_coord(coord, occupied_octants[0]);
            brick_coord_to_index[&first_child]
        } else {
            let start = descriptors.len() as u32;
            for &octant in &occupied_octants {
                let c = child_coord(coord, octant);
                let child_index = descriptors.len() as u32;
                descriptors.push(ChildDescriptor::new(0, 0, 0));
                queue.push_back(PendingNode {
                    level: level - 1,
                    coord: c,
                    index: child_index,
                });
            }
            start
        };

        descriptors[index as usize] = ChildDescriptor::new(valid_mask, leaf_mask, child_pointer);
    }

    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_density() -> AttributeRegistry {
        let registry = AttributeRegistry::new();
        registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
        registry
    }

    #[test]
    fn empty_input_produces_empty_octree() {
        let registry = registry_with_density();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let octree = build(&[], Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap();
        assert!(octree.is_empty());
        assert!(octree.brick_grid_lookup.iter().all(|&v| v == EMPTY_LOOKUP));
    }

    #[test]
    fn single_voxel_produces_root_leaf_chain() {
        let registry = registry_with_density();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let voxels = [SolidVoxel {
            position: Vec3::new(8.0, 8.0, 8.0),
            color: Vec3::ONE,
            normal: Vec3::Z,
            material: 1,
        }];
        let octree = build(&voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap();
        assert_eq!(octree.bricks.len(), 1);
        assert!(octree.root().is_some());
        assert_eq!(octree.brick_grid_lookup.iter().filter(|&&v| v != EMPTY_LOOKUP).count(), 1);
    }

    #[test]
    fn rebuild_is_byte_identical() {
        let voxels = [
            SolidVoxel {
                position: Vec3::new(1.0, 1.0, 1.0),
                color: Vec3::X,
                normal: Vec3::Z,
                material: 1,
            },
            SolidVoxel {
                position: Vec3::new(14.0, 14.0, 14.0),
                color: Vec3::Y,
                normal: Vec3::Y,
                material: 2,
            },
        ];
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let a = build(&voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry_with_density()).unwrap();
        let b = build(&voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry_with_density()).unwrap();
        assert_eq!(a.descriptors, b.descriptors);
        assert_eq!(a.bricks, b.bricks);
        assert_eq!(a.brick_grid_lookup, b.brick_grid_lookup);
    }

    #[test]
    fn insertion_order_does_not_affect_build_output() {
        // Same scattered voxels as `rebuild_is_byte_identical`'s sibling
        // scenario, but enumerated in two unrelated orders: Morton-sorting
        // inside the builder must make the input order irrelevant.
        let forward = [
            SolidVoxel { position: Vec3::new(1.0, 1.0, 1.0), color: Vec3::X, normal: Vec3::Z, material: 1 },
            SolidVoxel { position: Vec3::new(9.0, 2.0, 3.0), color: Vec3::Y, normal: Vec3::Y, material: 2 },
            SolidVoxel { position: Vec3::new(14.0, 14.0, 14.0), color: Vec3::Z, normal: Vec3::X, material: 3 },
            SolidVoxel { position: Vec3::new(3.0, 12.0, 5.0), color: Vec3::ONE, normal: Vec3::Z, material: 4 },
        ];
        let mut shuffled = [forward[2], forward[0], forward[3], forward[1]];
        shuffled.reverse();

        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let a = build(&forward, Vec3::ZERO, Vec3::splat(16.0), &config, &registry_with_density()).unwrap();
        let b = build(&shuffled, Vec3::ZERO, Vec3::splat(16.0), &config, &registry_with_density()).unwrap();
        assert_eq!(a.descriptors, b.descriptors);
        assert_eq!(a.bricks, b.bricks);
        assert_eq!(a.brick_grid_lookup, b.brick_grid_lookup);
    }

    #[test]
    fn non_cubic_bounds_are_rejected() {
        let config = BuildConfig::default();
        let err = build(&[], Vec3::ZERO, Vec3::new(16.0, 8.0, 16.0), &config, &registry_with_density()).unwrap_err();
        assert_eq!(err.kind(), voxelicous_core::ErrorKind::InvalidBounds);
    }

    #[test]
    fn non_power_of_two_cube_is_rejected() {
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let err = build(&[], Vec3::ZERO, Vec3::splat(17.0), &config, &registry_with_density()).unwrap_err();
        assert_eq!(err.kind(), voxelicous_core::ErrorKind::InvalidBounds);
    }

    #[test]
    fn voxel_on_world_max_does_not_panic() {
        let registry = registry_with_density();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let voxels = [SolidVoxel {
            position: Vec3::splat(16.0),
            color: Vec3::ONE,
            normal: Vec3::Z,
            material: 1,
        }];
        let octree = build(&voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap();
        assert_eq!(octree.bricks.len(), 1);
    }

    #[test]
    fn two_adjacent_bricks_share_a_parent() {
        let registry = registry_with_density();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let voxels = [
            SolidVoxel {
                position: Vec3::new(1.0, 1.0, 1.0),
                color: Vec3::ONE,
                normal: Vec3::Z,
                material: 1,
            },
            SolidVoxel {
                position: Vec3::new(3.0, 1.0, 1.0),
                color: Vec3::ONE,
                normal: Vec3::Z,
                material: 1,
            },
        ];
        let octree = build(&voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap();
        assert_eq!(octree.bricks.len(), 2);
    }
}
