//! In-memory octree representation (C7): bit-packed child descriptors,
//! brick buffer, optional compressed attribute buffers, brick-grid lookup,
//! material palette, and the GPU-facing config UBO.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use voxelicous_core::math::Aabb;
use voxelicous_core::Material;

use crate::attributes::{BrickView, BRICK_EDGE, BRICK_VOXELS};
use crate::dxt::{ColorBlock, NormalBlock};

/// Sentinel value for an empty cell in the brick-grid lookup table.
pub const EMPTY_LOOKUP: u32 = 0xFFFF_FFFF;

/// Two 32-bit words describing one octree node: which octants exist,
/// which of those are leaves, and the index of the first contiguous child.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct ChildDescriptor {
    /// Bit `i` set iff octant `i` (bit0=X, bit1=Y, bit2=Z positive direction) exists.
    pub valid_mask: u8,
    /// Bit `i` set iff the existing octant `i` is a leaf (a brick reference).
    pub leaf_mask: u8,
    _reserved: u16,
    /// Absolute index of the first child descriptor (internal) or brick id (leaf-only parent).
    pub child_pointer: u32,
}

impl ChildDescriptor {
    pub const fn new(valid_mask: u8, leaf_mask: u8, child_pointer: u32) -> Self {
        Self {
            valid_mask,
            leaf_mask,
            _reserved: 0,
            child_pointer,
        }
    }

    /// A node is a leaf (no descriptor children of its own) iff `valid_mask == 0`.
    #[inline]
    pub const fn is_leaf(&self) -> bool {
        self.valid_mask == 0
    }

    #[inline]
    pub const fn has_octant(&self, octant: u8) -> bool {
        (self.valid_mask & (1 << octant)) != 0
    }

    #[inline]
    pub const fn octant_is_leaf(&self, octant: u8) -> bool {
        (self.leaf_mask & (1 << octant)) != 0
    }

    /// Index of `octant`'s descriptor (or brick id, if `octant_is_leaf`)
    /// relative to `child_pointer`, counting only lower-numbered occupied octants.
    #[inline]
    pub fn child_slot(&self, octant: u8) -> u32 {
        let below_mask = self.valid_mask & ((1u8 << octant).wrapping_sub(1));
        self.child_pointer + u32::from(below_mask.count_ones())
    }
}

/// GPU-facing configuration block (§6.1), exactly 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct OctreeConfig {
    pub world_min: [f32; 3],
    pub _pad0: f32,
    pub world_extent: [f32; 3],
    pub _pad1: f32,
    pub voxel_size: f32,
    pub max_levels: u32,
    pub brick_depth: u32,
    pub bricks_per_axis: u32,
    pub flags: u32,
    pub _reserved: [u32; 3],
}

/// `flags` bit for LOD-enabled traversal.
pub const FLAG_LOD_ENABLED: u32 = 1 << 0;
/// `flags` bit for present compressed-color buffer.
pub const FLAG_COLORS_COMPRESSED: u32 = 1 << 1;
/// `flags` bit for present compressed-normal buffer.
pub const FLAG_NORMALS_COMPRESSED: u32 = 1 << 2;

impl OctreeConfig {
    pub fn world_max(&self) -> Vec3 {
        Vec3::from(self.world_min) + Vec3::from(self.world_extent)
    }
}

/// Read-only byte views of the octree's buffers, ready for GPU upload.
pub struct GpuBuffers<'a> {
    pub hierarchy: &'a [u8],
    pub bricks: &'a [u8],
    pub colors_compressed: Option<&'a [u8]>,
    pub normals_compressed: Option<&'a [u8]>,
    pub brick_grid_lookup: &'a [u8],
    pub materials: &'a [u8],
    pub config: &'a [u8],
}

/// The ESVO octree: descriptors, brick payloads, optional compressed
/// attribute blocks, the coarse brick-grid lookup, and the material palette.
#[derive(Clone, Debug, Default)]
pub struct Octree {
    pub descriptors: Vec<ChildDescriptor>,
    pub bricks: Vec<[u8; BRICK_VOXELS]>,
    pub colors_compressed: Option<Vec<ColorBlock>>,
    pub normals_compressed: Option<Vec<NormalBlock>>,
    pub brick_grid_lookup: Vec<u32>,
    pub materials: Vec<Material>,
    pub config: OctreeConfig,
}

impl Octree {
    /// `true` for a build that produced no descriptors (empty scene).
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn root(&self) -> Option<&ChildDescriptor> {
        self.descriptors.first()
    }

    pub fn gpu_buffers(&self) -> GpuBuffers<'_> {
        GpuBuffers {
            hierarchy: bytemuck::cast_slice(&self.descriptors),
            bricks: bytemuck::cast_slice(&self.bricks),
            colors_compressed: self.colors_compressed.as_deref().map(bytemuck::cast_slice::<ColorBlock, u8>),
            normals_compressed: self.normals_compressed.as_deref().map(bytemuck::cast_slice::<NormalBlock, u8>),
            brick_grid_lookup: bytemuck::cast_slice(&self.brick_grid_lookup),
            materials: bytemuck::cast_slice(&self.materials),
            config: bytemuck::bytes_of(&self.config),
        }
    }

    pub fn world_min(&self) -> Vec3 {
        Vec3::from(self.config.world_min)
    }

    pub fn world_max(&self) -> Vec3 {
        self.config.world_max()
    }

    pub fn max_levels(&self) -> u32 {
        self.config.max_levels
    }

    /// World-space size of a node `scale` levels above a single voxel.
    pub fn voxel_size(&self, scale: u32) -> f32 {
        self.config.voxel_size * (1u32 << scale) as f32
    }

    /// Descend from the root toward `position`, stopping at the finest node
    /// whose world-space size is still `<= min_size`, or sooner at a leaf
    /// (a brick) or a missing octant. `None` for points outside the root
    /// cube or an empty tree.
    fn descend(&self, position: Vec3, min_size: f32) -> Option<DescendResult> {
        if self.is_empty() {
            return None;
        }
        let world_min = self.world_min();
        let world_size = self.world_max().x - world_min.x;
        if position.cmplt(world_min).any() || position.cmpgt(world_min + Vec3::splat(world_size)).any() {
            return None;
        }

        let mut node_min = world_min;
        let mut node_size = world_size;
        let mut descriptor_idx = 0u32;

        loop {
            let descriptor = self.descriptors[descriptor_idx as usize];
            let half = node_size * 0.5;
            let center = node_min + Vec3::splat(half);
            let octant = u8::from(position.x >= center.x) | (u8::from(position.y >= center.y) << 1) | (u8::from(position.z >= center.z) << 2);
            let child_min = node_min
                + Vec3::new(
                    if octant & 1 != 0 { half } else { 0.0 },
                    if octant & 2 != 0 { half } else { 0.0 },
                    if octant & 4 != 0 { half } else { 0.0 },
                );

            if !descriptor.has_octant(octant) {
                return Some(DescendResult {
                    exists: false,
                    brick: None,
                    descriptor,
                    min: child_min,
                    size: half,
                });
            }
            if descriptor.octant_is_leaf(octant) {
                return Some(DescendResult {
                    exists: true,
                    brick: Some(descriptor.child_slot(octant)),
                    descriptor,
                    min: child_min,
                    size: half,
                });
            }
            if half <= min_size {
                return Some(DescendResult {
                    exists: true,
                    brick: None,
                    descriptor,
                    min: child_min,
                    size: half,
                });
            }

            descriptor_idx = descriptor.child_slot(octant);
            node_min = child_min;
            node_size = half;
        }
    }

    /// `true` if a node or brick voxel exists at `position` down to `scale`.
    pub fn voxel_exists(&self, position: Vec3, scale: f32) -> bool {
        self.descend(position, scale).is_some_and(|r| r.exists)
    }

    /// The `validMask` of the descriptor containing `position` at `scale`.
    pub fn child_mask(&self, position: Vec3, scale: f32) -> u8 {
        self.descend(position, scale).map_or(0, |r| r.descriptor.valid_mask)
    }

    /// World-space bounds of the node containing `position` at `scale`.
    pub fn voxel_bounds(&self, position: Vec3, scale: f32) -> Aabb {
        match self.descend(position, scale) {
            Some(r) => Aabb::new(r.min, r.min + Vec3::splat(r.size)),
            None => Aabb::new(position, position),
        }
    }

    /// Look up a brick voxel's baked attributes at `position`.
    ///
    /// Returns `None` if no voxel exists there. `color`/`normal` fall back to
    /// the material palette's base color and `+Z` when the octree was built
    /// without C5 compression (the only form in which per-voxel color and
    /// normal survive into the GPU buffers).
    pub fn voxel_data(&self, position: Vec3, scale: f32) -> Option<VoxelData> {
        let result = self.descend(position, scale)?;
        if !result.exists {
            return None;
        }
        let Some(brick_id) = result.brick else {
            return Some(VoxelData {
                color: Vec3::from(self.materials.first().copied().unwrap_or_default().base_color),
                normal: Vec3::Z,
                occlusion: 1.0,
                is_leaf: false,
            });
        };
        let brick = self.bricks.get(brick_id as usize)?;
        let voxel_size = result.size / BRICK_EDGE as f32;
        let local = ((position - result.min) / voxel_size).floor();
        let lx = (local.x as i32).clamp(0, BRICK_EDGE as i32 - 1) as u32;
        let ly = (local.y as i32).clamp(0, BRICK_EDGE as i32 - 1) as u32;
        let lz = (local.z as i32).clamp(0, BRICK_EDGE as i32 - 1) as u32;
        let local_index = BrickView::local_index(lx, ly, lz);
        let material = brick[local_index];
        if material == 0 {
            return None;
        }

        let blocks_per_brick = BRICK_VOXELS / crate::dxt::BLOCK_TEXELS;
        let block_index = brick_id as usize * blocks_per_brick + local_index / crate::dxt::BLOCK_TEXELS;
        let texel = local_index % crate::dxt::BLOCK_TEXELS;
        let color = self
            .colors_compressed
            .as_ref()
            .and_then(|blocks| blocks.get(block_index))
            .map_or_else(
                || Vec3::from(self.materials.get(material as usize).or_else(|| self.materials.first()).copied().unwrap_or_default().base_color),
                |block| block.decode_texel(texel),
            );
        let normal = self
            .normals_compressed
            .as_ref()
            .and_then(|blocks| blocks.get(block_index))
            .map_or(Vec3::Z, |block| block.decode_texel(texel));

        Some(VoxelData {
            color,
            normal,
            occlusion: 1.0,
            is_leaf: true,
        })
    }
}

struct DescendResult {
    exists: bool,
    brick: Option<u32>,
    descriptor: ChildDescriptor,
    min: Vec3,
    size: f32,
}

/// A brick voxel's baked attributes, as returned by [`Octree::voxel_data`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelData {
    pub color: Vec3,
    pub normal: Vec3,
    pub occlusion: f32,
    pub is_leaf: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_is_64_bits() {
        assert_eq!(std::mem::size_of::<ChildDescriptor>(), 8);
    }

    #[test]
    fn config_is_64_bytes() {
        assert_eq!(std::mem::size_of::<OctreeConfig>(), 64);
    }

    #[test]
    fn leaf_iff_no_valid_mask() {
        let leaf = ChildDescriptor::new(0, 0, 7);
        assert!(leaf.is_leaf());
        let internal = ChildDescriptor::new(0b0000_0101, 0, 3);
        assert!(!internal.is_leaf());
    }

    #[test]
    fn child_slot_counts_lower_occupied_octants() {
        let node = ChildDescriptor::new(0b0010_1001, 0, 10);
        assert_eq!(node.child_slot(0), 10);
        assert_eq!(node.child_slot(3), 11);
        assert_eq!(node.child_slot(5), 12);
    }

    #[test]
    fn empty_octree_has_no_descriptors() {
        let octree = Octree::default();
        assert!(octree.is_empty());
        assert_eq!(octree.brick_grid_lookup.iter().filter(|&&v| v != EMPTY_LOOKUP).count(), 0);
    }

    fn built_octree() -> Octree {
        use crate::attributes::{AttributeRegistry, AttributeType, AttributeValue};
        use crate::octree::builder::{build, BuildConfig, SolidVoxel};

        let registry = AttributeRegistry::new();
        registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        let voxels = [SolidVoxel {
            position: Vec3::new(8.0, 8.0, 8.0),
            color: Vec3::new(1.0, 0.0, 0.0),
            normal: Vec3::Z,
            material: 1,
        }];
        build(&voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap()
    }

    #[test]
    fn voxel_exists_at_occupied_position() {
        let octree = built_octree();
        assert!(octree.voxel_exists(Vec3::new(8.0, 8.0, 8.0), 0.0));
        assert!(!octree.voxel_exists(Vec3::new(0.1, 0.1, 0.1), 0.0));
    }

    #[test]
    fn voxel_data_reports_leaf_with_material() {
        let octree = built_octree();
        let data = octree.voxel_data(Vec3::new(8.0, 8.0, 8.0), 0.0).expect("voxel exists");
        assert!(data.is_leaf);
    }

    #[test]
    fn voxel_bounds_are_within_world() {
        let octree = built_octree();
        let bounds = octree.voxel_bounds(Vec3::new(8.0, 8.0, 8.0), 0.0);
        assert!(bounds.min.x >= 0.0 && bounds.max.x <= 16.0);
    }
}
