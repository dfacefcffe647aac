//! ESVO ray traversal (C8): parametric PUSH/ADVANCE/POP stack traversal in
//! mirrored normalized `[1,2]^3` space (Laine & Karras 2010, Appendix A).

use glam::Vec3;
use tracing::instrument;
use voxelicous_core::math::Ray;
use voxelicous_core::Error;

use super::brick_dda::{cast_in_brick, MAX_STEPS as BRICK_MAX_STEPS};
use super::descriptor::Octree;
use super::lod::LodParams;
use crate::attributes::BRICK_EDGE;

/// Root traversal scale, per the reference's `CAST_STACK_DEPTH`.
pub const CAST_STACK_DEPTH: i32 = 23;

/// A condition under which a ray cast reports no hit. Not an [`Error`] --
/// a miss is an expected outcome of casting a ray, per the engine's error
/// design (see `voxelicous_core::error`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissReason {
    /// The ray's entry/exit span against the root cube was empty (`t_min > t_max`).
    InvalidSpan,
    /// The traversal stack emptied (popped past the root) without a hit.
    StackExit,
}

/// Enough state to resume or inspect a traversal after it stops.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraversalState {
    pub parent: u32,
    pub idx: u8,
    pub scale: i32,
    pub pos: Vec3,
}

/// A successful ray/octree intersection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// World-space parametric distance from the ray origin.
    pub t: f32,
    /// World-space hit position.
    pub position: Vec3,
    /// World-space outward surface normal.
    pub normal: Vec3,
    /// Octree scale level at which the hit was resolved (finer = smaller).
    pub scale: i32,
    /// The brick material byte, when the hit resolved to an actual brick
    /// voxel rather than an LOD-terminated approximate hit.
    pub material: Option<u8>,
    pub traversal_state: Option<TraversalState>,
}

/// The outcome of a ray cast: a hit, or a structured miss.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayOutcome {
    Hit(RayHit),
    Miss { reason: MissReason },
}

impl RayOutcome {
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn hit(&self) -> Option<&RayHit> {
        match self {
            Self::Hit(hit) => Some(hit),
            Self::Miss { .. } => None,
        }
    }
}

/// Iteration counters accumulated during one [`cast_ray`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RayStats {
    pub iteration_count: u32,
    pub push_count: u32,
    pub pop_count: u32,
}

#[derive(Clone, Copy)]
struct StackEntry {
    parent: u32,
    t_max: f32,
}

/// Which in-memory representation an [`OctreeAccess`] implementor uses.
///
/// Only [`StructureKind::Esvo`] (this crate's canonical bit-packed
/// representation) is implemented; the others are declared so the
/// capability surface is extensible without speculative unused code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructureKind {
    Esvo,
    Dag,
    Svdag,
    HashGrid,
    Compressed,
}

/// Common capability set shared by every octree representation.
///
/// Implemented only for the `Esvo` variant in this crate; constructing any
/// other `StructureKind` is an explicit "unsupported variant" failure
/// (`ErrorKind::InvalidBounds`), not a panic.
pub trait OctreeAccess {
    fn kind(&self) -> StructureKind;
    fn voxel_exists(&self, position: Vec3, scale: f32) -> bool;
    fn cast_ray(&self, ray: &Ray) -> (RayOutcome, RayStats);
    fn cast_ray_lod(&self, ray: &Ray, lod: LodParams) -> (RayOutcome, RayStats);
}

/// Construct a placeholder for an unimplemented structural variant.
///
/// Always fails: only [`StructureKind::Esvo`] has a constructible body in
/// this crate.
pub fn unsupported_variant(kind: StructureKind) -> voxelicous_core::Result<()> {
    if matches!(kind, StructureKind::Esvo) {
        Ok(())
    } else {
        Err(Error::invalid_bounds(0, 0))
    }
}

impl OctreeAccess for Octree {
    fn kind(&self) -> StructureKind {
        StructureKind::Esvo
    }

    fn voxel_exists(&self, position: Vec3, scale: f32) -> bool {
        let ray = Ray {
            origin: position - Vec3::splat(scale),
            direction: Vec3::ONE.normalize(),
        };
        matches!(cast_ray(self, &ray, LodParams::DISABLED).0, RayOutcome::Hit(_))
    }

    fn cast_ray(&self, ray: &Ray) -> (RayOutcome, RayStats) {
        cast_ray(self, ray, LodParams::DISABLED)
    }

    fn cast_ray_lod(&self, ray: &Ray, lod: LodParams) -> (RayOutcome, RayStats) {
        cast_ray(self, ray, lod)
    }
}

/// Cast a single ray against `octree`, with optional screen-space LOD termination.
///
/// Instrumented at `trace` level: per-ray spans are far too fine-grained to
/// enable by default, but are invaluable when chasing a specific traversal
/// bug with `RUST_LOG=voxelicous_voxel=trace`.
#[instrument(level = "trace", skip_all)]
pub fn cast_ray(octree: &Octree, ray: &Ray, lod: LodParams) -> (RayOutcome, RayStats) {
    let mut stats = RayStats::default();

    if octree.is_empty() {
        return (RayOutcome::Miss { reason: MissReason::StackExit }, stats);
    }

    let world_min = Vec3::from(octree.config.world_min);
    let world_extent = Vec3::from(octree.config.world_extent);
    let voxel_size = octree.config.voxel_size;
    let inv_extent = Vec3::ONE / world_extent;

    let o = (ray.origin - world_min) * inv_extent + Vec3::ONE;
    let mut d = ray.direction * inv_extent;

    let epsilon = 2f32.powi(-CAST_STACK_DEPTH);
    if d.x.abs() < epsilon {
        d.x = epsilon.copysign(d.x);
    }
    if d.y.abs() < epsilon {
        d.y = epsilon.copysign(d.y);
    }
    if d.z.abs() < epsilon {
        d.z = epsilon.copysign(d.z);
    }

    let tx_coef = 1.0 / -d.x.abs();
    let ty_coef = 1.0 / -d.y.abs();
    let tz_coef = 1.0 / -d.z.abs();

    let mut tx_bias = tx_coef * o.x;
    let mut ty_bias = ty_coef * o.y;
    let mut tz_bias = tz_coef * o.z;

    let mut octant_mask: u8 = 0;
    if d.x > 0.0 {
        octant_mask ^= 1;
        tx_bias = 3.0 * tx_coef - tx_bias;
    }
    if d.y > 0.0 {
        octant_mask ^= 2;
        ty_bias = 3.0 * ty_coef - ty_bias;
    }
    if d.z > 0.0 {
        octant_mask ^= 4;
        tz_bias = 3.0 * tz_coef - tz_bias;
    }

    let mut t_min = (2.0 * tx_coef - tx_bias).max(2.0 * ty_coef - ty_bias).max(2.0 * tz_coef - tz_bias);
    let mut t_max = (tx_coef - tx_bias).min(ty_coef - ty_bias).min(tz_coef - tz_bias);
    let mut h = t_max;
    t_min = t_min.max(0.0);
    t_max = t_max.min(1.0);

    if t_min > t_max {
        return (RayOutcome::Miss { reason: MissReason::InvalidSpan }, stats);
    }

    let mut stack = vec![StackEntry { parent: 0, t_max: 0.0 }; CAST_STACK_DEPTH as usize + 1];

    let mut parent_idx: u32 = 0;
    let mut idx: u8 = 0;
    let mut pos = Vec3::ONE;
    let mut scale = CAST_STACK_DEPTH - 1;
    let mut scale_exp2 = 0.5f32;

    if 1.5 * tx_coef - tx_bias > t_min {
        idx ^= 1;
        pos.x = 1.5;
    }
    if 1.5 * ty_coef - ty_bias > t_min {
        idx ^= 2;
        pos.y = 1.5;
    }
    if 1.5 * tz_coef - tz_bias > t_min {
        idx ^= 4;
        pos.z = 1.5;
    }

    let max_iterations = 8 * CAST_STACK_DEPTH as u32 + BRICK_MAX_STEPS + 64;

    while scale < CAST_STACK_DEPTH {
        stats.iteration_count += 1;
        if stats.iteration_count > max_iterations {
            return (RayOutcome::Miss { reason: MissReason::StackExit }, stats);
        }

        let descriptor = octree.descriptors[parent_idx as usize];

        let tx_corner = pos.x * tx_coef - tx_bias;
        let ty_corner = pos.y * ty_coef - ty_bias;
        let tz_corner = pos.z * tz_coef - tz_bias;
        let tc_max = tx_corner.min(ty_corner).min(tz_corner);

        let child_octant = idx ^ octant_mask;
        let child_exists = descriptor.has_octant(child_octant);

        if child_exists && t_min <= t_max {
            if lod.should_terminate(tc_max, scale_exp2) {
                let t = t_min.max(0.0);
                return (
                    RayOutcome::Hit(RayHit {
                        t,
                        position: ray.origin + ray.direction * t,
                        normal: corner_normal(tx_corner, ty_corner, tz_corner, tc_max),
                        scale,
                        material: None,
                        traversal_state: Some(TraversalState { parent: parent_idx, idx, scale, pos }),
                    }),
                    stats,
                );
            }

            let tv_max = t_max.min(tc_max);
            let half = scale_exp2 * 0.5;
            let tx_center = half * tx_coef + tx_corner;
            let ty_center = half * ty_coef + ty_corner;
            let tz_center = half * tz_coef + tz_corner;

            if t_min <= tv_max {
                if descriptor.octant_is_leaf(child_octant) {
                    let brick_id = descriptor.child_slot(child_octant);
                    let entry_t = t_min.max(0.0);
                    let entry_world = ray.origin + ray.direction * entry_t;
                    let brick_world_size = voxel_size * BRICK_EDGE as f32;
                    let rel = (entry_world - world_min).rem_euclid(Vec3::splat(brick_world_size));
                    let local_entry = rel / voxel_size;
                    let local_dir = ray.direction / voxel_size;
                    let entry_axis = if tx_corner <= ty_corner && tx_corner <= tz_corner {
                        0
                    } else if ty_corner <= tz_corner {
                        1
                    } else {
                        2
                    };

                    if let Some(brick) = octree.bricks.get(brick_id as usize) {
                        if let Some(brick_hit) = cast_in_brick(brick, local_entry, local_dir, entry_axis) {
                            let t = entry_t + brick_hit.t;
                            return (
                                RayOutcome::Hit(RayHit {
                                    t,
                                    position: ray.origin + ray.direction * t,
                                    normal: Vec3::new(brick_hit.normal.x as f32, brick_hit.normal.y as f32, brick_hit.normal.z as f32),
                                    scale,
                                    material: Some(brick_hit.material),
                                    traversal_state: Some(TraversalState { parent: parent_idx, idx, scale, pos }),
                                }),
                                stats,
                            );
                        }
                    }
                    // DDA found no solid voxel in this brick: fall through to ADVANCE.
                } else {
                    stats.push_count += 1;
                    if tc_max < h {
                        stack[scale as usize] = StackEntry { parent: parent_idx, t_max };
                    }
                    h = tc_max;

                    parent_idx = descriptor.child_slot(child_octant);
                    idx = 0;
                    scale -= 1;
                    scale_exp2 = half;

                    if tx_center > t_min {
                        idx ^= 1;
                        pos.x += scale_exp2;
                    }
                    if ty_center > t_min {
                        idx ^= 2;
                        pos.y += scale_exp2;
                    }
                    if tz_center > t_min {
                        idx ^= 4;
                        pos.z += scale_exp2;
                    }

                    t_max = tv_max;
                    continue;
                }
            }
        }

        // ADVANCE
        let mut step_mask: u8 = 0;
        if tx_corner <= tc_max {
            step_mask ^= 1;
            pos.x -= scale_exp2;
        }
        if ty_corner <= tc_max {
            step_mask ^= 2;
            pos.y -= scale_exp2;
        }
        if tz_corner <= tc_max {
            step_mask ^= 4;
            pos.z -= scale_exp2;
        }

        t_min = tc_max;
        idx ^= step_mask;

        if (idx & step_mask) != 0 {
            // POP
            stats.pop_count += 1;
            let mut differing_bits: u32 = 0;
            if step_mask & 1 != 0 {
                differing_bits |= pos.x.to_bits() ^ (pos.x + scale_exp2).to_bits();
            }
            if step_mask & 2 != 0 {
                differing_bits |= pos.y.to_bits() ^ (pos.y + scale_exp2).to_bits();
            }
            if step_mask & 4 != 0 {
                differing_bits |= pos.z.to_bits() ^ (pos.z + scale_exp2).to_bits();
            }
            if differing_bits == 0 {
                return (RayOutcome::Miss { reason: MissReason::StackExit }, stats);
            }

            scale = 31 - differing_bits.leading_zeros() as i32;
            if scale >= CAST_STACK_DEPTH {
                return (RayOutcome::Miss { reason: MissReason::StackExit }, stats);
            }
            scale_exp2 = 2f32.powi(scale - CAST_STACK_DEPTH);

            let entry = stack[scale as usize];
            parent_idx = entry.parent;
            t_max = entry.t_max;

            let shx = (pos.x.to_bits() as i32) >> scale;
            let shy = (pos.y.to_bits() as i32) >> scale;
            let shz = (pos.z.to_bits() as i32) >> scale;
            pos.x = f32::from_bits((shx << scale) as u32);
            pos.y = f32::from_bits((shy << scale) as u32);
            pos.z = f32::from_bits((shz << scale) as u32);
            idx = (shx & 1) as u8 | (((shy & 1) as u8) << 1) | (((shz & 1) as u8) << 2);

            h = 0.0;
        }
    }

    (RayOutcome::Miss { reason: MissReason::StackExit }, stats)
}

fn corner_normal(tx: f32, ty: f32, tz: f32, tc_max: f32) -> Vec3 {
    if tx >= ty && tx >= tz {
        Vec3::new(-1.0, 0.0, 0.0)
    } else if ty >= tz {
        Vec3::new(0.0, -1.0, 0.0)
    } else {
        let _ = tc_max;
        Vec3::new(0.0, 0.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::builder::{build, BuildConfig, SolidVoxel};
    use crate::attributes::{AttributeRegistry, AttributeType, AttributeValue};

    fn tiny_world(voxels: &[SolidVoxel]) -> Octree {
        let registry = AttributeRegistry::new();
        registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
        let config = BuildConfig {
            max_levels: 6,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        build(voxels, Vec3::ZERO, Vec3::splat(16.0), &config, &registry).unwrap()
    }

    #[test]
    fn single_voxel_hit_from_outside() {
        let octree = tiny_world(&[SolidVoxel {
            position: Vec3::new(8.0, 8.0, 8.0),
            color: Vec3::ONE,
            normal: Vec3::Z,
            material: 1,
        }]);
        let ray = Ray::new(Vec3::new(15.0, 8.0, 8.0), Vec3::new(-1.0, 0.0, 0.0));
        let (outcome, _) = cast_ray(&octree, &ray, LodParams::DISABLED);
        let hit = outcome.hit().expect("expected a hit");
        assert!((hit.position.x - 8.0).abs() < 0.2);
    }

    #[test]
    fn empty_ray_reports_stack_exit() {
        let octree = tiny_world(&[SolidVoxel {
            position: Vec3::new(8.0, 8.0, 8.0),
            color: Vec3::ONE,
            normal: Vec3::Z,
            material: 1,
        }]);
        let ray = Ray::new(Vec3::new(15.0, 15.0, 15.0), Vec3::new(1.0, 0.0, 0.0));
        let (outcome, _) = cast_ray(&octree, &ray, LodParams::DISABLED);
        assert_eq!(outcome, RayOutcome::Miss { reason: MissReason::StackExit });
    }

    #[test]
    fn lod_termination_reduces_iteration_count() {
        let octree = tiny_world(&[SolidVoxel {
            position: Vec3::new(8.0, 8.0, 8.0),
            color: Vec3::ONE,
            normal: Vec3::Z,
            material: 1,
        }]);
        let ray = Ray::new(Vec3::new(15.0, 8.0, 8.0), Vec3::new(-1.0, 0.0, 0.0));
        let (_, stats_no_lod) = cast_ray(&octree, &ray, LodParams::DISABLED);
        let lod = LodParams {
            ray_orig_size: 0.0,
            ray_dir_size: 0.2,
        };
        let (outcome_lod, stats_lod) = cast_ray(&octree, &ray, lod);
        assert!(outcome_lod.is_hit());
        assert!(stats_lod.iteration_count <= stats_no_lod.iteration_count);
    }
}
