//! Amanatides-Woo 3D DDA inside an 8x8x8 brick (C9).
//!
//! Entered once ESVO traversal (C8) descends into a leaf descriptor; hands
//! control back to the parent traversal's ADVANCE step on a miss.

use glam::{IVec3, Vec3};

use crate::attributes::{BrickView, BRICK_EDGE};

/// Maximum DDA steps inside one brick: `3 * 8` per the invariant in §4.9.
pub const MAX_STEPS: u32 = 3 * BRICK_EDGE;

/// A hit reported by the in-brick DDA.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrickHit {
    /// Parametric distance from the brick-local entry point.
    pub t: f32,
    /// The `[0, 8)^3` cell the ray landed in.
    pub cell: (u32, u32, u32),
    /// Outward surface normal (axis-aligned, unit length).
    pub normal: IVec3,
    /// The non-zero material byte sampled at `cell`.
    pub material: u8,
}

fn axis_normal(axis: usize, step: Vec3) -> IVec3 {
    let sign = -step[axis] as i32;
    match axis {
        0 => IVec3::new(sign, 0, 0),
        1 => IVec3::new(0, sign, 0),
        _ => IVec3::new(0, 0, sign),
    }
}

/// Walk a brick's byte grid from `entry` (already in the brick's local
/// `[0, 8)^3` space) along `dir`. `entry_axis` names the axis along which
/// the ray crossed into the brick, used only if the entry cell itself is
/// already occupied (no DDA step has happened yet to derive a normal from).
pub fn cast_in_brick(brick: &[u8; crate::attributes::BRICK_VOXELS], entry: Vec3, dir: Vec3, entry_axis: usize) -> Option<BrickHit> {
    let edge = BRICK_EDGE as f32;
    let mut cell = entry.floor();
    cell.x = cell.x.clamp(0.0, edge - 1.0);
    cell.y = cell.y.clamp(0.0, edge - 1.0);
    cell.z = cell.z.clamp(0.0, edge - 1.0);

    let step = Vec3::new(dir.x.signum(), dir.y.signum(), dir.z.signum());
    let t_delta = Vec3::new(
        if dir.x != 0.0 { (1.0 / dir.x).abs() } else { f32::INFINITY },
        if dir.y != 0.0 { (1.0 / dir.y).abs() } else { f32::INFINITY },
        if dir.z != 0.0 { (1.0 / dir.z).abs() } else { f32::INFINITY },
    );

    let next_boundary = |axis_entry: f32, axis_cell: f32, axis_step: f32| -> f32 {
        if axis_step > 0.0 {
            axis_cell + 1.0 - axis_entry
        } else if axis_step < 0.0 {
            axis_entry - axis_cell
        } else {
            f32::INFINITY
        }
    };
    let mut t_next = Vec3::new(
        next_boundary(entry.x, cell.x, step.x) * t_delta.x,
        next_boundary(entry.y, cell.y, step.y) * t_delta.y,
        next_boundary(entry.z, cell.z, step.z) * t_delta.z,
    );

    let mut last_axis = entry_axis;
    let mut t = 0.0f32;

    for steps in 0..=MAX_STEPS {
        let (cx, cy, cz) = (cell.x as i32, cell.y as i32, cell.z as i32);
        if !(0..BRICK_EDGE as i32).contains(&cx) || !(0..BRICK_EDGE as i32).contains(&cy) || !(0..BRICK_EDGE as i32).contains(&cz)
        {
            return None;
        }
        let idx = BrickView::local_index(cx as u32, cy as u32, cz as u32);
        let material = brick[idx];
        if material != 0 {
            return Some(BrickHit {
                t,
                cell: (cx as u32, cy as u32, cz as u32),
                normal: axis_normal(last_axis, step),
                material,
            });
        }
        if steps == MAX_STEPS {
            return None;
        }

        let axis = if t_next.x <= t_next.y && t_next.x <= t_next.z {
            0
        } else if t_next.y <= t_next.z {
            1
        } else {
            2
        };
        t = t_next[axis];
        cell[axis] += step[axis];
        t_next[axis] += t_delta[axis];
        last_axis = axis;
    }
    None
}
