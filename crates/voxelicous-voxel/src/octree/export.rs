//! Binary export format (§6.2): a self-describing container for the octree's
//! GPU-ready buffers, consumed by an external render/tooling collaborator.

use std::io::{self, Read, Write};

use glam::Vec3;

use super::descriptor::Octree;

/// File magic identifying the format and its current revision.
pub const MAGIC: &[u8; 8] = b"LKSVO001";
/// Format version written by this crate.
pub const VERSION: u32 = 1;
const RESERVED_BYTES: usize = 24;

fn total_voxels(octree: &Octree) -> u64 {
    octree.bricks.iter().flatten().filter(|&&b| b != 0).count() as u64
}

/// Serialize `octree` to `writer` as a self-describing binary blob.
///
/// Layout: an 8-byte magic, a version `u32`, `max_levels` `u32`,
/// `total_voxels` `u64`, `world_min`/`world_max` (`f32[3]` each), 24
/// reserved bytes, then the hierarchy, brick, optional compressed color and
/// normal, brick-grid lookup, config, and material palette buffers in that
/// order (§6.1).
pub fn serialize<W: Write>(octree: &Octree, writer: &mut W) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&octree.config.max_levels.to_le_bytes())?;
    writer.write_all(&total_voxels(octree).to_le_bytes())?;
    writer.write_all(bytemuck::cast_slice(&octree.world_min().to_array()))?;
    writer.write_all(bytemuck::cast_slice(&octree.world_max().to_array()))?;
    writer.write_all(&[0u8; RESERVED_BYTES])?;

    let buffers = octree.gpu_buffers();
    writer.write_all(buffers.hierarchy)?;
    writer.write_all(buffers.bricks)?;
    if let Some(colors) = buffers.colors_compressed {
        writer.write_all(colors)?;
    }
    if let Some(normals) = buffers.normals_compressed {
        writer.write_all(normals)?;
    }
    writer.write_all(buffers.brick_grid_lookup)?;
    writer.write_all(buffers.config)?;
    writer.write_all(buffers.materials)?;
    Ok(())
}

/// Header fields read back by [`read_header`], ahead of the buffer payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportHeader {
    pub version: u32,
    pub max_levels: u32,
    pub total_voxels: u64,
    pub world_min: Vec3,
    pub world_max: Vec3,
}

/// Read and validate the fixed-size header, leaving `reader` positioned at
/// the start of the buffer payload.
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<ExportHeader> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "unrecognized octree export magic"));
    }

    let mut u32_buf = [0u8; 4];
    reader.read_exact(&mut u32_buf)?;
    let version = u32::from_le_bytes(u32_buf);
    reader.read_exact(&mut u32_buf)?;
    let max_levels = u32::from_le_bytes(u32_buf);

    let mut u64_buf = [0u8; 8];
    reader.read_exact(&mut u64_buf)?;
    let total_voxels = u64::from_le_bytes(u64_buf);

    let mut min_buf = [0u8; 12];
    reader.read_exact(&mut min_buf)?;
    let world_min = Vec3::new(
        f32::from_le_bytes(min_buf[0..4].try_into().unwrap()),
        f32::from_le_bytes(min_buf[4..8].try_into().unwrap()),
        f32::from_le_bytes(min_buf[8..12].try_into().unwrap()),
    );
    let mut max_buf = [0u8; 12];
    reader.read_exact(&mut max_buf)?;
    let world_max = Vec3::new(
        f32::from_le_bytes(max_buf[0..4].try_into().unwrap()),
        f32::from_le_bytes(max_buf[4..8].try_into().unwrap()),
        f32::from_le_bytes(max_buf[8..12].try_into().unwrap()),
    );

    let mut reserved = [0u8; RESERVED_BYTES];
    reader.read_exact(&mut reserved)?;

    Ok(ExportHeader {
        version,
        max_levels,
        total_voxels,
        world_min,
        world_max,
    })
}
