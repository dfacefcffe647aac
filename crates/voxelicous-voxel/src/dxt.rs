//! DXT-style block compression (C5) for brick color and normal attributes.
//!
//! Color blocks follow the DXT1/BC1 bit layout exactly (two RGB-565
//! endpoints plus 16 2-bit indices) so GPU and CPU decoders agree
//! bit-for-bit. Normal blocks use a matching but distinct layout: a base
//! normal plus two tangent axes and 2-bit-per-axis coefficients.

use glam::Vec3;

/// Number of texels packed into one compressed block.
pub const BLOCK_TEXELS: usize = 16;
/// Encoded size of one color block, in bytes.
pub const COLOR_BLOCK_BYTES: usize = 8;
/// Encoded size of one normal block, in bytes.
pub const NORMAL_BLOCK_BYTES: usize = 16;

const COEFFS: [f32; 4] = [-1.0, -1.0 / 3.0, 1.0 / 3.0, 1.0];

fn quantize_565(c: Vec3) -> u16 {
    let r = (c.x.clamp(0.0, 1.0) * 31.0).round() as u16;
    let g = (c.y.clamp(0.0, 1.0) * 63.0).round() as u16;
    let b = (c.z.clamp(0.0, 1.0) * 31.0).round() as u16;
    (r << 11) | (g << 5) | b
}

fn expand_565(packed: u16) -> Vec3 {
    let r = ((packed >> 11) & 0x1F) as f32 / 31.0;
    let g = ((packed >> 5) & 0x3F) as f32 / 63.0;
    let b = (packed & 0x1F) as f32 / 31.0;
    Vec3::new(r, g, b)
}

/// A compressed 16-texel color block, DXT1/BC1-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ColorBlock {
    pub endpoint0: u16,
    pub endpoint1: u16,
    pub indices: u32,
}

impl ColorBlock {
    /// Pack to the 8-byte wire representation (little-endian, matching §6.1).
    pub fn to_bytes(self) -> [u8; COLOR_BLOCK_BYTES] {
        let mut out = [0u8; COLOR_BLOCK_BYTES];
        out[0..2].copy_from_slice(&self.endpoint0.to_le_bytes());
        out[2..4].copy_from_slice(&self.endpoint1.to_le_bytes());
        out[4..8].copy_from_slice(&self.indices.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; COLOR_BLOCK_BYTES]) -> Self {
        Self {
            endpoint0: u16::from_le_bytes([bytes[0], bytes[1]]),
            endpoint1: u16::from_le_bytes([bytes[2], bytes[3]]),
            indices: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// The four palette colors implied by this block's endpoints, matching
    /// the GLSL reference decoder's interpolation weights exactly.
    pub fn palette(self) -> [Vec3; 4] {
        let e0 = expand_565(self.endpoint0);
        let e1 = expand_565(self.endpoint1);
        [e0, e1, e0 * (2.0 / 3.0) + e1 * (1.0 / 3.0), e0 * (1.0 / 3.0) + e1 * (2.0 / 3.0)]
    }

    /// Decode texel `i in [0, 16)` back to an RGB color.
    pub fn decode_texel(self, i: usize) -> Vec3 {
        let idx = (self.indices >> (2 * i)) & 0b11;
        self.palette()[idx as usize]
    }
}

/// Encode up to 16 colors into one DXT1-style block.
///
/// `colors[i]` is only read for `i` where `valid[i]` is true; unmapped
/// texel positions default to index 0 ("don't-care", per §4.5/§7's
/// `CompressionDomain` handling — an all-invalid block just emits the
/// zero color at both endpoints).
pub fn encode_color_block(colors: &[Vec3; BLOCK_TEXELS], valid: &[bool; BLOCK_TEXELS]) -> ColorBlock {
    let present: Vec<Vec3> = colors.iter().copied().zip(valid.iter().copied()).filter(|(_, v)| *v).map(|(c, _)| c).collect();

    if present.is_empty() {
        return ColorBlock {
            endpoint0: 0,
            endpoint1: 0,
            indices: 0,
        };
    }

    let (mut e0, mut e1) = (present[0], present[0]);
    let mut best_dist = -1.0f32;
    for i in 0..present.len() {
        for j in (i + 1)..present.len() {
            let d = present[i].distance_squared(present[j]);
            if d > best_dist
                || (d == best_dist
                    && (present[i].length_squared(), i, j) < (e0.length_squared(), 0, 0))
            {
                best_dist = d;
                e0 = present[i];
                e1 = present[j];
            }
        }
    }
    if present.len() == 1 {
        e1 = e0;
    }

    let packed0 = quantize_565(e0);
    let packed1 = quantize_565(e1);
    let palette = ColorBlock {
        endpoint0: packed0,
        endpoint1: packed1,
        indices: 0,
    }
    .palette();

    let mut indices = 0u32;
    for i in 0..BLOCK_TEXELS {
        let idx = if valid[i] {
            (0..4)
                .min_by(|&a, &b| {
                    let da = colors[i].distance_squared(palette[a]);
                    let db = colors[i].distance_squared(palette[b]);
                    da.partial_cmp(&db).unwrap()
                })
                .unwrap_or(0)
        } else {
            0
        };
        indices |= (idx as u32) << (2 * i);
    }

    ColorBlock {
        endpoint0: packed0,
        endpoint1: packed1,
        indices,
    }
}

/// Octahedral-map a unit vector to a 2D point in `[-1, 1]^2`.
fn oct_encode(n: Vec3) -> (f32, f32) {
    let l1 = n.x.abs() + n.y.abs() + n.z.abs();
    let p = if l1 > 0.0 { n / l1 } else { Vec3::new(0.0, 0.0, 1.0) };
    if p.z < 0.0 {
        ((1.0 - p.y.abs()).copysign(p.x), (1.0 - p.x.abs()).copysign(p.y))
    } else {
        (p.x, p.y)
    }
}

/// Inverse of [`oct_encode`].
fn oct_decode(x: f32, y: f32) -> Vec3 {
    let z = 1.0 - x.abs() - y.abs();
    let (mut nx, mut ny) = (x, y);
    if z < 0.0 {
        let old_x = nx;
        nx = (1.0 - y.abs()).copysign(old_x);
        ny = (1.0 - old_x.abs()).copysign(y);
    }
    Vec3::new(nx, ny, z).normalize_or(Vec3::Z)
}

fn quantize_i16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

fn quantize_i8(v: f32) -> i8 {
    (v.clamp(-1.0, 1.0) * i8::MAX as f32).round() as i8
}

/// A compressed 16-texel normal block: an octahedral-encoded base normal
/// (32 bits), two octahedral-encoded tangent axes U and V (16 bits each),
/// and 16 x 4-bit (2-bit-per-axis) signed interpolation coefficients.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NormalBlock {
    pub base: [i16; 2],
    pub tangent_u: [i8; 2],
    pub tangent_v: [i8; 2],
    pub coeffs: u64,
}

impl NormalBlock {
    pub fn to_bytes(self) -> [u8; NORMAL_BLOCK_BYTES] {
        let mut out = [0u8; NORMAL_BLOCK_BYTES];
        out[0..2].copy_from_slice(&self.base[0].to_le_bytes());
        out[2..4].copy_from_slice(&self.base[1].to_le_bytes());
        out[4] = self.tangent_u[0] as u8;
        out[5] = self.tangent_u[1] as u8;
        out[6] = self.tangent_v[0] as u8;
        out[7] = self.tangent_v[1] as u8;
        out[8..16].copy_from_slice(&self.coeffs.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; NORMAL_BLOCK_BYTES]) -> Self {
        Self {
            base: [
                i16::from_le_bytes([bytes[0], bytes[1]]),
                i16::from_le_bytes([bytes[2], bytes[3]]),
            ],
            tangent_u: [bytes[4] as i8, bytes[5] as i8],
            tangent_v: [bytes[6] as i8, bytes[7] as i8],
            coeffs: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
        }
    }

    fn base_vec(self) -> Vec3 {
        oct_decode(self.base[0] as f32 / i16::MAX as f32, self.base[1] as f32 / i16::MAX as f32)
    }

    fn tangent_u_vec(self) -> Vec3 {
        oct_decode(self.tangent_u[0] as f32 / i8::MAX as f32, self.tangent_u[1] as f32 / i8::MAX as f32)
    }

    fn tangent_v_vec(self) -> Vec3 {
        oct_decode(self.tangent_v[0] as f32 / i8::MAX as f32, self.tangent_v[1] as f32 / i8::MAX as f32)
    }

    pub fn decode_texel(self, i: usize) -> Vec3 {
        let base = self.base_vec();
        let u = self.tangent_u_vec();
        let v = self.tangent_v_vec();
        let shift = 4 * i;
        let cu = COEFFS[((self.coeffs >> shift) & 0b11) as usize];
        let cv = COEFFS[((self.coeffs >> (shift + 2)) & 0b11) as usize];
        (base + u * cu + v * cv).normalize_or(base)
    }
}

/// Encode up to 16 normals into one compressed block.
pub fn encode_normal_block(normals: &[Vec3; BLOCK_TEXELS], valid: &[bool; BLOCK_TEXELS]) -> NormalBlock {
    let present: Vec<Vec3> = normals.iter().copied().zip(valid.iter().copied()).filter(|(_, v)| *v).map(|(n, _)| n).collect();

    if present.is_empty() {
        let (bx, by) = oct_encode(Vec3::Z);
        return NormalBlock {
            base: [quantize_i16(bx), quantize_i16(by)],
            tangent_u: [i8::MAX, 0],
            tangent_v: [0, i8::MAX],
            coeffs: 0,
        };
    }

    let sum: Vec3 = present.iter().copied().sum();
    let base = (sum / present.len() as f32).normalize_or(Vec3::Z);

    let n_farthest = present
        .iter()
        .copied()
        .max_by(|a, b| a.distance_squared(base).partial_cmp(&b.distance_squared(base)).unwrap())
        .unwrap_or(base);
    let u = (n_farthest - base).normalize_or(base.any_orthonormal_vector());

    let n_worst = present
        .iter()
        .copied()
        .max_by(|a, b| {
            let ra = (*a - base - u * (a - base).dot(u)).length_squared();
            let rb = (*b - base - u * (b - base).dot(u)).length_squared();
            ra.partial_cmp(&rb).unwrap()
        })
        .unwrap_or(base);
    let proj_u = (n_worst - base).dot(u);
    let v = (n_worst - base - u * proj_u).normalize_or(u.cross(base).normalize_or(base.any_orthonormal_vector()));

    let mut coeffs = 0u64;
    for (i, n) in normals.iter().enumerate() {
        if !valid[i] {
            continue;
        }
        let delta = *n - base;
        let mut best = (0usize, 0usize, f32::MAX);
        for (ci, cu) in COEFFS.iter().enumerate() {
            for (cj, cv) in COEFFS.iter().enumerate() {
                let candidate = (base + u * *cu + v * *cv).normalize_or(base);
                let err = n.distance_squared(candidate);
                if err < best.2 {
                    best = (ci, cj, err);
                }
            }
        }
        let shift = 4 * i;
        coeffs |= (best.0 as u64) << shift;
        coeffs |= (best.1 as u64) << (shift + 2);
    }

    let (bx, by) = oct_encode(base);
    let (ux, uy) = oct_encode(u);
    let (vx, vy) = oct_encode(v);
    NormalBlock {
        base: [quantize_i16(bx), quantize_i16(by)],
        tangent_u: [quantize_i8(ux), quantize_i8(uy)],
        tangent_v: [quantize_i8(vx), quantize_i8(vy)],
        coeffs,
    }
}

/// Split a flat element stream into 16-element blocks in input order and
/// encode each one, for the bulk brick-attribute compression path.
pub fn encode_colors_bulk(colors: &[Vec3]) -> Vec<ColorBlock> {
    colors
        .chunks(BLOCK_TEXELS)
        .map(|chunk| {
            let mut buf = [Vec3::ZERO; BLOCK_TEXELS];
            let mut valid = [false; BLOCK_TEXELS];
            for (i, c) in chunk.iter().enumerate() {
                buf[i] = *c;
                valid[i] = true;
            }
            encode_color_block(&buf, &valid)
        })
        .collect()
}

/// Split a flat element stream into 16-element blocks and encode each one.
pub fn encode_normals_bulk(normals: &[Vec3]) -> Vec<NormalBlock> {
    normals
        .chunks(BLOCK_TEXELS)
        .map(|chunk| {
            let mut buf = [Vec3::Z; BLOCK_TEXELS];
            let mut valid = [false; BLOCK_TEXELS];
            for (i, n) in chunk.iter().enumerate() {
                buf[i] = *n;
                valid[i] = true;
            }
            encode_normal_block(&buf, &valid)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn color_round_trip_within_quantization_error() {
        let colors = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
        ];
        let valid = [true; 16];
        let block = encode_color_block(&colors, &valid);
        let bytes = block.to_bytes();
        let decoded_block = ColorBlock::from_bytes(bytes);
        for (i, c) in colors.iter().enumerate() {
            let d = decoded_block.decode_texel(i);
            assert!((d.x - c.x).abs() <= 1.0 / 32.0 + 1e-3);
            assert!((d.y - c.y).abs() <= 1.0 / 32.0 + 1e-3);
            assert!((d.z - c.z).abs() <= 1.0 / 32.0 + 1e-3);
        }
    }

    #[test]
    fn normal_round_trip_within_angular_bound() {
        let base = Vec3::new(0.0, 0.0, 1.0);
        let mut normals = [base; BLOCK_TEXELS];
        let valid = [true; BLOCK_TEXELS];
        normals[1] = Vec3::new(0.3, 0.0, 0.95).normalize();
        normals[2] = Vec3::new(-0.2, 0.2, 0.96).normalize();
        let block = encode_normal_block(&normals, &valid);
        for (i, n) in normals.iter().enumerate() {
            let d = block.decode_texel(i);
            assert_abs_diff_eq!(n.dot(d), 1.0, epsilon = 0.05);
        }
    }

    #[test]
    fn degenerate_block_does_not_panic() {
        let colors = [Vec3::ZERO; BLOCK_TEXELS];
        let valid = [false; BLOCK_TEXELS];
        let block = encode_color_block(&colors, &valid);
        assert_eq!(block.endpoint0, block.endpoint1);
    }

    #[test]
    fn bulk_path_splits_in_order() {
        let colors: Vec<Vec3> = (0..20).map(|i| Vec3::splat(i as f32 / 20.0)).collect();
        let blocks = encode_colors_bulk(&colors);
        assert_eq!(blocks.len(), 2);
    }
}
