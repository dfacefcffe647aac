//! Screen-space LOD termination parameters (§4.10/§4.10.1).
//!
//! Each pixel is modeled as a cone from the camera; traversal terminates
//! early once the projected cone diameter exceeds the current node's size.

/// Cone-shaped per-pixel LOD parameters used by [`super::traversal::cast_ray`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodParams {
    /// Cone diameter at the ray origin (0 for a pinhole camera).
    pub ray_orig_size: f32,
    /// `2 * tan(pixel_angle / 2)`, the cone's angular spread per unit distance.
    pub ray_dir_size: f32,
}

impl LodParams {
    /// Disabled LOD: traversal always descends to maximum detail.
    pub const DISABLED: Self = Self {
        ray_orig_size: 0.0,
        ray_dir_size: 0.0,
    };

    /// Pinhole-camera parameters from vertical FOV and screen height in pixels.
    pub fn from_camera(fov_y_radians: f32, screen_height_px: f32) -> Self {
        let pixel_angle = fov_y_radians / screen_height_px;
        Self {
            ray_orig_size: 0.0,
            ray_dir_size: 2.0 * (pixel_angle * 0.5).tan(),
        }
    }

    /// Same as [`from_camera`](Self::from_camera) but with a nonzero cone
    /// origin diameter, for cameras with a finite near-plane aperture.
    pub fn from_camera_with_near_plane(fov_y_radians: f32, screen_height_px: f32, near_plane_radius: f32) -> Self {
        let mut params = Self::from_camera(fov_y_radians, screen_height_px);
        params.ray_orig_size = near_plane_radius;
        params
    }

    /// `true` when LOD termination is active (`ray_dir_size > 0`).
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.ray_dir_size > 0.0
    }

    /// Scale both size parameters by `2^bias`, matching the `>= scale_exp2`
    /// threshold's power-of-two convention.
    #[inline]
    pub fn with_bias(self, bias: i32) -> Self {
        let factor = 2f32.powi(bias);
        Self {
            ray_orig_size: self.ray_orig_size * factor,
            ray_dir_size: self.ray_dir_size * factor,
        }
    }

    /// Projected cone diameter at parametric distance `t_c_max`.
    #[inline]
    pub fn projected_size(&self, t_c_max: f32) -> f32 {
        t_c_max * self.ray_dir_size + self.ray_orig_size
    }

    /// Whether traversal should terminate at a node of normalized half-size `scale_exp2`.
    #[inline]
    pub fn should_terminate(&self, t_c_max: f32, scale_exp2: f32) -> bool {
        self.is_enabled() && self.projected_size(t_c_max) >= scale_exp2
    }
}

impl Default for LodParams {
    fn default() -> Self {
        Self::DISABLED
    }
}

/// Convert a normalized `[1, 2]^3` traversal-space scale to a world-space size.
#[inline]
pub fn esvo_scale_to_world_size(scale_exp2: f32, world_size: f32) -> f32 {
    scale_exp2 * world_size
}

/// Convert a normalized traversal parameter `t` to a world-space distance.
#[inline]
pub fn esvo_t_to_world_distance(t: f32, world_ray_length: f32) -> f32 {
    t * world_ray_length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        assert!(!LodParams::default().is_enabled());
    }

    #[test]
    fn from_camera_is_enabled() {
        let params = LodParams::from_camera(std::f32::consts::FRAC_PI_2, 1080.0);
        assert!(params.is_enabled());
        assert_eq!(params.ray_orig_size, 0.0);
    }

    #[test]
    fn bias_scales_both_sizes() {
        let base = LodParams::from_camera_with_near_plane(1.0, 720.0, 0.01);
        let biased = base.with_bias(2);
        assert!((biased.ray_dir_size - base.ray_dir_size * 4.0).abs() < 1e-6);
        assert!((biased.ray_orig_size - base.ray_orig_size * 4.0).abs() < 1e-6);
    }

    #[test]
    fn monotonic_termination_with_increasing_ray_dir_size() {
        let scale_exp2 = 0.1;
        let t_c_max = 50.0;
        let lax = LodParams {
            ray_orig_size: 0.0,
            ray_dir_size: 0.05,
        };
        let strict = LodParams {
            ray_orig_size: 0.0,
            ray_dir_size: 0.0001,
        };
        assert!(lax.should_terminate(t_c_max, scale_exp2));
        assert!(!strict.should_terminate(t_c_max, scale_exp2));
    }
}
