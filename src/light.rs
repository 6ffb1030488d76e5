use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Direction towards the light before any rotation is applied.
pub const BASE_DIRECTION: Vec3 = Vec3::new(0.0, 1.0, 1.0);
/// Distance from the origin at which the light camera is placed.
pub const LIGHT_DISTANCE: f32 = 10.0;
/// Half extent of the orthographic light frustum.
pub const ORTHO_HALF_EXTENT: f32 = 10.0;
pub const LIGHT_NEAR: f32 = 1.0;
pub const LIGHT_FAR: f32 = 50.0;
/// Degrees added or removed per held-key frame.
pub const ANGLE_STEP: f32 = 1.0;

/// Per-frame light values shared read-only by every pass.
///
/// Everything here is derived from one rotation of [`BASE_DIRECTION`], so the
/// matrix used for the depth pass and the direction used for diffuse shading
/// can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightFrame {
    pub angle: f32,
    pub direction: Vec3,
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub light_space: Mat4,
}

/// Directional light orbiting the world up axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    angle: f32,
    color: Vec3,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            angle: 0.0,
            color: Vec3::ONE,
        }
    }
}

impl LightState {
    pub fn new(angle: f32) -> Self {
        Self {
            angle,
            ..Self::default()
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn rotate_by(&mut self, degrees: f32) {
        self.angle += degrees;
    }

    /// Rotation about world Y by the current angle.
    pub fn rotation(&self) -> Mat4 {
        Mat4::from_rotation_y(self.angle.to_radians())
    }

    /// Normalised direction towards the light.
    pub fn direction(&self) -> Vec3 {
        self.rotation()
            .transform_vector3(BASE_DIRECTION)
            .normalize()
    }

    /// Position of the virtual light camera.
    pub fn position(&self) -> Vec3 {
        self.direction() * LIGHT_DISTANCE
    }

    /// Orthographic projection times look-at view from the light.
    pub fn light_space_matrix(&self) -> Mat4 {
        self.frame().light_space
    }

    /// Computes every light-derived value from a single rotated direction.
    pub fn frame(&self) -> LightFrame {
        let direction = self.direction();
        let position = direction * LIGHT_DISTANCE;
        let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::orthographic_rh(
            -ORTHO_HALF_EXTENT,
            ORTHO_HALF_EXTENT,
            -ORTHO_HALF_EXTENT,
            ORTHO_HALF_EXTENT,
            LIGHT_NEAR,
            LIGHT_FAR,
        );
        LightFrame {
            angle: self.angle,
            direction,
            position,
            view,
            projection,
            light_space: projection * view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_and_direction_share_the_rotated_vector() {
        for angle in [-720.0, -181.0, -1.0, 0.0, 33.0, 90.0, 359.0, 10_000.0] {
            let light = LightState::new(angle);
            let frame = light.frame();
            assert_eq!(frame.direction, light.direction());
            assert_eq!(frame.light_space, light.light_space_matrix());
            let expected = Mat4::from_rotation_y(f32::to_radians(angle))
                .transform_vector3(BASE_DIRECTION)
                .normalize();
            assert_eq!(frame.direction, expected);
        }
    }

    #[test]
    fn frame_is_bit_reproducible() {
        let light = LightState::new(47.0);
        let a = light.frame();
        let b = light.frame();
        assert_eq!(
            a.light_space.to_cols_array(),
            b.light_space.to_cols_array()
        );
    }

    #[test]
    fn half_turn_round_trip_restores_direction() {
        let mut light = LightState::default();
        let original = light.direction();
        light.rotate_by(180.0);
        assert!(!light.direction().abs_diff_eq(original, 1e-3));
        light.rotate_by(-180.0);
        assert!(light.direction().abs_diff_eq(original, 1e-6));
    }

    #[test]
    fn origin_projects_to_the_centre_of_the_light_frustum() {
        let frame = LightState::new(75.0).frame();
        let clip = frame.light_space.project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-5);
        assert!(clip.y.abs() < 1e-5);
        // Depth of the origin is the light distance mapped into [0, 1].
        let expected = (LIGHT_DISTANCE - LIGHT_NEAR) / (LIGHT_FAR - LIGHT_NEAR);
        assert!((clip.z - expected).abs() < 1e-5);
    }

    #[test]
    fn light_sits_at_fixed_distance() {
        let light = LightState::new(123.0);
        assert!((light.position().length() - LIGHT_DISTANCE).abs() < 1e-4);
    }
}
