use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Pitch limit in degrees; looking straight up or down flips the basis.
pub const PITCH_LIMIT: f32 = 89.0;
/// World units travelled per frame while a movement key is held.
pub const CAMERA_SPEED: f32 = 0.05;

/// Direction of a single camera translation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDirection {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// First-person camera driven by absolute yaw/pitch angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    position: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -10.0), Vec3::Y)
    }
}

impl Camera {
    /// Creates a camera at `position` looking at `target`.
    ///
    /// Yaw and pitch are derived from the initial front vector so that the
    /// first mouse-driven `rotate` continues from the same orientation.
    pub fn new(position: Vec3, target: Vec3, world_up: Vec3) -> Self {
        let front = (target - position).normalize_or_zero();
        let front = if front == Vec3::ZERO { Vec3::NEG_Z } else { front };
        let pitch = front.y.clamp(-1.0, 1.0).asin().to_degrees();
        let yaw = front.z.atan2(front.x).to_degrees();
        let world_up = world_up.normalize_or_zero();
        let mut camera = Self {
            position,
            front,
            right: Vec3::X,
            up: Vec3::Y,
            world_up: if world_up == Vec3::ZERO { Vec3::Y } else { world_up },
            yaw,
            pitch,
        };
        camera.rotate(pitch, yaw);
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Translates the camera along one of its basis vectors.
    pub fn move_by(&mut self, direction: MoveDirection, speed: f32) {
        let step = match direction {
            MoveDirection::Forward => self.front,
            MoveDirection::Backward => -self.front,
            MoveDirection::Right => self.right,
            MoveDirection::Left => -self.right,
            MoveDirection::Up => self.up,
            MoveDirection::Down => -self.up,
        };
        self.position += step * speed;
    }

    /// Sets the orientation from absolute pitch and yaw in degrees.
    pub fn rotate(&mut self, pitch: f32, yaw: f32) {
        self.pitch = pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.yaw = yaw;

        let (pitch_sin, pitch_cos) = self.pitch.to_radians().sin_cos();
        let (yaw_sin, yaw_cos) = self.yaw.to_radians().sin_cos();
        self.front = Vec3::new(yaw_cos * pitch_cos, pitch_sin, yaw_sin * pitch_cos).normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }

    /// Look-at matrix for the current pose. Never cached.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn default_pose_faces_negative_z() {
        let camera = Camera::default();
        assert!(camera.front().abs_diff_eq(Vec3::NEG_Z, EPS));
        assert!((camera.yaw() + 90.0).abs() < 1e-3);
        assert!(camera.pitch().abs() < 1e-3);
    }

    #[test]
    fn pitch_is_clamped_for_any_input() {
        let mut camera = Camera::default();
        for pitch in [-1.0e6, -360.0, -89.5, 0.0, 45.0, 89.0001, 720.0, 1.0e9] {
            camera.rotate(pitch, 12.0);
            assert!((-PITCH_LIMIT..=PITCH_LIMIT).contains(&camera.pitch()));
        }
    }

    #[test]
    fn basis_stays_orthonormal_after_rotation() {
        let mut camera = Camera::default();
        for (pitch, yaw) in [(10.0, 30.0), (-89.0, 400.0), (89.0, -725.0), (3.0, 0.5)] {
            camera.rotate(pitch, yaw);
            let (f, r, u) = (camera.front(), camera.right(), camera.up());
            assert!((f.length() - 1.0).abs() < EPS);
            assert!((r.length() - 1.0).abs() < EPS);
            assert!((u.length() - 1.0).abs() < EPS);
            assert!(f.dot(r).abs() < EPS);
            assert!(f.dot(u).abs() < EPS);
            assert!(r.dot(u).abs() < EPS);
        }
    }

    #[test]
    fn view_follows_position_after_move() {
        let mut camera = Camera::default();
        let front = camera.front();
        camera.move_by(MoveDirection::Forward, 0.5);
        camera.move_by(MoveDirection::Up, 0.25);

        let expected = Mat4::look_at_rh(camera.position(), camera.position() + front, camera.up());
        assert!(camera.view_matrix().abs_diff_eq(expected, EPS));
        assert!(camera.front().abs_diff_eq(front, EPS));
        assert!(camera
            .position()
            .abs_diff_eq(Vec3::new(0.0, 0.25, 2.5), EPS));
        // The camera itself sits at the view-space origin.
        let origin = camera.view_matrix().transform_point3(camera.position());
        assert!(origin.abs_diff_eq(Vec3::ZERO, EPS));
    }

    #[test]
    fn opposite_moves_cancel() {
        let mut camera = Camera::default();
        camera.rotate(20.0, 10.0);
        let start = camera.position();
        camera.move_by(MoveDirection::Left, 0.05);
        camera.move_by(MoveDirection::Right, 0.05);
        camera.move_by(MoveDirection::Down, 0.05);
        camera.move_by(MoveDirection::Up, 0.05);
        assert!(camera.position().abs_diff_eq(start, EPS));
    }
}
