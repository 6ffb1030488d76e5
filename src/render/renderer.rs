use std::fmt;

use glam::{Mat3, Mat4, Vec3};
use log::{error, trace};
use serde::Serialize;

use crate::light::LightFrame;
use crate::render::backend::{ClearMask, Framebuffer, RenderBackend};
use crate::render::shadow_map::ShadowMap;
use crate::render::uniforms::{Program, Uniform};
use crate::scene::{SceneState, POINT_LIGHT_POSITION};

/// Scale applied to the marker cube drawn at the light.
pub const LIGHT_MARKER_SCALE: f32 = 0.5;

/// Phase of the per-frame render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassState {
    Idle,
    DepthPass,
    ColorPass,
}

impl PassState {
    /// Frames always cycle Idle → DepthPass → ColorPass → Idle.
    fn next(self) -> PassState {
        match self {
            PassState::Idle => PassState::DepthPass,
            PassState::DepthPass => PassState::ColorPass,
            PassState::ColorPass => PassState::Idle,
        }
    }
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassState::Idle => "idle",
            PassState::DepthPass => "depth",
            PassState::ColorPass => "color",
        })
    }
}

/// What one call to [`SceneRenderer::render_frame`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub light: LightFrame,
    pub depth_draws: usize,
    pub color_draws: usize,
}

/// Drives the depth pass, the colour pass, the light marker and the sky-box.
#[derive(Debug)]
pub struct SceneRenderer {
    shadow_map: ShadowMap,
    state: PassState,
    frame: u64,
}

impl SceneRenderer {
    pub fn new(shadow_map: ShadowMap) -> Self {
        Self {
            shadow_map,
            state: PassState::Idle,
            frame: 0,
        }
    }

    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Renders one full frame. Does not present.
    pub fn render_frame<B: RenderBackend + ?Sized>(
        &mut self,
        scene: &SceneState,
        backend: &mut B,
    ) -> FrameReport {
        // Computed once; both passes read this exact value.
        let light = scene.light.frame();
        let view = scene.camera.view_matrix();
        // Polygon mode holds for every draw of the frame, shadow casters included.
        backend.set_fill_mode(scene.display.fill());

        self.advance(PassState::DepthPass);
        let depth_draws = self.depth_pass(scene, &light, backend);

        self.advance(PassState::ColorPass);
        let mut color_draws = self.color_pass(scene, &light, view, backend);
        color_draws += draw_light_marker(scene, &light, view, backend);
        color_draws += draw_skybox(scene, view, backend);

        self.advance(PassState::Idle);
        self.frame += 1;
        FrameReport {
            frame: self.frame,
            light,
            depth_draws,
            color_draws,
        }
    }

    fn advance(&mut self, to: PassState) {
        if self.state.next() != to {
            error!("render state jumped from {} to {}", self.state, to);
        }
        trace!("frame {}: {} -> {}", self.frame, self.state, to);
        self.state = to;
    }

    fn depth_pass<B: RenderBackend + ?Sized>(
        &self,
        scene: &SceneState,
        light: &LightFrame,
        backend: &mut B,
    ) -> usize {
        let mut pass = self.shadow_map.begin_depth_pass(backend, scene.window());
        pass.use_program(Program::Depth);
        pass.set_uniform(Uniform::LightSpaceTrMatrix(light.light_space));
        draw_objects(scene, None, &mut *pass)
    }

    fn color_pass<B: RenderBackend + ?Sized>(
        &self,
        scene: &SceneState,
        light: &LightFrame,
        view: Mat4,
        backend: &mut B,
    ) -> usize {
        if backend.bound_framebuffer() != Framebuffer::Default {
            backend.bind_framebuffer(Framebuffer::Default);
        }
        if backend.viewport() != scene.window() {
            backend.set_viewport(scene.window());
        }
        backend.clear(ClearMask::COLOR_DEPTH);

        backend.use_program(Program::Main);
        backend.set_uniform(Uniform::IsFlat(scene.display.is_flat()));
        backend.set_uniform(Uniform::View(view));
        backend.set_uniform(Uniform::Projection(scene.projection()));
        backend.set_uniform(Uniform::LightSpaceTrMatrix(light.light_space));
        self.shadow_map.bind_for_sampling(backend);
        backend.set_uniform(Uniform::ShadowMap(self.shadow_map.texture_unit()));
        backend.set_uniform(Uniform::LightDir(light.direction));
        backend.set_uniform(Uniform::LightColor(scene.light.color()));
        backend.set_uniform(Uniform::PointLightPos(POINT_LIGHT_POSITION));

        draw_objects(scene, Some(view), backend)
    }
}

/// Draws every scene object with the program in use.
///
/// `view` is `None` for the depth pass, which has no lighting term and
/// therefore skips the normal matrix and colour.
fn draw_objects<B: RenderBackend + ?Sized>(
    scene: &SceneState,
    view: Option<Mat4>,
    backend: &mut B,
) -> usize {
    for object in &scene.objects {
        let model = object.model_matrix(scene.object_angle);
        backend.set_uniform(Uniform::Model(model));
        if let Some(view) = view {
            backend.set_uniform(Uniform::NormalMatrix(normal_matrix(view, model)));
            backend.set_uniform(Uniform::BaseColor(object.color));
        }
        backend.draw(object.mesh);
    }
    scene.objects.len()
}

fn draw_light_marker<B: RenderBackend + ?Sized>(
    scene: &SceneState,
    light: &LightFrame,
    view: Mat4,
    backend: &mut B,
) -> usize {
    backend.use_program(Program::LightMarker);
    backend.set_uniform(Uniform::View(view));
    backend.set_uniform(Uniform::Projection(scene.projection()));
    backend.set_uniform(Uniform::Model(light_marker_model(light)));
    backend.draw(scene.light_marker);
    1
}

fn draw_skybox<B: RenderBackend + ?Sized>(scene: &SceneState, view: Mat4, backend: &mut B) -> usize {
    backend.use_program(Program::Skybox);
    backend.set_uniform(Uniform::View(rotation_only(view)));
    backend.set_uniform(Uniform::Projection(scene.projection()));
    backend.draw(scene.skybox);
    1
}

/// Inverse-transpose of the upper 3x3 of `view * model`.
pub fn normal_matrix(view: Mat4, model: Mat4) -> Mat3 {
    Mat3::from_mat4(view * model).inverse().transpose()
}

/// Drops the translation so the sky-box stays centred on the camera.
pub fn rotation_only(view: Mat4) -> Mat4 {
    Mat4::from_mat3(Mat3::from_mat4(view))
}

/// Model matrix of the marker cube placed at the light position.
pub fn light_marker_model(light: &LightFrame) -> Mat4 {
    Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(LIGHT_MARKER_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_cycle_is_fixed() {
        assert_eq!(PassState::Idle.next(), PassState::DepthPass);
        assert_eq!(PassState::DepthPass.next(), PassState::ColorPass);
        assert_eq!(PassState::ColorPass.next(), PassState::Idle);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(Mat4::IDENTITY, model);
        // A 45 degree surface normal keeps pointing away from the stretched surface.
        let n = (normal * Vec3::new(1.0, 1.0, 0.0)).normalize();
        let tangent = (Mat3::from_mat4(model) * Vec3::new(1.0, -1.0, 0.0)).normalize();
        assert!(n.dot(tangent).abs() < 1e-6);
    }

    #[test]
    fn rotation_only_strips_translation() {
        let view = Mat4::look_at_rh(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO, Vec3::Y);
        let stripped = rotation_only(view);
        assert_eq!(stripped.w_axis, glam::Vec4::W);
        assert_eq!(
            Mat3::from_mat4(stripped),
            Mat3::from_mat4(view)
        );
    }
}
