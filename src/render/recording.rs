//! GPU-free backend that records every call.
//!
//! Used by the headless CLI mode and by tests that inspect what the scene
//! renderer asked for. It applies the same validation as the wgpu backend,
//! so a frame that is clean here is clean on the GPU.

use std::collections::HashMap;

use serde::Serialize;

use crate::display_mode::FillMode;
use crate::mesh::MeshData;
use crate::render::backend::{
    validate_draw, validate_shadow_unit, validate_uniform, validate_viewport, BackendError,
    ClearMask, Framebuffer, MeshHandle, RenderBackend, ShadowMapDesc, Viewport,
};
use crate::render::uniforms::{Program, Uniform, UniformSlot};
use crate::skybox::SkyboxImages;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Command {
    SetViewport(Viewport),
    BindFramebuffer(Framebuffer),
    Clear(ClearMask),
    UseProgram(Program),
    SetUniform { program: Program, uniform: Uniform },
    BindShadowTexture(u32),
    SetFillMode(FillMode),
    Draw(DrawRecord),
    Present,
}

/// State captured at a draw call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawRecord {
    pub program: Program,
    pub mesh: MeshHandle,
    pub target: Framebuffer,
    pub viewport: Viewport,
    pub fill_mode: FillMode,
    /// Triangles submitted; zero for empty meshes.
    pub triangles: usize,
}

#[derive(Debug, Clone)]
struct RecordedMesh {
    label: String,
    triangles: usize,
}

#[derive(Debug, Clone)]
pub struct RecordingBackend {
    window: (u32, u32),
    viewport: Viewport,
    target: Framebuffer,
    program: Option<Program>,
    fill_mode: FillMode,
    shadow_unit: Option<u32>,
    shadow: Option<ShadowMapDesc>,
    skybox_size: Option<u32>,
    meshes: Vec<RecordedMesh>,
    uniforms: HashMap<(Program, UniformSlot), Uniform>,
    commands: Vec<Command>,
    errors: Vec<BackendError>,
    frames: u64,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window: (width, height),
            viewport: Viewport::new(width, height),
            target: Framebuffer::Default,
            program: None,
            fill_mode: FillMode::Fill,
            shadow_unit: None,
            shadow: None,
            skybox_size: None,
            meshes: Vec::new(),
            uniforms: HashMap::new(),
            commands: Vec::new(),
            errors: Vec::new(),
            frames: 0,
        }
    }

    /// Changes the window size, as a resize event would.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window = (width, height);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    pub fn shadow_target(&self) -> Option<&ShadowMapDesc> {
        self.shadow.as_ref()
    }

    pub fn skybox_size(&self) -> Option<u32> {
        self.skybox_size
    }

    pub fn mesh_label(&self, mesh: MeshHandle) -> Option<&str> {
        self.meshes.get(mesh.0).map(|m| m.label.as_str())
    }

    /// Last value set for `slot` on `program`.
    pub fn uniform(&self, program: Program, slot: UniformSlot) -> Option<Uniform> {
        self.uniforms.get(&(program, slot)).copied()
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|command| match command {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Queues a diagnostic as if the device had reported it.
    pub fn inject_error(&mut self, error: BackendError) {
        self.errors.push(error);
    }

    fn target_size(&self, target: Framebuffer) -> Option<(u32, u32)> {
        match target {
            Framebuffer::Default => Some(self.window),
            Framebuffer::Shadow => self.shadow.map(|desc| (desc.width, desc.height)),
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn upload_mesh(&mut self, label: &str, mesh: &MeshData) -> MeshHandle {
        self.meshes.push(RecordedMesh {
            label: label.to_string(),
            triangles: mesh.triangle_count(),
        });
        MeshHandle(self.meshes.len() - 1)
    }

    fn configure_shadow_target(&mut self, desc: &ShadowMapDesc) {
        self.shadow = Some(*desc);
    }

    fn upload_skybox(&mut self, images: &SkyboxImages) {
        self.skybox_size = Some(images.size);
    }

    fn window_size(&self) -> (u32, u32) {
        self.window
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.commands.push(Command::SetViewport(viewport));
    }

    fn bound_framebuffer(&self) -> Framebuffer {
        self.target
    }

    fn bind_framebuffer(&mut self, target: Framebuffer) {
        if target == Framebuffer::Shadow && self.shadow.is_none() {
            self.errors.push(BackendError::ShadowTargetMissing);
        }
        self.target = target;
        self.commands.push(Command::BindFramebuffer(target));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.commands.push(Command::Clear(mask));
    }

    fn use_program(&mut self, program: Program) {
        self.program = Some(program);
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, uniform: Uniform) {
        match validate_uniform(self.program, &uniform) {
            Ok(program) => {
                self.uniforms.insert((program, uniform.slot()), uniform);
                self.commands.push(Command::SetUniform { program, uniform });
            }
            Err(err) => self.errors.push(err),
        }
    }

    fn bind_shadow_texture(&mut self, unit: u32) {
        self.shadow_unit = Some(unit);
        self.commands.push(Command::BindShadowTexture(unit));
    }

    fn set_fill_mode(&mut self, mode: FillMode) {
        self.fill_mode = mode;
        self.commands.push(Command::SetFillMode(mode));
    }

    fn draw(&mut self, mesh: MeshHandle) {
        let program = match validate_draw(self.program, self.target) {
            Ok(program) => program,
            Err(err) => {
                self.errors.push(err);
                return;
            }
        };
        let Some(triangles) = self.meshes.get(mesh.0).map(|m| m.triangles) else {
            self.errors.push(BackendError::UnknownMesh(mesh.0));
            return;
        };
        let Some(size) = self.target_size(self.target) else {
            self.errors.push(BackendError::ShadowTargetMissing);
            return;
        };
        let viewport = match validate_viewport(self.viewport, self.target, size) {
            Ok(viewport) => viewport,
            Err((clamped, err)) => {
                self.errors.push(err);
                clamped
            }
        };
        if program.samples_shadow_map() {
            let uniform = match self.uniform(program, UniformSlot::ShadowMap) {
                Some(Uniform::ShadowMap(unit)) => Some(unit),
                _ => None,
            };
            if let Err(err) = validate_shadow_unit(uniform, self.shadow_unit) {
                self.errors.push(err);
            }
        }
        self.commands.push(Command::Draw(DrawRecord {
            program,
            mesh,
            target: self.target,
            viewport,
            fill_mode: self.fill_mode,
            triangles,
        }));
    }

    fn present(&mut self) {
        self.frames += 1;
        self.commands.push(Command::Present);
    }

    fn take_errors(&mut self) -> Vec<BackendError> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn uniforms_are_tracked_per_program() {
        let mut backend = RecordingBackend::new(100, 100);
        backend.use_program(Program::Main);
        backend.set_uniform(Uniform::View(Mat4::IDENTITY));
        backend.use_program(Program::Skybox);
        backend.set_uniform(Uniform::View(Mat4::ZERO));
        assert_eq!(
            backend.uniform(Program::Main, UniformSlot::View),
            Some(Uniform::View(Mat4::IDENTITY))
        );
        assert_eq!(
            backend.uniform(Program::Skybox, UniformSlot::View),
            Some(Uniform::View(Mat4::ZERO))
        );
    }

    #[test]
    fn draw_with_stale_viewport_is_clamped_and_reported() {
        let mut backend = RecordingBackend::new(320, 240);
        let mesh = backend.upload_mesh("cube", &MeshData::unit_cube());
        backend.use_program(Program::LightMarker);
        backend.set_viewport(Viewport::new(2048, 2048));
        backend.draw(mesh);
        let draw = backend.draws().next().cloned().unwrap();
        assert_eq!(draw.viewport, Viewport::new(320, 240));
        assert!(matches!(
            backend.take_errors().as_slice(),
            [BackendError::ViewportOutOfBounds { .. }]
        ));
    }

    #[test]
    fn empty_mesh_draw_records_zero_triangles() {
        let mut backend = RecordingBackend::new(64, 64);
        let mesh = backend.upload_mesh("missing", &MeshData::empty());
        backend.use_program(Program::LightMarker);
        backend.draw(mesh);
        assert_eq!(backend.draws().next().map(|d| d.triangles), Some(0));
        assert!(backend.take_errors().is_empty());
    }

    #[test]
    fn unknown_mesh_is_reported() {
        let mut backend = RecordingBackend::new(64, 64);
        backend.use_program(Program::LightMarker);
        backend.draw(MeshHandle(7));
        assert_eq!(backend.take_errors(), vec![BackendError::UnknownMesh(7)]);
        assert_eq!(backend.draws().count(), 0);
    }
}
