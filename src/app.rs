use std::fs;
use std::panic::Location;
use std::path::Path;

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use log::{debug, info, warn};
use serde::Serialize;

use crate::camera::{MoveDirection, PITCH_LIMIT};
use crate::config::ViewerConfig;
use crate::display_mode::DisplayMode;
use crate::input::{InputState, KeyCode, MouseLook, NamedKey};
use crate::light::ANGLE_STEP;
use crate::mesh::MeshData;
use crate::obj::load_obj;
use crate::render::backend::RenderBackend;
use crate::render::renderer::{FrameReport, SceneRenderer};
use crate::render::shadow_map::ShadowMap;
use crate::scene::{SceneDescription, SceneObject, SceneState, OBJECT_ANGLE_STEP};
use crate::skybox::SkyboxImages;

/// Mesh drawn at the light position.
pub const LIGHT_MARKER_MESH: &str = "objects/cube/cube.obj";
/// Directory holding the six sky-box faces.
pub const SKYBOX_DIR: &str = "skybox";
const BUILTIN_PREFIX: &str = "builtin:";
const BUILTIN_PLANE_SIZE: f32 = 20.0;

const MOVE_BINDINGS: [(KeyCode, MoveDirection); 6] = [
    (KeyCode::Character('W'), MoveDirection::Forward),
    (KeyCode::Character('S'), MoveDirection::Backward),
    (KeyCode::Character('A'), MoveDirection::Left),
    (KeyCode::Character('D'), MoveDirection::Right),
    (KeyCode::Named(NamedKey::Space), MoveDirection::Up),
    (KeyCode::Named(NamedKey::LeftShift), MoveDirection::Down),
];

/// Request from the viewer to the window layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAction {
    Close,
    SetCursorCapture(bool),
}

/// An object as loaded at start-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedObject {
    pub name: String,
    pub mesh: String,
    pub triangles: usize,
}

/// State reported by the headless mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerSummary {
    pub objects: Vec<LoadedObject>,
    pub frames: u64,
    pub depth_draws: usize,
    pub color_draws: usize,
    pub backend_errors: usize,
    pub camera_position: Vec3,
    pub camera_yaw: f32,
    pub camera_pitch: f32,
    pub light_angle: f32,
    pub light_direction: Vec3,
    pub object_angle: f32,
    pub display_mode: DisplayMode,
}

/// Owns the scene, the renderer and a backend, and maps input onto them.
pub struct Viewer<B: RenderBackend> {
    backend: B,
    scene: SceneState,
    renderer: SceneRenderer,
    input: InputState,
    mouse: MouseLook,
    cursor: Vec2,
    cursor_captured: bool,
    camera_speed: f32,
    loaded: Vec<LoadedObject>,
    last_report: Option<FrameReport>,
    error_count: usize,
}

impl<B: RenderBackend> Viewer<B> {
    /// Loads the scene and uploads every asset to `backend`.
    pub fn new(mut backend: B, config: &ViewerConfig) -> Result<Self> {
        let description = match &config.scene {
            Some(path) => {
                let xml = fs::read_to_string(path)
                    .with_context(|| format!("failed to read scene {}", path.display()))?;
                SceneDescription::from_xml(&xml)
                    .with_context(|| format!("failed to parse scene {}", path.display()))?
            }
            None => SceneDescription::default(),
        };

        let mut objects = Vec::with_capacity(description.objects.len());
        let mut loaded = Vec::with_capacity(description.objects.len());
        for object in &description.objects {
            let mesh = resolve_mesh(&config.assets, &object.mesh);
            loaded.push(LoadedObject {
                name: object.name.clone(),
                mesh: object.mesh.clone(),
                triangles: mesh.triangle_count(),
            });
            objects.push(SceneObject {
                name: object.name.clone(),
                mesh: backend.upload_mesh(&object.name, &mesh),
                transform: object.transform,
                color: object.color,
            });
        }

        let marker_mesh = load_obj(config.assets.join(LIGHT_MARKER_MESH)).unwrap_or_else(|err| {
            debug!("light marker falls back to the built-in cube: {err:#}");
            MeshData::unit_cube()
        });
        let light_marker = backend.upload_mesh("light-marker", &marker_mesh);
        let skybox = backend.upload_mesh("skybox", &MeshData::unit_cube());
        backend.upload_skybox(&SkyboxImages::load_or_gradient(config.assets.join(SKYBOX_DIR)));

        let shadow_map = ShadowMap::init(&mut backend, config.shadow_size, config.shadow_size);
        let scene = SceneState::new(objects, light_marker, skybox, backend.window_size());
        info!(
            "loaded {} objects, shadow map {}x{}",
            scene.objects.len(),
            shadow_map.width(),
            shadow_map.height()
        );

        Ok(Self {
            backend,
            scene,
            renderer: SceneRenderer::new(shadow_map),
            input: InputState::new(),
            mouse: MouseLook::new(config.sensitivity),
            cursor: Vec2::ZERO,
            cursor_captured: true,
            camera_speed: config.camera_speed,
            loaded,
            last_report: None,
            error_count: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneState {
        &mut self.scene
    }

    pub fn renderer(&self) -> &SceneRenderer {
        &self.renderer
    }

    pub fn loaded_objects(&self) -> &[LoadedObject] {
        &self.loaded
    }

    pub fn cursor_captured(&self) -> bool {
        self.cursor_captured
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Records a key transition and returns any window-level request.
    pub fn key_event(&mut self, key: KeyCode, pressed: bool) -> Option<ViewerAction> {
        if !pressed {
            self.input.set_key_up(key);
            return None;
        }
        self.input.set_key_down(key);
        match key {
            KeyCode::Named(NamedKey::Escape) => Some(ViewerAction::Close),
            KeyCode::Character('M') => {
                self.cursor_captured = !self.cursor_captured;
                if self.cursor_captured {
                    self.mouse.reset();
                }
                debug!("cursor captured: {}", self.cursor_captured);
                Some(ViewerAction::SetCursorCapture(self.cursor_captured))
            }
            _ => None,
        }
    }

    /// Drops held keys, e.g. when the window loses focus.
    pub fn release_keys(&mut self) {
        self.input.release_all();
    }

    /// Applies every held key once. Called once per frame.
    pub fn update(&mut self) {
        for (key, direction) in MOVE_BINDINGS {
            if self.input.is_key_down(key) {
                self.scene.camera.move_by(direction, self.camera_speed);
            }
        }
        if self.input.is_key_down(KeyCode::Character('Q')) {
            self.scene.object_angle -= OBJECT_ANGLE_STEP;
        }
        if self.input.is_key_down(KeyCode::Character('E')) {
            self.scene.object_angle += OBJECT_ANGLE_STEP;
        }
        for digit in 1..=4 {
            if self.input.is_key_down(KeyCode::Digit(digit)) {
                if let Some(mode) = DisplayMode::from_digit(digit) {
                    self.scene.display.select(mode);
                }
            }
        }
        if self.input.is_key_down(KeyCode::Character('J')) {
            self.scene.light.rotate_by(-ANGLE_STEP);
        }
        if self.input.is_key_down(KeyCode::Character('L')) {
            self.scene.light.rotate_by(ANGLE_STEP);
        }
    }

    /// Rotates the camera from an absolute cursor position.
    pub fn cursor_moved(&mut self, position: Vec2) {
        self.cursor = position;
        if !self.cursor_captured {
            return;
        }
        let Some(offset) = self.mouse.offset(position) else {
            return;
        };
        let camera = &mut self.scene.camera;
        let yaw = camera.yaw() + offset.x;
        let pitch = (camera.pitch() + offset.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        camera.rotate(pitch, yaw);
    }

    /// Rotates the camera from relative mouse motion.
    pub fn mouse_motion(&mut self, delta: Vec2) {
        self.cursor_moved(self.cursor + delta);
    }

    /// Updates the projection for a new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.scene.resize(width, height) {
            debug!("window resized to {width}x{height}");
        }
    }

    /// Applies input, renders and presents one frame, then drains backend errors.
    pub fn frame(&mut self) -> FrameReport {
        self.update();
        let report = self.renderer.render_frame(&self.scene, &mut self.backend);
        self.backend.present();
        self.check_errors();
        self.last_report = Some(report.clone());
        report
    }

    #[track_caller]
    fn check_errors(&mut self) -> usize {
        let location = Location::caller();
        let errors = self.backend.take_errors();
        for err in &errors {
            warn!("{}:{}: {err}", location.file(), location.line());
        }
        self.error_count += errors.len();
        errors.len()
    }

    pub fn summary(&self) -> ViewerSummary {
        let camera = &self.scene.camera;
        let (depth_draws, color_draws) = self
            .last_report
            .as_ref()
            .map_or((0, 0), |r| (r.depth_draws, r.color_draws));
        ViewerSummary {
            objects: self.loaded.clone(),
            frames: self.renderer.frames_rendered(),
            depth_draws,
            color_draws,
            backend_errors: self.error_count,
            camera_position: camera.position(),
            camera_yaw: camera.yaw(),
            camera_pitch: camera.pitch(),
            light_angle: self.scene.light.angle(),
            light_direction: self.scene.light.direction(),
            object_angle: self.scene.object_angle,
            display_mode: self.scene.display.current(),
        }
    }
}

/// Resolves a scene mesh name to mesh data. Failures yield an empty mesh.
pub fn resolve_mesh(assets: &Path, name: &str) -> MeshData {
    if let Some(builtin) = name.strip_prefix(BUILTIN_PREFIX) {
        return match builtin {
            "cube" => MeshData::unit_cube(),
            "plane" => MeshData::plane(BUILTIN_PLANE_SIZE),
            other => {
                warn!("unknown built-in mesh `{other}`; drawing nothing");
                MeshData::empty()
            }
        };
    }
    match load_obj(assets.join(name)) {
        Ok(mesh) => mesh,
        Err(err) => {
            warn!("failed to load mesh {name}: {err:#}");
            MeshData::empty()
        }
    }
}
