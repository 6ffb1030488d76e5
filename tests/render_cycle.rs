use glam::Mat4;
use shadow_viewer::render::backend::{BackendError, Framebuffer, RenderBackend, Viewport};
use shadow_viewer::render::recording::{Command, DrawRecord};
use shadow_viewer::render::{Program, Uniform, UniformSlot};
use shadow_viewer::{DisplayMode, FillMode, KeyCode, RecordingBackend, Viewer, ViewerConfig};

fn viewer(width: u32, height: u32) -> Viewer<RecordingBackend> {
    let config = ViewerConfig {
        assets: "/nonexistent-assets".into(),
        width,
        height,
        ..ViewerConfig::default()
    };
    Viewer::new(RecordingBackend::new(width, height), &config).expect("viewer")
}

/// Runs one frame and returns only the commands it produced.
fn frame_commands(viewer: &mut Viewer<RecordingBackend>) -> Vec<Command> {
    viewer.backend_mut().clear_commands();
    viewer.frame();
    viewer.backend().commands().to_vec()
}

fn draws(commands: &[Command]) -> Vec<DrawRecord> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Draw(draw) => Some(draw.clone()),
            _ => None,
        })
        .collect()
}

fn light_space_uploads(commands: &[Command]) -> Vec<(Program, Mat4)> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::SetUniform {
                program,
                uniform: Uniform::LightSpaceTrMatrix(matrix),
            } => Some((*program, *matrix)),
            _ => None,
        })
        .collect()
}

#[test]
fn both_passes_share_one_light_space_matrix() {
    let mut viewer = viewer(1024, 768);
    viewer.key_event(KeyCode::Character('L'), true);
    for _ in 0..5 {
        let commands = frame_commands(&mut viewer);
        let uploads = light_space_uploads(&commands);
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].0, Program::Depth);
        assert_eq!(uploads[1].0, Program::Main);
        assert_eq!(uploads[0].1, uploads[1].1);
    }
}

#[test]
fn depth_draws_precede_colour_draws_and_skybox_is_last() {
    let mut viewer = viewer(1024, 768);
    let draws = draws(&frame_commands(&mut viewer));
    let programs: Vec<Program> = draws.iter().map(|d| d.program).collect();
    assert_eq!(
        programs,
        vec![
            Program::Depth,
            Program::Depth,
            Program::Main,
            Program::Main,
            Program::LightMarker,
            Program::Skybox,
        ]
    );
    for draw in &draws[..2] {
        assert_eq!(draw.target, Framebuffer::Shadow);
        assert_eq!(draw.viewport, Viewport::new(2048, 2048));
    }
    for draw in &draws[2..] {
        assert_eq!(draw.target, Framebuffer::Default);
        assert_eq!(draw.viewport, Viewport::new(1024, 768));
    }
}

#[test]
fn depth_pass_uploads_no_lighting_uniforms() {
    let mut viewer = viewer(640, 480);
    let commands = frame_commands(&mut viewer);
    let depth_slots: Vec<UniformSlot> = commands
        .iter()
        .filter_map(|command| match command {
            Command::SetUniform {
                program: Program::Depth,
                uniform,
            } => Some(uniform.slot()),
            _ => None,
        })
        .collect();
    assert!(depth_slots.contains(&UniformSlot::Model));
    assert!(!depth_slots.contains(&UniformSlot::NormalMatrix));
    assert!(!depth_slots.contains(&UniformSlot::BaseColor));
}

#[test]
fn viewport_matches_window_after_every_frame() {
    let mut viewer = viewer(1024, 768);
    viewer.frame();
    assert_eq!(viewer.backend().viewport(), Viewport::new(1024, 768));
    assert_eq!(viewer.backend().bound_framebuffer(), Framebuffer::Default);

    viewer.backend_mut().resize(800, 600);
    viewer.resize(800, 600);
    let draws = draws(&frame_commands(&mut viewer));
    assert_eq!(viewer.backend().viewport(), Viewport::new(800, 600));
    assert_eq!(draws.last().map(|d| d.viewport), Some(Viewport::new(800, 600)));
    assert_eq!(viewer.error_count(), 0);
}

#[test]
fn minimised_window_keeps_previous_projection() {
    let mut viewer = viewer(1024, 768);
    let projection = viewer.scene().projection();
    viewer.resize(0, 0);
    viewer.frame();
    assert_eq!(viewer.scene().projection(), projection);
    assert_eq!(viewer.scene().window(), Viewport::new(1024, 768));
}

#[test]
fn wireframe_then_flat_restores_filled_polygons() {
    let mut viewer = viewer(1024, 768);
    viewer.key_event(KeyCode::Digit(2), true);
    let wire = draws(&frame_commands(&mut viewer));
    viewer.key_event(KeyCode::Digit(2), false);
    assert_eq!(wire.len(), 6);
    assert!(wire.iter().all(|d| d.fill_mode == FillMode::Line));

    viewer.key_event(KeyCode::Digit(4), true);
    let flat = draws(&frame_commands(&mut viewer));
    assert_eq!(viewer.scene().display.current(), DisplayMode::Flat);
    assert!(flat.iter().all(|d| d.fill_mode == FillMode::Fill));
    assert_eq!(
        viewer.backend().uniform(Program::Main, UniformSlot::IsFlat),
        Some(Uniform::IsFlat(true))
    );
}

#[test]
fn backend_errors_do_not_stop_rendering() {
    let mut viewer = viewer(1024, 768);
    viewer
        .backend_mut()
        .inject_error(BackendError::Surface("timeout".into()));
    let report = viewer.frame();
    assert_eq!(report.frame, 1);
    assert_eq!(viewer.error_count(), 1);
    let report = viewer.frame();
    assert_eq!(report.frame, 2);
    assert_eq!(viewer.error_count(), 1);
}

#[test]
fn empty_meshes_are_drawn_without_errors() {
    let mut viewer = viewer(1024, 768);
    let draws = draws(&frame_commands(&mut viewer));
    assert!(draws
        .iter()
        .filter(|d| d.program == Program::Main)
        .all(|d| d.triangles == 0));
    assert_eq!(draws.last().map(|d| d.triangles), Some(12));
    assert_eq!(viewer.error_count(), 0);
}
