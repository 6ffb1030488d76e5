use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use shadow_viewer::config::WINDOW_TITLE;
use shadow_viewer::{
    Args, KeyCode, NamedKey, RecordingBackend, RunMode, Viewer, ViewerAction, ViewerConfig,
    ViewerSummary, WgpuBackend,
};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = ViewerConfig::from_args(Args::parse())?;
    match config.mode.clone() {
        RunMode::Headless { frames, hold, json } => run_headless(&config, frames, &hold, json),
        RunMode::Interactive => run_interactive(config),
    }
}

fn run_headless(config: &ViewerConfig, frames: u32, hold: &[KeyCode], json: bool) -> Result<()> {
    let backend = RecordingBackend::new(config.width, config.height);
    let mut viewer = Viewer::new(backend, config)?;
    for key in hold {
        viewer.key_event(*key, true);
    }
    for _ in 0..frames {
        viewer.frame();
    }

    let summary = viewer.summary();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to encode summary")?
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ViewerSummary) {
    println!("Loaded scene with {} objects", summary.objects.len());
    for object in &summary.objects {
        println!(
            " - {} ({}, {} triangles)",
            object.name, object.mesh, object.triangles
        );
    }
    println!(
        "Rendered {} frame(s): {} depth draws, {} colour draws per frame",
        summary.frames, summary.depth_draws, summary.color_draws
    );
    println!("Backend errors: {}", summary.backend_errors);
    let p = summary.camera_position;
    println!(
        "Camera: pos=({:.2}, {:.2}, {:.2}) yaw={:.2} pitch={:.2}",
        p.x, p.y, p.z, summary.camera_yaw, summary.camera_pitch
    );
    let d = summary.light_direction;
    println!(
        "Light: angle={:.2} dir=({:.3}, {:.3}, {:.3})",
        summary.light_angle, d.x, d.y, d.z
    );
    println!("Object angle: {:.2}", summary.object_angle);
    println!("Display mode: {:?}", summary.display_mode);
}

fn run_interactive(config: ViewerConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        config,
        viewer: None,
        error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated abnormally")?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct App {
    config: ViewerConfig,
    viewer: Option<Viewer<WgpuBackend>>,
    error: Option<anyhow::Error>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );
        let backend = block_on(WgpuBackend::new(Arc::clone(&window)))?;
        let viewer = Viewer::new(backend, &self.config)?;
        set_cursor_capture(&window, viewer.cursor_captured());
        info!("viewer ready");
        window.request_redraw();
        self.viewer = Some(viewer);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        if window_id != viewer.backend().window_id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                viewer.backend_mut().resize(size);
                viewer.resize(size.width, size.height);
            }
            WindowEvent::Focused(false) => viewer.release_keys(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                let Some(key) = map_keycode(code) else {
                    return;
                };
                if repeat {
                    return;
                }
                match viewer.key_event(key, state == ElementState::Pressed) {
                    Some(ViewerAction::Close) => event_loop.exit(),
                    Some(ViewerAction::SetCursorCapture(captured)) => {
                        set_cursor_capture(viewer.backend().window(), captured);
                    }
                    None => {}
                }
            }
            WindowEvent::RedrawRequested => {
                viewer.frame();
                viewer.backend().window().request_redraw();
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let (Some(viewer), DeviceEvent::MouseMotion { delta }) = (self.viewer.as_mut(), event) {
            viewer.mouse_motion(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }
}

fn set_cursor_capture(window: &Window, captured: bool) {
    let result = if captured {
        window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
    } else {
        window.set_cursor_grab(CursorGrabMode::None)
    };
    if let Err(err) = result {
        warn!("failed to change cursor grab: {err}");
    }
    window.set_cursor_visible(!captured);
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Space => KeyCode::Named(NamedKey::Space),
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::Digit1 => KeyCode::Digit(1),
        WinitKey::Digit2 => KeyCode::Digit(2),
        WinitKey::Digit3 => KeyCode::Digit(3),
        WinitKey::Digit4 => KeyCode::Digit(4),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyE => KeyCode::Character('E'),
        WinitKey::KeyJ => KeyCode::Character('J'),
        WinitKey::KeyL => KeyCode::Character('L'),
        WinitKey::KeyM => KeyCode::Character('M'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyW => KeyCode::Character('W'),
        _ => return None,
    })
}
