//! Shadow-mapped scene viewer.
//!
//! The crate renders a small scene lit by a rotating directional light with
//! a depth-map shadow pass, a fixed point light and a sky-box. Rendering goes
//! through the [`RenderBackend`] trait so the frame logic can run against the
//! wgpu backend in a window or against the recording backend in tests and
//! headless tools.

pub mod app;
pub mod camera;
pub mod config;
pub mod display_mode;
pub mod input;
pub mod light;
pub mod mesh;
pub mod obj;
pub mod render;
pub mod scene;
pub mod skybox;

pub use app::{Viewer, ViewerAction, ViewerSummary};
pub use camera::{Camera, MoveDirection};
pub use config::{Args, RunMode, ViewerConfig};
pub use display_mode::{DisplayMode, DisplayModeState, FillMode, ShadingMode};
pub use input::{InputState, KeyCode, NamedKey};
pub use light::{LightFrame, LightState};
pub use mesh::{MeshData, Vertex};
pub use obj::{load_obj, load_obj_from_str};
pub use render::{RecordingBackend, RenderBackend, SceneRenderer, WgpuBackend};
pub use scene::{SceneDescription, SceneState};
