pub mod backend;
pub mod gpu;
pub mod recording;
pub mod renderer;
pub mod shaders;
pub mod shadow_map;
pub mod uniforms;

pub use backend::{BackendError, Framebuffer, MeshHandle, RenderBackend, Viewport};
pub use gpu::WgpuBackend;
pub use recording::RecordingBackend;
pub use renderer::{FrameReport, PassState, SceneRenderer};
pub use shadow_map::ShadowMap;
pub use uniforms::{Program, Uniform, UniformSlot};
