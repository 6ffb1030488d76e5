use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::display_mode::FillMode;
use crate::mesh::MeshData;
use crate::render::uniforms::{Program, Uniform, UniformSlot};
use crate::skybox::SkyboxImages;

/// Opaque reference to a mesh owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshHandle(pub usize);

/// Pixel rectangle rasterized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x.saturating_add(self.width) <= width && self.y.saturating_add(self.height) <= height
    }

    /// Clamps the rectangle into a target of the given size.
    pub fn clamped_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Render target selected for subsequent clears and draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Framebuffer {
    /// The window surface with its depth buffer.
    Default,
    /// The depth-only shadow target.
    Shadow,
}

impl fmt::Display for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Framebuffer::Default => "default",
            Framebuffer::Shadow => "shadow",
        })
    }
}

/// Buffers reset by [`RenderBackend::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const DEPTH: ClearMask = ClearMask {
        color: false,
        depth: true,
    };
    pub const COLOR_DEPTH: ClearMask = ClearMask {
        color: true,
        depth: true,
    };
}

/// Texture filtering used when sampling the shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowFilter {
    Nearest,
}

/// Addressing outside the [0, 1] texture range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShadowWrap {
    /// Out-of-range samples read the given depth.
    ClampToBorder { depth: f32 },
}

/// Allocation parameters for the depth-only shadow target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowMapDesc {
    pub width: u32,
    pub height: u32,
    pub filter: ShadowFilter,
    pub wrap: ShadowWrap,
}

impl ShadowMapDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: ShadowFilter::Nearest,
            wrap: ShadowWrap::ClampToBorder { depth: 1.0 },
        }
    }
}

/// Diagnostic raised by a backend. None of these stop the frame.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("uniform `{slot}` is not declared by the {program} program")]
    UnknownUniform { program: Program, slot: UniformSlot },
    #[error("uniform `{0}` set with no program in use")]
    NoProgramForUniform(UniformSlot),
    #[error("draw issued with no program in use")]
    NoProgram,
    #[error("the {program} program cannot draw into the {target} framebuffer")]
    IncompatibleTarget {
        program: Program,
        target: Framebuffer,
    },
    #[error("viewport {viewport} exceeds the {target} framebuffer ({width}x{height})")]
    ViewportOutOfBounds {
        viewport: Viewport,
        target: Framebuffer,
        width: u32,
        height: u32,
    },
    #[error("shadow target bound before it was configured")]
    ShadowTargetMissing,
    #[error("unknown mesh handle {0}")]
    UnknownMesh(usize),
    #[error("`shadowMap` reads texture unit {uniform:?} but the depth texture is bound to unit {bound:?}")]
    ShadowUnitMismatch {
        uniform: Option<u32>,
        bound: Option<u32>,
    },
    #[error("{0} polygon mode is not supported by this adapter; drawing filled")]
    UnsupportedFillMode(FillMode),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("device error: {0}")]
    Device(String),
}

/// Immediate-mode rendering interface the scene renderer drives.
///
/// State set through this trait (viewport, bound framebuffer, program,
/// uniforms, fill mode) persists until changed, across frames as well.
pub trait RenderBackend {
    /// Uploads a mesh; empty meshes are accepted and draw nothing.
    fn upload_mesh(&mut self, label: &str, mesh: &MeshData) -> MeshHandle;

    /// Allocates the depth-only shadow target.
    fn configure_shadow_target(&mut self, desc: &ShadowMapDesc);

    fn upload_skybox(&mut self, images: &SkyboxImages);

    /// Current size of the window surface.
    fn window_size(&self) -> (u32, u32);

    fn viewport(&self) -> Viewport;

    fn set_viewport(&mut self, viewport: Viewport);

    fn bound_framebuffer(&self) -> Framebuffer;

    fn bind_framebuffer(&mut self, target: Framebuffer);

    fn clear(&mut self, mask: ClearMask);

    fn use_program(&mut self, program: Program);

    /// Sets a uniform on the program currently in use.
    fn set_uniform(&mut self, uniform: Uniform);

    /// Binds the shadow map's depth texture to a texture unit.
    fn bind_shadow_texture(&mut self, unit: u32);

    fn set_fill_mode(&mut self, mode: FillMode);

    fn draw(&mut self, mesh: MeshHandle);

    /// Finishes the frame and hands it to the display.
    fn present(&mut self);

    /// Drains diagnostics collected since the previous call.
    fn take_errors(&mut self) -> Vec<BackendError>;
}

/// Framebuffer a program is able to render into.
pub fn program_target(program: Program) -> Framebuffer {
    match program {
        Program::Depth => Framebuffer::Shadow,
        Program::Main | Program::LightMarker | Program::Skybox => Framebuffer::Default,
    }
}

/// Checks that a draw with `program` may go to `target`.
pub fn validate_draw(program: Option<Program>, target: Framebuffer) -> Result<Program, BackendError> {
    let program = program.ok_or(BackendError::NoProgram)?;
    if program_target(program) != target {
        return Err(BackendError::IncompatibleTarget { program, target });
    }
    Ok(program)
}

/// Checks that `uniform` is declared by the program in use.
pub fn validate_uniform(program: Option<Program>, uniform: &Uniform) -> Result<Program, BackendError> {
    let slot = uniform.slot();
    let program = program.ok_or(BackendError::NoProgramForUniform(slot))?;
    if !program.accepts(slot) {
        return Err(BackendError::UnknownUniform { program, slot });
    }
    Ok(program)
}

/// Checks the sampler unit against the unit the depth texture is bound to.
pub fn validate_shadow_unit(uniform: Option<u32>, bound: Option<u32>) -> Result<(), BackendError> {
    match (uniform, bound) {
        (Some(a), Some(b)) if a == b => Ok(()),
        _ => Err(BackendError::ShadowUnitMismatch { uniform, bound }),
    }
}

/// Checks a viewport against the size of the bound target and clamps it.
pub fn validate_viewport(
    viewport: Viewport,
    target: Framebuffer,
    (width, height): (u32, u32),
) -> Result<Viewport, (Viewport, BackendError)> {
    if viewport.fits_within(width, height) {
        Ok(viewport)
    } else {
        Err((
            viewport.clamped_to(width, height),
            BackendError::ViewportOutOfBounds {
                viewport,
                target,
                width,
                height,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn depth_program_only_draws_into_shadow_target() {
        assert!(validate_draw(Some(Program::Depth), Framebuffer::Shadow).is_ok());
        assert_eq!(
            validate_draw(Some(Program::Main), Framebuffer::Shadow),
            Err(BackendError::IncompatibleTarget {
                program: Program::Main,
                target: Framebuffer::Shadow
            })
        );
        assert_eq!(
            validate_draw(None, Framebuffer::Default),
            Err(BackendError::NoProgram)
        );
    }

    #[test]
    fn undeclared_uniform_is_reported() {
        let err = validate_uniform(Some(Program::Skybox), &Uniform::Model(Mat4::IDENTITY)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "uniform `model` is not declared by the skybox program"
        );
    }

    #[test]
    fn oversized_viewport_is_clamped() {
        let (clamped, err) =
            validate_viewport(Viewport::new(2048, 2048), Framebuffer::Default, (1024, 768))
                .unwrap_err();
        assert_eq!(clamped, Viewport::new(1024, 768));
        assert!(matches!(err, BackendError::ViewportOutOfBounds { .. }));
        assert!(validate_viewport(Viewport::new(800, 600), Framebuffer::Default, (800, 600)).is_ok());
    }

    #[test]
    fn shadow_unit_must_match() {
        assert!(validate_shadow_unit(Some(2), Some(2)).is_ok());
        assert!(validate_shadow_unit(Some(2), None).is_err());
        assert!(validate_shadow_unit(Some(0), Some(2)).is_err());
    }
}
