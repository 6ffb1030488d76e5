use std::ops::{Deref, DerefMut};

use log::trace;

use crate::render::backend::{ClearMask, Framebuffer, RenderBackend, ShadowMapDesc, Viewport};
use crate::render::uniforms::SHADOW_MAP_UNIT;

pub const DEFAULT_SHADOW_SIZE: u32 = 2048;

/// Depth-only render target captured from the light.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMap {
    desc: ShadowMapDesc,
}

impl ShadowMap {
    /// Allocates the depth texture and its target on `backend`.
    pub fn init<B: RenderBackend + ?Sized>(backend: &mut B, width: u32, height: u32) -> Self {
        let desc = ShadowMapDesc::new(width.max(1), height.max(1));
        backend.configure_shadow_target(&desc);
        Self { desc }
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn desc(&self) -> &ShadowMapDesc {
        &self.desc
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.desc.width, self.desc.height)
    }

    /// Texture unit the colour pass samples the depth texture from.
    pub fn texture_unit(&self) -> u32 {
        SHADOW_MAP_UNIT
    }

    /// Binds the shadow target at full resolution and clears its depth.
    ///
    /// The returned guard rebinds the default framebuffer and restores
    /// `window` as the viewport when it is dropped or finished.
    pub fn begin_depth_pass<'a, B: RenderBackend + ?Sized>(
        &self,
        backend: &'a mut B,
        window: Viewport,
    ) -> DepthPass<'a, B> {
        trace!("depth pass: {}x{}", self.desc.width, self.desc.height);
        backend.set_viewport(self.viewport());
        backend.bind_framebuffer(Framebuffer::Shadow);
        backend.clear(ClearMask::DEPTH);
        DepthPass {
            backend,
            window,
            finished: false,
        }
    }

    /// Binds the depth texture for sampling by the colour pass.
    pub fn bind_for_sampling<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.bind_shadow_texture(self.texture_unit());
    }
}

/// An open depth pass; derefs to the backend for issuing draws.
pub struct DepthPass<'a, B: RenderBackend + ?Sized> {
    backend: &'a mut B,
    window: Viewport,
    finished: bool,
}

impl<B: RenderBackend + ?Sized> DepthPass<'_, B> {
    /// Ends the pass explicitly.
    pub fn finish(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.backend.bind_framebuffer(Framebuffer::Default);
        self.backend.set_viewport(self.window);
        trace!("depth pass ended, viewport restored to {}", self.window);
    }
}

impl<B: RenderBackend + ?Sized> Deref for DepthPass<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: RenderBackend + ?Sized> DerefMut for DepthPass<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: RenderBackend + ?Sized> Drop for DepthPass<'_, B> {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recording::{Command, RecordingBackend};

    #[test]
    fn init_configures_nearest_border_target() {
        let mut backend = RecordingBackend::new(800, 600);
        let shadow = ShadowMap::init(&mut backend, 1024, 512);
        let desc = backend.shadow_target().copied().unwrap();
        assert_eq!(desc, *shadow.desc());
        assert_eq!((desc.width, desc.height), (1024, 512));
        assert_eq!(desc.filter, crate::render::backend::ShadowFilter::Nearest);
        assert_eq!(
            desc.wrap,
            crate::render::backend::ShadowWrap::ClampToBorder { depth: 1.0 }
        );
    }

    #[test]
    fn dropping_the_pass_restores_default_target_and_viewport() {
        let mut backend = RecordingBackend::new(800, 600);
        let shadow = ShadowMap::init(&mut backend, 256, 256);
        let window = backend.viewport();
        {
            let pass = shadow.begin_depth_pass(&mut backend, window);
            assert_eq!(pass.bound_framebuffer(), Framebuffer::Shadow);
            assert_eq!(pass.viewport(), Viewport::new(256, 256));
        }
        assert_eq!(backend.bound_framebuffer(), Framebuffer::Default);
        assert_eq!(backend.viewport(), Viewport::new(800, 600));
        assert!(backend.take_errors().is_empty());
    }

    #[test]
    fn begin_orders_viewport_bind_clear() {
        let mut backend = RecordingBackend::new(640, 480);
        let shadow = ShadowMap::init(&mut backend, 128, 128);
        backend.clear_commands();
        shadow
            .begin_depth_pass(&mut backend, Viewport::new(640, 480))
            .finish();
        assert_eq!(
            backend.commands(),
            &[
                Command::SetViewport(Viewport::new(128, 128)),
                Command::BindFramebuffer(Framebuffer::Shadow),
                Command::Clear(ClearMask::DEPTH),
                Command::BindFramebuffer(Framebuffer::Default),
                Command::SetViewport(Viewport::new(640, 480)),
            ]
        );
    }
}
