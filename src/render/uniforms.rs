//! Typed uniform slots shared by every backend.
//!
//! Each program declares the slots it reads. Backends resolve a slot to
//! storage once at start-up instead of looking names up every frame; the
//! names returned by [`UniformSlot::name`] are the contract with the shader
//! sources.

use std::fmt;

use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Texture unit the shadow map is bound to for the colour pass.
pub const SHADOW_MAP_UNIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformSlot {
    Model,
    View,
    Projection,
    NormalMatrix,
    LightDir,
    LightColor,
    PointLightPos,
    LightSpaceTrMatrix,
    ShadowMap,
    IsFlat,
    BaseColor,
}

impl UniformSlot {
    pub const fn name(self) -> &'static str {
        match self {
            UniformSlot::Model => "model",
            UniformSlot::View => "view",
            UniformSlot::Projection => "projection",
            UniformSlot::NormalMatrix => "normalMatrix",
            UniformSlot::LightDir => "lightDir",
            UniformSlot::LightColor => "lightColor",
            UniformSlot::PointLightPos => "pointLightPos",
            UniformSlot::LightSpaceTrMatrix => "lightSpaceTrMatrix",
            UniformSlot::ShadowMap => "shadowMap",
            UniformSlot::IsFlat => "isFlat",
            UniformSlot::BaseColor => "baseColor",
        }
    }
}

impl fmt::Display for UniformSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A uniform value tagged with the slot it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Uniform {
    Model(Mat4),
    View(Mat4),
    Projection(Mat4),
    NormalMatrix(Mat3),
    LightDir(Vec3),
    LightColor(Vec3),
    PointLightPos(Vec3),
    LightSpaceTrMatrix(Mat4),
    /// Texture unit the sampler reads from.
    ShadowMap(u32),
    IsFlat(bool),
    BaseColor(Vec3),
}

impl Uniform {
    pub const fn slot(&self) -> UniformSlot {
        match self {
            Uniform::Model(_) => UniformSlot::Model,
            Uniform::View(_) => UniformSlot::View,
            Uniform::Projection(_) => UniformSlot::Projection,
            Uniform::NormalMatrix(_) => UniformSlot::NormalMatrix,
            Uniform::LightDir(_) => UniformSlot::LightDir,
            Uniform::LightColor(_) => UniformSlot::LightColor,
            Uniform::PointLightPos(_) => UniformSlot::PointLightPos,
            Uniform::LightSpaceTrMatrix(_) => UniformSlot::LightSpaceTrMatrix,
            Uniform::ShadowMap(_) => UniformSlot::ShadowMap,
            Uniform::IsFlat(_) => UniformSlot::IsFlat,
            Uniform::BaseColor(_) => UniformSlot::BaseColor,
        }
    }
}

/// The fixed set of GPU programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Program {
    /// Depth-only program rendering from the light.
    Depth,
    /// Lit, shadowed scene program.
    Main,
    /// Unlit marker drawn at the light position.
    LightMarker,
    Skybox,
}

impl Program {
    pub const ALL: [Program; 4] = [
        Program::Depth,
        Program::Main,
        Program::LightMarker,
        Program::Skybox,
    ];

    pub fn index(self) -> usize {
        match self {
            Program::Depth => 0,
            Program::Main => 1,
            Program::LightMarker => 2,
            Program::Skybox => 3,
        }
    }

    /// Slots declared by the program's shader source.
    pub const fn slots(self) -> &'static [UniformSlot] {
        use UniformSlot::*;
        match self {
            Program::Depth => &[Model, LightSpaceTrMatrix],
            Program::Main => &[
                Model,
                View,
                Projection,
                NormalMatrix,
                LightDir,
                LightColor,
                PointLightPos,
                LightSpaceTrMatrix,
                ShadowMap,
                IsFlat,
                BaseColor,
            ],
            Program::LightMarker => &[Model, View, Projection],
            Program::Skybox => &[View, Projection],
        }
    }

    pub fn accepts(self, slot: UniformSlot) -> bool {
        self.slots().contains(&slot)
    }

    pub fn samples_shadow_map(self) -> bool {
        self.accepts(UniformSlot::ShadowMap)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Program::Depth => "depth",
            Program::Main => "main",
            Program::LightMarker => "light-marker",
            Program::Skybox => "skybox",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_match_shader_contract() {
        assert_eq!(UniformSlot::NormalMatrix.name(), "normalMatrix");
        assert_eq!(UniformSlot::LightSpaceTrMatrix.name(), "lightSpaceTrMatrix");
        assert_eq!(Uniform::IsFlat(true).slot(), UniformSlot::IsFlat);
    }

    #[test]
    fn depth_program_has_no_normal_matrix() {
        assert!(!Program::Depth.accepts(UniformSlot::NormalMatrix));
        assert!(Program::Depth.accepts(UniformSlot::LightSpaceTrMatrix));
        assert!(Program::Main.samples_shadow_map());
        assert!(!Program::LightMarker.samples_shadow_map());
    }

    #[test]
    fn light_marker_takes_transforms_only() {
        assert_eq!(
            Program::LightMarker.slots(),
            &[UniformSlot::Model, UniformSlot::View, UniformSlot::Projection]
        );
        assert!(!Program::LightMarker.accepts(UniformSlot::LightColor));
    }
}
