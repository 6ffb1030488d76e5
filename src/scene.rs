use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::display_mode::DisplayModeState;
use crate::light::LightState;
use crate::render::backend::{MeshHandle, Viewport};

pub const FOV_Y_DEGREES: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 50.0;
/// Degrees the hero object turns per held-key frame.
pub const OBJECT_ANGLE_STEP: f32 = 1.0;
/// Position of the fixed point light.
pub const POINT_LIGHT_POSITION: Vec3 = Vec3::new(0.0, 2.0, 0.0);

/// How an object's model matrix is derived each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransformRecipe {
    /// Spins about world Y by the scene's object angle.
    Turntable { translation: Vec3, scale: Vec3 },
    Fixed { translation: Vec3, scale: Vec3 },
}

impl TransformRecipe {
    pub fn model_matrix(&self, object_angle: f32) -> Mat4 {
        match *self {
            TransformRecipe::Turntable { translation, scale } => {
                Mat4::from_translation(translation)
                    * Mat4::from_rotation_y(object_angle.to_radians())
                    * Mat4::from_scale(scale)
            }
            TransformRecipe::Fixed { translation, scale } => {
                Mat4::from_translation(translation) * Mat4::from_scale(scale)
            }
        }
    }
}

/// Object entry as written in a scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescription {
    pub name: String,
    /// Mesh path relative to the asset root, or a `builtin:` name.
    pub mesh: String,
    pub transform: TransformRecipe,
    #[serde(default = "default_color")]
    pub color: Vec3,
}

/// Ordered list of objects making up the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub objects: Vec<ObjectDescription>,
}

impl Default for SceneDescription {
    /// The demo scene: a suit on a turntable above a scaled-down ground.
    fn default() -> Self {
        Self {
            objects: vec![
                ObjectDescription {
                    name: "Nanosuit".to_string(),
                    mesh: "objects/nanosuit/nanosuit.obj".to_string(),
                    transform: TransformRecipe::Turntable {
                        translation: Vec3::ZERO,
                        scale: Vec3::ONE,
                    },
                    color: default_color(),
                },
                ObjectDescription {
                    name: "Ground".to_string(),
                    mesh: "objects/ground/ground.obj".to_string(),
                    transform: TransformRecipe::Fixed {
                        translation: Vec3::new(0.0, -1.0, 0.0),
                        scale: Vec3::splat(0.5),
                    },
                    color: Vec3::new(0.6, 0.6, 0.6),
                },
            ],
        }
    }
}

impl SceneDescription {
    /// Parses a `<scene>` document with one `<object>` per drawable.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let mut objects = Vec::new();

        for node in document.descendants().filter(|n| n.has_tag_name("object")) {
            let name = required_text(&node, "name")?;
            let mesh = required_text(&node, "mesh").with_context(|| format!("object {name}"))?;
            let translation = parse_vec3(optional_text(&node, "position"), Vec3::ZERO)
                .with_context(|| format!("object {name}: bad <position>"))?;
            let scale = parse_vec3(optional_text(&node, "scale"), Vec3::ONE)
                .with_context(|| format!("object {name}: bad <scale>"))?;
            let transform = match optional_text(&node, "transform").as_deref() {
                None | Some("fixed") => TransformRecipe::Fixed { translation, scale },
                Some("turntable") => TransformRecipe::Turntable { translation, scale },
                Some(other) => bail!("object {name}: unknown transform `{other}`"),
            };
            let color = parse_color(optional_text(&node, "color"), default_color())
                .with_context(|| format!("object {name}: bad <color>"))?;
            objects.push(ObjectDescription {
                name,
                mesh,
                transform,
                color,
            });
        }

        if objects.is_empty() {
            bail!("scene does not contain any <object>");
        }
        Ok(Self { objects })
    }
}

/// A drawable bound to its transform recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    pub name: String,
    pub mesh: MeshHandle,
    pub transform: TransformRecipe,
    pub color: Vec3,
}

impl SceneObject {
    pub fn model_matrix(&self, object_angle: f32) -> Mat4 {
        self.transform.model_matrix(object_angle)
    }
}

/// All mutable per-frame state, passed by reference through rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SceneState {
    pub camera: Camera,
    pub light: LightState,
    pub display: DisplayModeState,
    /// Rotation of turntable objects in degrees.
    pub object_angle: f32,
    pub objects: Vec<SceneObject>,
    pub light_marker: MeshHandle,
    pub skybox: MeshHandle,
    window: Viewport,
    projection: glam::Mat4,
}

impl SceneState {
    pub fn new(
        objects: Vec<SceneObject>,
        light_marker: MeshHandle,
        skybox: MeshHandle,
        (width, height): (u32, u32),
    ) -> Self {
        let window = Viewport::new(width.max(1), height.max(1));
        Self {
            camera: Camera::default(),
            light: LightState::default(),
            display: DisplayModeState::default(),
            object_angle: 0.0,
            objects,
            light_marker,
            skybox,
            window,
            projection: perspective(window),
        }
    }

    pub fn window(&self) -> Viewport {
        self.window
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Records a new window size; zero-area sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.window = Viewport::new(width, height);
        self.projection = perspective(self.window);
        true
    }
}

fn perspective(window: Viewport) -> Mat4 {
    Mat4::perspective_rh(
        FOV_Y_DEGREES.to_radians(),
        window.aspect(),
        NEAR_PLANE,
        FAR_PLANE,
    )
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str) -> Result<[f32; 3]> {
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(anyhow!("expected 3 components, found {}", numbers.len())),
    }
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(Vec3::from(parse_components(&value)?)),
        None => Ok(default),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(Vec3::from(parse_components(&value)?) / 255.0),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <object>
            <name>Hero</name>
            <mesh>builtin:cube</mesh>
            <transform>turntable</transform>
            <position>0 0.5 0</position>
        </object>
        <object>
            <name>Floor</name>
            <mesh>objects/ground/ground.obj</mesh>
            <position>0 -1 0</position>
            <scale>0.5 0.5 0.5</scale>
            <color>255 128 0</color>
        </object>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_objects() {
        let scene = SceneDescription::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.objects.len(), 2);
        assert_eq!(scene.objects[0].mesh, "builtin:cube");
        assert_eq!(
            scene.objects[0].transform,
            TransformRecipe::Turntable {
                translation: Vec3::new(0.0, 0.5, 0.0),
                scale: Vec3::ONE
            }
        );
        let floor = &scene.objects[1];
        assert!(matches!(floor.transform, TransformRecipe::Fixed { .. }));
        assert_eq!(floor.color, Vec3::new(1.0, 128.0 / 255.0, 0.0));
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = "<scene><object><mesh>builtin:cube</mesh></object></scene>";
        assert!(SceneDescription::from_xml(bad).is_err());
    }

    #[test]
    fn unknown_transform_is_an_error() {
        let bad = "<scene><object><name>A</name><mesh>x.obj</mesh><transform>orbit</transform></object></scene>";
        let err = SceneDescription::from_xml(bad).unwrap_err();
        assert!(err.to_string().contains("orbit"));
    }

    #[test]
    fn short_vectors_are_rejected() {
        let bad = "<scene><object><name>A</name><mesh>x.obj</mesh><scale>1 2</scale></object></scene>";
        assert!(SceneDescription::from_xml(bad).is_err());
    }

    #[test]
    fn default_scene_matches_demo_transforms() {
        let scene = SceneDescription::default();
        let ground = scene.objects[1].transform.model_matrix(123.0);
        let expected = Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)) * Mat4::from_scale(Vec3::splat(0.5));
        assert_eq!(ground, expected);
        let hero = scene.objects[0].transform.model_matrix(90.0);
        assert!(hero.abs_diff_eq(Mat4::from_rotation_y(90f32.to_radians()), 1e-6));
    }

    #[test]
    fn zero_area_resize_is_ignored() {
        let mut state = SceneState::new(Vec::new(), MeshHandle(0), MeshHandle(1), (1024, 768));
        let projection = state.projection();
        assert!(!state.resize(0, 600));
        assert_eq!(state.projection(), projection);
        assert!(state.resize(800, 800));
        assert_eq!(state.window(), Viewport::new(800, 800));
        assert_ne!(state.projection(), projection);
    }
}
