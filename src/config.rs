use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use serde::Serialize;

use crate::camera::CAMERA_SPEED;
use crate::input::{KeyCode, MOUSE_SENSITIVITY};
use crate::render::shadow_map::DEFAULT_SHADOW_SIZE;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;
pub const WINDOW_TITLE: &str = "OpenGL Project Core";
const MAX_SHADOW_SIZE: u32 = 8192;

/// Command line of the viewer.
#[derive(Debug, Clone, Parser)]
#[command(name = "shadow-viewer", version, about = "Shadow-mapped scene viewer")]
pub struct Args {
    /// Scene description (XML). The built-in demo scene is used when omitted.
    #[arg(long, value_name = "FILE")]
    pub scene: Option<PathBuf>,
    /// Directory meshes and sky-box faces are resolved against.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub assets: PathBuf,
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,
    /// Edge length of the square shadow map in texels.
    #[arg(long, default_value_t = DEFAULT_SHADOW_SIZE)]
    pub shadow_size: u32,
    #[arg(long, default_value_t = CAMERA_SPEED)]
    pub camera_speed: f32,
    /// Degrees of rotation per pixel of mouse travel.
    #[arg(long, default_value_t = MOUSE_SENSITIVITY)]
    pub sensitivity: f32,
    /// Load the scene and render on the recording backend without a window.
    #[arg(long)]
    pub summary_only: bool,
    /// Frames rendered in summary mode.
    #[arg(long, default_value_t = 1, requires = "summary_only")]
    pub frames: u32,
    /// Key held down for every summary frame; may be repeated.
    #[arg(long = "hold", value_name = "KEY", requires = "summary_only")]
    pub hold: Vec<String>,
    /// Print the summary as JSON.
    #[arg(long, requires = "summary_only")]
    pub json: bool,
}

/// How the viewer runs after loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunMode {
    Interactive,
    Headless {
        frames: u32,
        hold: Vec<KeyCode>,
        json: bool,
    },
}

/// Validated settings the viewer is started with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerConfig {
    pub scene: Option<PathBuf>,
    pub assets: PathBuf,
    pub width: u32,
    pub height: u32,
    pub shadow_size: u32,
    pub camera_speed: f32,
    pub sensitivity: f32,
    pub mode: RunMode,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            scene: None,
            assets: PathBuf::from("."),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            shadow_size: DEFAULT_SHADOW_SIZE,
            camera_speed: CAMERA_SPEED,
            sensitivity: MOUSE_SENSITIVITY,
            mode: RunMode::Interactive,
        }
    }
}

impl ViewerConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        if args.width == 0 || args.height == 0 {
            bail!("window size must be non-zero, got {}x{}", args.width, args.height);
        }
        if args.shadow_size == 0 || args.shadow_size > MAX_SHADOW_SIZE {
            bail!(
                "shadow map size must be between 1 and {MAX_SHADOW_SIZE}, got {}",
                args.shadow_size
            );
        }
        if args.camera_speed.is_nan() || args.camera_speed <= 0.0 {
            bail!("camera speed must be positive, got {}", args.camera_speed);
        }
        if !args.sensitivity.is_finite() {
            bail!("mouse sensitivity must be finite");
        }

        let mode = if args.summary_only {
            let hold = args
                .hold
                .iter()
                .map(|name| KeyCode::from_name(name).ok_or_else(|| anyhow!("unknown key `{name}`")))
                .collect::<Result<Vec<_>>>()?;
            RunMode::Headless {
                frames: args.frames,
                hold,
                json: args.json,
            }
        } else {
            RunMode::Interactive
        };

        Ok(Self {
            scene: args.scene,
            assets: args.assets,
            width: args.width,
            height: args.height,
            shadow_size: args.shadow_size,
            camera_speed: args.camera_speed,
            sensitivity: args.sensitivity,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<ViewerConfig> {
        let args = Args::try_parse_from(std::iter::once("shadow-viewer").chain(argv.iter().copied()))?;
        ViewerConfig::from_args(args)
    }

    #[test]
    fn defaults_match_demo() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.shadow_size, 2048);
        assert_eq!((config.width, config.height), (1024, 768));
    }

    #[test]
    fn headless_keys_are_parsed() {
        let config = parse(&["--summary-only", "--frames", "5", "--hold", "W", "--hold", "space"]).unwrap();
        match config.mode {
            RunMode::Headless { frames, hold, json } => {
                assert_eq!(frames, 5);
                assert_eq!(hold.len(), 2);
                assert!(!json);
            }
            RunMode::Interactive => panic!("expected headless mode"),
        }
    }

    #[test]
    fn unknown_hold_key_is_rejected() {
        let err = parse(&["--summary-only", "--hold", "F13"]).unwrap_err();
        assert!(err.to_string().contains("F13"));
    }

    #[test]
    fn invalid_sizes_are_rejected() {
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--shadow-size", "0"]).is_err());
        assert!(parse(&["--camera-speed", "-1"]).is_err());
    }

    #[test]
    fn headless_flags_require_summary_mode() {
        assert!(parse(&["--frames", "3"]).is_err());
    }
}
