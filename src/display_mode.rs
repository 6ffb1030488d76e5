use std::fmt;

use serde::{Deserialize, Serialize};

/// Lighting normal source used by the main program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShadingMode {
    #[default]
    Smooth,
    Flat,
}

/// Rasterizer polygon mode applied to colour-pass geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FillMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl FillMode {
    pub const ALL: [FillMode; 3] = [FillMode::Fill, FillMode::Line, FillMode::Point];

    pub fn index(self) -> usize {
        match self {
            FillMode::Fill => 0,
            FillMode::Line => 1,
            FillMode::Point => 2,
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FillMode::Fill => "fill",
            FillMode::Line => "line",
            FillMode::Point => "point",
        })
    }
}

/// The four presets bound to keys 1-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    Smooth,
    Wireframe,
    Points,
    Flat,
}

impl DisplayMode {
    /// Maps the digit keys 1-4 to a preset.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(DisplayMode::Smooth),
            2 => Some(DisplayMode::Wireframe),
            3 => Some(DisplayMode::Points),
            4 => Some(DisplayMode::Flat),
            _ => None,
        }
    }

    fn modes(self) -> (ShadingMode, FillMode) {
        match self {
            DisplayMode::Smooth => (ShadingMode::Smooth, FillMode::Fill),
            DisplayMode::Wireframe => (ShadingMode::Smooth, FillMode::Line),
            DisplayMode::Points => (ShadingMode::Smooth, FillMode::Point),
            DisplayMode::Flat => (ShadingMode::Flat, FillMode::Fill),
        }
    }
}

/// Shading and fill mode; changed only by discrete key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayModeState {
    shading: ShadingMode,
    fill: FillMode,
}

impl DisplayModeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shading(&self) -> ShadingMode {
        self.shading
    }

    pub fn fill(&self) -> FillMode {
        self.fill
    }

    pub fn is_flat(&self) -> bool {
        self.shading == ShadingMode::Flat
    }

    pub fn select(&mut self, mode: DisplayMode) {
        let (shading, fill) = mode.modes();
        self.shading = shading;
        self.fill = fill;
    }

    /// Returns the preset matching the current state.
    pub fn current(&self) -> DisplayMode {
        match (self.shading, self.fill) {
            (ShadingMode::Flat, _) => DisplayMode::Flat,
            (ShadingMode::Smooth, FillMode::Fill) => DisplayMode::Smooth,
            (ShadingMode::Smooth, FillMode::Line) => DisplayMode::Wireframe,
            (ShadingMode::Smooth, FillMode::Point) => DisplayMode::Points,
        }
    }
}
