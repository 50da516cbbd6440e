// Pastel color palette for console output

use crossterm::style::{Color, StyledContent, Stylize};
use std::fmt;

/// Defines the pastel color palette for the UI
#[derive(Clone, Copy, Debug)]
pub enum PastelColor {
    Pink,
    Lavender,
    Mint,
    SkyBlue,
    Gray,
}

impl PastelColor {
    /// Get the terminal color representation
    pub fn as_color(&self) -> Color {
        match self {
            PastelColor::Pink => Color::Rgb { r: 255, g: 182, b: 193 },
            PastelColor::Lavender => Color::Rgb { r: 204, g: 169, b: 221 },
            PastelColor::Mint => Color::Rgb { r: 176, g: 224, b: 183 },
            PastelColor::SkyBlue => Color::Rgb { r: 173, g: 216, b: 230 },
            PastelColor::Gray => Color::Rgb { r: 169, g: 169, b: 169 },
        }
    }
}

/// A styled text element
pub struct StyledText<'a> {
    styled: StyledContent<&'a str>,
}

impl<'a> StyledText<'a> {
    pub fn new(text: &'a str, color: PastelColor) -> Self {
        Self { styled: text.with(color.as_color()) }
    }

    pub fn bold(text: &'a str, color: PastelColor) -> Self {
        Self { styled: text.with(color.as_color()).bold() }
    }
}

impl<'a> fmt::Display for StyledText<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.styled)
    }
}

/// Colors used for each kind of console message
#[derive(Clone, Copy, Debug)]
pub struct Theme {
    pub primary: PastelColor,
    pub accent: PastelColor,
    pub muted: PastelColor,
    pub error: PastelColor,
    pub success: PastelColor,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: PastelColor::Lavender,
            accent: PastelColor::SkyBlue,
            muted: PastelColor::Gray,
            error: PastelColor::Pink,
            success: PastelColor::Mint,
        }
    }
}
