use serde::Serialize;
use std::fmt;

/// Dimensions assumed for submissions stored without (valid) pixel sizes.
pub const FALLBACK_WIDTH: i64 = 1920;
pub const FALLBACK_HEIGHT: i64 = 1080;

/// Default ratio of long side to short side still considered square.
///
/// 1.2 keeps 5:4 (1.25) and 4:3 prints landscape, 4:5 portrait uploads
/// portrait, and absorbs the few pixels cropping or frame compositing
/// shaves off a 1:1 capture.
pub const DEFAULT_SQUARE_TOLERANCE: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Landscape,
    Square,
    Portrait,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Landscape, Bucket::Square, Bucket::Portrait];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Landscape => "landscape",
            Bucket::Square => "square",
            Bucket::Portrait => "portrait",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    square_tolerance: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_SQUARE_TOLERANCE)
    }
}

impl Classifier {
    /// Tolerances below 1.0 (or NaN) are clamped to 1.0, i.e. only exact squares.
    pub fn new(square_tolerance: f64) -> Self {
        let square_tolerance = if square_tolerance.is_finite() && square_tolerance >= 1.0 {
            square_tolerance
        } else {
            1.0
        };
        Self { square_tolerance }
    }

    pub fn square_tolerance(&self) -> f64 {
        self.square_tolerance
    }

    pub fn classify(&self, width: Option<i64>, height: Option<i64>) -> Bucket {
        let (width, height) = match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w as f64, h as f64),
            _ => (FALLBACK_WIDTH as f64, FALLBACK_HEIGHT as f64),
        };

        if width > height * self.square_tolerance {
            Bucket::Landscape
        } else if height > width * self.square_tolerance {
            Bucket::Portrait
        } else {
            Bucket::Square
        }
    }
}

/// Classifies with the default tolerance.
pub fn classify(width: Option<i64>, height: Option<i64>) -> Bucket {
    Classifier::default().classify(width, height)
}
