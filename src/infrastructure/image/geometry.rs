//! Output size arithmetic.

/// Bounding box for a resize. `None` leaves that axis unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Maximum width.
    pub width: Option<u32>,
    /// Maximum height.
    pub height: Option<u32>,
}

impl Bounds {
    /// Both axes bounded.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// Only the height bounded.
    #[must_use]
    pub const fn height(height: u32) -> Self {
        Self {
            width: None,
            height: Some(height),
        }
    }

    /// Largest size with the source aspect ratio that fits inside the
    /// bounds. Never enlarges and never returns a zero dimension.
    #[must_use]
    pub fn fit(self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width.max(1), height.max(1));
        }

        let scale_w = self
            .width
            .map_or(1.0, |max| f64::from(max) / f64::from(width));
        let scale_h = self
            .height
            .map_or(1.0, |max| f64::from(max) / f64::from(height));
        let scale = scale_w.min(scale_h);

        if scale >= 1.0 {
            return (width, height);
        }

        (scaled(width, scale), scaled(height, scale))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(value: u32, scale: f64) -> u32 {
    ((f64::from(value) * scale).round() as u32).max(1)
}
