//! SVG rasterisation.

use image::RgbaImage;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use super::geometry::Bounds;
use crate::domain::errors::ProxyError;

/// Largest raster produced from an SVG on either axis.
pub const SVG_RASTER_LIMIT: u32 = 2048;

/// Renders an SVG document at its intrinsic size, shrunk to fit `bounds`.
///
/// External image references are never resolved; only `data:` URIs load.
///
/// # Errors
/// Returns error if the document cannot be parsed or rendered.
pub fn rasterize(bytes: &[u8], bounds: Bounds) -> Result<RgbaImage, ProxyError> {
    let mut options = Options::default();
    options.image_href_resolver.resolve_string = Box::new(|_, _| None);

    let tree = Tree::from_data(bytes, &options).map_err(|e| ProxyError::decode(e.to_string()))?;
    let size = tree.size();
    let (width, height) = bounds.fit(to_pixels(size.width()), to_pixels(size.height()));

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| ProxyError::decode(format!("invalid raster size {width}x{height}")))?;
    #[allow(clippy::cast_precision_loss)]
    let transform = Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut data = pixmap.take();
    demultiply(&mut data);
    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| ProxyError::decode("raster buffer size mismatch"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_pixels(length: f32) -> u32 {
    let length = length.ceil();
    if length.is_finite() && length >= 1.0 {
        length.min(u32::MAX as f32) as u32
    } else {
        1
    }
}

/// Converts premultiplied RGBA to straight alpha in place.
fn demultiply(data: &mut [u8]) {
    for pixel in data.chunks_exact_mut(4) {
        let alpha = u16::from(pixel[3]);
        if alpha == 0 || alpha == 255 {
            continue;
        }
        for channel in &mut pixel[..3] {
            let value = (u16::from(*channel) * 255 + alpha / 2) / alpha;
            *channel = u8::try_from(value.min(255)).unwrap_or(u8::MAX);
        }
    }
}
