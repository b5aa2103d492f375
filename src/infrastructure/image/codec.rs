//! Raster decoding and webp/png encoding.
//!
//! Everything here is synchronous and CPU-bound. Callers run it on the
//! blocking pool.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use libwebp_sys::WebPConfig;
use webp::{AnimEncoder, AnimFrame, Encoder};

use super::geometry::Bounds;
use crate::domain::errors::ProxyError;

/// Browsers render frame delays below this as 100ms.
const MIN_FRAME_DELAY_MS: u32 = 10;
const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// One decoded frame, always full canvas.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixels.
    pub image: RgbaImage,
    /// Display time in milliseconds. Zero for stills.
    pub delay_ms: u32,
}

impl Frame {
    /// A single still frame.
    #[must_use]
    pub fn still(image: RgbaImage) -> Self {
        Self { image, delay_ms: 0 }
    }
}

/// Lossy webp encoder settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebpProfile {
    /// Colour quality, 0 to 100.
    pub quality: f32,
    /// Alpha plane quality, 0 to 100.
    pub alpha_quality: i32,
    /// Lossless mode.
    pub lossless: bool,
    /// Near-lossless preprocessing level. `None` disables it.
    pub near_lossless: Option<i32>,
    /// Encoder effort, 0 (fast) to 6 (slow).
    pub method: i32,
}

impl Default for WebpProfile {
    fn default() -> Self {
        Self {
            quality: 77.0,
            alpha_quality: 95,
            lossless: false,
            near_lossless: None,
            method: 2,
        }
    }
}

impl WebpProfile {
    fn to_config(self) -> Result<WebPConfig, ProxyError> {
        let mut config =
            WebPConfig::new().map_err(|()| ProxyError::encode("webp config init failed"))?;
        config.quality = self.quality;
        config.alpha_quality = self.alpha_quality;
        config.lossless = i32::from(self.lossless);
        config.near_lossless = self.near_lossless.unwrap_or(100);
        config.method = self.method;
        // Plain 4:2:0 conversion.
        config.use_sharp_yuv = 0;
        Ok(config)
    }
}

/// Image crate limits for a decoded pixel ceiling.
#[must_use]
pub fn raster_limits(max_pixels: u64) -> image::Limits {
    let max_dim = u32::try_from(max_pixels).unwrap_or(u32::MAX);
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(max_dim);
    limits.max_image_height = Some(max_dim);
    limits.max_alloc = Some(max_pixels.saturating_mul(4));
    limits
}

fn check_pixels(width: u32, height: u32, max_pixels: u64) -> Result<(), ProxyError> {
    if width == 0 || height == 0 {
        return Err(ProxyError::decode("image has no pixels"));
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(ProxyError::decode(format!(
            "image too large: {width}x{height} exceeds {max_pixels} pixels"
        )));
    }
    Ok(())
}

/// Decodes the first frame with EXIF orientation applied.
///
/// # Errors
/// Returns error on unknown formats, corrupt data or oversized images.
pub fn decode_still(bytes: &[u8], max_pixels: u64) -> Result<DynamicImage, ProxyError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ProxyError::decode(e.to_string()))?;
    reader.limits(raster_limits(max_pixels));

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| ProxyError::decode(e.to_string()))?;
    let (width, height) = decoder.dimensions();
    check_pixels(width, height, max_pixels)?;

    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image =
        DynamicImage::from_decoder(decoder).map_err(|e| ProxyError::decode(e.to_string()))?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Decodes every frame of an animated GIF or WebP. Other inputs, and
/// WebP files without animation, yield one still frame.
///
/// # Errors
/// Returns error on corrupt data or when the frames together exceed
/// `max_pixels`.
pub fn decode_animated(bytes: &[u8], mime: &str, max_pixels: u64) -> Result<Vec<Frame>, ProxyError> {
    let decode_err = |e: image::ImageError| ProxyError::decode(e.to_string());

    match mime {
        "image/gif" => {
            let mut decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode_err)?;
            let (width, height) = decoder.dimensions();
            check_pixels(width, height, max_pixels)?;
            decoder.set_limits(raster_limits(max_pixels)).map_err(decode_err)?;
            collect_frames(decoder.into_frames(), max_pixels)
        }
        "image/webp" => {
            let mut decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(decode_err)?;
            if !decoder.has_animation() {
                return Ok(vec![Frame::still(decode_still(bytes, max_pixels)?.to_rgba8())]);
            }
            let (width, height) = decoder.dimensions();
            check_pixels(width, height, max_pixels)?;
            decoder.set_limits(raster_limits(max_pixels)).map_err(decode_err)?;
            collect_frames(decoder.into_frames(), max_pixels)
        }
        _ => Ok(vec![Frame::still(decode_still(bytes, max_pixels)?.to_rgba8())]),
    }
}

fn collect_frames(frames: image::Frames<'_>, max_pixels: u64) -> Result<Vec<Frame>, ProxyError> {
    let mut out = Vec::new();
    let mut budget = max_pixels;

    for frame in frames {
        let frame = frame.map_err(|e| ProxyError::decode(e.to_string()))?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay_ms = numer.checked_div(denom).unwrap_or(0);
        let delay_ms = if delay_ms < MIN_FRAME_DELAY_MS {
            DEFAULT_FRAME_DELAY_MS
        } else {
            delay_ms
        };

        let image = frame.into_buffer();
        let pixels = u64::from(image.width()) * u64::from(image.height());
        budget = budget
            .checked_sub(pixels)
            .ok_or_else(|| ProxyError::decode("animation exceeds decoded pixel limit"))?;

        out.push(Frame { image, delay_ms });
    }

    if out.is_empty() {
        return Err(ProxyError::decode("animation has no frames"));
    }
    Ok(out)
}

/// Resizes every frame to fit `bounds`. Frames already inside are untouched.
#[must_use]
pub fn resize_frames(frames: Vec<Frame>, bounds: Bounds) -> Vec<Frame> {
    frames
        .into_iter()
        .map(|frame| {
            let (width, height) = frame.image.dimensions();
            let target = bounds.fit(width, height);
            if target == (width, height) {
                return frame;
            }
            Frame {
                image: image::imageops::resize(&frame.image, target.0, target.1, FilterType::Lanczos3),
                delay_ms: frame.delay_ms,
            }
        })
        .collect()
}

/// Encodes one frame as a still webp, or several as an animated one.
///
/// # Errors
/// Returns error if there are no frames or the encoder fails.
pub fn encode_webp(frames: &[Frame], profile: WebpProfile) -> Result<Vec<u8>, ProxyError> {
    let config = profile.to_config()?;

    match frames {
        [] => Err(ProxyError::encode("nothing to encode")),
        [frame] => {
            let (width, height) = frame.image.dimensions();
            let memory = Encoder::from_rgba(frame.image.as_raw(), width, height)
                .encode_advanced(&config)
                .map_err(|e| ProxyError::encode(format!("webp: {e:?}")))?;
            Ok(memory.to_vec())
        }
        [first, ..] => {
            let (width, height) = first.image.dimensions();
            let mut encoder = AnimEncoder::new(width, height, &config);
            let mut timestamp: i32 = 0;
            for frame in frames {
                encoder.add_frame(AnimFrame::from_rgba(
                    frame.image.as_raw(),
                    width,
                    height,
                    timestamp,
                ));
                timestamp =
                    timestamp.saturating_add(i32::try_from(frame.delay_ms).unwrap_or(i32::MAX));
            }
            let memory = encoder
                .try_encode()
                .map_err(|e| ProxyError::encode(format!("animated webp: {e:?}")))?;
            Ok(memory.to_vec())
        }
    }
}

/// Encodes an image as PNG.
///
/// # Errors
/// Returns error if the encoder fails.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ProxyError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ProxyError::encode(e.to_string()))?;
    Ok(out.into_inner())
}
