//! Picks and runs the single transform a request asks for.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tracing::debug;

use super::badge::render_badge;
use super::codec::{Frame, WebpProfile, decode_animated, decode_still, encode_webp, resize_frames};
use super::geometry::Bounds;
use super::svg_raster::{SVG_RASTER_LIMIT, rasterize};
use crate::domain::entities::{
    ByteStream, ImagePayload, MIME_SVG, PayloadData, ProxyFlags, SniffedType, TransformKind,
};
use crate::domain::errors::ProxyError;
use crate::infrastructure::config::TransformSettings;

/// Chunk size for passthrough streams.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

const STILL_BOUNDS: Bounds = Bounds::new(498, 422);
const PREVIEW_BOUNDS: Bounds = Bounds::new(200, 200);
const SVG_BOUNDS: Bounds = Bounds::new(SVG_RASTER_LIMIT, SVG_RASTER_LIMIT);

/// How a source is decoded before resizing.
#[derive(Debug, Clone, Copy)]
struct Conversion {
    bounds: Bounds,
    animated: bool,
}

/// Runs transforms with bounded parallelism on the blocking pool.
#[derive(Debug, Clone)]
pub struct TransformDispatcher {
    permits: Arc<Semaphore>,
    max_decoded_pixels: u64,
    profile: WebpProfile,
}

impl TransformDispatcher {
    /// Creates a dispatcher from settings.
    #[must_use]
    pub fn new(settings: &TransformSettings) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(settings.max_concurrent_transforms.max(1))),
            max_decoded_pixels: settings.max_decoded_pixels,
            profile: WebpProfile::default(),
        }
    }

    /// Produces the response payload for the file at `path`.
    ///
    /// Conversions return buffers; passthrough returns a stream over the
    /// file, which must stay in place until the stream is done.
    ///
    /// # Errors
    /// Returns [`ProxyError::UnsupportedType`] when a conversion flag meets
    /// a type that cannot be decoded, [`ProxyError::RejectedType`] for
    /// unflagged non-image content, and decode/encode failures.
    pub async fn transform(
        &self,
        path: &Path,
        sniffed: &SniffedType,
        flags: ProxyFlags,
    ) -> Result<ImagePayload, ProxyError> {
        if flags.requests_conversion() && !sniffed.is_convertible() {
            return Err(ProxyError::unsupported("Unexpected mime"));
        }

        let kind = TransformKind::select(flags);
        debug!(?kind, mime = sniffed.mime(), "Selected transform");

        match kind {
            TransformKind::Sized { rendition, still } => {
                if !still && !sniffed.is_animation_convertible() {
                    return passthrough(path, sniffed).await;
                }
                self.convert(
                    path,
                    sniffed,
                    Conversion {
                        bounds: Bounds::height(rendition.max_height()),
                        animated: !still,
                    },
                )
                .await
            }
            TransformKind::Still => self.convert(path, sniffed, still(STILL_BOUNDS)).await,
            TransformKind::Preview => self.convert(path, sniffed, still(PREVIEW_BOUNDS)).await,
            TransformKind::Badge => self.badge(path, sniffed).await,
            TransformKind::Original if sniffed.is_svg() => {
                self.convert(path, sniffed, still(SVG_BOUNDS)).await
            }
            TransformKind::Original => {
                if !(sniffed.mime().starts_with("image/") || sniffed.is_browser_safe()) {
                    return Err(ProxyError::RejectedType {
                        mime: sniffed.mime().to_string(),
                    });
                }
                passthrough(path, sniffed).await
            }
        }
    }

    async fn convert(
        &self,
        path: &Path,
        sniffed: &SniffedType,
        conversion: Conversion,
    ) -> Result<ImagePayload, ProxyError> {
        let path = path.to_path_buf();
        let mime = sniffed.mime().to_string();
        let max_pixels = self.max_decoded_pixels;
        let profile = self.profile;

        let bytes = self
            .run_blocking(move || {
                let frames = load_frames(&path, &mime, conversion.animated, max_pixels)?;
                let frames = resize_frames(frames, conversion.bounds);
                encode_webp(&frames, profile)
            })
            .await?;

        Ok(ImagePayload::webp(bytes))
    }

    async fn badge(&self, path: &Path, sniffed: &SniffedType) -> Result<ImagePayload, ProxyError> {
        let path = path.to_path_buf();
        let mime = sniffed.mime().to_string();
        let max_pixels = self.max_decoded_pixels;

        let bytes = self
            .run_blocking(move || {
                let frames = load_frames(&path, &mime, false, max_pixels)?;
                let first = frames
                    .into_iter()
                    .next()
                    .ok_or_else(|| ProxyError::decode("no frames"))?;
                render_badge(&first.image)
            })
            .await?;

        Ok(ImagePayload::png(bytes))
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, ProxyError>
    where
        F: FnOnce() -> Result<T, ProxyError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProxyError::encode("transform pool closed"))?;

        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| ProxyError::encode(format!("transform task failed: {e}")))?
    }
}

const fn still(bounds: Bounds) -> Conversion {
    Conversion {
        bounds,
        animated: false,
    }
}

fn load_frames(
    path: &Path,
    mime: &str,
    animated: bool,
    max_pixels: u64,
) -> Result<Vec<Frame>, ProxyError> {
    let bytes = std::fs::read(path)?;

    if mime == MIME_SVG {
        return Ok(vec![Frame::still(rasterize(&bytes, SVG_BOUNDS)?)]);
    }
    if animated {
        return decode_animated(&bytes, mime, max_pixels);
    }
    Ok(vec![Frame::still(decode_still(&bytes, max_pixels)?.to_rgba8())])
}

async fn passthrough(path: &Path, sniffed: &SniffedType) -> Result<ImagePayload, ProxyError> {
    Ok(ImagePayload {
        data: PayloadData::Stream(open_stream(path).await?),
        extension: sniffed.extension().map(String::from),
        mime: sniffed.mime().to_string(),
    })
}

/// Streams a file in fixed-size chunks. The file is opened before
/// returning so open errors surface here.
///
/// # Errors
/// Returns error if the file cannot be opened.
pub async fn open_stream(path: &Path) -> Result<ByteStream, ProxyError> {
    let file = tokio::fs::File::open(path).await?;

    let stream = futures_util::stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });

    Ok(Box::pin(stream))
}
