//! Pipeline output with the temp-file release bound to it.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::domain::entities::ByteStream;
use crate::infrastructure::temp::ReleaseHandle;

/// What the caller receives for a successful request.
#[derive(Debug)]
pub struct ProxiedMedia {
    /// `Content-Type` of the body.
    pub mime: String,
    /// Filename for `Content-Disposition`.
    pub filename: String,
    /// Body.
    pub body: ResponseBody,
}

/// Response body. The temp file behind a stream lives until the stream
/// ends, fails or is dropped.
#[derive(Debug)]
pub enum ResponseBody {
    /// In memory. The temp file is already gone.
    Buffer(Bytes),
    /// Read lazily from the temp file.
    Stream(ReleasingStream),
}

impl ResponseBody {
    /// Reads the whole body into memory.
    ///
    /// # Errors
    /// Returns the first stream error.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        use futures_util::TryStreamExt;

        match self {
            Self::Buffer(bytes) => Ok(bytes),
            Self::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(Bytes::from(chunks.concat()))
            }
        }
    }
}

/// Stream wrapper that releases its temp file exactly once: on the end of
/// the stream, on the first error, or on drop, whichever comes first.
pub struct ReleasingStream {
    inner: ByteStream,
    release: ReleaseHandle,
}

impl ReleasingStream {
    /// Binds `release` to the lifetime of `inner`.
    #[must_use]
    pub fn new(inner: ByteStream, release: ReleaseHandle) -> Self {
        Self { inner, release }
    }

    /// Returns true once the underlying file has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.release.is_released()
    }
}

impl Stream for ReleasingStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.release.is_released() {
            return Poll::Ready(None);
        }
        let polled = self.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(None | Some(Err(_))) => {
                self.release.release();
            }
            Poll::Ready(Some(Ok(_))) | Poll::Pending => {}
        }
        polled
    }
}

impl Drop for ReleasingStream {
    fn drop(&mut self) {
        self.release.release();
    }
}

impl std::fmt::Debug for ReleasingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasingStream")
            .field("release", &self.release)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::temp::TempAllocator;
    use futures_util::StreamExt;
    use tempfile::TempDir;

    fn chunks(items: Vec<std::io::Result<Bytes>>) -> ByteStream {
        Box::pin(futures_util::stream::iter(items))
    }

    #[tokio::test]
    async fn test_release_on_completion() {
        let dir = TempDir::new().unwrap();
        let temp = TempAllocator::new(Some(dir.path().to_path_buf())).acquire().unwrap();
        let path = temp.path().to_path_buf();

        let mut stream = ReleasingStream::new(
            chunks(vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))]),
            temp.release_handle(),
        );

        assert!(stream.next().await.is_some());
        assert!(path.exists());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert!(!path.exists());
        assert!(stream.is_released());
    }

    #[tokio::test]
    async fn test_release_on_error() {
        let dir = TempDir::new().unwrap();
        let temp = TempAllocator::new(Some(dir.path().to_path_buf())).acquire().unwrap();
        let path = temp.path().to_path_buf();

        let mut stream = ReleasingStream::new(
            chunks(vec![Err(std::io::Error::other("disk gone")), Ok(Bytes::from_static(b"x"))]),
            temp.release_handle(),
        );

        assert!(stream.next().await.unwrap().is_err());
        assert!(!path.exists());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_release_on_drop_before_completion() {
        let dir = TempDir::new().unwrap();
        let temp = TempAllocator::new(Some(dir.path().to_path_buf())).acquire().unwrap();
        let path = temp.path().to_path_buf();
        let handle = temp.release_handle();

        let mut stream = ReleasingStream::new(
            chunks(vec![Ok(Bytes::from_static(b"a")), Ok(Bytes::from_static(b"b"))]),
            temp.release_handle(),
        );
        assert!(stream.next().await.is_some());
        drop(stream);

        assert!(!path.exists());
        assert!(handle.is_released());
        assert!(!temp.release());
    }

    #[test]
    fn test_pending_keeps_file() {
        let dir = TempDir::new().unwrap();
        let temp = TempAllocator::new(Some(dir.path().to_path_buf())).acquire().unwrap();

        let mut stream = tokio_test::task::spawn(ReleasingStream::new(
            Box::pin(futures_util::stream::pending()),
            temp.release_handle(),
        ));

        tokio_test::assert_pending!(stream.poll_next());
        assert!(temp.path().exists());
        assert!(!temp.release_handle().is_released());
    }

    #[tokio::test]
    async fn test_into_bytes() {
        let dir = TempDir::new().unwrap();
        let temp = TempAllocator::new(Some(dir.path().to_path_buf())).acquire().unwrap();
        let body = ResponseBody::Stream(ReleasingStream::new(
            chunks(vec![Ok(Bytes::from_static(b"he")), Ok(Bytes::from_static(b"llo"))]),
            temp.release_handle(),
        ));

        assert_eq!(body.into_bytes().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(temp.release_handle().is_released());
    }
}
