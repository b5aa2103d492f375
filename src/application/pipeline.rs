//! Fetch, sniff, transform and hand back the result with its temp file
//! released at the right moment.

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::filename::correct_filename;
use super::proxied_media::{ProxiedMedia, ReleasingStream, ResponseBody};
use crate::domain::entities::{ImagePayload, PayloadData, ProxyFlags};
use crate::domain::errors::{ProxyError, StatusError};
use crate::domain::ports::MediaFetchPort;
use crate::infrastructure::image::TransformDispatcher;
use crate::infrastructure::sniff::TypeSniffer;
use crate::infrastructure::temp::{TempAllocator, TempResource};

/// Runs one request end to end.
///
/// Holds only immutable state, so one coordinator serves any number of
/// concurrent requests.
pub struct PipelineCoordinator<F: MediaFetchPort> {
    fetcher: F,
    default_config: F::Config,
    sniffer: TypeSniffer,
    transformer: TransformDispatcher,
    temp: TempAllocator,
}

impl<F: MediaFetchPort> PipelineCoordinator<F> {
    /// Creates a coordinator with a process-wide default fetch config.
    #[must_use]
    pub fn new(
        fetcher: F,
        default_config: F::Config,
        transformer: TransformDispatcher,
        temp: TempAllocator,
    ) -> Self {
        Self {
            fetcher,
            default_config,
            sniffer: TypeSniffer::new(),
            transformer,
            temp,
        }
    }

    /// Handles a request with the default fetch config.
    ///
    /// # Errors
    /// Returns the status the caller should answer with.
    pub async fn handle(&self, url: &str, flags: ProxyFlags) -> Result<ProxiedMedia, StatusError> {
        self.handle_with(url, flags, &self.default_config).await
    }

    /// Handles a request with an explicit fetch config.
    ///
    /// # Errors
    /// Returns the status the caller should answer with. Internal detail is
    /// logged, never returned.
    pub async fn handle_with(
        &self,
        url: &str,
        flags: ProxyFlags,
        config: &F::Config,
    ) -> Result<ProxiedMedia, StatusError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("proxy", %request_id, url = %url, ?flags);

        async move {
            match self.run(url, flags, config).await {
                Ok(media) => {
                    info!(mime = %media.mime, filename = %media.filename, "Request served");
                    Ok(media)
                }
                Err(e) => {
                    let status = e.status_code();
                    if status >= 500 {
                        error!(error = %e, "Request failed");
                    } else {
                        warn!(error = %e, status, "Request refused");
                    }
                    Err(StatusError::from(e))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        url: &str,
        flags: ProxyFlags,
        config: &F::Config,
    ) -> Result<ProxiedMedia, ProxyError> {
        let temp = self.temp.acquire()?;

        let (payload, filename) = match self.process(&temp, url, flags, config).await {
            Ok(done) => done,
            Err(e) => {
                temp.release();
                return Err(e);
            }
        };

        let body = match payload.data {
            PayloadData::Buffer(bytes) => {
                temp.release();
                ResponseBody::Buffer(bytes)
            }
            PayloadData::Stream(stream) => {
                ResponseBody::Stream(ReleasingStream::new(stream, temp.release_handle()))
            }
        };

        Ok(ProxiedMedia {
            mime: payload.mime,
            filename,
            body,
        })
    }

    async fn process(
        &self,
        temp: &TempResource,
        url: &str,
        flags: ProxyFlags,
        config: &F::Config,
    ) -> Result<(ImagePayload, String), ProxyError> {
        let fetched = self.fetcher.fetch(url, temp.path(), config).await?;
        debug!(bytes = fetched.byte_count, filename = %fetched.filename, "Fetched");

        let sniffed = self.sniffer.detect(&fetched.path).await;
        debug!(sniffed = %sniffed, "Sniffed");

        let filename = correct_filename(&fetched.filename, sniffed.extension());
        let payload = self.transformer.transform(&fetched.path, &sniffed, flags).await?;
        let filename = correct_filename(&filename, payload.extension.as_deref());

        Ok((payload, filename))
    }
}

impl<F: MediaFetchPort + std::fmt::Debug> std::fmt::Debug for PipelineCoordinator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("fetcher", &self.fetcher)
            .field("temp", &self.temp)
            .finish_non_exhaustive()
    }
}
