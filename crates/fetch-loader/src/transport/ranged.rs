use async_trait::async_trait;
use bytes::Bytes;
use humansize::{BINARY, format_size};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use super::{Transport, TransportKind};
use crate::LoaderError;
use crate::client::{RequestPolicy, range_header};

/// Inclusive byte range `[start, end]` of the next request.
///
/// The first range is `[0, chunk_size]`. Every later one starts right after
/// its predecessor and spans `chunk_size` bytes, clamped to the content
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeCursor {
    pub start: u64,
    pub end: u64,
}

impl RangeCursor {
    pub fn first(chunk_size: u64) -> Self {
        Self {
            start: 0,
            end: chunk_size,
        }
    }

    /// Range following this one, or `None` once the source is exhausted.
    pub fn next(&self, content_length: u64, chunk_size: u64) -> Option<Self> {
        let start = self.end.saturating_add(1);
        if start >= content_length {
            return None;
        }
        let end = content_length.min(start.saturating_add(chunk_size.max(1) - 1));
        Some(Self { start, end })
    }
}

/// Fetches the resource as a strictly sequential chain of range requests.
pub struct RangedTransport {
    client: Client,
    url: Url,
    policy: RequestPolicy,
    chunk_size: u64,
    probe_range_end: u64,
    fallback_length: Option<u64>,
    range_query_param: bool,
    content_length: u64,
    cursor: Option<RangeCursor>,
    closed: bool,
    bytes_read: u64,
}

impl RangedTransport {
    pub fn new(client: Client, url: Url, policy: RequestPolicy, chunk_size: u64) -> Self {
        Self {
            client,
            url,
            policy,
            chunk_size: chunk_size.max(1),
            probe_range_end: 1024,
            fallback_length: None,
            range_query_param: true,
            content_length: 0,
            cursor: None,
            closed: false,
            bytes_read: 0,
        }
    }

    /// Content length used when the probe response carries none
    pub fn with_fallback_length(mut self, length: Option<u64>) -> Self {
        self.fallback_length = length;
        self
    }

    pub fn with_probe_range_end(mut self, end: u64) -> Self {
        self.probe_range_end = end;
        self
    }

    pub fn with_range_query_param(mut self, enabled: bool) -> Self {
        self.range_query_param = enabled;
        self
    }

    fn range_url(&self, cursor: RangeCursor) -> Url {
        let mut url = self.url.clone();
        if self.range_query_param {
            url.query_pairs_mut()
                .append_pair("range", &format!("{}-{}", cursor.start, cursor.end));
        }
        url
    }

    #[instrument(skip(self), fields(url = %self.url), level = "debug")]
    async fn probe(&self) -> Result<Option<u64>, LoaderError> {
        let response = self
            .policy
            .apply_range(self.client.head(self.url.clone()), 0, self.probe_range_end)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::http_status(
                status,
                self.url.as_str(),
                "length probe",
            ));
        }

        Ok(content_length_from_headers(status, response.headers()))
    }

    /// Fetches one range. The flag is set when the server ignored `Range`
    /// and answered with the whole resource.
    #[instrument(skip(self), level = "debug")]
    async fn fetch_range(&self, cursor: RangeCursor) -> Result<(Bytes, bool), LoaderError> {
        let url = self.range_url(cursor);
        debug!(url = %url, header = %range_header(cursor.start, cursor.end), "Fetching range");

        let response = self
            .policy
            .apply_range(self.client.get(url), cursor.start, cursor.end)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(LoaderError::http_status(
                status,
                self.url.as_str(),
                "range fetch",
            ));
        }

        Ok((response.bytes().await?, status == StatusCode::OK))
    }
}

#[async_trait]
impl Transport for RangedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ranged
    }

    async fn open(&mut self) -> Result<(), LoaderError> {
        if self.closed {
            return Err(LoaderError::ReaderClosed);
        }

        let probed = match self.probe().await {
            Ok(length) => length,
            Err(err) => {
                self.closed = true;
                return Err(err);
            }
        };

        self.content_length = match probed.or(self.fallback_length) {
            Some(length) => length,
            None => {
                warn!(url = %self.url, "Content length unknown, only the first range will be fetched");
                0
            }
        };

        info!(
            url = %self.url,
            size = %format_size(self.content_length, BINARY),
            chunk_size = self.chunk_size,
            "Ranged download started"
        );

        self.cursor = Some(RangeCursor::first(self.chunk_size));
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>, LoaderError> {
        if self.closed {
            return Err(LoaderError::ReaderClosed);
        }
        let Some(cursor) = self.cursor else {
            return Ok(None);
        };

        let (bytes, whole_resource) = match self.fetch_range(cursor).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.closed = true;
                self.cursor = None;
                return Err(err);
            }
        };

        let bytes = if whole_resource {
            debug!(
                url = %self.url,
                range_start = cursor.start,
                "Server ignored Range, taking the rest of the full body"
            );
            self.cursor = None;
            remainder_from(bytes, cursor.start)
        } else {
            self.cursor = cursor.next(self.content_length, self.chunk_size);
            bytes
        };

        self.bytes_read += bytes.len() as u64;
        if self.cursor.is_none() {
            debug!(total = self.bytes_read, "Range sequence finished");
        }
        Ok(Some(bytes))
    }

    fn cancel(&mut self) {
        self.closed = true;
        self.cursor = None;
    }
}

/// Part of a full-resource body not yet delivered by earlier ranges.
pub(crate) fn remainder_from(body: Bytes, start: u64) -> Bytes {
    let start = usize::try_from(start).unwrap_or(usize::MAX).min(body.len());
    body.slice(start..)
}

/// Total length from `Content-Range: bytes a-b/total`, or `Content-Length`
/// when the server answered with the full resource.
pub(crate) fn content_length_from_headers(status: StatusCode, headers: &HeaderMap) -> Option<u64> {
    let from_range = headers
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse::<u64>().ok());

    if from_range.is_some() {
        return from_range;
    }

    if status != StatusCode::OK {
        return None;
    }

    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|length| *length > 0)
}
