use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use humansize::{BINARY, format_size};
use reqwest::{Client, Url};
use tracing::{debug, info, instrument, trace};

use super::{Transport, TransportKind};
use crate::LoaderError;
use crate::client::RequestPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Idle,
    Reading,
    Finished,
    Closed,
}

/// Reads the whole resource through one open request.
pub struct StreamingTransport {
    client: Client,
    url: Url,
    policy: RequestPolicy,
    body: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
    state: ReaderState,
    bytes_read: u64,
}

impl StreamingTransport {
    pub fn new(client: Client, url: Url, policy: RequestPolicy) -> Self {
        Self {
            client,
            url,
            policy,
            body: None,
            state: ReaderState::Idle,
            bytes_read: 0,
        }
    }

    fn close(&mut self) {
        self.body = None;
        self.state = ReaderState::Closed;
    }
}

#[async_trait]
impl Transport for StreamingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Streaming
    }

    #[instrument(skip(self), fields(url = %self.url), level = "debug")]
    async fn open(&mut self) -> Result<(), LoaderError> {
        if self.state != ReaderState::Idle {
            return Err(LoaderError::ReaderClosed);
        }

        debug!(
            credentials = self.policy.credentials().as_str(),
            mode = self.policy.mode().as_str(),
            "Opening streaming request"
        );

        let response = self
            .policy
            .apply(self.client.get(self.url.clone()))
            .send()
            .await
            .inspect_err(|_| self.state = ReaderState::Closed)?;

        if !response.status().is_success() {
            self.state = ReaderState::Closed;
            return Err(LoaderError::http_status(
                response.status(),
                self.url.as_str(),
                "stream open",
            ));
        }

        match response.content_length() {
            Some(length) => info!(
                url = %self.url,
                size = %format_size(length, BINARY),
                "Streaming download started"
            ),
            None => debug!(url = %self.url, "Content length not available"),
        }

        self.body = Some(response.bytes_stream().boxed());
        self.state = ReaderState::Reading;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Bytes>, LoaderError> {
        match self.state {
            ReaderState::Finished => return Ok(None),
            ReaderState::Idle | ReaderState::Closed => return Err(LoaderError::ReaderClosed),
            ReaderState::Reading => {}
        }

        let Some(body) = self.body.as_mut() else {
            self.state = ReaderState::Closed;
            return Err(LoaderError::ReaderClosed);
        };

        loop {
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    self.bytes_read += chunk.len() as u64;
                    trace!(len = chunk.len(), total = self.bytes_read, "Read increment");
                    return Ok(Some(chunk));
                }
                Some(Err(err)) => {
                    self.close();
                    return Err(err.into());
                }
                None => {
                    self.body = None;
                    self.state = ReaderState::Finished;
                    debug!(total = self.bytes_read, "Stream body exhausted");
                    return Ok(None);
                }
            }
        }
    }

    fn cancel(&mut self) {
        if self.state != ReaderState::Closed {
            debug!(url = %self.url, total = self.bytes_read, "Closing stream reader");
        }
        self.close();
    }
}
