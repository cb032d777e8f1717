//! HTTP client construction and the per-request policy shared by both
//! transports.

use std::sync::OnceLock;

use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::LoaderError;
use crate::config::{ClientConfig, CredentialsMode, LoaderOptions, RequestMode};
use crate::proxy::build_proxy;

pub const SEC_FETCH_MODE: HeaderName = HeaderName::from_static("sec-fetch-mode");

/// Installs the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

pub fn create_client(config: &ClientConfig) -> Result<Client, LoaderError> {
    install_rustls_provider();

    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs);

    if !config.timeout.is_zero() {
        builder = builder.timeout(config.timeout);
    }

    if !config.follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }

    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(build_proxy(proxy)?);
    } else if !config.use_system_proxy {
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}

/// Headers, credentials and mode applied to every request of one loader.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    headers: HeaderMap,
    credentials: CredentialsMode,
    mode: RequestMode,
}

impl RequestPolicy {
    pub fn from_options(options: &LoaderOptions) -> Result<Self, LoaderError> {
        let mut headers = HeaderMap::with_capacity(options.headers.len());
        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| LoaderError::invalid_header(name, e.to_string()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| LoaderError::invalid_header(name, e.to_string()))?;
            headers.insert(header_name, header_value);
        }

        let credentials = options.credentials();
        if credentials == CredentialsMode::Omit {
            for name in [COOKIE, AUTHORIZATION] {
                if headers.remove(&name).is_some() {
                    debug!(header = %name, "Dropping credential header, credentials are omitted");
                }
            }
        }

        Ok(Self {
            headers,
            credentials,
            mode: options.request_mode(),
        })
    }

    pub fn credentials(&self) -> CredentialsMode {
        self.credentials
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .headers(self.headers.clone())
            .header(SEC_FETCH_MODE, HeaderValue::from_static(self.mode.as_str()))
    }

    /// Same as [`apply`](Self::apply) plus an inclusive `Range` header.
    pub fn apply_range(&self, request: RequestBuilder, start: u64, end: u64) -> RequestBuilder {
        self.apply(request).header(RANGE, range_header(start, end))
    }
}

pub fn range_header(start: u64, end: u64) -> String {
    format!("bytes={start}-{end}")
}
