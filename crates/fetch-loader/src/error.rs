use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("proxy configuration error: {reason}")]
    ProxyConfiguration { reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("reader is closed")]
    ReaderClosed,

    #[error("transport error: {reason}")]
    Transport { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl LoaderError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn proxy_configuration(reason: impl Into<String>) -> Self {
        Self::ProxyConfiguration {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// HTTP status of the failed response, if the failure carried one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network { source } => source.status(),
            _ => None,
        }
    }

    pub fn is_http_status(&self) -> bool {
        matches!(self, Self::HttpStatus { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_message() {
        let err = LoaderError::http_status(
            StatusCode::NOT_FOUND,
            "http://example.com/a.flv",
            "range fetch",
        );
        assert_eq!(
            err.to_string(),
            "request failed with HTTP 404 Not Found during range fetch for http://example.com/a.flv"
        );
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(err.is_http_status());
    }

    #[test]
    fn test_non_http_errors_have_no_status() {
        assert_eq!(LoaderError::ReaderClosed.status(), None);
        assert_eq!(LoaderError::transport("boom").status(), None);
        assert!(!LoaderError::internal("boom").is_http_status());
    }
}
