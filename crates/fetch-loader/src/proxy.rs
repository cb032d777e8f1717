use reqwest::Proxy;

use crate::LoaderError;

/// Proxy server kinds supported by the HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks5,
}

/// Credentials for an authenticating proxy
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Proxy used for every loader request
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    pub fn new(url: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            url: url.into(),
            proxy_type,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

pub(crate) fn build_proxy(config: &ProxyConfig) -> Result<Proxy, LoaderError> {
    let proxy_url = &config.url;

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(proxy_url)
            .map_err(|e| LoaderError::proxy_configuration(format!("invalid HTTP proxy URL: {e}")))?,
        ProxyType::Https => Proxy::https(proxy_url).map_err(|e| {
            LoaderError::proxy_configuration(format!("invalid HTTPS proxy URL: {e}"))
        })?,
        ProxyType::Socks5 => {
            let url = if proxy_url.starts_with("socks5://") || proxy_url.starts_with("socks5h://") {
                proxy_url.to_string()
            } else {
                format!("socks5://{proxy_url}")
            };
            Proxy::all(&url).map_err(|e| {
                LoaderError::proxy_configuration(format!("invalid SOCKS5 proxy URL: {e}"))
            })?
        }
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}
