use anyhow::{Context, Result};
use core_logic::{NetworkError, ProxyConfig};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Header set and egress path used by every request of one account session.
#[derive(Debug, Clone)]
pub struct NetworkIdentity {
    pub user_agent: String,
    pub origin: String,
    pub proxy: Option<ProxyConfig>,
}

#[derive(Deserialize)]
struct IpEcho {
    ip: String,
}

impl NetworkIdentity {
    pub fn new(user_agent: &str, origin: &str, proxy: Option<ProxyConfig>) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            origin: origin.trim_end_matches('/').to_string(),
            proxy,
        }
    }

    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent).context("Invalid user agent")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(&self.origin).context("Invalid origin")?,
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!("{}/", self.origin)).context("Invalid referer")?,
        );
        Ok(headers)
    }

    fn builder(&self) -> Result<ClientBuilder> {
        let mut builder = Client::builder().default_headers(self.headers()?);
        if let Some(proxy_conf) = &self.proxy {
            let mut proxy = reqwest::Proxy::all(&proxy_conf.url).map_err(|e| {
                NetworkError::InvalidProxy {
                    url: proxy_conf.url.clone(),
                    reason: e.to_string(),
                }
            })?;
            if let (Some(u), Some(p)) = (&proxy_conf.username, &proxy_conf.password) {
                proxy = proxy.basic_auth(u, p);
            }
            builder = builder.proxy(proxy);
        }
        Ok(builder)
    }

    pub fn http_client(&self, timeout: Duration) -> Result<Client> {
        self.builder()?
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")
    }

    /// Egress address as seen by `lookup_url`, or `"Unknown"` if the lookup fails.
    pub async fn lookup_ip(&self, lookup_url: &str) -> String {
        let attempt = async {
            let client = self.http_client(IP_LOOKUP_TIMEOUT)?;
            let echo: IpEcho = client
                .get(lookup_url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            anyhow::Ok(echo.ip)
        };

        match attempt.await {
            Ok(ip) => {
                info!("🌍 IP: {}", ip);
                ip
            }
            Err(e) => {
                warn!("IP check failed: {:#}", e);
                "Unknown".to_string()
            }
        }
    }
}

/// The account's own proxy wins over the shared one.
pub fn resolve_proxy(own: Option<&ProxyConfig>, shared: Option<&ProxyConfig>) -> Option<ProxyConfig> {
    own.or(shared).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(url: &str) -> ProxyConfig {
        ProxyConfig {
            url: url.to_string(),
            username: None,
            password: None,
        }
    }

    #[test]
    fn headers_carry_origin_and_referer() {
        let id = NetworkIdentity::new("agent/1.0", "https://app.fight.id/", None);
        let headers = id.headers().unwrap();
        assert_eq!(headers[ORIGIN], "https://app.fight.id");
        assert_eq!(headers[REFERER], "https://app.fight.id/");
        assert_eq!(headers[USER_AGENT], "agent/1.0");
    }

    #[test]
    fn own_proxy_takes_precedence() {
        let own = proxy("http://1.1.1.1:80");
        let shared = proxy("http://2.2.2.2:80");
        assert_eq!(resolve_proxy(Some(&own), Some(&shared)), Some(own));
        assert_eq!(resolve_proxy(None, Some(&shared)), Some(shared));
        assert_eq!(resolve_proxy(None, None), None);
    }

    #[test]
    fn builds_client_with_proxy_credentials() {
        let p = ProxyConfig {
            url: "http://10.0.0.1:8080".to_string(),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
        };
        let id = NetworkIdentity::new("agent/1.0", "https://app.fight.id", Some(p));
        assert!(id.http_client(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn failed_lookup_reports_unknown() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(500)
            .create_async()
            .await;

        let id = NetworkIdentity::new("agent/1.0", "https://app.fight.id", None);
        assert_eq!(id.lookup_ip(&server.url()).await, "Unknown");
    }

    #[tokio::test]
    async fn lookup_reads_echoed_ip() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ip":"203.0.113.7"}"#)
            .create_async()
            .await;

        let id = NetworkIdentity::new("agent/1.0", "https://app.fight.id", None);
        assert_eq!(id.lookup_ip(&server.url()).await, "203.0.113.7");
    }
}
