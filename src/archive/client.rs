//! HTTP client for the LIDO archive.

use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ArchiveConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("record {id} not available (HTTP {status})")]
    Status { id: String, status: StatusCode },
    #[error("request for record {id} failed: {source}")]
    Transport {
        id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid archive url {0:?}")]
    Url(String),
}

/// Anything that serves raw LIDO payloads by record id.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches `LIDO_SOURCE` datastreams from the archive
pub struct ArchiveClient {
    client: Client,
    url_template: String,
}

impl ArchiveClient {
    pub fn new(config: &ArchiveConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("placemark/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url_template: config.url_template.clone(),
        })
    }

    pub fn record_url(&self, id: &str) -> Result<Url, FetchError> {
        let raw = self.url_template.replace("{id}", id);
        Url::parse(&raw).map_err(|_| FetchError::Url(raw))
    }
}

impl RecordSource for ArchiveClient {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.record_url(id)?;
        debug!("GET {}", url);

        let transport = |source| FetchError::Transport {
            id: id.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                id: id.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server_uri: &str) -> ArchiveClient {
        let config = ArchiveConfig {
            url_template: format!("{}/objects/o:{{id}}/content", server_uri),
            timeout_secs: 5,
            ..ArchiveConfig::default()
        };
        ArchiveClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/objects/o:gm.1/content"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<lido:lido/>"))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let body = client.fetch("gm.1").await.unwrap();
        assert_eq!(body, b"<lido:lido/>");
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        match client.fetch("gm.2").await {
            Err(FetchError::Status { id, status }) => {
                assert_eq!(id, "gm.2");
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Nothing listens on the discard port
        let client = client_for("http://127.0.0.1:9");
        assert!(matches!(
            client.fetch("gm.3").await,
            Err(FetchError::Transport { .. })
        ));
    }

    #[test]
    fn test_record_url() {
        let client = ArchiveClient::new(&ArchiveConfig::default()).unwrap();
        let url = client.record_url("gm.8316").unwrap();
        assert_eq!(
            url.as_str(),
            "https://gams.uni-graz.at/archive/objects/o:gm.8316/datastreams/LIDO_SOURCE/content"
        );
    }
}
