//! reqwest-backed [`ArtifactGenerator`].

use std::time::Instant;

use async_trait::async_trait;
use papyrus_core::{ArtifactGenerator, GeneratedArtifact, GeneratorError, PaperKey};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::config::GeneratorConfig;
use crate::types::{GenerateQuery, GenerateResponse};

/// Longest slice of an error body kept in [`GeneratorError::RequestFailed`].
const MAX_ERROR_BODY: usize = 512;

/// Calls the remote generator with `POST {url}?school=&paper_id=&sec=`.
pub struct HttpArtifactGenerator {
    client: Client,
    url: String,
    secret: SecretString,
    timeout: std::time::Duration,
}

impl HttpArtifactGenerator {
    /// Build a client from configuration.
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GeneratorError::Transport {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.url,
            secret: config.secret,
            timeout: config.timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ArtifactGenerator for HttpArtifactGenerator {
    async fn generate(&self, key: PaperKey) -> Result<GeneratedArtifact, GeneratorError> {
        let query = GenerateQuery {
            school: key.school(),
            paper_id: key.paper(),
            sec: self.secret.expose_secret(),
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeneratorError::Timeout {
                        timeout: self.timeout,
                    }
                } else {
                    GeneratorError::Transport {
                        reason: format!("HTTP request failed: {}", e.without_url()),
                    }
                }
            })?;

        let status = response.status();
        tracing::debug!(
            %key,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generator responded"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                format!("{}...", &body[..cut])
            } else {
                body
            };
            return Err(GeneratorError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout {
                    timeout: self.timeout,
                }
            } else {
                GeneratorError::InvalidResponse {
                    reason: format!("failed to parse response: {}", e.without_url()),
                }
            }
        })?;

        Ok(GeneratedArtifact {
            question: body.paper,
            answer: body.answer,
        })
    }
}

impl std::fmt::Debug for HttpArtifactGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpArtifactGenerator")
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}
