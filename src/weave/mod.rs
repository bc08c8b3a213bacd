//! # Weaving
//!
//! Merges two divergent plain-text states of a document through an external
//! text-transform service. A weave is a pure request: it reads its two inputs
//! and returns the service output, nothing else. The result only enters a
//! document through a separate accept step on the session channel.
mod service;
mod strategy;

pub use service::{EndpointError, HttpGenerator, ServiceError, TextTransform};
pub use strategy::{instructions, MergeStrategy, UnknownStrategy};

use crate::config::WeaveConfig;
use displaydoc::Display;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Error when weaving two texts
#[derive(Debug, Error, Display)]
pub enum WeaveError {
    /// No text-transform service is configured
    ServiceNotConfigured,
    /// Weave failed: {0}
    WeaveFailed(#[from] ServiceError),
}

/// Runs merge requests against the configured service
#[derive(Clone, Default)]
pub struct Weaver {
    service: Option<Arc<dyn TextTransform>>,
}

impl fmt::Debug for Weaver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weaver")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl Weaver {
    pub fn new<T: TextTransform + 'static>(service: T) -> Self {
        Self {
            service: Some(Arc::new(service)),
        }
    }

    /// A weaver that rejects every request
    pub fn unconfigured() -> Self {
        Self { service: None }
    }

    /// Set up the HTTP service from the configuration
    ///
    /// Anything missing (endpoint, model or the API key variable) leaves the
    /// weaver unconfigured. This never touches the network.
    pub fn from_config(cfg: &WeaveConfig) -> Self {
        let (endpoint, model) = match (&cfg.endpoint, &cfg.model) {
            (Some(endpoint), Some(model)) => (endpoint, model),
            _ => {
                info!("Weaving is disabled, no endpoint or model configured");
                return Self::unconfigured();
            }
        };
        let api_key = match &cfg.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    warn!(%var, "Weaving is disabled, API key variable is not set");
                    return Self::unconfigured();
                }
            },
            None => None,
        };
        let timeout = Duration::from_secs(cfg.timeout_secs);
        match HttpGenerator::new(endpoint, model.clone(), api_key, timeout) {
            Ok(generator) => {
                info!(uri = %generator.uri(), %model, "Weaving enabled");
                Self::new(generator)
            }
            Err(err) => {
                warn!(%err, "Weaving is disabled, invalid endpoint");
                Self::unconfigured()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Merge `incoming` into `current` with the given strategy
    ///
    /// The returned text is exactly what the service produced.
    #[instrument(skip(self, current, incoming))]
    pub async fn weave(
        &self,
        current: &str,
        incoming: &str,
        strategy: MergeStrategy,
    ) -> Result<String, WeaveError> {
        let service = self
            .service
            .as_ref()
            .ok_or(WeaveError::ServiceNotConfigured)?;
        let prompt = instructions(strategy, current, incoming);
        let output = service.generate(&prompt).await?;
        if output.trim().is_empty() {
            return Err(WeaveError::WeaveFailed(ServiceError::Empty));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::{instructions, MergeStrategy, ServiceError, TextTransform, WeaveError, Weaver};
    use crate::config::WeaveConfig;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records prompts and answers with a fixed reply
    #[derive(Clone, Default)]
    struct Scripted {
        reply: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TextTransform for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            Ok(self.reply.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl TextTransform for Broken {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            Err(ServiceError::Timeout(std::time::Duration::from_secs(1)))
        }
    }

    #[tokio::test]
    async fn test_output_is_unmodified() {
        let service = Scripted {
            reply: String::from("  The vase had stood whole, until it fell.\n"),
            ..Scripted::default()
        };
        let weaver = Weaver::new(service.clone());
        let a = "The vase stood whole on the table.";
        let b = "The vase lay shattered on the floor.";

        let out = weaver.weave(a, b, MergeStrategy::Blend).await.unwrap();
        assert_eq!(out, "  The vase had stood whole, until it fell.\n");

        let prompts = service.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0], instructions(MergeStrategy::Blend, a, b));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let weaver = Weaver::unconfigured();
        assert!(matches!(
            weaver.weave("a", "b", MergeStrategy::Bridge).await,
            Err(WeaveError::ServiceNotConfigured)
        ));

        let cfg = WeaveConfig {
            endpoint: Some(String::from("http://127.0.0.1:9")),
            model: Some(String::from("llama3")),
            api_key_env: Some(String::from("QUIRE_TEST_KEY_THAT_IS_NEVER_SET")),
            ..WeaveConfig::default()
        };
        assert!(!Weaver::from_config(&cfg).is_configured());
        assert!(!Weaver::from_config(&WeaveConfig::default()).is_configured());

        let cfg = WeaveConfig {
            api_key_env: None,
            ..cfg
        };
        assert!(Weaver::from_config(&cfg).is_configured());
    }

    #[tokio::test]
    async fn test_service_failures() {
        let weaver = Weaver::new(Broken);
        assert!(matches!(
            weaver.weave("a", "b", MergeStrategy::Restyle).await,
            Err(WeaveError::WeaveFailed(ServiceError::Timeout(_)))
        ));

        let weaver = Weaver::new(Scripted {
            reply: String::from(" \n "),
            ..Scripted::default()
        });
        assert!(matches!(
            weaver.weave("a", "b", MergeStrategy::Restyle).await,
            Err(WeaveError::WeaveFailed(ServiceError::Empty))
        ));
    }
}
