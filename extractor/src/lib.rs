//! Resolves embed pages of third-party video hosts into directly playable
//! media urls plus the headers the media server expects.

use std::sync::Arc;

use tokio::time;
use tracing::*;

pub use crate::browser::{BrowserDriver, BrowserPage, ChromiumDriver};
pub use crate::config::{BrowserSettings, ExtractorConfig};
pub use crate::error::{ExtractError, ExtractionFailure, FailureKind};
pub use crate::http_util::{Fetcher, ReqwestFetcher};
pub use crate::models::{
    EmbedRequest, ExtractionOutcome, ExtractionResult, MediaType, RefererPolicy, VideoProvider,
};

pub mod browser;
pub mod cipher;
pub mod config;
pub mod error;
pub mod http_util;
pub mod js;
pub mod models;
pub mod providers;
pub mod scanner;
pub mod walker;

#[cfg(test)]
mod test_util;

/// Entry point: picks the provider for an embed url and runs its pipeline.
pub struct Extractor {
    fetcher: Arc<dyn Fetcher>,
    browser: Option<Arc<dyn BrowserDriver>>,
    config: ExtractorConfig,
}

impl Extractor {
    /// Real http client and a local chrome for the providers that need one.
    pub fn new(config: ExtractorConfig) -> anyhow::Result<Self> {
        let fetcher = ReqwestFetcher::new(&config)?;
        Ok(Extractor::with_parts(
            Arc::new(fetcher),
            Some(Arc::new(ChromiumDriver)),
            config,
        ))
    }

    pub fn with_parts(
        fetcher: Arc<dyn Fetcher>,
        browser: Option<Arc<dyn BrowserDriver>>,
        config: ExtractorConfig,
    ) -> Self {
        Extractor {
            fetcher,
            browser,
            config,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    #[instrument(skip(self), fields(url = %request.url))]
    pub async fn extract(
        &self,
        request: &EmbedRequest,
    ) -> Result<ExtractionResult, ExtractionFailure> {
        let provider = request
            .provider_hint
            .or_else(|| VideoProvider::from_url(&request.url));
        let Some(provider) = provider else {
            let err = ExtractError::parse(format!("No extractor handles {}", request.url));
            warn!("{err}");
            return Err(ExtractionFailure::new(None, &err));
        };

        let ctx = providers::Context::new(
            self.fetcher.as_ref(),
            self.browser.as_deref(),
            &self.config,
            &request.referer_policy,
        );
        let budget = self.config.call_timeout();
        let outcome = match time::timeout(budget, providers::extract(provider, &request.url, &ctx))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExtractError::Timeout(budget)),
        };
        outcome.map_err(|e| {
            warn!("{} failed on {}: {e}", provider.name(), request.url);
            ExtractionFailure::new(Some(provider), &e)
        })
    }

    /// [`Extractor::extract`] with default request options, in the shape the player consumes.
    pub async fn extract_url(&self, url: &str) -> ExtractionOutcome {
        self.extract(&EmbedRequest::new(url)).await.into()
    }
}
