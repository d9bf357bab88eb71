use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub user_agent: String,
    /// Applies to every single http request.
    pub request_timeout_ms: u64,
    /// Budget for one whole `extract` call, browser included.
    pub call_timeout_ms: u64,
    pub max_redirect_depth: usize,
    pub bucket_hours: u32,
    pub browser: BrowserSettings,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            user_agent: USER_AGENT.to_owned(),
            request_timeout_ms: 15_000,
            call_timeout_ms: 45_000,
            max_redirect_depth: 5,
            bucket_hours: 3,
            browser: BrowserSettings::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Invalid extractor config")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub navigation_timeout_ms: u64,
    pub settle_grace_ms: u64,
    pub post_click_grace_ms: u64,
    pub executable: Option<PathBuf>,
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        BrowserSettings {
            navigation_timeout_ms: 15_000,
            settle_grace_ms: 2_000,
            post_click_grace_ms: 3_000,
            executable: None,
            headless: true,
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }

    pub fn post_click_grace(&self) -> Duration {
        Duration::from_millis(self.post_click_grace_ms)
    }
}

#[cfg(test)]
mod test {
    use super::{ExtractorConfig, USER_AGENT};

    #[test]
    fn test_partial_override() -> anyhow::Result<()> {
        let config = ExtractorConfig::from_json(
            r#"{"max_redirect_depth": 2, "browser": {"settle_grace_ms": 10}}"#,
        )?;
        assert_eq!(config.max_redirect_depth, 2);
        assert_eq!(config.browser.settle_grace_ms, 10);
        assert_eq!(config.browser.post_click_grace_ms, 3_000);
        assert!(config.browser.headless);
        assert_eq!(config.user_agent, USER_AGENT);
        assert_eq!(config.bucket_hours, 3);
        Ok(())
    }

    #[test]
    fn test_bad_json() {
        assert!(ExtractorConfig::from_json("{\"bucket_hours\": \"x\"}").is_err());
    }
}
