use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::Instant;

use crate::browser::BrowserDriver;
use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::http_util::Fetcher;
use crate::js::packer;
use crate::models::{ExtractionResult, RefererPolicy, VideoProvider};
use crate::scanner::{Candidate, Scanner, Scoring};

pub mod bysebuho;
pub mod packed;
pub mod static_page;
pub mod vsembed;

static BARE_MANIFEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s'"<>\\]+\.m3u8[^\s'"<>\\]*"#).unwrap());

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pipeline {
    /// Key scan of the page as served, then the inline source fallbacks.
    StaticRegex { scoring: Scoring },
    /// Scan of the unpacked player scripts. `raw_first` scans the page before unpacking.
    PackedJs { raw_first: bool },
    /// Decrypted player config, host token, then the iframe walk.
    EncryptedRedirect,
    /// Static scan, then a headless browser listening for the manifest.
    BrowserInterception,
}

#[derive(Debug)]
pub struct ProviderProfile {
    pub provider: VideoProvider,
    pub pipeline: Pipeline,
    /// `Referer` of the first request made for an embed url.
    pub request_referer: &'static str,
    /// `Referer` the media url has to be played with, `Origin` follows from it.
    pub media_referer: &'static str,
    /// Domains serving the same player as the request referer's host.
    pub mirrors: &'static [&'static str],
}

pub static PROVIDERS: [ProviderProfile; 7] = [
    ProviderProfile {
        provider: VideoProvider::VsEmbed,
        pipeline: Pipeline::EncryptedRedirect,
        request_referer: "https://vsembed.ru/",
        media_referer: "https://cloudnestra.com/",
        mirrors: &[],
    },
    ProviderProfile {
        provider: VideoProvider::Vidmoly,
        pipeline: Pipeline::StaticRegex {
            scoring: Scoring::Heuristic,
        },
        request_referer: "https://vidmoly.to/",
        media_referer: "https://vidmoly.to/",
        mirrors: &[],
    },
    ProviderProfile {
        provider: VideoProvider::Darkibox,
        pipeline: Pipeline::PackedJs { raw_first: false },
        request_referer: "https://darkibox.com/",
        media_referer: "https://darkibox.com/",
        mirrors: &[],
    },
    ProviderProfile {
        provider: VideoProvider::Vidzy,
        pipeline: Pipeline::PackedJs { raw_first: false },
        request_referer: "https://vidzy.org/",
        media_referer: "https://vidzy.org/",
        mirrors: &[],
    },
    ProviderProfile {
        provider: VideoProvider::FsVid,
        pipeline: Pipeline::PackedJs { raw_first: true },
        request_referer: "https://french-stream.one/",
        media_referer: "https://fsvid.lol/",
        mirrors: &[],
    },
    ProviderProfile {
        provider: VideoProvider::Voe,
        pipeline: Pipeline::StaticRegex {
            scoring: Scoring::Flat,
        },
        request_referer: "https://voe.sx/",
        media_referer: "https://voe.sx/",
        mirrors: &["vocancellario.com", "ralphysuccessfull.org"],
    },
    ProviderProfile {
        provider: VideoProvider::Bysebuho,
        pipeline: Pipeline::BrowserInterception,
        request_referer: "https://bysebuho.com/",
        media_referer: "https://bysebuho.com/",
        mirrors: &[],
    },
];

impl VideoProvider {
    pub fn profile(&self) -> &'static ProviderProfile {
        match self {
            VideoProvider::VsEmbed => &PROVIDERS[0],
            VideoProvider::Vidmoly => &PROVIDERS[1],
            VideoProvider::Darkibox => &PROVIDERS[2],
            VideoProvider::Vidzy => &PROVIDERS[3],
            VideoProvider::FsVid => &PROVIDERS[4],
            VideoProvider::Voe => &PROVIDERS[5],
            VideoProvider::Bysebuho => &PROVIDERS[6],
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.profile().pipeline
    }
}

/// Capabilities and settings one extraction runs with.
pub struct Context<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub browser: Option<&'a dyn BrowserDriver>,
    pub config: &'a ExtractorConfig,
    pub referer_policy: &'a RefererPolicy,
    /// End of the per-call budget.
    pub deadline: Instant,
}

impl<'a> Context<'a> {
    /// The call budget starts now.
    pub fn new(
        fetcher: &'a dyn Fetcher,
        browser: Option<&'a dyn BrowserDriver>,
        config: &'a ExtractorConfig,
        referer_policy: &'a RefererPolicy,
    ) -> Self {
        Context {
            fetcher,
            browser,
            config,
            referer_policy,
            deadline: Instant::now() + config.call_timeout(),
        }
    }

    /// What is left of the call budget.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn request_referer(&self, profile: &ProviderProfile) -> Option<String> {
        match self.referer_policy {
            RefererPolicy::Provider => Some(profile.request_referer.to_owned()),
            RefererPolicy::Custom(referer) => Some(referer.clone()),
            RefererPolicy::Omit => None,
        }
    }

    /// Loads the embed page with the referer the request asked for.
    pub async fn fetch_embed(
        &self,
        profile: &ProviderProfile,
        url: &str,
    ) -> Result<String, ExtractError> {
        let referer = self.request_referer(profile);
        self.fetcher.fetch(url, referer.as_deref()).await
    }

    pub fn result(
        &self,
        profile: &ProviderProfile,
        media_url: impl Into<String>,
    ) -> ExtractionResult {
        ExtractionResult::new(
            media_url,
            &self.config.user_agent,
            Some(profile.media_referer),
        )
    }
}

/// Runs the pipeline the provider's profile names.
pub async fn extract(
    provider: VideoProvider,
    url: &str,
    ctx: &Context<'_>,
) -> Result<ExtractionResult, ExtractError> {
    let profile = provider.profile();
    match profile.pipeline {
        Pipeline::StaticRegex { scoring } => static_page::extract(profile, scoring, url, ctx).await,
        Pipeline::PackedJs { raw_first } => packed::extract(profile, raw_first, url, ctx).await,
        Pipeline::EncryptedRedirect => vsembed::extract(profile, url, ctx).await,
        Pipeline::BrowserInterception => bysebuho::extract(profile, url, ctx).await,
    }
}

/// First candidate found in the unpacked scripts of a page.
fn scan_packed(html: &str, scanner: &Scanner) -> Option<Candidate> {
    packer::unpack_all(html)
        .iter()
        .find_map(|script| scanner.best(script))
}

/// Unpacked scripts first, then the raw page.
fn packed_then_raw(html: &str, scanner: &Scanner) -> Option<Candidate> {
    scan_packed(html, scanner).or_else(|| scanner.best(html))
}

/// Unquoted absolute manifest url anywhere in `text`.
fn bare_manifest(text: &str) -> Option<String> {
    BARE_MANIFEST.find(text).map(|m| m.as_str().to_owned())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{bare_manifest, Context, Pipeline, PROVIDERS};
    use crate::config::ExtractorConfig;
    use crate::error::FailureKind;
    use crate::models::{RefererPolicy, VideoProvider};
    use crate::scanner::Scoring;
    use crate::test_util::{FakeFetcher, PACKED_PLAYER};

    #[test]
    fn test_provider_table() {
        for provider in VideoProvider::ALL {
            assert_eq!(provider.profile().provider, provider);
            assert!(provider.profile().request_referer.ends_with('/'));
            assert!(provider.profile().media_referer.ends_with('/'));
        }
        assert_eq!(PROVIDERS.len(), VideoProvider::ALL.len());
        assert_eq!(VideoProvider::VsEmbed.pipeline(), Pipeline::EncryptedRedirect);
        assert_eq!(VideoProvider::Bysebuho.pipeline(), Pipeline::BrowserInterception);
        assert_eq!(VideoProvider::FsVid.profile().media_referer, "https://fsvid.lol/");
        assert_eq!(
            VideoProvider::FsVid.pipeline(),
            Pipeline::PackedJs { raw_first: true }
        );
        assert_eq!(
            VideoProvider::Vidmoly.pipeline(),
            Pipeline::StaticRegex {
                scoring: Scoring::Heuristic
            }
        );
        assert!(VideoProvider::Voe.profile().mirrors.contains(&"vocancellario.com"));
    }

    #[tokio::test]
    async fn test_dispatch_follows_pipeline() -> anyhow::Result<()> {
        let url = "https://vidzy.org/embed-1.html";
        let fetcher = FakeFetcher::new().page(url, PACKED_PLAYER);
        let config = ExtractorConfig::default();
        let ctx = Context::new(&fetcher, None, &config, &RefererPolicy::Provider);

        // A packed player only resolves through the packed pipeline.
        let result = super::extract(VideoProvider::Vidzy, url, &ctx).await?;
        assert_eq!(result.referer(), Some("https://vidzy.org/"));
        let err = super::extract(VideoProvider::Vidmoly, url, &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseFailure);
        Ok(())
    }

    #[test]
    fn test_remaining_budget() {
        let fetcher = FakeFetcher::new();
        let config = ExtractorConfig {
            call_timeout_ms: 5_000,
            ..ExtractorConfig::default()
        };
        let ctx = Context::new(&fetcher, None, &config, &RefererPolicy::Provider);
        let remaining = ctx.remaining();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }

    #[test]
    fn test_referer_policy() {
        let fetcher = FakeFetcher::new();
        let config = ExtractorConfig::default();
        let profile = VideoProvider::Vidzy.profile();
        let policies = [
            (RefererPolicy::Provider, Some("https://vidzy.org/")),
            (
                RefererPolicy::Custom("https://site.example/".into()),
                Some("https://site.example/"),
            ),
            (RefererPolicy::Omit, None),
        ];
        for (policy, expected) in policies {
            let ctx = Context::new(&fetcher, None, &config, &policy);
            assert_eq!(ctx.request_referer(profile).as_deref(), expected);
            let result = ctx.result(profile, "https://cdn.x/v.mp4");
            assert_eq!(result.referer(), Some("https://vidzy.org/"));
        }
    }

    #[test]
    fn test_bare_manifest() {
        assert_eq!(
            bare_manifest("url=https://cdn.x/hls/index.m3u8?a=1&b=2 next"),
            Some("https://cdn.x/hls/index.m3u8?a=1&b=2".to_owned())
        );
        assert_eq!(bare_manifest("https:\\/\\/cdn.x\\/index.m3u8"), None);
        assert_eq!(bare_manifest("nothing here"), None);
    }
}
