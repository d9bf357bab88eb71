use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ExtractionFailure;

pub type Headers = LinkedHashMap<String, String>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum VideoProvider {
    VsEmbed,
    Vidmoly,
    Darkibox,
    Vidzy,
    FsVid,
    Voe,
    Bysebuho,
}

impl VideoProvider {
    pub const ALL: [VideoProvider; 7] = [
        VideoProvider::VsEmbed,
        VideoProvider::Vidmoly,
        VideoProvider::Darkibox,
        VideoProvider::Vidzy,
        VideoProvider::FsVid,
        VideoProvider::Voe,
        VideoProvider::Bysebuho,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VideoProvider::VsEmbed => "VsEmbed",
            VideoProvider::Vidmoly => "Vidmoly",
            VideoProvider::Darkibox => "Darkibox",
            VideoProvider::Vidzy => "Vidzy",
            VideoProvider::FsVid => "FsVid",
            VideoProvider::Voe => "Voe",
            VideoProvider::Bysebuho => "Bysebuho",
        }
    }

    fn hosts(&self) -> &'static [&'static str] {
        match self {
            VideoProvider::VsEmbed => &["vsembed.ru", "vsembed.su", "vidsrc.xyz", "vidsrc-embed.ru"],
            VideoProvider::Vidmoly => &["vidmoly.to", "vidmoly.net", "vidmoly.me"],
            VideoProvider::Darkibox => &["darkibox.com"],
            VideoProvider::Vidzy => &["vidzy.org"],
            VideoProvider::FsVid => &["fsvid.lol"],
            VideoProvider::Voe => &["voe.sx", "vocancellario.com", "ralphysuccessfull.org"],
            VideoProvider::Bysebuho => &["bysebuho.com"],
        }
    }

    /// Detects the provider from the host of an embed url, subdomains included.
    pub fn from_url(url: &str) -> Option<VideoProvider> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.trim_start_matches("www.");
        VideoProvider::ALL.into_iter().find(|provider| {
            provider
                .hosts()
                .iter()
                .any(|h| host == *h || host.ends_with(&format!(".{h}")))
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum MediaType {
    #[serde(rename = "hls")]
    Hls,
    #[serde(rename = "mp4")]
    Progressive,
}

impl MediaType {
    pub fn from_url(url: &str) -> MediaType {
        let path = Url::parse(url)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or_else(|_| url.to_ascii_lowercase());
        if path.contains(".m3u8") {
            MediaType::Hls
        } else {
            MediaType::Progressive
        }
    }
}

/// How the first request of an extraction sets its `Referer`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum RefererPolicy {
    #[default]
    Provider,
    Custom(String),
    Omit,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EmbedRequest {
    pub url: String,
    pub provider_hint: Option<VideoProvider>,
    #[serde(default)]
    pub referer_policy: RefererPolicy,
}

impl EmbedRequest {
    pub fn new(url: impl Into<String>) -> Self {
        EmbedRequest {
            url: url.into(),
            provider_hint: None,
            referer_policy: RefererPolicy::default(),
        }
    }

    pub fn with_provider(mut self, provider: VideoProvider) -> Self {
        self.provider_hint = Some(provider);
        self
    }

    pub fn with_referer_policy(mut self, policy: RefererPolicy) -> Self {
        self.referer_policy = policy;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub media_url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub headers: Headers,
}

impl ExtractionResult {
    /// `Origin` is derived from `referer` with its trailing slash removed.
    pub fn new(media_url: impl Into<String>, user_agent: &str, referer: Option<&str>) -> Self {
        let media_url = media_url.into();
        let mut headers = Headers::new();
        headers.insert("User-Agent".to_owned(), user_agent.to_owned());
        if let Some(referer) = referer {
            headers.insert("Referer".to_owned(), referer.to_owned());
            headers.insert(
                "Origin".to_owned(),
                referer.trim_end_matches('/').to_owned(),
            );
        }
        ExtractionResult {
            media_type: MediaType::from_url(&media_url),
            media_url,
            headers,
        }
    }

    pub fn referer(&self) -> Option<&str> {
        self.headers.get("Referer").map(String::as_str)
    }
}

/// Serialized shape handed to the playback layer.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Success {
        success: bool,
        #[serde(flatten)]
        result: ExtractionResult,
    },
    Failure {
        success: bool,
        #[serde(flatten)]
        failure: ExtractionFailure,
    },
}

impl From<Result<ExtractionResult, ExtractionFailure>> for ExtractionOutcome {
    fn from(result: Result<ExtractionResult, ExtractionFailure>) -> Self {
        match result {
            Ok(result) => ExtractionOutcome::Success {
                success: true,
                result,
            },
            Err(failure) => ExtractionOutcome::Failure {
                success: false,
                failure,
            },
        }
    }
}
