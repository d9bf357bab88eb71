use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tokio::time::Instant;
use tracing::*;
use url::Url;

use super::{Context, ProviderProfile};
use crate::error::ExtractError;
use crate::http_util::{is_followable, normalize_url, s};
use crate::models::ExtractionResult;
use crate::scanner::{Scanner, Scoring};

static WAIT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]g=([A-Za-z0-9_-]+)").unwrap());

static ATOB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"atob\(\s*["']([A-Za-z0-9+/=]+)["']\s*\)"#).unwrap());

static BARE_MP4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s'"<>\\]+\.mp4[^\s'"<>\\]*"#).unwrap());

static SOURCES_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)(?:window\.sources|var\s+sources)\s*=\s*([\[{].*?[\]}])\s*;"#).unwrap()
});

static QUOTED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']((?:https?:)?//[^"'\s]+)["']"#).unwrap());

/// Player pages whose source sits in the served html.
pub async fn extract(
    profile: &ProviderProfile,
    scoring: Scoring,
    url: &str,
    ctx: &Context<'_>,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();
    let url = canonical_url(profile, url);
    let mut html = ctx.fetch_embed(profile, &url).await?;

    if let Some(retry) = interstitial_retry(&html, &url) {
        debug!("Got the waiting page, retrying with {retry}");
        html = ctx.fetch_embed(profile, &retry).await?;
    }

    let scanner = match scoring {
        Scoring::Heuristic => Scanner::media(),
        Scoring::Flat => Scanner::hls().with_scoring(Scoring::Flat),
    };
    let media_url = scanner
        .best(&html)
        .map(|c| {
            debug!("Picked {} from `{}`", c.url, c.source_pattern);
            c.url
        })
        .or_else(|| encoded_source(&html, profile.request_referer))
        .or_else(|| BARE_MP4.find(&html).map(|m| m.as_str().to_owned()))
        .or_else(|| video_tag(&html, &url))
        .or_else(|| sources_variable(&html))
        .ok_or_else(|| {
            ExtractError::parse(format!(
                "No {} player source in {url}",
                profile.provider.name()
            ))
        })?;
    info!(
        "Time taken to resolve {}: {:?}",
        profile.provider.name(),
        start.elapsed()
    );
    Ok(ctx.result(profile, media_url))
}

/// Mirror domains serve the same player as the provider's own host.
fn canonical_url(profile: &ProviderProfile, url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_owned();
    };
    let is_mirror = parsed.host_str().is_some_and(|host| {
        profile
            .mirrors
            .iter()
            .any(|m| host == *m || host.ends_with(&format!(".{m}")))
    });
    if !is_mirror {
        return url.to_owned();
    }
    let home = Url::parse(profile.request_referer).ok();
    let home = home.as_ref().and_then(|u| u.host_str());
    if parsed.set_host(home).is_ok() {
        debug!("Rewrote mirror url to {parsed}");
        return parsed.to_string();
    }
    url.to_owned()
}

/// The waiting page carries a `g` token the real embed page has to be asked with.
fn interstitial_retry(html: &str, url: &str) -> Option<String> {
    if !html.to_ascii_lowercase().contains("please wait") {
        return None;
    }
    let token = WAIT_TOKEN.captures(html)?.get(1)?.as_str();
    let mut retry = Url::parse(url).ok()?;
    let others: Vec<(String, String)> = retry
        .query_pairs()
        .filter(|(k, _)| k != "g")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    retry
        .query_pairs_mut()
        .clear()
        .extend_pairs(others)
        .append_pair("g", token);
    Some(retry.to_string())
}

fn encoded_source(html: &str, base: &str) -> Option<String> {
    ATOB.captures_iter(html).find_map(|caps| {
        let decoded = STANDARD.decode(&caps[1]).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let decoded = decoded.trim();
        if is_followable(decoded) {
            return normalize_url(decoded, base).ok().map(|u| u.into_owned());
        }
        Scanner::hls().best(decoded).map(|c| c.url)
    })
}

fn video_tag(html: &str, base: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let found = doc
        .select(&s("video[src], video source[src]"))
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| !src.starts_with("blob:"))
        .find_map(|src| normalize_url(src, base).ok().map(|u| u.into_owned()));
    found
}

fn sources_variable(html: &str) -> Option<String> {
    let body = SOURCES_VAR.captures(html)?.get(1)?.as_str().replace("\\/", "/");
    let url = QUOTED_URL.captures(&body)?.get(1)?.as_str();
    Some(match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_owned(),
    })
}
