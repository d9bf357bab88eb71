use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::*;
use url::Url;

use crate::error::ExtractError;
use crate::http_util::{normalize_url, s, Fetcher};
use crate::models::ExtractionResult;

static FILE_TEMPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"file\s*:\s*["']([^"']+\.m3u8[^"']*)["']"#).unwrap());

static QUOTED_MANIFEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](https?://[^"']+\.m3u8[^"']*)["']"#).unwrap());

static CDN_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{v\d+\}").unwrap());

static RCP_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"/rcp/([A-Za-z0-9+/=]+)").unwrap());

#[derive(Debug, Clone)]
pub struct WalkerPolicy {
    /// Only iframes and inline urls on this domain are followed.
    pub trusted_domain: String,
    /// Replaces `{v1}`, `{v2}`, ... in manifest templates.
    pub cdn_alias: String,
    pub max_depth: usize,
}

impl Default for WalkerPolicy {
    fn default() -> Self {
        WalkerPolicy {
            trusted_domain: "cloudnestra.com".to_owned(),
            cdn_alias: "neonhorizonworkshops.com".to_owned(),
            max_depth: 5,
        }
    }
}

/// Follows nested embed pages on the trusted domain until a manifest shows up.
pub struct Walker<'a> {
    fetcher: &'a dyn Fetcher,
    policy: WalkerPolicy,
    user_agent: &'a str,
    inline_url: Regex,
}

impl<'a> Walker<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, policy: WalkerPolicy, user_agent: &'a str) -> Self {
        let inline_url = Regex::new(&format!(
            r#"https?://(?:www\.)?{}/[^"'\s]+"#,
            regex::escape(&policy.trusted_domain)
        ))
        .unwrap();
        Walker {
            fetcher,
            policy,
            user_agent,
            inline_url,
        }
    }

    pub fn policy(&self) -> &WalkerPolicy {
        &self.policy
    }

    pub fn resolve(
        &self,
        url: String,
        referer: String,
        depth: usize,
    ) -> BoxFuture<'_, Result<ExtractionResult, ExtractError>> {
        async move {
            if depth > self.policy.max_depth {
                warn!("Giving up on {url} at depth {depth}");
                return Err(ExtractError::DepthExceeded { depth, url });
            }
            debug!("Walking {url} (depth: {depth}, referer: {referer})");
            let html = self.fetcher.fetch(&url, Some(&referer)).await?;

            if let Some(inner) = self.find_trusted_iframe(&html, &url) {
                debug!("Found inner iframe: {inner}");
                return self.resolve(inner, url, depth + 1).await;
            }

            if let Some(manifest) = self.manifest(&html) {
                return Ok(self.finish(manifest));
            }

            if let Some(hash) = rcp_hash(&url) {
                let prorcp = format!("https://{}/prorcp/{hash}", self.policy.trusted_domain);
                debug!("Trying {prorcp}");
                match self.fetcher.fetch(&prorcp, Some(&url)).await {
                    Ok(body) => {
                        if let Some(manifest) = self.manifest(&body) {
                            return Ok(self.finish(manifest));
                        }
                    }
                    Err(e) => warn!("Failed to load {prorcp}: {e}"),
                }
            }

            if html.contains(&self.policy.trusted_domain) {
                if let Some(next) = self.inline_url.find(&html) {
                    let next = next.as_str().to_owned();
                    debug!("Found {next} inside inline js");
                    return self.resolve(next, url, depth + 1).await;
                }
            }

            Err(ExtractError::parse(format!(
                "Couldn't find a manifest template in {url}"
            )))
        }
        .boxed()
    }

    /// First iframe on the trusted domain, resolved against `base`.
    pub fn find_trusted_iframe(&self, html: &str, base: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        let iframes: Vec<String> = doc
            .select(&s("iframe[src]"))
            .filter_map(|i| i.value().attr("src"))
            .filter_map(|src| normalize_url(src, base).ok().map(|u| u.into_owned()))
            .collect();
        iframes.into_iter().find(|src| self.is_trusted(src))
    }

    fn is_trusted(&self, url: &str) -> bool {
        let trusted = &self.policy.trusted_domain;
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_owned()))
            .is_some_and(|host| host == *trusted || host.ends_with(&format!(".{trusted}")))
    }

    /// First template or quoted manifest that fills in to an absolute url.
    fn manifest(&self, html: &str) -> Option<String> {
        FILE_TEMPLATE
            .captures_iter(html)
            .chain(QUOTED_MANIFEST.captures_iter(html))
            .find_map(|caps| {
                // players list mirrors as "<url> or <url>"
                caps[1]
                    .split(" or ")
                    .find_map(|template| self.absolute_manifest(template.trim()))
            })
    }

    fn absolute_manifest(&self, template: &str) -> Option<String> {
        let url = CDN_PLACEHOLDER
            .replace_all(template, self.policy.cdn_alias.as_str())
            .into_owned();
        match url.strip_prefix("//") {
            Some(rest) => Some(format!("https://{rest}")),
            None if url.starts_with("http://") || url.starts_with("https://") => Some(url),
            None => {
                debug!("Ignoring relative manifest template {url}");
                None
            }
        }
    }

    fn finish(&self, media_url: String) -> ExtractionResult {
        info!("Resolved manifest: {media_url}");
        let referer = format!("https://{}/", self.policy.trusted_domain);
        ExtractionResult::new(media_url, self.user_agent, Some(&referer))
    }
}

fn rcp_hash(url: &str) -> Option<&str> {
    RCP_HASH.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str())
}
