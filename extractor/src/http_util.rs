use std::borrow::Cow;
use std::time::Duration;

use anyhow::anyhow;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{header, Client};
use scraper::Selector;
use tracing::*;
use url::{ParseError, Url};

use crate::config::ExtractorConfig;
use crate::error::ExtractError;

/// Loads embed pages. Everything an extractor needs from the network goes
/// through here so tests can swap in canned pages.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        referer: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ExtractError>>;
}

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &ExtractorConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(10).min(config.request_timeout()))
            .timeout(config.request_timeout())
            .build()?;
        Ok(ReqwestFetcher { client })
    }

    pub fn with_client(client: Client) -> Self {
        ReqwestFetcher { client }
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        referer: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ExtractError>> {
        async move {
            debug!("Fetching {url} (referer: {referer:?})");
            let mut request = self.client.get(url).header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            );
            if let Some(referer) = referer {
                request = request.header(header::REFERER, referer);
            }
            let response = request
                .send()
                .await
                .map_err(|e| ExtractError::network(url, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(ExtractError::Network {
                    url: url.to_owned(),
                    status: Some(status.as_u16()),
                    message: format!("server answered {status}"),
                });
            }
            response
                .text()
                .await
                .map_err(|e| ExtractError::network(url, e))
        }
        .boxed()
    }
}

pub fn s(selector: &str) -> Selector {
    Selector::parse(selector).unwrap()
}

pub fn normalize_url<'a>(url: &'a str, base: &str) -> anyhow::Result<Cow<'a, str>> {
    match Url::parse(url) {
        Ok(_) => Ok(Cow::Borrowed(url)),
        Err(ParseError::RelativeUrlWithoutBase) => {
            if let Some(rest) = url.strip_prefix("//") {
                return Ok(Cow::Owned(format!("https://{rest}")));
            }
            let base = Url::parse(base)?;
            Ok(Cow::Owned(base.join(url)?.to_string()))
        }
        Err(e) => Err(anyhow!("Couldn't parse {url}: {e}")),
    }
}

/// True for `http(s)://…` and `//…` urls, the only shapes worth following.
pub fn is_followable(url: &str) -> bool {
    if url.starts_with("//") {
        return url.len() > 2;
    }
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
