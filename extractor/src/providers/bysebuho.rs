use std::time::Duration;

use tokio::time::Instant;
use tracing::*;

use super::{Context, ProviderProfile};
use crate::browser::{extract_via_browser, BrowserJob};
use crate::error::ExtractError;
use crate::models::ExtractionResult;
use crate::scanner::{Scanner, Scoring};

/// Kept back from the browser budget so the session can be closed in time.
const CLOSE_MARGIN: Duration = Duration::from_secs(2);

pub async fn extract(
    profile: &ProviderProfile,
    url: &str,
    ctx: &Context<'_>,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();

    match ctx.fetch_embed(profile, url).await {
        Ok(html) => {
            if let Some(candidate) = Scanner::hls().with_scoring(Scoring::Flat).best(&html) {
                info!("Time taken to resolve Bysebuho: {:?}", start.elapsed());
                return Ok(ctx.result(profile, candidate.url));
            }
            debug!("Player of {url} is built by scripts, switching to the browser");
        }
        Err(e) => warn!("Static fetch of {url} failed, switching to the browser: {e}"),
    }

    let driver = ctx
        .browser
        .ok_or_else(|| ExtractError::Automation("no browser available".into()))?;
    let job = BrowserJob {
        url,
        referer: profile.media_referer,
        user_agent: &ctx.config.user_agent,
        network_pattern: ".m3u8",
    };
    let result =
        extract_via_browser(driver, &ctx.config.browser, job, browser_budget(ctx.remaining()))
            .await?;
    info!("Time taken to resolve Bysebuho: {:?}", start.elapsed());
    Ok(result)
}

/// The browser has to give up before the call does.
fn browser_budget(remaining: Duration) -> Duration {
    remaining - (remaining / 10).min(CLOSE_MARGIN)
}
