use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::time::Instant;
use tracing::*;

use super::{Context, ProviderProfile};
use crate::cipher::{find_cipher_payload, select_url, DomainConfig};
use crate::error::ExtractError;
use crate::models::ExtractionResult;
use crate::walker::{Walker, WalkerPolicy};

const TRUSTED_MARKER: &str = "cloudnestra";

pub async fn extract(
    profile: &ProviderProfile,
    url: &str,
    ctx: &Context<'_>,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();
    let html = ctx.fetch_embed(profile, url).await?;

    let policy = WalkerPolicy {
        max_depth: ctx.config.max_redirect_depth,
        ..WalkerPolicy::default()
    };
    let walker = Walker::new(ctx.fetcher, policy, &ctx.config.user_agent);

    let mut hops = Vec::new();
    let mut last_err = None;
    let derived = {
        let mut rng = rand::thread_rng();
        next_hop(&html, ctx.config.bucket_hours, Utc::now(), &mut rng)
    };
    match derived {
        Ok(Some(next)) => hops.push(next),
        Ok(None) => debug!("No encrypted player config in {url}"),
        Err(e) => {
            warn!("{e}");
            last_err = Some(e);
        }
    }
    if let Some(iframe) = walker.find_trusted_iframe(&html, url) {
        hops.push(iframe);
    }
    if hops.is_empty() {
        return Err(last_err.unwrap_or_else(|| {
            ExtractError::parse(format!("Neither a player config nor an iframe in {url}"))
        }));
    }

    for hop in hops {
        debug!("Following {hop}");
        match walker.resolve(hop, url.to_owned(), 0).await {
            Ok(result) => {
                info!("Time taken to resolve VsEmbed: {:?}", start.elapsed());
                return Ok(result);
            }
            Err(e) => {
                warn!("Failed to resolve {url}: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| ExtractError::parse(format!("Nothing to follow in {url}"))))
}

/// Player url rebuilt from the encrypted config of the embed page.
fn next_hop(
    html: &str,
    bucket_hours: u32,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<Option<String>, ExtractError> {
    let Some(payload) = find_cipher_payload(html) else {
        return Ok(None);
    };
    let config = payload
        .decrypt()
        .ok_or_else(|| ExtractError::Decryption("Player config didn't decrypt to json".into()))?;
    let (primary, secondary) = DomainConfig::from_json(&config, bucket_hours).ok_or_else(|| {
        ExtractError::Decryption(format!("Player config misses server fields: {config}"))
    })?;
    let primary = primary.build_url(now, rng);
    let secondary = secondary.map(|config| config.build_url(now, rng));
    debug!("Derived player urls: {primary}, {secondary:?}");
    Ok(Some(select_url(primary, secondary, TRUSTED_MARKER)))
}
