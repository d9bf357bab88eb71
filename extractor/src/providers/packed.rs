use tokio::time::Instant;
use tracing::*;

use super::{bare_manifest, packed_then_raw, scan_packed, Context, ProviderProfile};
use crate::error::ExtractError;
use crate::js::packer;
use crate::models::ExtractionResult;
use crate::scanner::{Scanner, Scoring};

/// Players hidden behind `eval(function(p,a,c,k,e,d)...)`. Unquoted manifest
/// urls are the last resort, in the page and then in the unpacked scripts.
pub async fn extract(
    profile: &ProviderProfile,
    raw_first: bool,
    url: &str,
    ctx: &Context<'_>,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();
    let html = ctx.fetch_embed(profile, url).await?;

    let scanner = Scanner::hls().with_scoring(Scoring::Flat);
    let candidate = if raw_first {
        scanner.best(&html).or_else(|| scan_packed(&html, &scanner))
    } else {
        packed_then_raw(&html, &scanner)
    };
    let media_url = match candidate {
        Some(candidate) => {
            debug!("Picked {} from `{}`", candidate.url, candidate.source_pattern);
            candidate.url
        }
        None => bare_manifest(&html)
            .or_else(|| {
                packer::unpack_all(&html)
                    .iter()
                    .find_map(|script| bare_manifest(script))
            })
            .ok_or_else(|| {
                ExtractError::parse(format!(
                    "{} player of {url} has no stream",
                    profile.provider.name()
                ))
            })?,
    };
    info!(
        "Time taken to resolve {}: {:?}",
        profile.provider.name(),
        start.elapsed()
    );
    Ok(ctx.result(profile, media_url))
}

#[cfg(test)]
mod test {
    use crate::config::ExtractorConfig;
    use crate::error::FailureKind;
    use crate::models::{MediaType, VideoProvider};
    use crate::test_util::{context, FakeFetcher, PACKED_MASTER, PACKED_PLAYER};

    const DARKIBOX: &str = "https://darkibox.com/embed-ed0p89ndlpl6.html";
    const VIDZY: &str = "https://vidzy.org/embed-q1w2e3r4.html";
    const FSVID: &str = "https://fsvid.lol/embed-7xk2p9.html";

    #[tokio::test]
    async fn test_packed_before_raw() -> anyhow::Result<()> {
        let html = format!(
            r#"<html><body><div id="vplayer"></div>
            <script>var poster = {{file: "https://darkibox.com/promo/teaser.m3u8"}};</script>
            {PACKED_PLAYER}</body></html>"#
        );
        let fetcher = FakeFetcher::new().page(DARKIBOX, html);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::Darkibox.profile();
        let result = super::extract(profile, false, DARKIBOX, &context(&fetcher, &config)).await?;
        assert_eq!(result.media_url, PACKED_MASTER);
        assert_eq!(result.media_type, MediaType::Hls);
        assert_eq!(result.referer(), Some("https://darkibox.com/"));
        assert_eq!(result.headers["Origin"], "https://darkibox.com");
        assert_eq!(
            fetcher.referer_of(DARKIBOX).as_deref(),
            Some("https://darkibox.com/")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_player() -> anyhow::Result<()> {
        let html = r#"<script>jwplayer("vplayer").setup({sources: [{src: "https://s1.darkibox.com/hls/x/master.m3u8"}]});</script>"#;
        let fetcher = FakeFetcher::new().page(DARKIBOX, html);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::Darkibox.profile();
        let result = super::extract(profile, false, DARKIBOX, &context(&fetcher, &config)).await?;
        assert_eq!(result.media_url, "https://s1.darkibox.com/hls/x/master.m3u8");
        Ok(())
    }

    #[tokio::test]
    async fn test_no_stream() {
        let fetcher = FakeFetcher::new().page(DARKIBOX, "<h1>File was deleted</h1>");
        let config = ExtractorConfig::default();
        let profile = VideoProvider::Darkibox.profile();
        let err = super::extract(profile, false, DARKIBOX, &context(&fetcher, &config))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ParseFailure);
        assert!(!err.kind().is_retryable());
    }

    #[tokio::test]
    async fn test_second_packed_script() -> anyhow::Result<()> {
        let html = concat!(
            r"<script>eval(function(p,a,c,k,e,d){}('0.1()',10,2,'analytics|track'.split('|')))</script>",
            r#"<script>eval(function(p,a,c,k,e,d){}('0("1").2({3:[{4:"5"}]})',10,6,'jwplayer|vplayer|setup|sources|file|https://v3.vidzy.org/hls2/q1w2e3r4/master.m3u8?t=abc'.split('|')))</script>"#,
        );
        let fetcher = FakeFetcher::new().page(VIDZY, html);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::Vidzy.profile();
        let result = super::extract(profile, false, VIDZY, &context(&fetcher, &config)).await?;
        assert_eq!(
            result.media_url,
            "https://v3.vidzy.org/hls2/q1w2e3r4/master.m3u8?t=abc"
        );
        assert_eq!(result.referer(), Some("https://vidzy.org/"));
        Ok(())
    }

    #[tokio::test]
    async fn test_forbidden() {
        let fetcher = FakeFetcher::new().status(VIDZY, 403);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::Vidzy.profile();
        let err = super::extract(profile, false, VIDZY, &context(&fetcher, &config))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::NetworkFailure);
        assert!(err.kind().is_retryable());
        assert_eq!(err.http_status(), Some(403));
    }

    #[tokio::test]
    async fn test_raw_before_packed() -> anyhow::Result<()> {
        let html = format!(
            r#"<script>var player = {{source: 'https://fs1.fsvid.lol/v/7xk2p9/index.m3u8'}};</script>{PACKED_PLAYER}"#
        );
        let fetcher = FakeFetcher::new().page(FSVID, html);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::FsVid.profile();
        let result = super::extract(profile, true, FSVID, &context(&fetcher, &config)).await?;
        assert_eq!(result.media_url, "https://fs1.fsvid.lol/v/7xk2p9/index.m3u8");
        assert_eq!(result.referer(), Some("https://fsvid.lol/"));
        assert_eq!(
            fetcher.referer_of(FSVID).as_deref(),
            Some("https://french-stream.one/")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_packed_only() -> anyhow::Result<()> {
        let fetcher = FakeFetcher::new().page(FSVID, PACKED_PLAYER);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::FsVid.profile();
        let result = super::extract(profile, true, FSVID, &context(&fetcher, &config)).await?;
        assert_eq!(result.media_url, PACKED_MASTER);
        Ok(())
    }

    #[tokio::test]
    async fn test_unquoted_manifest() -> anyhow::Result<()> {
        let html = "<a data-stream=https://fs2.fsvid.lol/hls/7xk2p9/master.m3u8?e=1>play</a>";
        let fetcher = FakeFetcher::new().page(FSVID, html);
        let config = ExtractorConfig::default();
        let profile = VideoProvider::FsVid.profile();
        let result = super::extract(profile, true, FSVID, &context(&fetcher, &config)).await?;
        assert_eq!(
            result.media_url,
            "https://fs2.fsvid.lol/hls/7xk2p9/master.m3u8?e=1"
        );
        Ok(())
    }
}
