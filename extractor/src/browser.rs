use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::*;
use url::Url;

use crate::config::BrowserSettings;
use crate::error::ExtractError;
use crate::http_util::is_followable;
use crate::models::ExtractionResult;

/// Looks for a stream url in the running player when nothing showed up on the wire.
pub const INSPECT_SCRIPT: &str = r#"(() => {
    const found = [];
    try {
        if (typeof window.jwplayer === 'function') {
            const item = window.jwplayer().getPlaylistItem();
            if (item && item.file) found.push(item.file);
        }
    } catch (e) {}
    try {
        if (window.player && typeof window.player.src === 'string') found.push(window.player.src);
    } catch (e) {}
    if (typeof window.videoUrl === 'string') found.push(window.videoUrl);
    if (typeof window.hlsUrl === 'string') found.push(window.hlsUrl);
    for (const el of document.querySelectorAll('video, source')) {
        const src = el.currentSrc || el.src || el.getAttribute('src');
        if (src && !src.startsWith('blob:')) found.push(src);
    }
    for (const script of document.querySelectorAll('script')) {
        const m = (script.textContent || '').match(/https:\/\/[^"'\s]+\.m3u8[^"'\s]*/);
        if (m) found.push(m[0]);
    }
    return found.find(Boolean) || null;
})()"#;

pub const CLICK_SCRIPT: &str = r#"(() => {
    const selectors = [
        '.jw-icon-display', '.jw-display-icon-container', '.vjs-big-play-button',
        '.plyr__control--overlaid', 'button[aria-label*="play" i]', '[class*="play-button"]',
        '[id*="play" i]', 'video'
    ];
    for (const selector of selectors) {
        const el = document.querySelector(selector);
        if (el) {
            el.click();
            return selector;
        }
    }
    return null;
})()"#;

pub trait BrowserDriver: Send + Sync {
    /// Starts a fresh browser process with its own profile.
    fn launch<'a>(
        &'a self,
        settings: &'a BrowserSettings,
    ) -> BoxFuture<'a, anyhow::Result<Box<dyn BrowserPage>>>;
}

pub trait BrowserPage: Send {
    /// Sets request headers and starts recording request urls containing `network_pattern`.
    fn prepare<'a>(
        &'a mut self,
        user_agent: &'a str,
        referer: &'a str,
        network_pattern: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;

    fn goto<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;

    fn evaluate<'a>(&'a mut self, script: &'a str) -> BoxFuture<'a, anyhow::Result<Value>>;

    fn intercepted(&self) -> Vec<String>;

    fn close(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

pub struct BrowserJob<'a> {
    pub url: &'a str,
    pub referer: &'a str,
    pub user_agent: &'a str,
    pub network_pattern: &'a str,
}

/// A manifest whose file is named `master` wins, otherwise the first hit.
pub fn pick_intercepted(hits: &[String]) -> Option<&String> {
    let is_master = |url: &String| {
        Url::parse(url)
            .ok()
            .and_then(|u| u.path_segments().and_then(|s| s.last()).map(str::to_owned))
            .is_some_and(|name| name == "master" || name.starts_with("master."))
    };
    hits.iter().find(|url| is_master(url)).or_else(|| hits.first())
}

pub async fn extract_via_browser(
    driver: &dyn BrowserDriver,
    settings: &BrowserSettings,
    job: BrowserJob<'_>,
    timeout: Duration,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();
    let mut page = driver
        .launch(settings)
        .await
        .map_err(|e| ExtractError::Automation(format!("{e:#}")))?;

    let outcome = time::timeout(timeout, drive(page.as_mut(), settings, &job)).await;
    if let Err(e) = page.close().await {
        warn!("Failed to close the browser: {e:#}");
    }
    debug!("Browser session took {}ms", start.elapsed().as_millis());

    let media_url = match outcome {
        Ok(result) => result?,
        Err(_) => {
            return Err(ExtractError::Automation(format!(
                "browser session timed out after {timeout:?}"
            )))
        }
    };
    info!("Captured stream url in the browser: {media_url}");
    Ok(ExtractionResult::new(
        media_url,
        job.user_agent,
        Some(job.referer),
    ))
}

async fn drive(
    page: &mut dyn BrowserPage,
    settings: &BrowserSettings,
    job: &BrowserJob<'_>,
) -> Result<String, ExtractError> {
    let automation = |e: anyhow::Error| ExtractError::Automation(format!("{e:#}"));

    page.prepare(job.user_agent, job.referer, job.network_pattern)
        .await
        .map_err(automation)?;
    match time::timeout(settings.navigation_timeout(), page.goto(job.url)).await {
        Ok(result) => result.map_err(automation)?,
        Err(_) => warn!("Navigation to {} is still running, carrying on", job.url),
    }

    time::sleep(settings.settle_grace()).await;
    if let Some(url) = pick_intercepted(&page.intercepted()) {
        return Ok(url.clone());
    }

    match page.evaluate(CLICK_SCRIPT).await {
        Ok(Value::String(selector)) => debug!("Clicked play control {selector}"),
        Ok(_) => debug!("No play control found"),
        Err(e) => warn!("Failed to click play: {e:#}"),
    }
    time::sleep(settings.post_click_grace()).await;
    if let Some(url) = pick_intercepted(&page.intercepted()) {
        return Ok(url.clone());
    }

    debug!("No stream request seen, inspecting the player");
    let found = page.evaluate(INSPECT_SCRIPT).await.map_err(automation)?;
    match found.as_str().map(str::trim) {
        Some(url) if is_followable(url) => Ok(match url.strip_prefix("//") {
            Some(rest) => format!("https://{rest}"),
            None => url.to_owned(),
        }),
        _ => Err(ExtractError::parse(format!(
            "No stream url found in the player of {}",
            job.url
        ))),
    }
}

/// Drives a local chrome through the devtools protocol.
#[derive(Default)]
pub struct ChromiumDriver;

impl BrowserDriver for ChromiumDriver {
    fn launch<'a>(
        &'a self,
        settings: &'a BrowserSettings,
    ) -> BoxFuture<'a, anyhow::Result<Box<dyn BrowserPage>>> {
        async move {
            let profile = std::env::temp_dir().join(format!(
                "link-extractor-{}-{}",
                std::process::id(),
                rand::random::<u64>()
            ));
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .user_data_dir(&profile)
                .request_timeout(settings.navigation_timeout())
                .window_size(1280, 720)
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-gpu")
                .arg("--mute-audio");
            if !settings.headless {
                builder = builder.with_head();
            }
            if let Some(executable) = &settings.executable {
                builder = builder.chrome_executable(executable);
            }
            let config = builder
                .build()
                .map_err(|e| anyhow!("Invalid browser config: {e}"))?;

            let mut session = Session {
                profile,
                tasks: Vec::new(),
            };
            let (mut browser, mut handler) = Browser::launch(config)
                .await
                .context("Failed to launch chrome")?;
            session
                .tasks
                .push(tokio::spawn(async move { while handler.next().await.is_some() {} }));

            let page = match browser.new_page("about:blank").await {
                Ok(page) => page,
                Err(e) => {
                    browser.close().await.ok();
                    return Err(anyhow!(e).context("Failed to open a tab"));
                }
            };
            debug!("Launched chrome with profile {:?}", session.profile);
            Ok(Box::new(ChromiumPage {
                browser,
                page,
                hits: Arc::default(),
                session,
            }) as Box<dyn BrowserPage>)
        }
        .boxed()
    }
}

/// Stops the background tasks and deletes the profile however a session ends,
/// dropped futures included.
struct Session {
    profile: PathBuf,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Err(e) = std::fs::remove_dir_all(&self.profile) {
            debug!("Couldn't remove {:?}: {e}", self.profile);
        }
    }
}

struct ChromiumPage {
    browser: Browser,
    page: Page,
    hits: Arc<Mutex<Vec<String>>>,
    session: Session,
}

impl BrowserPage for ChromiumPage {
    fn prepare<'a>(
        &'a mut self,
        user_agent: &'a str,
        referer: &'a str,
        network_pattern: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            self.page.set_user_agent(user_agent).await?;
            let headers = Headers::new(serde_json::json!({ "Referer": referer }));
            self.page
                .execute(SetExtraHttpHeadersParams::new(headers))
                .await?;

            let mut events = self.page.event_listener::<EventRequestWillBeSent>().await?;
            let hits = self.hits.clone();
            let pattern = network_pattern.to_owned();
            self.session.tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let url = &event.request.url;
                    if url.contains(&pattern) {
                        debug!("Intercepted {url}");
                        if let Ok(mut hits) = hits.lock() {
                            hits.push(url.clone());
                        }
                    }
                }
            }));
            Ok(())
        }
        .boxed()
    }

    fn goto<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            self.page.goto(url).await?;
            Ok(())
        }
        .boxed()
    }

    fn evaluate<'a>(&'a mut self, script: &'a str) -> BoxFuture<'a, anyhow::Result<Value>> {
        async move {
            let result = self.page.evaluate(script).await?;
            Ok(result.into_value().unwrap_or(Value::Null))
        }
        .boxed()
    }

    fn intercepted(&self) -> Vec<String> {
        self.hits.lock().map(|hits| hits.clone()).unwrap_or_default()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        async move {
            let ChromiumPage {
                mut browser,
                page,
                session,
                ..
            } = *self;
            page.close().await.ok();
            let closed = browser.close().await;
            browser.wait().await.ok();
            drop(session);
            closed?;
            Ok(())
        }
        .boxed()
    }
}
