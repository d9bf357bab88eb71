use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::browser::{BrowserDriver, BrowserPage, CLICK_SCRIPT, INSPECT_SCRIPT};
use crate::config::{BrowserSettings, ExtractorConfig};
use crate::error::ExtractError;
use crate::http_util::Fetcher;
use crate::models::RefererPolicy;
use crate::providers::Context;

/// A captured player page packed with `eval(function(p,a,c,k,e,d)...)`.
pub const PACKED_PLAYER: &str = include_str!("../tests/fixtures/packed_player.html");

/// The stream url hidden in [`PACKED_PLAYER`].
pub const PACKED_MASTER: &str = "https://be7713.rcr82.waw05.cdn112.com/hls2/01/04830/ed0p89ndlpl6_x/master.m3u8?t=rvm0EjVpGO2BKMaUJjRPEKrxndDmKgV6VrdJ3HnPsp4&s=1697939838&e=43200&f=24152475&srv=30&asn=12329&sp=2500";

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

static PROVIDER_REFERER: RefererPolicy = RefererPolicy::Provider;

/// Context with provider referers and no browser.
pub fn context<'a>(fetcher: &'a dyn Fetcher, config: &'a ExtractorConfig) -> Context<'a> {
    Context::new(fetcher, None, config, &PROVIDER_REFERER)
}

/// Serves canned pages and remembers which referer every request carried.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, Result<String, u16>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        init_tracing();
        FakeFetcher::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_owned(), Ok(body.into()));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_owned(), Err(status));
        self
    }

    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn referer_of(&self, url: &str) -> Option<String> {
        self.requests()
            .into_iter()
            .find(|(u, _)| u == url)
            .and_then(|(_, referer)| referer)
    }
}

impl Fetcher for FakeFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        referer: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String, ExtractError>> {
        async move {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_owned(), referer.map(str::to_owned)));
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(ExtractError::Network {
                    url: url.to_owned(),
                    status: Some(*status),
                    message: format!("server answered {status}"),
                }),
                None => Err(ExtractError::Network {
                    url: url.to_owned(),
                    status: Some(404),
                    message: "no such page".to_owned(),
                }),
            }
        }
        .boxed()
    }
}

/// Scripted browser: `hits` are on the wire after navigation, `hits_after_click`
/// once the play control was clicked.
#[derive(Clone, Default)]
pub struct FakeDriver {
    pub hits: Vec<String>,
    pub hits_after_click: Vec<String>,
    pub inspected: Option<String>,
    pub goto_delay: Duration,
    pub fail_goto: bool,
    pub closed: Arc<AtomicBool>,
    pub launches: Arc<AtomicUsize>,
    pub referers: Arc<Mutex<Vec<String>>>,
}

struct FakePage {
    driver: FakeDriver,
    clicked: bool,
}

impl BrowserDriver for FakeDriver {
    fn launch<'a>(
        &'a self,
        _settings: &'a BrowserSettings,
    ) -> BoxFuture<'a, anyhow::Result<Box<dyn BrowserPage>>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let page = FakePage {
            driver: self.clone(),
            clicked: false,
        };
        async move { Ok(Box::new(page) as Box<dyn BrowserPage>) }.boxed()
    }
}

impl BrowserPage for FakePage {
    fn prepare<'a>(
        &'a mut self,
        _user_agent: &'a str,
        referer: &'a str,
        network_pattern: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        assert_eq!(network_pattern, ".m3u8");
        self.driver.referers.lock().unwrap().push(referer.to_owned());
        async { Ok(()) }.boxed()
    }

    fn goto<'a>(&'a mut self, _url: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        let delay = self.driver.goto_delay;
        let fail = self.driver.fail_goto;
        async move {
            tokio::time::sleep(delay).await;
            if fail {
                anyhow::bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            Ok(())
        }
        .boxed()
    }

    fn evaluate<'a>(&'a mut self, script: &'a str) -> BoxFuture<'a, anyhow::Result<Value>> {
        let value = if script == CLICK_SCRIPT {
            self.clicked = true;
            Value::String(".jw-icon-display".into())
        } else if script == INSPECT_SCRIPT {
            self.driver
                .inspected
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        async move { Ok(value) }.boxed()
    }

    fn intercepted(&self) -> Vec<String> {
        let mut hits = self.driver.hits.clone();
        if self.clicked {
            hits.extend(self.driver.hits_after_click.iter().cloned());
        }
        hits
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        self.driver.closed.store(true, Ordering::SeqCst);
        async { Ok(()) }.boxed()
    }
}
