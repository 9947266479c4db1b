//! In-memory browser driver.
//!
//! Serves scripted HTML snapshots per URL. Each `content()` call on a URL
//! returns the next snapshot, the last one repeating, which models a page
//! that finishes rendering after a few polls. Clicking an element with an
//! `href` navigates to it. Used for replaying captured pages and in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use super::{BrowserError, BrowserLauncher, BrowserPage, LaunchProfile};

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// Pages the fixture browser can reach.
#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    pages: HashMap<String, Vec<String>>,
    unreachable: HashSet<String>,
    stalls: HashMap<String, usize>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page that is fully rendered on first read.
    pub fn page(self, url: &str, html: impl Into<String>) -> Self {
        self.rendering(url, vec![html.into()])
    }

    /// A page whose successive reads return `snapshots` in order.
    pub fn rendering(mut self, url: &str, snapshots: Vec<String>) -> Self {
        self.pages.insert(normalize(url), snapshots);
        self
    }

    /// Navigation to `url` fails.
    pub fn unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(normalize(url));
        self
    }

    /// Reads of `url` after the first `reads` never complete, like a
    /// DevTools call that gets no reply.
    pub fn stalling_after(mut self, url: &str, reads: usize) -> Self {
        self.stalls.insert(normalize(url), reads);
        self
    }
}

/// Counters shared between a launcher and its pages.
#[derive(Debug, Default)]
pub struct FixtureStats {
    launches: AtomicUsize,
    closes: AtomicUsize,
    profiles: Mutex<Vec<LaunchProfile>>,
    typed: Mutex<Vec<(String, String)>>,
    clicks: Mutex<Vec<(String, usize)>>,
}

impl FixtureStats {
    /// Launch attempts, including injected failures.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn profiles(&self) -> Vec<LaunchProfile> {
        self.profiles.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// `(selector, text)` pairs typed into any page.
    pub fn typed(&self) -> Vec<(String, String)> {
        self.typed.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.clicks.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

pub struct FixtureLauncher {
    site: Arc<FixtureSite>,
    stats: Arc<FixtureStats>,
    failing_launches: AtomicUsize,
    always_fail: AtomicBool,
}

impl FixtureLauncher {
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site: Arc::new(site),
            stats: Arc::new(FixtureStats::default()),
            failing_launches: AtomicUsize::new(0),
            always_fail: AtomicBool::new(false),
        }
    }

    /// The next `n` launches fail.
    pub fn fail_next_launches(self, n: usize) -> Self {
        self.failing_launches.store(n, Ordering::SeqCst);
        self
    }

    /// Every launch fails.
    pub fn always_failing(self) -> Self {
        self.always_fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn stats(&self) -> Arc<FixtureStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl BrowserLauncher for FixtureLauncher {
    async fn launch(&self, profile: &LaunchProfile) -> Result<Box<dyn BrowserPage>, BrowserError> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut profiles) = self.stats.profiles.lock() {
            profiles.push(profile.clone());
        }

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(BrowserError::Launch("fixture browser unavailable".to_string()));
        }
        let injected = self
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BrowserError::Launch("injected launch failure".to_string()));
        }

        Ok(Box::new(FixturePage {
            site: Arc::clone(&self.site),
            stats: Arc::clone(&self.stats),
            current: None,
            reads: HashMap::new(),
            closed: false,
        }))
    }
}

struct FixturePage {
    site: Arc<FixtureSite>,
    stats: Arc<FixtureStats>,
    current: Option<String>,
    reads: HashMap<String, usize>,
    closed: bool,
}

impl FixturePage {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        let key = normalize(url);
        if self.site.unreachable.contains(&key) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if !self.site.pages.contains_key(&key) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            });
        }
        self.reads.insert(key.clone(), 0);
        self.current = Some(key);
        Ok(())
    }

    /// Snapshot the page is showing right now, without advancing.
    fn visible(&self) -> Result<(&str, &str), BrowserError> {
        self.ensure_open()?;
        let url = self
            .current
            .as_deref()
            .ok_or_else(|| BrowserError::Protocol("no page loaded".to_string()))?;
        let snapshots = self
            .site
            .pages
            .get(url)
            .ok_or_else(|| BrowserError::Protocol(format!("page {} vanished", url)))?;
        let read = self.reads.get(url).copied().unwrap_or(0);
        let idx = read.saturating_sub(1).min(snapshots.len().saturating_sub(1));
        let html = snapshots.get(idx).map(String::as_str).unwrap_or("");
        Ok((url, html))
    }

    /// Finds the target element and returns its `href` resolved against
    /// the current URL, if it has one.
    fn locate(&self, selector: &str, index: usize) -> Result<Option<String>, BrowserError> {
        let (url, html) = self.visible()?;
        let parsed = Selector::parse(selector)
            .map_err(|e| BrowserError::Protocol(format!("invalid selector '{}': {:?}", selector, e)))?;
        let document = Html::parse_document(html);
        let element = document
            .select(&parsed)
            .nth(index)
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
                index,
            })?;
        let href = element.value().attr("href").map(|href| {
            Url::parse(url)
                .and_then(|base| base.join(href))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string())
        });
        Ok(href)
    }
}

#[async_trait]
impl BrowserPage for FixturePage {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.goto(url)
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        let url = self
            .current
            .clone()
            .ok_or_else(|| BrowserError::Protocol("no page loaded".to_string()))?;
        let snapshots = self
            .site
            .pages
            .get(&url)
            .ok_or_else(|| BrowserError::Protocol(format!("page {} vanished", url)))?;
        let stall_after = self.site.stalls.get(&url).copied();
        let read = self.reads.entry(url).or_insert(0);
        if stall_after.is_some_and(|after| *read >= after) {
            return std::future::pending().await;
        }
        let idx = (*read).min(snapshots.len().saturating_sub(1));
        *read += 1;
        Ok(snapshots.get(idx).cloned().unwrap_or_default())
    }

    async fn click(&mut self, selector: &str, index: usize) -> Result<(), BrowserError> {
        let href = self.locate(selector, index)?;
        if let Ok(mut clicks) = self.stats.clicks.lock() {
            clicks.push((selector.to_string(), index));
        }
        if let Some(href) = href {
            self.goto(&href)?;
        }
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.locate(selector, 0)?;
        if let Ok(mut typed) = self.stats.typed.lock() {
            typed.push((selector.to_string(), text.to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
