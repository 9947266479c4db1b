//! Scripted scraper and studio source for driving the batch coordinator.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use studiosync::extract::{ExtractionDiagnostics, StructuralError};
use studiosync::registry::{StudioInfo, StudioRef};
use studiosync::scrape::{AttemptRecord, ScrapeError, ScrapeReport, StudioScraper};
use studiosync::source::{SourceError, StudioSource};
use studiosync::store::{LessonRecord, LessonStore, SqliteLessonStore, StoreError};

use super::builders::lesson;

/// What one scrape call for a studio should do.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Succeeds with this many lessons.
    Lessons(usize),
    NotFound,
    /// Fails after the retry controller used all its attempts.
    Exhausted(u32),
    /// Like `Exhausted`, with the studio selector never rendering.
    NoStudioOptions(u32),
}

/// Replays queued outcomes per studio; studios with nothing queued get
/// one lesson.
#[derive(Default)]
pub struct ScriptedScraper {
    script: Mutex<HashMap<String, VecDeque<Outcome>>>,
    always: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, code: &str, outcome: Outcome) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(code.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn always(self, code: &str, outcome: Outcome) -> Self {
        self.always.lock().unwrap().insert(code.to_string(), outcome);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_outcome(&self, code: &str) -> Outcome {
        if let Some(outcome) = self
            .script
            .lock()
            .unwrap()
            .get_mut(code)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        self.always
            .lock()
            .unwrap()
            .get(code)
            .copied()
            .unwrap_or(Outcome::Lessons(1))
    }
}

#[async_trait]
impl StudioScraper for ScriptedScraper {
    async fn scrape(&self, studio: &StudioRef) -> Result<ScrapeReport, ScrapeError> {
        self.calls.lock().unwrap().push(studio.code.clone());
        match self.next_outcome(&studio.code) {
            Outcome::Lessons(n) => Ok(ScrapeReport {
                studio: studio.code.clone(),
                lessons: (0..n)
                    .map(|i| lesson(&studio.code, 1, &format!("{:02}:00", 7 + i)))
                    .collect(),
                diagnostics: ExtractionDiagnostics::default(),
                attempts: vec![AttemptRecord {
                    attempt: 1,
                    delay_before: 0,
                    error: None,
                }],
            }),
            Outcome::NotFound => Err(ScrapeError::StudioNotFound {
                studio: studio.code.clone(),
                listed: 3,
            }),
            Outcome::Exhausted(attempts) => Err(exhausted(
                studio,
                attempts,
                ScrapeError::Timeout {
                    step: "navigate",
                    secs: 30,
                },
            )),
            Outcome::NoStudioOptions(attempts) => Err(exhausted(
                studio,
                attempts,
                ScrapeError::Structural {
                    studio: studio.code.clone(),
                    error: StructuralError::NoStudioOptions,
                },
            )),
        }
    }
}

fn exhausted(studio: &StudioRef, attempts: u32, last: ScrapeError) -> ScrapeError {
    let message = last.to_string();
    ScrapeError::RetriesExhausted {
        studio: studio.code.clone(),
        attempts,
        last: Box::new(last),
        history: (1..=attempts)
            .map(|attempt| AttemptRecord {
                attempt,
                delay_before: 0,
                error: Some(message.clone()),
            })
            .collect(),
    }
}

/// Studio source whose listing can be swapped or made to fail.
#[derive(Default)]
pub struct StaticSource {
    studios: Mutex<Option<Vec<StudioInfo>>>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(studios: &[(&str, &str)]) -> Self {
        let source = Self::default();
        source.set(studios);
        source
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, studios: &[(&str, &str)]) {
        *self.studios.lock().unwrap() = Some(
            studios
                .iter()
                .map(|(code, name)| StudioInfo {
                    code: code.to_string(),
                    name: name.to_string(),
                    region: Some("Tokyo".to_string()),
                })
                .collect(),
        );
    }

    pub fn fail(&self) {
        *self.studios.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StudioSource for StaticSource {
    async fn list_current_studios(&self) -> Result<Vec<StudioInfo>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.studios.lock().unwrap().clone().ok_or_else(|| {
            SourceError::Scrape(ScrapeError::Timeout {
                step: "navigate",
                secs: 30,
            })
        })
    }
}

/// SQLite-backed store whose writes can be made to fail.
pub struct SwitchableStore {
    inner: SqliteLessonStore,
    failing: AtomicBool,
}

impl SwitchableStore {
    pub fn new(inner: SqliteLessonStore) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LessonStore for SwitchableStore {
    async fn put_many(&self, lessons: &[LessonRecord]) -> Result<usize, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.put_many(lessons).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.purge_expired(now).await
    }
}
