//! One browser session scraping one studio.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc};
use scraper::Html;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::Instrument;

use super::readiness::{ReadinessWaiter, ReadyCondition, ReadyVia};
use super::ScrapeError;
use crate::browser::{BrowserLauncher, BrowserPage, LaunchProfile};
use crate::extract::{
    first_match, resolver, studio_options, ExtractedLesson, ExtractionDiagnostics, PatternSet,
    Role, ScheduleExtractor, StructuralError,
};
use crate::registry::StudioRef;
use crate::store::LessonRecord;

/// Upper bounds for each session step.
#[derive(Debug, Clone)]
pub struct StepTimeouts {
    pub launch: Duration,
    pub navigate: Duration,
    pub login: Duration,
    pub ready: Duration,
    pub select: Duration,
    pub extract: Duration,
    pub close: Duration,
    /// Pause after selecting a studio before checking the schedule.
    pub settle: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            launch: Duration::from_secs(30),
            navigate: Duration::from_secs(30),
            login: Duration::from_secs(30),
            ready: Duration::from_secs(15),
            select: Duration::from_secs(15),
            extract: Duration::from_secs(20),
            close: Duration::from_secs(10),
            settle: Duration::from_secs(2),
        }
    }
}

impl StepTimeouts {
    /// Longest a session may run between launch and close: every step at
    /// its limit and both readiness waits through all fallback checks.
    pub fn drive_budget(&self, waiter: &ReadinessWaiter, login: bool) -> Duration {
        let login = if login { self.login } else { Duration::ZERO };
        login
            + self.navigate
            + waiter.budget(self.ready) * 2
            + self.select
            + self.settle
            + self.extract
    }

    /// Longest one attempt may take, launch and close included.
    pub fn attempt_budget(&self, waiter: &ReadinessWaiter, login: bool) -> Duration {
        self.launch + self.drive_budget(waiter, login) + self.close
    }
}

pub struct LoginSettings {
    pub url: String,
    pub email: String,
    pub password: SecretString,
}

/// Everything a session needs besides the browser.
pub struct ScrapeSettings {
    pub entry_url: String,
    pub login: Option<LoginSettings>,
    pub utc_offset: FixedOffset,
    pub retention: chrono::Duration,
    pub timeouts: StepTimeouts,
    pub waiter: ReadinessWaiter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutput {
    pub lessons: Vec<LessonRecord>,
    pub diagnostics: ExtractionDiagnostics,
    pub page_ready: ReadyVia,
    pub schedule_ready: ReadyVia,
}

/// Builds one [`ScrapeSession`] per attempt from shared parts.
#[derive(Clone)]
pub struct SessionFactory {
    launcher: Arc<dyn BrowserLauncher>,
    profile: LaunchProfile,
    settings: Arc<ScrapeSettings>,
    extractor: Arc<ScheduleExtractor>,
}

impl SessionFactory {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        profile: LaunchProfile,
        settings: Arc<ScrapeSettings>,
        extractor: ScheduleExtractor,
    ) -> Self {
        Self {
            launcher,
            profile,
            settings,
            extractor: Arc::new(extractor),
        }
    }

    pub fn session(&self) -> ScrapeSession {
        ScrapeSession {
            launcher: Arc::clone(&self.launcher),
            profile: self.profile.clone(),
            settings: Arc::clone(&self.settings),
            extractor: Arc::clone(&self.extractor),
        }
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        Arc::clone(&self.launcher)
    }

    pub fn profile(&self) -> &LaunchProfile {
        &self.profile
    }

    pub fn settings(&self) -> Arc<ScrapeSettings> {
        Arc::clone(&self.settings)
    }

    pub fn patterns(&self) -> &PatternSet {
        self.extractor.patterns()
    }
}

pub struct ScrapeSession {
    launcher: Arc<dyn BrowserLauncher>,
    profile: LaunchProfile,
    settings: Arc<ScrapeSettings>,
    extractor: Arc<ScheduleExtractor>,
}

/// Runs `fut` with a deadline, naming the step on expiry.
pub(crate) async fn bounded<T, F>(step: &'static str, limit: Duration, fut: F) -> Result<T, ScrapeError>
where
    F: Future<Output = Result<T, ScrapeError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::Timeout {
            step,
            secs: limit.as_secs(),
        }),
    }
}

/// Closes `page`, logging rather than returning failures.
pub(crate) async fn teardown(mut page: Box<dyn BrowserPage>, limit: Duration) {
    match tokio::time::timeout(limit, page.close()).await {
        Ok(Ok(())) => tracing::debug!("browser session closed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to close browser session"),
        Err(_) => tracing::warn!(secs = limit.as_secs(), "closing browser session timed out"),
    }
}

impl ScrapeSession {
    /// Scrapes `studio`. The browser is closed on every exit path.
    pub async fn run(&self, studio: &StudioRef) -> Result<SessionOutput, ScrapeError> {
        let timeouts = &self.settings.timeouts;
        let mut page = bounded(
            "launch",
            timeouts.launch,
            async { self.launcher.launch(&self.profile).await.map_err(ScrapeError::from) },
        )
        .instrument(tracing::info_span!("session.launch"))
        .await?;

        let budget = timeouts.drive_budget(&self.settings.waiter, self.settings.login.is_some());
        let result = bounded("session", budget, self.drive(page.as_mut(), studio)).await;
        teardown(page, timeouts.close).await;
        result
    }

    async fn drive(&self, page: &mut dyn BrowserPage, studio: &StudioRef) -> Result<SessionOutput, ScrapeError> {
        let settings = &*self.settings;
        let t = &settings.timeouts;
        let patterns = self.extractor.patterns();

        if let Some(login) = &settings.login {
            bounded("login", t.login, log_in(page, login, patterns))
                .instrument(tracing::info_span!("session.login"))
                .await?;
        }

        bounded("navigate", t.navigate, async {
            page.navigate(&settings.entry_url).await.map_err(ScrapeError::from)
        })
        .instrument(tracing::info_span!("session.navigate", url = %settings.entry_url))
        .await?;

        let any_content = condition(patterns, Role::AnyContent);
        let page_ready = settings
            .waiter
            .await_ready(page, &condition(patterns, Role::PageReady), &any_content, t.ready)
            .instrument(tracing::info_span!("session.page_ready"))
            .await?;

        bounded("select_studio", t.select, select_studio(page, patterns, studio))
            .instrument(tracing::info_span!("session.select_studio", studio = %studio.code))
            .await?;

        tokio::time::sleep(t.settle).await;

        let schedule_ready = settings
            .waiter
            .await_ready(page, &condition(patterns, Role::ScheduleReady), &any_content, t.ready)
            .instrument(tracing::info_span!("session.schedule_ready"))
            .await?;

        let year = Utc::now().with_timezone(&settings.utc_offset).year();
        let extraction = bounded("extract", t.extract, async {
            let html = page.content().await?;
            Ok::<_, ScrapeError>(self.extractor.extract(&html, year))
        })
        .instrument(tracing::info_span!("session.extract", studio = %studio.code))
        .await?;

        if let Some(error) = extraction.error {
            return Err(ScrapeError::Structural {
                studio: studio.code.clone(),
                error,
            });
        }

        let fetched_at = Utc::now();
        let expires_at = fetched_at
            .checked_add_signed(settings.retention)
            .unwrap_or(fetched_at);
        let lessons = to_records(
            &studio.code,
            extraction.lessons,
            settings.utc_offset,
            fetched_at,
            expires_at,
        );
        tracing::info!(
            studio = %studio.code,
            lessons = lessons.len(),
            skipped = extraction.diagnostics.skipped_entries,
            "schedule scraped"
        );

        Ok(SessionOutput {
            lessons,
            diagnostics: extraction.diagnostics,
            page_ready,
            schedule_ready,
        })
    }
}

fn condition(patterns: &PatternSet, role: Role) -> ReadyCondition {
    ReadyCondition::new(role.as_str(), patterns.get(role).to_vec())
}

/// First pattern for `role` that matches anything in `html`.
fn present_pattern(html: &str, patterns: &PatternSet, role: Role) -> Option<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    first_match(role, patterns.get(role), |p| resolver::select_all(root, p))
        .map(|r| r.pattern.to_string())
}

async fn log_in(page: &mut dyn BrowserPage, login: &LoginSettings, patterns: &PatternSet) -> Result<(), ScrapeError> {
    page.navigate(&login.url).await?;
    let html = page.content().await?;
    let find = |role: Role| {
        present_pattern(&html, patterns, role)
            .ok_or_else(|| ScrapeError::Login(format!("no {} field on login page", role)))
    };
    let email = find(Role::LoginEmail)?;
    let password = find(Role::LoginPassword)?;
    let submit = find(Role::LoginSubmit)?;

    page.type_text(&email, &login.email).await?;
    page.type_text(&password, login.password.expose_secret()).await?;
    page.click(&submit, 0).await?;
    tracing::debug!("login submitted");
    Ok(())
}

async fn select_studio(page: &mut dyn BrowserPage, patterns: &PatternSet, studio: &StudioRef) -> Result<(), ScrapeError> {
    let html = page.content().await?;
    // No options at all is retried like any unrendered content. Only a
    // populated list lacking the code means the studio is not offered.
    let (options, pattern) = studio_options(&html, patterns)
        .filter(|(options, _)| !options.is_empty())
        .ok_or_else(|| ScrapeError::Structural {
            studio: studio.code.clone(),
            error: StructuralError::NoStudioOptions,
        })?;
    let option = options
        .iter()
        .find(|o| o.code == studio.code)
        .ok_or_else(|| ScrapeError::StudioNotFound {
            studio: studio.code.clone(),
            listed: options.len(),
        })?;
    tracing::debug!(pattern = %pattern, index = option.index, "selecting studio");
    page.click(&pattern, option.index).await?;
    Ok(())
}

fn to_records(
    studio_code: &str,
    lessons: Vec<ExtractedLesson>,
    offset: FixedOffset,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Vec<LessonRecord> {
    lessons
        .into_iter()
        .filter_map(|lesson| {
            let start = NaiveTime::parse_from_str(&lesson.start_time, "%H:%M").ok()?;
            let start_at = lesson
                .date
                .and_time(start)
                .and_local_timezone(offset)
                .single()?;
            Some(LessonRecord {
                studio_code: studio_code.to_string(),
                date: lesson.date,
                start_time: lesson.start_time,
                end_time: lesson.end_time,
                start_at,
                name: lesson.name,
                instructor: lesson.instructor,
                program: lesson.program,
                is_available: lesson.is_available,
                seats_left: lesson.seats_left,
                status_text: lesson.status_text,
                colors: lesson.colors,
                fetched_at,
                expires_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_records_carry_site_offset_and_expiry() {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let fetched = Utc::now();
        let lessons = vec![ExtractedLesson {
            date: NaiveDate::from_ymd_opt(2025, 7, 24).unwrap(),
            start_time: "07:00".into(),
            end_time: "07:45".into(),
            name: "BB2 NOW 1".into(),
            instructor: "Fuka".into(),
            program: "BB2".into(),
            status_text: None,
            is_available: true,
            seats_left: None,
            colors: None,
        }];
        let records = to_records("SBY", lessons, offset, fetched, fetched + chrono::Duration::days(7));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].start_at.to_rfc3339(), "2025-07-24T07:00:00+09:00");
        assert_eq!(records[0].expires_at - records[0].fetched_at, chrono::Duration::days(7));
    }

    #[test]
    fn test_attempt_budget_covers_every_step() {
        let timeouts = StepTimeouts::default();
        let waiter = ReadinessWaiter::default();
        // 30 navigate + 2 x (15 ready + 5 x 2 fallback) + 15 select + 2 settle + 20 extract
        assert_eq!(timeouts.drive_budget(&waiter, false), Duration::from_secs(117));
        assert_eq!(timeouts.drive_budget(&waiter, true), Duration::from_secs(147));
        assert_eq!(timeouts.attempt_budget(&waiter, false), Duration::from_secs(157));
    }

    #[test]
    fn test_present_pattern_uses_fallback() {
        let html = r#"<form><input name="email"><input type="password"><button type="submit">Go</button></form>"#;
        let patterns = PatternSet::default();
        assert_eq!(
            present_pattern(html, &patterns, Role::LoginEmail).as_deref(),
            Some("input[name=email]")
        );
        assert_eq!(
            present_pattern(html, &patterns, Role::LoginPassword).as_deref(),
            Some("input[type=password]")
        );
    }
}
