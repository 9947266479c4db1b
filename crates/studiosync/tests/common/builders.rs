//! Builders for fixture pages and runtime settings.
//!
//! Pages follow the layout the default pattern set recognises: a
//! `.studio-list` of `[data-studio-code]` links on the entry page and a
//! positional schedule (header dates plus one column per day).

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

use studiosync::browser::{BrowserEnvironment, BrowserLauncher, FixtureSite, LaunchProfile};
use studiosync::extract::{PatternSet, ProgramCatalog, ScheduleExtractor};
use studiosync::extract::status::DEFAULT_SOLD_OUT_MARKERS;
use studiosync::scrape::{ReadinessWaiter, ScrapeSettings, SessionFactory, StepTimeouts};
use studiosync::store::LessonRecord;

pub const ENTRY_URL: &str = "https://reserve.example.test/";
pub const LOGIN_URL: &str = "https://reserve.example.test/login";

pub fn schedule_url(code: &str) -> String {
    format!("{}schedule?studio={}", ENTRY_URL, code)
}

/// Entry page listing `(code, name)` studios.
pub fn entry_page(studios: &[(&str, &str)]) -> String {
    let items: String = studios
        .iter()
        .map(|(code, name)| {
            format!(
                r#"<li><a class="studio" data-studio-code="{code}" href="/schedule?studio={code}">{name}</a></li>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><main><ul class="studio-list" data-region="Tokyo">{items}</ul></main></body></html>"#
    )
}

pub fn login_page() -> String {
    r#"<html><body><form>
        <input type="email" name="email">
        <input type="password" name="password">
        <button type="submit">Log in</button>
    </form></body></html>"#
        .to_string()
}

/// One lesson tile.
#[derive(Debug, Clone)]
pub struct Tile {
    pub time: &'static str,
    pub name: &'static str,
    pub instructor: &'static str,
    pub status: Option<&'static str>,
}

impl Tile {
    pub fn new(time: &'static str, name: &'static str, instructor: &'static str) -> Self {
        Self {
            time,
            name,
            instructor,
            status: None,
        }
    }

    pub fn status(mut self, status: &'static str) -> Self {
        self.status = Some(status);
        self
    }

    fn html(&self) -> String {
        let status = self
            .status
            .map(|s| format!(r#"<p class="status">{s}</p>"#))
            .unwrap_or_default();
        format!(
            r#"<div class="lesson" style="color: #ffffff; background-color: #e60012">
                <p class="time">{}</p><p class="lesson_name">{}</p><p class="instructor">{}</p>{}
            </div>"#,
            self.time, self.name, self.instructor, status
        )
    }
}

/// Schedule page with one column per `(M/D label, tiles)` day. `container`
/// is the attribute text of the element wrapping the columns.
pub fn schedule_page(container: &str, days: &[(&str, Vec<Tile>)]) -> String {
    let header: String = days
        .iter()
        .map(|(label, _)| format!(r#"<span class="date">{label}</span>"#))
        .collect();
    let columns: String = days
        .iter()
        .map(|(_, tiles)| {
            let tiles: String = tiles.iter().map(Tile::html).collect();
            format!(r#"<div class="schedule-column">{tiles}</div>"#)
        })
        .collect();
    format!(
        r#"<html><body><main>
        <div class="schedule-header">{header}</div>
        <div {container}>{columns}</div>
        </main></body></html>"#
    )
}

/// The single BB2 NOW 1 lesson on 7/24.
pub fn single_lesson_schedule(container: &str) -> String {
    schedule_page(
        container,
        &[("7/24", vec![Tile::new("07:00 - 07:45", "BB2 NOW 1", "Fuka")])],
    )
}

/// Entry page plus a one-lesson schedule for each studio.
pub fn studio_site(studios: &[(&str, &str)]) -> FixtureSite {
    studios.iter().fold(
        FixtureSite::new().page(ENTRY_URL, entry_page(studios)),
        |site, (code, _)| site.page(&schedule_url(code), single_lesson_schedule(r#"id="scheduleTable""#)),
    )
}

pub fn test_profile() -> LaunchProfile {
    LaunchProfile::new(BrowserEnvironment::Sandboxed, None, true, &[])
}

pub fn site_offset() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid offset")
}

pub fn scrape_settings() -> ScrapeSettings {
    ScrapeSettings {
        entry_url: ENTRY_URL.to_string(),
        login: None,
        utc_offset: site_offset(),
        retention: Duration::days(7),
        timeouts: StepTimeouts::default(),
        waiter: ReadinessWaiter::default(),
    }
}

pub fn extractor() -> ScheduleExtractor {
    ScheduleExtractor::new(
        PatternSet::default(),
        ProgramCatalog::default(),
        DEFAULT_SOLD_OUT_MARKERS.iter().map(|s| s.to_string()).collect(),
    )
}

pub fn session_factory(launcher: Arc<dyn BrowserLauncher>, settings: ScrapeSettings) -> SessionFactory {
    SessionFactory::new(launcher, test_profile(), Arc::new(settings), extractor())
}

/// A stored-shape lesson starting `days_ahead` days from now.
pub fn lesson(studio_code: &str, days_ahead: i64, start_time: &str) -> LessonRecord {
    let now = Utc::now();
    let date: NaiveDate = (now + Duration::days(days_ahead))
        .with_timezone(&site_offset())
        .date_naive();
    let start = chrono::NaiveTime::parse_from_str(start_time, "%H:%M").expect("HH:MM start");
    let start_at: DateTime<FixedOffset> = site_offset()
        .from_local_datetime(&date.and_time(start))
        .single()
        .expect("unambiguous start");
    LessonRecord {
        studio_code: studio_code.to_string(),
        date,
        start_time: start_time.to_string(),
        end_time: start_time.to_string(),
        start_at,
        name: "BB1 BASIC".to_string(),
        instructor: "Yui".to_string(),
        program: "BB1".to_string(),
        is_available: true,
        seats_left: None,
        status_text: None,
        colors: None,
        fetched_at: now,
        expires_at: now + Duration::days(7),
    }
}

/// Minimal configuration JSON pointing at [`ENTRY_URL`].
pub fn config_json(extra: &str) -> String {
    format!(
        r#"{{
            "version": "1.0",
            "site": {{ "entry_url": "{ENTRY_URL}" }},
            "browser": {{ "environment": "sandboxed" }}{extra}
        }}"#
    )
}
