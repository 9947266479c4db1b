//! Browser sessions and the retry loop, driven through the fixture browser.
//!
//! Time is paused, so backoff sleeps and readiness polls advance instantly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use common::*;
use studiosync::browser::{FixtureLauncher, FixtureSite};
use studiosync::extract::schedule::Alignment;
use studiosync::extract::StructuralError;
use studiosync::registry::StudioRef;
use studiosync::scrape::{
    BackoffSchedule, LoginSettings, RetryController, ScrapeError, DEFAULT_MAX_ATTEMPTS,
};

fn controller(launcher: Arc<FixtureLauncher>) -> RetryController {
    RetryController::new(
        session_factory(launcher, scrape_settings()),
        BackoffSchedule::default(),
        DEFAULT_MAX_ATTEMPTS,
    )
}

fn shibuya() -> StudioRef {
    StudioRef::new("SBY", "Shibuya")
}

#[tokio::test(start_paused = true)]
async fn test_single_lesson_scraped_end_to_end() {
    let launcher = Arc::new(FixtureLauncher::new(studio_site(&[("SBY", "Shibuya"), ("GNZ", "Ginza")])));
    let stats = launcher.stats();

    let report = controller(launcher).run_with_retry(&shibuya()).await.unwrap();

    assert_eq!(report.studio, "SBY");
    assert_eq!(report.lessons.len(), 1);
    let lesson = &report.lessons[0];
    assert_eq!(lesson.studio_code, "SBY");
    assert_eq!(lesson.name, "BB2 NOW 1");
    assert_eq!(lesson.program, "BB2");
    assert_eq!(lesson.instructor, "Fuka");
    assert_eq!(lesson.start_time, "07:00");
    assert_eq!(lesson.end_time, "07:45");
    assert_eq!(lesson.start_at.offset(), &site_offset());
    assert!(lesson.is_available);
    assert_eq!(
        lesson.colors.as_ref().and_then(|c| c.background.as_deref()),
        Some("#e60012")
    );
    assert_eq!(report.diagnostics.container.as_deref(), Some("#scheduleTable"));
    assert_eq!(report.diagnostics.alignment, Some(Alignment::Positional));

    assert_eq!(report.attempts.len(), 1);
    assert_eq!(stats.launches(), 1);
    assert_eq!(stats.closes(), 1);
    assert_eq!(stats.clicks(), vec![("[data-studio-code]".to_string(), 0)]);
}

#[tokio::test(start_paused = true)]
async fn test_second_listed_studio_is_clicked_by_index() {
    let launcher = Arc::new(FixtureLauncher::new(studio_site(&[("SBY", "Shibuya"), ("GNZ", "Ginza")])));
    let stats = launcher.stats();

    let report = controller(launcher)
        .run_with_retry(&StudioRef::new("GNZ", "Ginza"))
        .await
        .unwrap();

    assert_eq!(report.lessons[0].studio_code, "GNZ");
    assert_eq!(stats.clicks(), vec![("[data-studio-code]".to_string(), 1)]);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_container_yields_same_lessons() {
    let site = FixtureSite::new()
        .page(ENTRY_URL, entry_page(&[("SBY", "Shibuya")]))
        .page(
            &schedule_url("SBY"),
            single_lesson_schedule(r#"class="schedule-container""#),
        );
    let launcher = Arc::new(FixtureLauncher::new(site));

    let report = controller(launcher).run_with_retry(&shibuya()).await.unwrap();

    assert_eq!(report.lessons.len(), 1);
    assert_eq!(report.lessons[0].name, "BB2 NOW 1");
    assert_eq!(
        report.diagnostics.container.as_deref(),
        Some(".schedule-container")
    );
}

#[tokio::test(start_paused = true)]
async fn test_sold_out_and_seat_counts() {
    let site = FixtureSite::new()
        .page(ENTRY_URL, entry_page(&[("SBY", "Shibuya")]))
        .page(
            &schedule_url("SBY"),
            schedule_page(
                r#"id="scheduleTable""#,
                &[
                    (
                        "7/24",
                        vec![
                            Tile::new("07:00 - 07:45", "BB2 NOW 1", "Fuka").status("満席"),
                            Tile::new("09:00 - 09:45", "BSL House 1", "Mio").status("残り3席"),
                        ],
                    ),
                    ("7/25", vec![Tile::new("10:30 - 11:15", "SKT Hip 2", "Ren")]),
                ],
            ),
        );
    let launcher = Arc::new(FixtureLauncher::new(site));

    let report = controller(launcher).run_with_retry(&shibuya()).await.unwrap();

    assert_eq!(report.lessons.len(), 3);
    let by_name = |name: &str| report.lessons.iter().find(|l| l.name == name).unwrap();
    assert!(!by_name("BB2 NOW 1").is_available);
    assert_eq!(by_name("BSL House 1").seats_left, Some(3));
    assert_eq!(by_name("BSL House 1").program, "BSL");
    let late = by_name("SKT Hip 2");
    assert_eq!(late.start_time, "10:30");
    assert_eq!(late.date.format("%m-%d").to_string(), "07-25");
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_recover_with_backoff() {
    let launcher = Arc::new(
        FixtureLauncher::new(studio_site(&[("SBY", "Shibuya")])).fail_next_launches(2),
    );
    let stats = launcher.stats();

    let report = controller(launcher).run_with_retry(&shibuya()).await.unwrap();

    assert_eq!(report.attempts.len(), 3);
    let delays: Vec<u64> = report.attempts.iter().map(|a| a.delay_before).collect();
    assert_eq!(delays, vec![0, 2_000, 5_000]);
    assert!(report.attempts[0].error.is_some());
    assert!(report.attempts[2].error.is_none());
    assert_eq!(stats.launches(), 3);
    // Failed launches never produced a page to close.
    assert_eq!(stats.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_site_exhausts_retries() {
    let site = FixtureSite::new().unreachable(ENTRY_URL);
    let launcher = Arc::new(FixtureLauncher::new(site));
    let stats = launcher.stats();
    let started = tokio::time::Instant::now();

    let err = controller(launcher).run_with_retry(&shibuya()).await.unwrap_err();

    match &err {
        ScrapeError::RetriesExhausted {
            studio,
            attempts,
            last,
            history,
        } => {
            assert_eq!(studio, "SBY");
            assert_eq!(*attempts, 6);
            assert!(matches!(**last, ScrapeError::Browser(_)));
            let delays: Vec<u64> = history.iter().map(|a| a.delay_before).collect();
            assert_eq!(delays, vec![0, 2_000, 5_000, 10_000, 20_000, 30_000]);
            assert!(history.iter().all(|a| a.error.is_some()));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("SBY"));
    assert!(msg.contains("6 attempts"));

    // Every attempt opened and closed its own browser.
    assert_eq!(stats.launches(), 6);
    assert_eq!(stats.closes(), 6);
    assert!(started.elapsed() >= Duration::from_secs(67));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_restarts_for_next_studio() {
    let site = FixtureSite::new().unreachable(ENTRY_URL);
    let launcher = Arc::new(FixtureLauncher::new(site));
    let retry = RetryController::new(
        session_factory(launcher, scrape_settings()),
        BackoffSchedule::default(),
        2,
    );

    for code in ["SBY", "GNZ"] {
        let err = retry
            .run_with_retry(&StudioRef::new(code, code))
            .await
            .unwrap_err();
        let ScrapeError::RetriesExhausted { history, .. } = err else {
            panic!("expected RetriesExhausted");
        };
        let delays: Vec<u64> = history.iter().map(|a| a.delay_before).collect();
        assert_eq!(delays, vec![0, 2_000]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_studio_missing_from_entry_page_is_not_retried() {
    let launcher = Arc::new(FixtureLauncher::new(studio_site(&[("SBY", "Shibuya")])));
    let stats = launcher.stats();

    let err = controller(launcher)
        .run_with_retry(&StudioRef::new("UMD", "Umeda"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScrapeError::StudioNotFound { ref studio, listed: 1 } if studio == "UMD"
    ));
    assert_eq!(stats.launches(), 1);
    assert_eq!(stats.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unrendered_studio_selector_is_retried() {
    let site = FixtureSite::new()
        .page(ENTRY_URL, "<html><body><main>loading</main></body></html>");
    let launcher = Arc::new(FixtureLauncher::new(site));
    let stats = launcher.stats();
    let retry = RetryController::new(
        session_factory(launcher, scrape_settings()),
        BackoffSchedule::from_secs(&[1]),
        3,
    );

    let err = retry.run_with_retry(&shibuya()).await.unwrap_err();

    let ScrapeError::RetriesExhausted { attempts, last, .. } = err else {
        panic!("expected RetriesExhausted");
    };
    assert_eq!(attempts, 3);
    assert!(matches!(
        *last,
        ScrapeError::Structural {
            error: StructuralError::NoStudioOptions,
            ..
        }
    ));
    assert_eq!(stats.launches(), 3);
    assert!(stats.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_schedule_without_lessons_counts_as_failure() {
    let site = FixtureSite::new()
        .page(ENTRY_URL, entry_page(&[("SBY", "Shibuya")]))
        .page(
            &schedule_url("SBY"),
            schedule_page(r#"class="schedule-container""#, &[("7/24", Vec::new())]),
        );
    let launcher = Arc::new(FixtureLauncher::new(site));
    let retry = RetryController::new(
        session_factory(launcher, scrape_settings()),
        BackoffSchedule::from_secs(&[1]),
        3,
    );

    let err = retry.run_with_retry(&shibuya()).await.unwrap_err();
    let ScrapeError::RetriesExhausted { attempts, last, .. } = err else {
        panic!("expected RetriesExhausted");
    };
    assert_eq!(attempts, 3);
    assert!(matches!(*last, ScrapeError::EmptySchedule { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_slow_render_waits_for_schedule() {
    let loading = "<html><body><main><p>Loading…</p></main></body></html>".to_string();
    let site = FixtureSite::new()
        .page(ENTRY_URL, entry_page(&[("SBY", "Shibuya")]))
        .rendering(
            &schedule_url("SBY"),
            vec![
                loading.clone(),
                loading,
                single_lesson_schedule(r#"id="scheduleTable""#),
            ],
        );
    let launcher = Arc::new(FixtureLauncher::new(site));

    let report = controller(launcher).run_with_retry(&shibuya()).await.unwrap();

    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.lessons.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_fills_form_before_scraping() {
    let site = studio_site(&[("SBY", "Shibuya")]).page(LOGIN_URL, login_page());
    let launcher = Arc::new(FixtureLauncher::new(site));
    let stats = launcher.stats();
    let mut settings = scrape_settings();
    settings.login = Some(LoginSettings {
        url: LOGIN_URL.to_string(),
        email: "ops@example.test".to_string(),
        password: SecretString::from("hunter2".to_string()),
    });
    let retry = RetryController::new(
        session_factory(launcher, settings),
        BackoffSchedule::default(),
        DEFAULT_MAX_ATTEMPTS,
    );

    let report = retry.run_with_retry(&shibuya()).await.unwrap();

    assert_eq!(report.lessons.len(), 1);
    assert_eq!(
        stats.typed(),
        vec![
            ("input[type=email]".to_string(), "ops@example.test".to_string()),
            ("input[type=password]".to_string(), "hunter2".to_string()),
        ]
    );
    assert_eq!(stats.clicks()[0], ("button[type=submit]".to_string(), 0));
}

#[tokio::test(start_paused = true)]
async fn test_sandboxed_profile_reaches_launcher() {
    let launcher = Arc::new(FixtureLauncher::new(studio_site(&[("SBY", "Shibuya")])));
    let stats = launcher.stats();

    controller(launcher).run_with_retry(&shibuya()).await.unwrap();

    let profiles = stats.profiles();
    assert_eq!(profiles.len(), 1);
    assert!(profiles[0].headless);
    assert!(profiles[0].args.iter().any(|a| a == "--no-sandbox"));
}
