//! Semantic roles and their ordered candidate patterns.
//!
//! Every role maps to a list of CSS selectors tried in order. The site
//! rewrites its markup without notice, so new candidates are appended
//! through configuration rather than code changes.

use std::collections::BTreeMap;
use std::fmt;

use scraper::Selector;
use serde::{Deserialize, Serialize};

/// What a pattern is supposed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Self-contained day column carrying its own date label and entries.
    DayColumn,
    /// Date label (`M/D`) of one day.
    DateHeader,
    /// Element wrapping all lesson columns.
    LessonContainer,
    /// One day's column inside the container.
    Column,
    /// One lesson tile inside a column.
    LessonEntry,
    Time,
    Name,
    Instructor,
    Status,
    /// One selectable studio on the entry page.
    StudioOption,
    LoginEmail,
    LoginPassword,
    LoginSubmit,
    /// Entry page has rendered.
    PageReady,
    /// The selected studio's schedule has rendered.
    ScheduleReady,
    /// Looser readiness check used by the fallback poll.
    AnyContent,
}

impl Role {
    pub const ALL: [Role; 16] = [
        Role::DayColumn,
        Role::DateHeader,
        Role::LessonContainer,
        Role::Column,
        Role::LessonEntry,
        Role::Time,
        Role::Name,
        Role::Instructor,
        Role::Status,
        Role::StudioOption,
        Role::LoginEmail,
        Role::LoginPassword,
        Role::LoginSubmit,
        Role::PageReady,
        Role::ScheduleReady,
        Role::AnyContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DayColumn => "day_column",
            Self::DateHeader => "date_header",
            Self::LessonContainer => "lesson_container",
            Self::Column => "column",
            Self::LessonEntry => "lesson_entry",
            Self::Time => "time",
            Self::Name => "name",
            Self::Instructor => "instructor",
            Self::Status => "status",
            Self::StudioOption => "studio_option",
            Self::LoginEmail => "login_email",
            Self::LoginPassword => "login_password",
            Self::LoginSubmit => "login_submit",
            Self::PageReady => "page_ready",
            Self::ScheduleReady => "schedule_ready",
            Self::AnyContent => "any_content",
        }
    }

    fn defaults(&self) -> &'static [&'static str] {
        match self {
            Self::DayColumn => &["[data-schedule-day]", ".schedule-day", ".day-column"],
            Self::DateHeader => &[
                "[data-date-label]",
                ".schedule-header .date",
                ".days .date",
                "thead th",
            ],
            Self::LessonContainer => &[
                "#scheduleTable",
                ".schedule-container",
                ".sc_list",
                "table.schedule",
            ],
            Self::Column => &[".schedule-column", ".content .column", "tbody td"],
            Self::LessonEntry => &[
                "[data-lesson]",
                ".lesson",
                ".seat-available, .seat-disabled",
            ],
            Self::Time => &[".time", ".lesson-time", "[data-time]"],
            Self::Name => &[".lesson_name", ".lesson-name", ".program-name"],
            Self::Instructor => &[".instructor", ".lesson-instructor", ".teacher"],
            Self::Status => &[".status", ".lesson-status", ".reserve-status"],
            Self::StudioOption => &[
                "[data-studio-code]",
                ".studio-list .studio",
                "select#studio option",
                ".address_item",
            ],
            Self::LoginEmail => &["input[type=email]", "input[name=email]", "#mail_address"],
            Self::LoginPassword => &["input[type=password]", "input[name=password]"],
            Self::LoginSubmit => &["button[type=submit]", "input[type=submit]", ".login-btn"],
            Self::PageReady => &[".studio-list", "[data-studio-code]", "select#studio"],
            Self::ScheduleReady => &["[data-lesson]", ".lesson", ".schedule-container"],
            Self::AnyContent => &[
                "[data-lesson]",
                ".lesson",
                "[data-studio-code]",
                ".schedule-container",
                "main",
            ],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered candidate patterns for every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet {
    patterns: BTreeMap<Role, Vec<String>>,
}

impl Default for PatternSet {
    fn default() -> Self {
        let patterns = Role::ALL
            .iter()
            .map(|role| {
                (
                    *role,
                    role.defaults().iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect();
        Self { patterns }
    }
}

impl PatternSet {
    /// Built-in defaults with `overrides` replacing whole roles.
    pub fn with_overrides(overrides: &BTreeMap<Role, Vec<String>>) -> Self {
        let mut set = Self::default();
        for (role, list) in overrides {
            set.patterns.insert(*role, list.clone());
        }
        set
    }

    pub fn get(&self, role: Role) -> &[String] {
        self.patterns.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the first pattern that is not valid CSS, as `(role, pattern, reason)`.
    pub fn first_invalid(&self) -> Option<(Role, String, String)> {
        self.patterns.iter().find_map(|(role, list)| {
            list.iter().find_map(|p| match Selector::parse(p) {
                Ok(_) => None,
                Err(e) => Some((*role, p.clone(), format!("{:?}", e))),
            })
        })
    }
}
