//! Schedule extraction from a rendered page snapshot.
//!
//! Day columns are resolved as self-contained records first, each carrying
//! its own date label. Only when that fails does extraction fall back to
//! separate date-header and column queries aligned by index.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use serde::Serialize;

use super::dates::{parse_month_day, parse_time_range};
use super::patterns::{PatternSet, Role};
use super::program::ProgramCatalog;
use super::resolver::{element_text, resolve, resolve_text};
use super::status::{parse_status, parse_style_colors};
use crate::store::LessonColors;

/// Why extraction stopped before reaching lesson entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralError {
    NoContainer,
    NoColumns,
    /// The studio selector on the entry page matched nothing.
    NoStudioOptions,
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoContainer => f.write_str("no container"),
            Self::NoColumns => f.write_str("no columns"),
            Self::NoStudioOptions => f.write_str("no studio options"),
        }
    }
}

/// How dates were matched to columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Paired,
    Positional,
}

/// Which pattern satisfied each role during one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    pub date_list: Option<String>,
    pub day_columns: Option<String>,
    pub container: Option<String>,
    pub columns: Option<String>,
    /// field role -> pattern -> number of entries it satisfied
    pub fields: BTreeMap<String, BTreeMap<String, usize>>,
    pub alignment: Option<Alignment>,
    pub skipped_entries: usize,
}

impl ExtractionDiagnostics {
    fn hit(&mut self, role: Role, pattern: &str) {
        *self
            .fields
            .entry(role.as_str().to_string())
            .or_default()
            .entry(pattern.to_string())
            .or_default() += 1;
    }
}

/// A date label and the date it parsed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateEntry {
    pub label: String,
    pub actual_date: Option<NaiveDate>,
}

/// A fully resolved lesson entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLesson {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub name: String,
    pub instructor: String,
    pub program: String,
    pub status_text: Option<String>,
    pub is_available: bool,
    pub seats_left: Option<u32>,
    pub colors: Option<LessonColors>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub dates: Vec<DateEntry>,
    pub lessons: Vec<ExtractedLesson>,
    pub diagnostics: ExtractionDiagnostics,
    pub error: Option<StructuralError>,
}

pub struct ScheduleExtractor {
    patterns: PatternSet,
    programs: ProgramCatalog,
    sold_out_markers: Vec<String>,
}

impl ScheduleExtractor {
    pub fn new(patterns: PatternSet, programs: ProgramCatalog, sold_out_markers: Vec<String>) -> Self {
        Self {
            patterns,
            programs,
            sold_out_markers,
        }
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Extracts lessons from `html`, reading `M/D` labels in `reference_year`.
    pub fn extract(&self, html: &str, reference_year: i32) -> Extraction {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut out = Extraction::default();

        let columns = match self.paired_columns(root, reference_year, &mut out) {
            Some(columns) => columns,
            None => match self.positional_columns(root, reference_year, &mut out) {
                Ok(columns) => columns,
                Err(error) => {
                    tracing::warn!(error = %error, dates = out.dates.len(), "schedule structure not found");
                    out.error = Some(error);
                    return out;
                }
            },
        };

        for (date, column) in columns {
            let Some(date) = date else {
                tracing::debug!("skipping column without a parsable date");
                continue;
            };
            self.extract_column(column, date, &mut out);
        }

        tracing::debug!(
            lessons = out.lessons.len(),
            skipped = out.diagnostics.skipped_entries,
            alignment = ?out.diagnostics.alignment,
            "schedule extracted"
        );
        out
    }

    /// Day columns that each carry their own date label. `None` unless
    /// every resolved day column has one.
    fn paired_columns<'a>(
        &self,
        root: ElementRef<'a>,
        year: i32,
        out: &mut Extraction,
    ) -> Option<Vec<(Option<NaiveDate>, ElementRef<'a>)>> {
        let days = resolve(root, Role::DayColumn, self.patterns.get(Role::DayColumn))?;

        let mut paired = Vec::with_capacity(days.matches.len());
        let mut dates = Vec::with_capacity(days.matches.len());
        let mut label_pattern = None;
        for day in &days.matches {
            let Some((label, pattern)) =
                resolve_text(*day, Role::DateHeader, self.patterns.get(Role::DateHeader))
            else {
                tracing::debug!(pattern = days.pattern, "day column without its own label");
                return None;
            };
            label_pattern.get_or_insert(pattern);
            let actual_date = parse_month_day(&label, year);
            dates.push(DateEntry { label, actual_date });
            paired.push((actual_date, *day));
        }

        out.dates = dates;
        out.diagnostics.day_columns = Some(days.pattern.to_string());
        out.diagnostics.date_list = label_pattern.map(str::to_string);
        out.diagnostics.alignment = Some(Alignment::Paired);
        Some(paired)
    }

    fn positional_columns<'a>(
        &self,
        root: ElementRef<'a>,
        year: i32,
        out: &mut Extraction,
    ) -> Result<Vec<(Option<NaiveDate>, ElementRef<'a>)>, StructuralError> {
        out.diagnostics.alignment = Some(Alignment::Positional);

        if let Some(headers) = resolve(root, Role::DateHeader, self.patterns.get(Role::DateHeader)) {
            out.diagnostics.date_list = Some(headers.pattern.to_string());
            out.dates = headers
                .matches
                .iter()
                .map(|el| {
                    let label = element_text(*el);
                    let actual_date = parse_month_day(&label, year);
                    DateEntry { label, actual_date }
                })
                .collect();
        }

        let container = resolve(
            root,
            Role::LessonContainer,
            self.patterns.get(Role::LessonContainer),
        )
        .ok_or(StructuralError::NoContainer)?;
        out.diagnostics.container = Some(container.pattern.to_string());
        let container_el = *container
            .matches
            .first()
            .ok_or(StructuralError::NoContainer)?;

        let columns = resolve(container_el, Role::Column, self.patterns.get(Role::Column))
            .ok_or(StructuralError::NoColumns)?;
        out.diagnostics.columns = Some(columns.pattern.to_string());

        if columns.matches.len() != out.dates.len() {
            tracing::warn!(
                dates = out.dates.len(),
                columns = columns.matches.len(),
                "date and column counts differ; using common prefix"
            );
        }

        Ok(out
            .dates
            .iter()
            .map(|d| d.actual_date)
            .zip(columns.matches)
            .collect())
    }

    fn extract_column(&self, column: ElementRef<'_>, date: NaiveDate, out: &mut Extraction) {
        let Some(entries) = resolve(column, Role::LessonEntry, self.patterns.get(Role::LessonEntry))
        else {
            return;
        };
        for entry in entries.matches {
            out.diagnostics.hit(Role::LessonEntry, entries.pattern);
            match self.extract_entry(entry, date, &mut out.diagnostics) {
                Some(lesson) => out.lessons.push(lesson),
                None => out.diagnostics.skipped_entries += 1,
            }
        }
    }

    /// `None` unless time range, name and instructor all resolved.
    fn extract_entry(
        &self,
        entry: ElementRef<'_>,
        date: NaiveDate,
        diag: &mut ExtractionDiagnostics,
    ) -> Option<ExtractedLesson> {
        let mut field = |role: Role| {
            let (text, pattern) = resolve_text(entry, role, self.patterns.get(role))?;
            diag.hit(role, pattern);
            Some(text)
        };

        let time = field(Role::Time);
        let name = field(Role::Name);
        let instructor = field(Role::Instructor);
        let status_text = field(Role::Status);

        let (start_time, end_time) = parse_time_range(&time?)?;
        let name = name?;
        let instructor = instructor?;

        let availability = parse_status(status_text.as_deref(), &self.sold_out_markers);
        let colors = entry.value().attr("style").and_then(parse_style_colors);

        Some(ExtractedLesson {
            date,
            start_time,
            end_time,
            program: self.programs.classify(&name),
            name,
            instructor,
            status_text,
            is_available: availability.is_available,
            seats_left: availability.seats_left,
            colors,
        })
    }
}
