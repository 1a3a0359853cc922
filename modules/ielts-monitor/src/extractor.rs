//! Exam-date extraction from the announcements page.
//!
//! The page lists each session as a table row whose first column carries a
//! line like
//!
//! ```text
//! -- 12 Ocak 2025, Pazar - ... Son Başvuru ve Belge YüklemeTarihi: 20 Aralık 2024, Cuma
//! ```
//!
//! Two strategies read it: the targeted one looks only at the known row
//! (`tr.row-2.even td.column-1`), the fallback scans every table row in
//! document order. Both are pure and report a miss instead of failing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use ielts_common::ScrapedSnapshot;

/// Day, Turkish month name, year, weekday: `12 Ocak 2025, Pazar`.
const DATE_PATTERN: &str = r"\d{1,2}\s+[A-Za-zğüşıöçĞÜŞİÖÇ]+\s+\d{4},\s+[A-Za-zğüşıöçĞÜŞİÖÇ]+";

const SESSION_MARKER: &str = "--";
const DEADLINE_MARKER: &str = "Son Başvuru";
const SEGMENT_DELIMITER: &str = " - ";

const TARGET_ROW: &str = "tr.row-2.even";
const TARGET_COLUMN: &str = "td.column-1";

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DATE_PATTERN).expect("date pattern compiles"));
static EXAM_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"--\s*({DATE_PATTERN})")).expect("exam date pattern compiles")
});
static DEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"Son Başvuru ve Belge YüklemeTarihi:\s*({DATE_PATTERN})"
    ))
    .expect("deadline pattern compiles")
});

/// Why a strategy found nothing. Never fatal: the tick just has no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionMiss {
    #[error("exam date row ({TARGET_ROW} {TARGET_COLUMN}) not found")]
    NoTargetRow,
    #[error("no table row carries exam date information")]
    NoCandidateRow,
    #[error("no line matches the exam date / deadline pattern")]
    NoMatchingLine,
    #[error("matched line has no \" - \" delimiter")]
    Unsplittable,
    #[error("exam date or deadline pattern did not match")]
    DatePatternFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Targeted,
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Targeted => write!(f, "targeted"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Pull the exam date and application deadline out of plain text. The
/// first line carrying both markers and both dates is the one read.
pub fn extract(raw_text: &str) -> Result<ScrapedSnapshot, ExtractionMiss> {
    let line = raw_text
        .lines()
        .map(str::trim)
        .find(|line| is_session_line(line))
        .ok_or(ExtractionMiss::NoMatchingLine)?;

    read_dates(line, raw_text)
}

/// Same as [`extract`], but over the whole text at once, so the exam date
/// and the deadline may sit in different cells or on different lines.
pub fn extract_row(row_text: &str) -> Result<ScrapedSnapshot, ExtractionMiss> {
    if !is_session_line(row_text) {
        return Err(ExtractionMiss::NoMatchingLine);
    }
    read_dates(row_text, row_text)
}

/// The exam date comes from the first `" - "` segment, the deadline from
/// anywhere in `text`.
fn read_dates(text: &str, raw_text: &str) -> Result<ScrapedSnapshot, ExtractionMiss> {
    let mut segments = text.split(SEGMENT_DELIMITER);
    let exam_segment = segments.next().unwrap_or_default();
    if segments.next().is_none() {
        return Err(ExtractionMiss::Unsplittable);
    }

    let exam_date = first_capture(&EXAM_DATE_RE, exam_segment);
    let deadline = first_capture(&DEADLINE_RE, text);
    match (exam_date, deadline) {
        (Some(exam_date), Some(application_deadline)) => Ok(ScrapedSnapshot {
            exam_date,
            application_deadline,
            raw_text: raw_text.trim().to_string(),
        }),
        _ => Err(ExtractionMiss::DatePatternFailed),
    }
}

/// Read the known session cell only.
pub fn extract_targeted(html: &str) -> Result<ScrapedSnapshot, ExtractionMiss> {
    let document = Html::parse_document(html);
    let row_selector = selector(TARGET_ROW);
    let column_selector = selector(TARGET_COLUMN);

    let row = document
        .select(&row_selector)
        .next()
        .ok_or(ExtractionMiss::NoTargetRow)?;
    let mut columns = row.select(&column_selector).peekable();
    if columns.peek().is_none() {
        return Err(ExtractionMiss::NoTargetRow);
    }

    let text: String = columns.map(element_text).collect();
    tracing::debug!(raw_text = text.trim(), "Targeted cell text");
    extract(&text)
}

/// Scan every row of every table, first match wins.
pub fn extract_fallback(html: &str) -> Result<ScrapedSnapshot, ExtractionMiss> {
    let document = Html::parse_document(html);
    let table_selector = selector("table");
    let row_selector = selector("tr");

    for table in document.select(&table_selector) {
        for row in table.select(&row_selector) {
            if let Ok(snapshot) = extract_row(&element_text(row)) {
                return Ok(snapshot);
            }
        }
    }

    Err(ExtractionMiss::NoCandidateRow)
}

/// Targeted first; fallback only when targeted misses. On a double miss the
/// targeted reason is reported.
pub fn extract_page(html: &str) -> Result<(ScrapedSnapshot, Strategy), ExtractionMiss> {
    match extract_targeted(html) {
        Ok(snapshot) => Ok((snapshot, Strategy::Targeted)),
        Err(targeted_miss) => {
            tracing::warn!(reason = %targeted_miss, "Targeted extraction missed, trying fallback");
            match extract_fallback(html) {
                Ok(snapshot) => Ok((snapshot, Strategy::Fallback)),
                Err(fallback_miss) => {
                    tracing::debug!(reason = %fallback_miss, "Fallback extraction missed");
                    Err(targeted_miss)
                }
            }
        }
    }
}

fn is_session_line(line: &str) -> bool {
    line.contains(SESSION_MARKER)
        && line.contains(DEADLINE_MARKER)
        && DATE_RE.is_match(line)
        && DEADLINE_RE.is_match(line)
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector parses")
}
