use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventTime {
    /// `HH:MM` or empty.
    #[serde(default)]
    pub start: String,
    /// `HH:MM` or empty. Not guaranteed to be after `start`.
    #[serde(default)]
    pub end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub title: String,
    pub date: Option<String>,
    pub time: EventTime,
    pub location: Option<String>,
    pub detail_url: Option<String>,
    /// Normalized text of the row or line the event came from. Only used to
    /// rescue noisy titles during allow-list filtering.
    #[serde(skip)]
    pub context: String,
}

impl Event {
    pub fn identity(&self) -> (&str, Option<&str>, &str) {
        (
            self.title.as_str(),
            self.date.as_deref(),
            self.time.start.as_str(),
        )
    }

    pub fn start_time(&self) -> Option<&str> {
        Some(self.time.start.as_str()).filter(|v| !v.is_empty())
    }

    pub fn end_time(&self) -> Option<&str> {
        Some(self.time.end.as_str()).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
}

impl MonthWindow {
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month >= 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// `count` consecutive month windows starting with the month of `first_day`.
pub fn month_windows(first_day: NaiveDate, count: u32) -> Vec<MonthWindow> {
    let mut windows = Vec::with_capacity(count as usize);
    let mut current = MonthWindow::containing(first_day);
    for _ in 0..count {
        windows.push(current);
        current = current.next();
    }
    windows
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPayload {
    pub source: String,
    pub generated_at: String,
    pub filters: Vec<String>,
    pub timezone: String,
    pub months_loaded: Vec<MonthWindow>,
    pub items: Vec<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    pub window: MonthWindow,
    pub strategy: Option<&'static str>,
    pub candidates: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub windows: Vec<WindowReport>,
    pub candidates: usize,
    pub allowed: usize,
    pub parse_skipped: usize,
    pub past_dropped: usize,
    pub duplicates: usize,
    pub capped: usize,
    pub items: usize,
    pub calendar_events: usize,
    pub calendar_skipped: usize,
}
