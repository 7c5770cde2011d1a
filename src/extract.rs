use crate::config::{FeedConfig, resolve_link};
use crate::datetime::parse_date;
use crate::filter::AllowList;
use crate::model::{Event, EventTime};
use crate::text::{element_text, fragment_text};
use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2}\.\d{2}\.\d{4})\b").expect("date regex must compile"));
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{2}:\d{2})(?:\s*[-–]\s*(\d{2}:\d{2}))?\s*Uhr")
        .expect("time regex must compile")
});
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector must parse"));
static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("row selector must parse"));

/// One parsed listing page as seen by the strategies.
pub struct Page<'a> {
    pub raw: &'a str,
    pub document: &'a Html,
}

/// Site-specific knobs shared by every strategy.
#[derive(Debug, Clone)]
pub struct ExtractRules {
    pub allow: AllowList,
    base_url: String,
    detail_patterns: Vec<String>,
    locations: Vec<Regex>,
    min_title_chars: usize,
}

impl ExtractRules {
    pub fn from_config(config: &FeedConfig) -> Result<Self> {
        let locations = config
            .extract
            .location_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid location pattern {p}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            allow: AllowList::new(&config.filter.allow_list),
            base_url: config.source.base_url.clone(),
            detail_patterns: config
                .extract
                .detail_patterns
                .iter()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .collect(),
            locations,
            min_title_chars: config.extract.min_title_chars,
        })
    }

    fn is_detail_link(&self, href: &str) -> bool {
        self.detail_patterns.iter().any(|p| href.contains(p.as_str()))
    }

    fn resolve(&self, href: &str) -> String {
        resolve_link(&self.base_url, href)
    }

    /// First pattern (in configured priority) that matches anywhere in `texts`.
    fn find_location<'t>(&self, texts: impl Iterator<Item = &'t str> + Clone) -> Option<String> {
        self.locations.iter().find_map(|re| {
            texts.clone().find_map(|text| {
                re.find(text)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|v| !v.is_empty())
            })
        })
    }
}

pub trait ExtractStrategy: Send + Sync {
    fn key(&self) -> &'static str;
    fn try_extract(&self, page: &Page<'_>, rules: &ExtractRules) -> Vec<Event>;
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub strategy: Option<&'static str>,
    pub events: Vec<Event>,
}

/// Runs strategies in priority order and stops at the first one that
/// produces any candidate for the page.
pub struct Extractor {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(AnchorScan),
            Box::new(TableRows),
            Box::new(TextLines),
        ])
    }
}

impl Extractor {
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn extract(&self, html: &str, rules: &ExtractRules) -> Extraction {
        let document = Html::parse_document(html);
        let page = Page {
            raw: html,
            document: &document,
        };

        for strategy in &self.strategies {
            let events = strategy.try_extract(&page, rules);
            debug!(
                strategy = strategy.key(),
                candidates = events.len(),
                "extraction strategy finished"
            );
            if !events.is_empty() {
                return Extraction {
                    strategy: Some(strategy.key()),
                    events,
                };
            }
        }

        Extraction {
            strategy: None,
            events: Vec::new(),
        }
    }
}

/// Anchors pointing at session, agenda or proposal detail pages; the
/// surrounding row supplies date, time and place.
pub struct AnchorScan;

impl ExtractStrategy for AnchorScan {
    fn key(&self) -> &'static str {
        "anchor_scan"
    }

    fn try_extract(&self, page: &Page<'_>, rules: &ExtractRules) -> Vec<Event> {
        let mut seen = HashSet::new();
        let mut events = Vec::new();

        for anchor in page.document.select(&ANCHOR) {
            let href = anchor.value().attr("href").unwrap_or_default().trim();
            if !rules.is_detail_link(href) {
                continue;
            }

            let anchor_text = element_text(anchor);
            let context = row_container(anchor, rules)
                .map(element_text)
                .unwrap_or_else(|| anchor_text.clone());

            let title = if anchor_text.chars().count() < rules.min_title_chars {
                context.clone()
            } else {
                anchor_text
            };
            if !seen.insert((title.clone(), href.to_string())) {
                continue;
            }

            events.push(Event {
                title,
                date: find_date(&context),
                time: find_time(&context).unwrap_or_default(),
                location: rules.find_location(std::iter::once(context.as_str())),
                detail_url: Some(rules.resolve(href)),
                context,
            });
        }

        events
    }
}

/// Table rows with a date cell and an allow-listed title cell.
pub struct TableRows;

impl ExtractStrategy for TableRows {
    fn key(&self) -> &'static str {
        "table_rows"
    }

    fn try_extract(&self, page: &Page<'_>, rules: &ExtractRules) -> Vec<Event> {
        let mut events = Vec::new();

        for row in page.document.select(&ROW) {
            let cells = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| matches!(el.value().name(), "td" | "th"))
                .map(element_text)
                .collect::<Vec<_>>();
            if cells.len() < 2 {
                continue;
            }

            let date = cells.iter().find_map(|c| find_date(c));
            let time = cells.iter().find_map(|c| find_time(c));

            let mut ranked = cells.iter().collect::<Vec<_>>();
            ranked.sort_by_key(|c| Reverse(c.chars().count()));
            let title = ranked.into_iter().find(|c| rules.allow.is_allowed(c));

            let (Some(date), Some(title)) = (date, title) else {
                continue;
            };

            let detail_url = row
                .select(&ANCHOR)
                .filter_map(|a| a.value().attr("href"))
                .map(|href| rules.resolve(href))
                .find(|url| url.starts_with("https://") || url.starts_with("http://"));

            events.push(Event {
                title: title.clone(),
                date: Some(date),
                time: time.unwrap_or_default(),
                location: rules.find_location(cells.iter().map(String::as_str)),
                detail_url,
                context: element_text(row),
            });
        }

        events
    }
}

/// Last resort: raw HTML lines mentioning an allowed body next to a date.
pub struct TextLines;

impl ExtractStrategy for TextLines {
    fn key(&self) -> &'static str {
        "text_lines"
    }

    fn try_extract(&self, page: &Page<'_>, rules: &ExtractRules) -> Vec<Event> {
        let mut events = Vec::new();

        for line in page.raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let text = fragment_text(line);
            if !rules.allow.is_allowed(&text) {
                continue;
            }
            let Some(date) = find_date(&text) else {
                continue;
            };

            events.push(Event {
                title: text.clone(),
                date: Some(date),
                time: find_time(&text).unwrap_or_default(),
                location: None,
                detail_url: None,
                context: text,
            });
        }

        events
    }
}

/// Innermost block around `anchor` that holds no other detail link. When the
/// next block up is shared with other entries, the widest inline wrapper
/// below it is used instead.
fn row_container<'a>(anchor: ElementRef<'a>, rules: &ExtractRules) -> Option<ElementRef<'a>> {
    let mut widest = None;
    for el in anchor.ancestors().filter_map(ElementRef::wrap) {
        if detail_links(el, rules) > 1 {
            break;
        }
        if matches!(
            el.value().name(),
            "tr" | "li" | "p" | "dd" | "dt" | "div" | "section" | "article"
        ) {
            return Some(el);
        }
        widest = Some(el);
    }
    widest.or_else(|| anchor.parent().and_then(ElementRef::wrap))
}

fn detail_links(element: ElementRef<'_>, rules: &ExtractRules) -> usize {
    element
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| rules.is_detail_link(href.trim()))
        .count()
}

/// First `DD.MM.YYYY` token in `text` that is a real calendar date.
pub fn find_date(text: &str) -> Option<String> {
    DATE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|raw| parse_date(raw).is_some())
        .map(ToString::to_string)
}

/// `HH:MM[-HH:MM] Uhr`; the end is empty when the range is open.
pub fn find_time(text: &str) -> Option<EventTime> {
    let caps = TIME_RE.captures(text)?;
    Some(EventTime {
        start: caps.get(1)?.as_str().to_string(),
        end: caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    })
}
