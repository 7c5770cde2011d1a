use crate::config::{FeedConfig, load_config_or_default};
use crate::datetime::format_utc_iso;
use crate::extract::{ExtractRules, Extractor};
use crate::fetch::{DirPageSource, DumpingPageSource, HttpPageSource, PageSource};
use crate::ics::render_calendar;
use crate::model::{FeedPayload, RunReport, WindowReport, month_windows};
use crate::reduce::{dedupe_sort, future_only};
use crate::store::write_atomic;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub config_path: Option<PathBuf>,
    /// Read dumped pages from here instead of the network.
    pub html_dir: Option<PathBuf>,
    pub dump_dir: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
    pub ics_path: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct FeedOutput {
    pub payload: FeedPayload,
    pub calendar: String,
    pub report: RunReport,
}

pub fn run_sync(options: &SyncOptions) -> Result<RunReport> {
    let mut config = load_config_or_default(options.config_path.as_deref())?;
    if let Some(dir) = &options.dump_dir {
        config.output.dump_dir = Some(dir.clone());
    }
    if let Some(path) = &options.json_path {
        config.output.json_path = path.clone();
    }
    if let Some(path) = &options.ics_path {
        config.output.ics_path = path.clone();
    }

    let now = Utc::now();
    let extractor = Extractor::default();

    let output = if let Some(dir) = &options.html_dir {
        info!(dir = %dir.display(), "reading listing pages from disk");
        build_feed(&config, &DirPageSource::new(dir), &extractor, now)?
    } else {
        let http = HttpPageSource::new(&config)?;
        match &config.output.dump_dir {
            Some(dir) => build_feed(
                &config,
                &DumpingPageSource::new(http, dir),
                &extractor,
                now,
            )?,
            None => build_feed(&config, &http, &extractor, now)?,
        }
    };

    if options.dry_run {
        info!("dry run enabled; feed artifacts not written");
    } else {
        publish_feed(&config, &output)?;
    }

    Ok(output.report)
}

/// Fetches every month window, extracts, filters, reduces and renders both
/// artifacts in memory. Any fetch failure aborts the whole run.
pub fn build_feed(
    config: &FeedConfig,
    pages: &dyn PageSource,
    extractor: &Extractor,
    now: DateTime<Utc>,
) -> Result<FeedOutput> {
    let tz = config.timezone()?;
    let rules = ExtractRules::from_config(config)?;
    let now_local = now.with_timezone(&tz);
    let windows = month_windows(now_local.date_naive(), config.window.months);

    let mut report = RunReport::default();
    let mut candidates = Vec::new();

    for window in &windows {
        let page = pages
            .fetch_page(*window)
            .with_context(|| format!("fetch failed for month window {window}"))?;
        let extraction = extractor.extract(&page.html, &rules);
        info!(
            window = %window,
            strategy = extraction.strategy.unwrap_or("none"),
            candidates = extraction.events.len(),
            "listing page extracted"
        );
        report.windows.push(WindowReport {
            window: *window,
            strategy: extraction.strategy,
            candidates: extraction.events.len(),
        });
        candidates.extend(extraction.events);
    }
    report.candidates = candidates.len();

    let allowed = rules.allow.retain(candidates);
    report.allowed = allowed.len();

    let split = future_only(allowed, now_local, tz);
    report.parse_skipped = split.unparseable;
    report.past_dropped = split.past;
    if split.unparseable > 0 {
        info!(
            skipped = split.unparseable,
            "candidates without a parseable start dropped"
        );
    }

    let upcoming = split.upcoming.len();
    let mut items = dedupe_sort(split.upcoming, tz);
    report.duplicates = upcoming - items.len();
    report.capped = items.len().saturating_sub(config.output.max_items);
    items.truncate(config.output.max_items);
    report.items = items.len();

    let calendar = render_calendar(config, tz, &items, now);
    report.calendar_events = calendar.events;
    report.calendar_skipped = calendar.skipped;

    let payload = FeedPayload {
        source: config.list_url(),
        generated_at: format_utc_iso(now),
        filters: rules.allow.entries().to_vec(),
        timezone: tz.name().to_string(),
        months_loaded: windows,
        items,
    };

    Ok(FeedOutput {
        payload,
        calendar: calendar.text,
        report,
    })
}

/// Both artifacts are rendered before either file is touched.
pub fn publish_feed(config: &FeedConfig, output: &FeedOutput) -> Result<()> {
    let mut json = serde_json::to_string_pretty(&output.payload)
        .context("failed to serialize feed payload")?;
    json.push('\n');

    write_atomic(&config.output.json_path, json.as_bytes())?;
    write_atomic(&config.output.ics_path, output.calendar.as_bytes())?;

    info!(
        items = output.report.items,
        json = %config.output.json_path.display(),
        ics = %config.output.ics_path.display(),
        "feed artifacts written"
    );
    Ok(())
}

pub fn validate_config(config_path: Option<&std::path::Path>) -> Result<Vec<String>> {
    let config = load_config_or_default(config_path)?;
    let origin = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    Ok(vec![
        format!("OK: {} ({origin})", config.list_url()),
        format!(
            "allow-list: {}; months: {}; timezone: {}",
            config.filter.allow_list.join(", "),
            config.window.months,
            config.source.timezone
        ),
    ])
}
