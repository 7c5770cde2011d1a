use crate::config::FeedConfig;
use crate::datetime::{format_utc_compact, parse_datetime, parse_time};
use crate::model::Event;
use crate::reduce::start_of;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RenderedCalendar {
    pub text: String,
    pub events: usize,
    pub skipped: usize,
}

pub fn render_calendar(
    config: &FeedConfig,
    tz: Tz,
    events: &[Event],
    generated_at: DateTime<Utc>,
) -> RenderedCalendar {
    let mut lines = Vec::new();
    push_line(&mut lines, "BEGIN:VCALENDAR".to_string());
    push_line(&mut lines, "VERSION:2.0".to_string());
    push_line(&mut lines, format!("PRODID:{}", config.output.prod_id));
    push_line(&mut lines, "CALSCALE:GREGORIAN".to_string());
    push_line(&mut lines, "METHOD:PUBLISH".to_string());
    push_line(
        &mut lines,
        format!("X-WR-CALNAME:{}", escape_text(&config.output.calendar_name)),
    );
    push_line(&mut lines, format!("X-WR-TIMEZONE:{}", tz.name()));

    let default_duration = Duration::minutes(config.output.default_duration_minutes);
    let dtstamp = format_utc_compact(&generated_at);
    let mut rendered = 0usize;
    let mut skipped = 0usize;

    for event in events {
        let Some(start) = start_of(event, tz) else {
            skipped += 1;
            continue;
        };
        let end = event_end(event, start, tz, default_duration);

        push_line(&mut lines, "BEGIN:VEVENT".to_string());
        push_line(
            &mut lines,
            format!("UID:{}", event_uid(event, &start, &config.output.uid_domain)),
        );
        push_line(&mut lines, format!("DTSTAMP:{dtstamp}"));
        push_line(&mut lines, format!("DTSTART:{}", format_utc_compact(&start)));
        push_line(&mut lines, format!("DTEND:{}", format_utc_compact(&end)));
        push_line(
            &mut lines,
            format!("SUMMARY:{}", escape_text(&single_line(&event.title))),
        );
        push_line(
            &mut lines,
            format!(
                "LOCATION:{}",
                escape_text(&single_line(event.location.as_deref().unwrap_or_default()))
            ),
        );
        push_line(
            &mut lines,
            format!(
                "URL:{}",
                single_line(event.detail_url.as_deref().unwrap_or_default())
            ),
        );
        push_line(&mut lines, "END:VEVENT".to_string());
        rendered += 1;
    }

    push_line(&mut lines, "END:VCALENDAR".to_string());

    if skipped > 0 {
        debug!(skipped, "events without a resolvable start left out of calendar");
    }

    RenderedCalendar {
        text: lines.join("\r\n") + "\r\n",
        events: rendered,
        skipped,
    }
}

/// End on the start's calendar day when a usable end time is given, else
/// start plus the default duration. Reversed or zero-length ranges are
/// clamped to the default duration.
fn event_end(
    event: &Event,
    start: DateTime<Tz>,
    tz: Tz,
    default_duration: Duration,
) -> DateTime<Tz> {
    let fallback = start + default_duration;
    let Some(end_time) = event.end_time().filter(|t| parse_time(t).is_some()) else {
        return fallback;
    };

    match parse_datetime(event.date.as_deref(), Some(end_time), tz) {
        Some(end) if end > start => end,
        Some(_) => {
            debug!(
                title = %event.title,
                end = end_time,
                "end not after start; using default duration"
            );
            fallback
        }
        None => fallback,
    }
}

/// `<start stamp>-<content hash>@<domain>`; stable across runs for the same
/// identity tuple.
pub fn event_uid(event: &Event, start: &DateTime<Tz>, domain: &str) -> String {
    let (title, date, start_time) = event.identity();
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(date.unwrap_or_default().as_bytes());
    hasher.update([0x1f]);
    hasher.update(start_time.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let number = u64::from_be_bytes(prefix);

    format!("{}-{number}@{domain}", format_utc_compact(start))
}

fn single_line(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_line(lines: &mut Vec<String>, line: String) {
    for folded in fold_line(&line) {
        lines.push(folded);
    }
}

fn fold_line(line: &str) -> Vec<String> {
    const LIMIT: usize = 75;

    if line.len() <= LIMIT {
        return vec![line.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in line.chars() {
        // continuation lines spend one octet on the leading space
        let limit = if chunks.is_empty() { LIMIT } else { LIMIT - 1 };
        if current.len() + ch.len_utf8() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, chunk)| if idx == 0 { chunk } else { format!(" {chunk}") })
        .collect()
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
