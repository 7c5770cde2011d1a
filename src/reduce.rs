use crate::datetime::parse_datetime;
use crate::model::Event;
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct FutureSplit {
    pub upcoming: Vec<Event>,
    pub past: usize,
    pub unparseable: usize,
}

pub fn start_of(event: &Event, tz: Tz) -> Option<DateTime<Tz>> {
    parse_datetime(event.date.as_deref(), event.start_time(), tz)
}

/// Keeps events starting at or after `now`. Events without a resolvable
/// start are dropped and counted.
pub fn future_only(events: Vec<Event>, now: DateTime<Tz>, tz: Tz) -> FutureSplit {
    let mut split = FutureSplit::default();
    for event in events {
        match start_of(&event, tz) {
            Some(start) if start >= now => split.upcoming.push(event),
            Some(_) => split.past += 1,
            None => split.unparseable += 1,
        }
    }
    split
}

/// First occurrence of each `(title, date, start)` wins; the survivors are
/// stable-sorted by start with unresolvable starts last.
pub fn dedupe_sort(events: Vec<Event>, tz: Tz) -> Vec<Event> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(events.len());
    for event in events {
        let key = {
            let (title, date, start) = event.identity();
            (title.to_string(), date.map(ToString::to_string), start.to_string())
        };
        if seen.insert(key) {
            out.push(event);
        }
    }

    out.sort_by_key(|event| {
        let start = start_of(event, tz);
        (start.is_none(), start)
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventTime;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    fn event(title: &str, date: Option<&str>, start: &str) -> Event {
        Event {
            title: title.to_string(),
            date: date.map(ToString::to_string),
            time: EventTime {
                start: start.to_string(),
                end: String::new(),
            },
            ..Event::default()
        }
    }

    #[test]
    fn future_filter_is_inclusive_and_counts_skips() {
        let now = Berlin.with_ymd_and_hms(2026, 3, 12, 18, 0, 0).unwrap();
        let split = future_only(
            vec![
                event("a", Some("12.03.2026"), "18:00"),
                event("b", Some("12.03.2026"), "17:59"),
                event("c", None, "18:00"),
                event("d", Some("31.02.2026"), ""),
            ],
            now,
            Berlin,
        );
        assert_eq!(split.upcoming.len(), 1);
        assert_eq!(split.upcoming[0].title, "a");
        assert_eq!(split.past, 1);
        assert_eq!(split.unparseable, 2);
    }

    #[test]
    fn unresolvable_starts_sort_last_in_original_order() {
        let sorted = dedupe_sort(
            vec![
                event("x", None, ""),
                event("late", Some("20.03.2026"), "10:00"),
                event("y", Some("99.99.2026"), ""),
                event("early", Some("12.03.2026"), ""),
                event("same-early", Some("12.03.2026"), "00:00"),
            ],
            Berlin,
        );
        let titles = sorted.iter().map(|e| e.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["early", "same-early", "late", "x", "y"]);
    }
}
