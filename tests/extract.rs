use anyhow::Result;
use ratsfeed::config::FeedConfig;
use ratsfeed::extract::{
    AnchorScan, ExtractRules, ExtractStrategy, Extractor, Page, TableRows, TextLines,
};
use ratsfeed::model::Event;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const BASE: &str = "https://sessionnet.owl-it.de/koenigs_wusterhausen/bi";

#[test]
fn anchor_scan_reads_row_context() -> Result<()> {
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let extraction = Extractor::default().extract(&fixture("anchor_listing.html")?, &rules);

    assert_eq!(extraction.strategy, Some("anchor_scan"));
    assert_eq!(extraction.events.len(), 5);

    let social = find(&extraction.events, "Sozialausschuss");
    assert_eq!(social.date.as_deref(), Some("12.03.2026"));
    assert_eq!(social.time.start, "18:00");
    assert_eq!(social.time.end, "");
    assert!(social.location.as_deref().unwrap_or_default().contains("Rathaus"));
    assert_eq!(
        social.detail_url.as_deref(),
        Some(format!("{BASE}/si0057.asp?__ksinr=101").as_str())
    );

    let main = find(&extraction.events, "öffentliche Sitzung des Hauptausschusses");
    assert_eq!(main.time.start, "17:00");
    assert_eq!(main.time.end, "19:30");
    assert_eq!(main.location.as_deref(), Some("Bürgersaal, Bahnhofstraße 5"));
    assert_eq!(
        main.detail_url.as_deref(),
        Some(format!("{BASE}/si0057.asp?__ksinr=102").as_str())
    );

    let council = find(&extraction.events, "Stadtverordnetenversammlung");
    assert_eq!(council.location.as_deref(), Some("Schloss Königs Wusterhausen"));

    // Not allow-listed, but the anchor scan leaves filtering to the pipeline.
    find(&extraction.events, "Bauausschuss");

    Ok(())
}

#[test]
fn anchor_scan_uses_context_for_short_titles_and_dedupes() -> Result<()> {
    let html = r#"
        <ul>
          <li>Sitzung Hauptausschuss 05.05.2026 19:00 Uhr <a href="to0040.asp?__ksinr=5">TO</a></li>
          <li><a href="si0057.asp?__ksinr=6">Sozialausschuss</a> 06.05.2026</li>
          <li><a href="si0057.asp?__ksinr=6">Sozialausschuss</a> 06.05.2026</li>
        </ul>
    "#;
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let events = Extractor::default().extract(html, &rules).events;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].title, "Sitzung Hauptausschuss 05.05.2026 19:00 Uhr TO");
    assert_eq!(events[0].time.start, "19:00");
    assert_eq!(events[1].title, "Sozialausschuss");
    assert_eq!(events[1].time.start, "");

    Ok(())
}

#[test]
fn anchor_scan_keeps_paragraph_rows_in_a_shared_wrapper_apart() -> Result<()> {
    let html = r#"
        <div class="termine">
          <p><a href="si0057.asp?__ksinr=1">Hauptausschuss</a> 12.03.2026 18:00 Uhr Rathaus</p>
          <p><a href="si0057.asp?__ksinr=2">Sozialausschuss</a> 19.03.2026 17:00 Uhr Bürgersaal</p>
          <p><a href="si0057.asp?__ksinr=3">Bauausschuss</a> 24.03.2026 18:30 Uhr Schloss</p>
          <dl><dt><span><a href="si0057.asp?__ksinr=4">Stadtverordnetenversammlung</a> 26.03.2026 18:00 Uhr</span></dt></dl>
        </div>
    "#;
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let events = Extractor::default().extract(html, &rules).events;
    assert_eq!(events.len(), 4);

    let main = find(&events, "Hauptausschuss");
    assert_eq!(main.date.as_deref(), Some("12.03.2026"));
    assert_eq!(main.time.start, "18:00");
    assert_eq!(main.location.as_deref(), Some("Rathaus"));

    let social = find(&events, "Sozialausschuss");
    assert_eq!(social.date.as_deref(), Some("19.03.2026"));
    assert_eq!(social.time.start, "17:00");
    assert_eq!(social.location.as_deref(), Some("Bürgersaal"));
    assert_eq!(social.context, "Sozialausschuss 19.03.2026 17:00 Uhr Bürgersaal");

    let council = find(&events, "Stadtverordnetenversammlung");
    assert_eq!(council.date.as_deref(), Some("26.03.2026"));

    // Its own row does not mention an allowed body, so nothing rescues it.
    let building = find(&events, "Bauausschuss");
    assert_eq!(building.date.as_deref(), Some("24.03.2026"));
    assert!(!rules.allow.admits(building));

    Ok(())
}

#[test]
fn table_rows_skip_script_and_mail_links() -> Result<()> {
    let html = r#"
        <table>
          <tr>
            <td>12.03.2026 18:00 Uhr</td>
            <td><a href="javascript:void(0)">Drucken</a> <a href="mailto:buero@example.org">Kontakt</a>
                <a href="do0050.asp?dokid=9">Sitzung des Hauptausschusses</a></td>
          </tr>
          <tr>
            <td>19.03.2026</td>
            <td><a href="javascript:void(0)">Sozialausschuss</a></td>
          </tr>
        </table>
    "#;
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let extraction = Extractor::default().extract(html, &rules);
    assert_eq!(extraction.strategy, Some("table_rows"));
    assert_eq!(extraction.events.len(), 2);

    assert_eq!(
        extraction.events[0].detail_url.as_deref(),
        Some(format!("{BASE}/do0050.asp?dokid=9").as_str())
    );
    assert_eq!(extraction.events[1].detail_url, None);

    Ok(())
}

#[test]
fn table_rows_run_when_no_detail_links_exist() -> Result<()> {
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let extraction = Extractor::default().extract(&fixture("table_listing.html")?, &rules);

    assert_eq!(extraction.strategy, Some("table_rows"));
    assert_eq!(extraction.events.len(), 2);

    let first = &extraction.events[0];
    assert_eq!(first.title, "Sitzung des Hauptausschusses");
    assert_eq!(first.date.as_deref(), Some("10.03.2026"));
    assert_eq!(first.time.start, "18:00");
    assert_eq!(first.time.end, "20:00");
    assert_eq!(first.location.as_deref(), Some("Rathaus, Sitzungssaal"));
    assert_eq!(first.detail_url, None);

    let second = &extraction.events[1];
    assert_eq!(second.title, "Ausschuss für Soziales, Bildung und Kultur");
    assert_eq!(second.location.as_deref(), Some("Bürgersaal"));
    assert_eq!(
        second.detail_url.as_deref(),
        Some(format!("{BASE}/do0050.asp?dokid=7").as_str())
    );

    Ok(())
}

#[test]
fn text_lines_are_the_last_resort() -> Result<()> {
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let extraction = Extractor::default().extract(&fixture("text_listing.html")?, &rules);

    assert_eq!(extraction.strategy, Some("text_lines"));
    assert_eq!(extraction.events.len(), 1);
    let event = &extraction.events[0];
    assert_eq!(
        event.title,
        "Stadtverordnetenversammlung am 25.03.2026, 18:00 Uhr im Bürgersaal"
    );
    assert_eq!(event.date.as_deref(), Some("25.03.2026"));
    assert_eq!(event.time.start, "18:00");

    Ok(())
}

#[test]
fn empty_page_yields_no_strategy() -> Result<()> {
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let extraction =
        Extractor::default().extract("<html><body><p>Keine Termine</p></body></html>", &rules);
    assert_eq!(extraction.strategy, None);
    assert!(extraction.events.is_empty());
    Ok(())
}

#[test]
fn table_strategy_is_skipped_when_anchor_scan_finds_anything() -> Result<()> {
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let calls = Arc::new(AtomicUsize::new(0));
    let extractor = Extractor::with_strategies(vec![
        Box::new(AnchorScan),
        Box::new(Counting {
            inner: TableRows,
            calls: Arc::clone(&calls),
        }),
    ]);

    let html = r#"<table><tr><td>12.03.2026</td><td><a href="si0057.asp?__ksinr=1">Bauausschuss</a></td></tr></table>"#;
    let extraction = extractor.extract(html, &rules);
    assert_eq!(extraction.strategy, Some("anchor_scan"));
    assert_eq!(extraction.events.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let extraction = extractor.extract(&fixture("table_listing.html")?, &rules);
    assert_eq!(extraction.strategy, Some("table_rows"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[test]
fn strategies_can_be_run_on_their_own() -> Result<()> {
    let rules = ExtractRules::from_config(&FeedConfig::default())?;
    let raw = fixture("anchor_listing.html")?;
    let document = scraper::Html::parse_document(&raw);
    let page = Page {
        raw: &raw,
        document: &document,
    };

    // The anchor page is also a table, so lower strategies would find rows too.
    let rows = TableRows.try_extract(&page, &rules);
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|e| rules.allow.is_allowed(&e.title)));

    let lines = TextLines.try_extract(&page, &rules);
    assert!(lines.is_empty());

    Ok(())
}

struct Counting<S> {
    inner: S,
    calls: Arc<AtomicUsize>,
}

impl<S: ExtractStrategy> ExtractStrategy for Counting<S> {
    fn key(&self) -> &'static str {
        self.inner.key()
    }

    fn try_extract(&self, page: &Page<'_>, rules: &ExtractRules) -> Vec<Event> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.try_extract(page, rules)
    }
}

fn find<'a>(events: &'a [Event], title: &str) -> &'a Event {
    events
        .iter()
        .find(|e| e.title == title)
        .unwrap_or_else(|| panic!("event {title} must be extracted"))
}

fn fixture(name: &str) -> Result<String> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    Ok(fs::read_to_string(path)?)
}
