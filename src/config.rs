use anyhow::{Context, Result, anyhow, bail};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FeedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            bail!("source.base_url must not be empty");
        }
        Url::parse(&self.site_base())
            .with_context(|| format!("invalid source.base_url {}", self.source.base_url))?;
        self.timezone()?;

        if self.filter.allow_list.is_empty() {
            bail!("filter.allow_list must contain at least one body name");
        }
        if self.filter.allow_list.iter().any(|v| v.trim().is_empty()) {
            bail!("filter.allow_list must not contain blank entries");
        }

        if self.window.months == 0 {
            bail!("window.months must be at least 1");
        }
        if self.output.max_items == 0 {
            bail!("output.max_items must be at least 1");
        }
        if self.output.default_duration_minutes <= 0 {
            bail!("output.default_duration_minutes must be positive");
        }

        if self.extract.detail_patterns.iter().all(|v| v.trim().is_empty()) {
            bail!("extract.detail_patterns must contain at least one path fragment");
        }
        for pattern in &self.extract.location_patterns {
            Regex::new(pattern)
                .with_context(|| format!("invalid extract.location_patterns entry {pattern}"))?;
        }

        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.source
            .timezone
            .parse::<Tz>()
            .map_err(|err| anyhow!("unknown source.timezone {}: {err}", self.source.timezone))
    }

    pub fn list_url(&self) -> String {
        format!("{}{}", self.site_base(), self.source.list_path.trim_start_matches('/'))
    }

    pub fn resolve_url(&self, href: &str) -> String {
        resolve_link(&self.source.base_url, href)
    }

    fn site_base(&self) -> String {
        site_base(&self.source.base_url)
    }
}

/// Resolves a link target found on a listing page. Targets with a scheme are
/// kept, `//host/...` takes the scheme of the base, and other relative
/// targets are placed under the site base even when they start with `/`.
pub fn resolve_link(base_url: &str, href: &str) -> String {
    let href = href.trim();
    if Url::parse(href).is_ok() {
        return href.to_string();
    }

    let base = site_base(base_url);
    let relative = if href.starts_with("//") {
        href
    } else {
        href.trim_start_matches('/')
    };
    if let Ok(parsed) = Url::parse(&base)
        && let Ok(joined) = parsed.join(relative)
    {
        return joined.to_string();
    }

    format!("{base}{relative}")
}

fn site_base(base_url: &str) -> String {
    format!("{}/", base_url.trim().trim_end_matches('/'))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_list_path")]
    pub list_path: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
            base_url: default_base_url(),
            list_path: default_list_path(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_year_param")]
    pub year_param: String,
    #[serde(default = "default_month_param")]
    pub month_param: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            timeout_secs: default_timeout_secs(),
            year_param: default_year_param(),
            month_param: default_month_param(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_months")]
    pub months: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            months: default_months(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_allow_list")]
    pub allow_list: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allow_list: default_allow_list(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_detail_patterns")]
    pub detail_patterns: Vec<String>,
    #[serde(default = "default_location_patterns")]
    pub location_patterns: Vec<String>,
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            detail_patterns: default_detail_patterns(),
            location_patterns: default_location_patterns(),
            min_title_chars: default_min_title_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_json_path")]
    pub json_path: PathBuf,
    #[serde(default = "default_ics_path")]
    pub ics_path: PathBuf,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
    #[serde(default = "default_calendar_name")]
    pub calendar_name: String,
    #[serde(default = "default_prod_id")]
    pub prod_id: String,
    #[serde(default = "default_uid_domain")]
    pub uid_domain: String,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: i64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_path: default_json_path(),
            ics_path: default_ics_path(),
            max_items: default_max_items(),
            dump_dir: None,
            calendar_name: default_calendar_name(),
            prod_id: default_prod_id(),
            uid_domain: default_uid_domain(),
            default_duration_minutes: default_duration_minutes(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<FeedConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read feed config: {}", path.display()))?;
    let config: FeedConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse toml in {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid feed config {}", path.display()))?;
    Ok(config)
}

/// Loads `path` when given, otherwise validates and returns the built-in defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<FeedConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = FeedConfig::default();
            config.validate().context("invalid built-in feed config")?;
            Ok(config)
        }
    }
}

fn default_source_name() -> String {
    "Königs Wusterhausen Ratsinformationssystem".to_string()
}

fn default_base_url() -> String {
    "https://sessionnet.owl-it.de/koenigs_wusterhausen/bi".to_string()
}

fn default_list_path() -> String {
    "si0046.asp".to_string()
}

fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}

fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string()
}

fn default_accept_language() -> String {
    "de-DE,de;q=0.9,en;q=0.5".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_year_param() -> String {
    "__cjahr".to_string()
}

fn default_month_param() -> String {
    "__cmonat".to_string()
}

fn default_months() -> u32 {
    3
}

fn default_allow_list() -> Vec<String> {
    vec![
        "Stadtverordnetenversammlung".to_string(),
        "Hauptausschuss".to_string(),
        "Ausschuss für Soziales".to_string(),
        "Sozialausschuss".to_string(),
    ]
}

fn default_detail_patterns() -> Vec<String> {
    vec![
        "si0057.asp".to_string(),
        "to0040.asp".to_string(),
        "vo0050.asp".to_string(),
    ]
}

fn default_location_patterns() -> Vec<String> {
    vec![
        r"Rathaus.*".to_string(),
        r"Bürgersaal.*".to_string(),
        r"Bahnhof.*".to_string(),
        r"Schloss.*".to_string(),
        r"\b\d{5}\s+\S.*".to_string(),
    ]
}

fn default_min_title_chars() -> usize {
    4
}

fn default_json_path() -> PathBuf {
    PathBuf::from("data/termine.json")
}

fn default_ics_path() -> PathBuf {
    PathBuf::from("data/termine.ics")
}

fn default_max_items() -> usize {
    200
}

fn default_calendar_name() -> String {
    "Sitzungstermine Königs Wusterhausen".to_string()
}

fn default_prod_id() -> String {
    "-//ratsfeed//Sitzungstermine 1.0//DE".to_string()
}

fn default_uid_domain() -> String {
    "ratsfeed.local".to_string()
}

fn default_duration_minutes() -> i64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FeedConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.list_url(),
            "https://sessionnet.owl-it.de/koenigs_wusterhausen/bi/si0046.asp"
        );
    }

    #[test]
    fn resolve_url_keeps_absolute_and_joins_relative() {
        let config = FeedConfig::default();
        assert_eq!(
            config.resolve_url("https://example.org/x"),
            "https://example.org/x"
        );
        assert_eq!(
            config.resolve_url("/si0057.asp?__ksinr=12"),
            "https://sessionnet.owl-it.de/koenigs_wusterhausen/bi/si0057.asp?__ksinr=12"
        );
        assert_eq!(
            config.resolve_url("si0057.asp?__ksinr=12"),
            "https://sessionnet.owl-it.de/koenigs_wusterhausen/bi/si0057.asp?__ksinr=12"
        );
    }

    #[test]
    fn resolve_link_handles_schemes_and_protocol_relative_targets() {
        let base = "https://sessionnet.owl-it.de/koenigs_wusterhausen/bi";
        assert_eq!(
            resolve_link(base, "//other.example/si0057.asp?__ksinr=3"),
            "https://other.example/si0057.asp?__ksinr=3"
        );
        assert_eq!(
            resolve_link(base, "mailto:buero@example.org"),
            "mailto:buero@example.org"
        );
        assert_eq!(
            resolve_link(base, "javascript:void(0)"),
            "javascript:void(0)"
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FeedConfig = toml::from_str(
            r#"
            [filter]
            allow_list = ["Bauausschuss"]

            [window]
            months = 1
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.filter.allow_list, vec!["Bauausschuss".to_string()]);
        assert_eq!(config.source.timezone, "Europe/Berlin");
        assert_eq!(config.output.max_items, 200);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = FeedConfig::default();
        config.source.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.filter.allow_list = vec![" ".to_string()];
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.extract.location_patterns = vec!["(unclosed".to_string()];
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.window.months = 0;
        assert!(config.validate().is_err());
    }
}
