use crate::config::FeedConfig;
use crate::model::MonthWindow;
use crate::store::write_atomic;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read listing page {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no listing page available for {window}")]
    Missing { window: MonthWindow },
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub window: MonthWindow,
    pub source_url: String,
    pub html: String,
}

/// Where listing pages come from. The pipeline only ever asks for one month
/// window at a time, in chronological order.
pub trait PageSource {
    fn fetch_page(&self, window: MonthWindow) -> Result<FetchedPage, FetchError>;
}

pub struct HttpPageSource {
    client: Client,
    list_url: String,
    year_param: String,
    month_param: String,
}

impl HttpPageSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.fetch.user_agent).context("invalid fetch.user_agent")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&config.fetch.accept).context("invalid fetch.accept")?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.fetch.accept_language)
                .context("invalid fetch.accept_language")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            list_url: config.list_url(),
            year_param: config.fetch.year_param.clone(),
            month_param: config.fetch.month_param.clone(),
        })
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&self, window: MonthWindow) -> Result<FetchedPage, FetchError> {
        let year = window.year.to_string();
        let month = window.month.to_string();
        let params = [
            (self.year_param.as_str(), year.as_str()),
            (self.month_param.as_str(), month.as_str()),
        ];

        let transport = |source: reqwest::Error| FetchError::Transport {
            url: self.list_url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.list_url)
            .query(&params)
            .send()
            .map_err(transport)?;
        let source_url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: source_url,
                status,
            });
        }

        // Undeclared charsets are read as UTF-8 rather than sniffed.
        let html = response.text_with_charset("utf-8").map_err(transport)?;

        info!(
            window = %window,
            bytes = html.len(),
            url = %source_url,
            "fetched listing page"
        );

        Ok(FetchedPage {
            window,
            source_url,
            html,
        })
    }
}

/// Reads pages previously dumped as `<dir>/<YYYY>-<MM>.html`.
pub struct DirPageSource {
    dir: PathBuf,
}

impl DirPageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PageSource for DirPageSource {
    fn fetch_page(&self, window: MonthWindow) -> Result<FetchedPage, FetchError> {
        let path = page_file_path(&self.dir, window);
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::Missing { window }
            } else {
                FetchError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        info!(
            window = %window,
            file = %path.display(),
            bytes = bytes.len(),
            "loaded listing page"
        );

        Ok(FetchedPage {
            window,
            source_url: format!("file://{}", path.display()),
            html: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Pages held in memory, keyed by window.
#[derive(Debug, Clone, Default)]
pub struct InlinePageSource {
    pages: BTreeMap<MonthWindow, String>,
}

impl InlinePageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, window: MonthWindow, html: impl Into<String>) -> Self {
        self.pages.insert(window, html.into());
        self
    }
}

impl PageSource for InlinePageSource {
    fn fetch_page(&self, window: MonthWindow) -> Result<FetchedPage, FetchError> {
        let html = self
            .pages
            .get(&window)
            .cloned()
            .ok_or(FetchError::Missing { window })?;
        Ok(FetchedPage {
            window,
            source_url: format!("inline://{window}"),
            html,
        })
    }
}

/// Wraps another source and keeps a copy of every page it returns under
/// `dir`, in the layout [`DirPageSource`] reads back.
pub struct DumpingPageSource<S> {
    inner: S,
    dir: PathBuf,
}

impl<S: PageSource> DumpingPageSource<S> {
    pub fn new(inner: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }
}

impl<S: PageSource> PageSource for DumpingPageSource<S> {
    /// The dump is best-effort: a failed write is logged and the page is still returned.
    fn fetch_page(&self, window: MonthWindow) -> Result<FetchedPage, FetchError> {
        let page = self.inner.fetch_page(window)?;
        let path = page_file_path(&self.dir, window);
        match write_atomic(&path, page.html.as_bytes()) {
            Ok(()) => debug!(window = %window, file = %path.display(), "listing page dumped"),
            Err(err) => warn!(
                window = %window,
                file = %path.display(),
                error = %err,
                "failed to dump listing page"
            ),
        }
        Ok(page)
    }
}

pub fn page_file_path(dir: &Path, window: MonthWindow) -> PathBuf {
    dir.join(format!("{window}.html"))
}
