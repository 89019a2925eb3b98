//! Channel scraping
//!
//! Each [`Channel`] publishes an HTML index. [`ChannelScraper::discover`]
//! walks it lazily, confirming every archive link with a `HEAD` request
//! before yielding a [`BuildRecord`]. Network failures only ever shrink
//! the result: a failed index empties its channel, a failed confirmation
//! drops one candidate.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::build_info::{Branch, BuildRecord};
use crate::cancel::CancelToken;
use crate::config::SourcesConfig;
use crate::http::{HttpClient, Method};
use crate::markup::{self, Element};
use crate::metadata::COMMIT_TIME_FORMAT;
use crate::platform::{pin_locale, PlatformProfile};

/// Oldest stable release whose folder layout is regular
const STABLE_CUTOFF: f64 = 2.79;

static STABLE_FOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Blender\d+\.\d+").unwrap());
static FOLDER_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+").unwrap());
static BUILD_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w{12}").unwrap());
static SUBVERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\d+\.[a-zA-Z0-9.]+-").unwrap());

/// Distribution channel, in scrape order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stable,
    Daily,
    Experimental,
    Patch,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Stable,
        Channel::Daily,
        Channel::Experimental,
        Channel::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Daily => "daily",
            Self::Experimental => "experimental",
            Self::Patch => "patch",
        }
    }

    /// Index page of this channel
    pub fn index_url<'a>(&self, sources: &'a SourcesConfig) -> &'a str {
        match self {
            Self::Stable => &sources.stable,
            Self::Daily => &sources.daily,
            Self::Experimental => &sources.experimental,
            Self::Patch => &sources.patch,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "Unknown channel: {} (expected stable, daily, experimental or patch)",
                    s
                )
            })
    }
}

/// Scrapes channel index pages through the injected HTTP client
pub struct ChannelScraper {
    profile: Arc<PlatformProfile>,
    http: Arc<dyn HttpClient>,
    sources: SourcesConfig,
    cancel: CancelToken,
}

impl ChannelScraper {
    pub fn new(
        profile: Arc<PlatformProfile>,
        http: Arc<dyn HttpClient>,
        sources: SourcesConfig,
    ) -> Self {
        Self {
            profile,
            http,
            sources,
            cancel: CancelToken::new(),
        }
    }

    /// Share an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Lazily discover the builds of one channel. Every call fetches anew.
    pub fn discover(&self, channel: Channel) -> Discovery<'_> {
        Discovery {
            scraper: self,
            channel,
            index: Some(channel.index_url(&self.sources).to_string()),
            pages: VecDeque::new(),
            candidates: VecDeque::new(),
            index_reached: false,
            found: 0,
            finished: false,
        }
    }

    /// Archive links of one page, resolved against the page URL
    fn candidates(&self, channel: Channel, page_url: &str, html: &str) -> Vec<Candidate> {
        let Ok(base) = Url::parse(page_url) else {
            debug!(url = page_url, "page URL is not absolute");
            return Vec::new();
        };

        markup::anchors(html)
            .into_iter()
            .filter(|a| channel == Channel::Stable || is_download_anchor(a))
            .filter_map(|a| {
                let href = a.attr("href")?;
                if !self.profile.is_archive_link(href) {
                    return None;
                }
                let link = match base.join(href) {
                    Ok(url) => url.as_str().trim_end_matches('/').to_string(),
                    Err(e) => {
                        debug!(href, error = %e, "unresolvable link");
                        return None;
                    }
                };
                let label = match channel {
                    Channel::Stable => String::new(),
                    _ => {
                        let text = markup::next_text(html, a.end, "span", "build-var")
                            .unwrap_or_default();
                        self.profile.variant_label(&text, &link)
                    }
                };
                Some(Candidate { link, label })
            })
            .collect()
    }

    /// Confirm a candidate and build its record; `None` drops it
    fn confirm(&self, channel: Channel, candidate: Candidate) -> Option<BuildRecord> {
        let Candidate { link, label } = candidate;

        let Some(response) = self.http.request(Method::Head, &link) else {
            debug!(link = %link, "confirmation request failed");
            return None;
        };
        if !response.is_ok() {
            debug!(link = %link, status = response.status, "candidate not available");
            return None;
        }

        let stem = archive_stem(&link);
        let build_hash = BUILD_HASH
            .find_iter(stem)
            .last()
            .map(|m| m.as_str().to_string());

        let Some(version) = SUBVERSION.find(stem) else {
            warn!(link = %link, "archive name carries no version");
            return None;
        };
        let version = version.as_str().replace('-', "");

        pin_locale(&self.profile);
        let commit_time = match response
            .header("last-modified")
            .map(DateTime::parse_from_rfc2822)
        {
            Some(Ok(time)) => time.format(COMMIT_TIME_FORMAT).to_string(),
            Some(Err(e)) => {
                warn!(link = %link, error = %e, "unparseable Last-Modified header");
                return None;
            }
            None => {
                warn!(link = %link, "confirmation carries no Last-Modified header");
                return None;
            }
        };

        let (subversion, branch) = match channel {
            Channel::Stable => (version, Branch::Stable),
            Channel::Daily if label.is_empty() => (format!("{} Stable", version), Branch::Daily),
            Channel::Daily => (format!("{} {}", version, label), Branch::Daily),
            Channel::Experimental | Channel::Patch => (version, Branch::from(label.as_str())),
        };

        Some(BuildRecord::new(link, &subversion, build_hash, commit_time, branch))
    }
}

fn is_download_anchor(anchor: &Element) -> bool {
    anchor.attr("ga_cat") == Some("download")
}

/// File name of a link without its final extension
fn archive_stem(link: &str) -> &str {
    let name = link.rsplit('/').next().unwrap_or(link);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Release folders of the stable index at or above the cutoff
fn stable_folders(index_url: &str, html: &str) -> Vec<String> {
    let Ok(base) = Url::parse(index_url) else {
        return Vec::new();
    };

    markup::anchors(html)
        .iter()
        .filter_map(|a| a.attr("href"))
        .filter(|href| STABLE_FOLDER.is_match(href))
        .filter_map(|href| {
            let version: f64 = FOLDER_VERSION.find(href)?.as_str().parse().ok()?;
            if version < STABLE_CUTOFF {
                debug!(folder = href, "skipping release folder below cutoff");
                return None;
            }
            base.join(href).ok().map(String::from)
        })
        .collect()
}

#[derive(Debug)]
struct Candidate {
    link: String,
    /// Build-variant label, empty for stable releases
    label: String,
}

/// Lazy walk over one channel; finite and not restartable
pub struct Discovery<'a> {
    scraper: &'a ChannelScraper,
    channel: Channel,
    index: Option<String>,
    pages: VecDeque<String>,
    candidates: VecDeque<Candidate>,
    index_reached: bool,
    found: usize,
    finished: bool,
}

impl Discovery<'_> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Whether the channel index page was fetched
    pub fn index_reached(&self) -> bool {
        self.index_reached
    }

    fn fetch(&self, url: &str) -> Option<String> {
        match self.scraper.http.request(Method::Get, url) {
            Some(response) if response.is_ok() => Some(response.text()),
            Some(response) => {
                debug!(url, status = response.status, "page fetch rejected");
                None
            }
            None => {
                debug!(url, "page fetch failed");
                None
            }
        }
    }

    fn finish(&mut self) -> Option<BuildRecord> {
        if !self.finished {
            self.finished = true;
            self.index = None;
            self.pages.clear();
            self.candidates.clear();
            info!(
                channel = %self.channel,
                found = self.found,
                index_reached = self.index_reached,
                "channel scraped"
            );
        }
        None
    }
}

impl Iterator for Discovery<'_> {
    type Item = BuildRecord;

    fn next(&mut self) -> Option<BuildRecord> {
        loop {
            if self.finished {
                return None;
            }
            if self.scraper.cancel.is_cancelled() {
                debug!(channel = %self.channel, "scrape cancelled");
                return self.finish();
            }

            if let Some(candidate) = self.candidates.pop_front() {
                if let Some(record) = self.scraper.confirm(self.channel, candidate) {
                    self.found += 1;
                    return Some(record);
                }
                continue;
            }

            if let Some(index) = self.index.take() {
                let Some(html) = self.fetch(&index) else {
                    warn!(channel = %self.channel, url = %index, "channel index unreachable");
                    return self.finish();
                };
                self.index_reached = true;
                match self.channel {
                    Channel::Stable => self.pages.extend(stable_folders(&index, &html)),
                    channel => self
                        .candidates
                        .extend(self.scraper.candidates(channel, &index, &html)),
                }
                continue;
            }

            if let Some(page) = self.pages.pop_front() {
                if let Some(html) = self.fetch(&page) {
                    let found = self.scraper.candidates(self.channel, &page, &html);
                    self.candidates.extend(found);
                }
                continue;
            }

            return self.finish();
        }
    }
}
