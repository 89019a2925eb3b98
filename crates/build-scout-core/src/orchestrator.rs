//! Background sequencing of scrapes and metadata loads
//!
//! Results are delivered as tagged events over `flume` channels so a
//! front end can render them as they arrive.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::build_info::BuildRecord;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::http::{HttpClient, Method};
use crate::metadata::{MetadataStore, VersionReader};
use crate::platform::PlatformProfile;
use crate::scraper::{Channel, ChannelScraper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeFailure {
    /// Not a single channel index could be fetched
    Unreachable,
}

impl fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "no channel index could be reached"),
        }
    }
}

/// Events of one discovery run; exactly one of `Done`/`Error` ends it
#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    Found(BuildRecord),
    /// Newest launcher release tag
    LatestTag(String),
    Done,
    Error(ScrapeFailure),
}

#[derive(Debug, Clone)]
pub enum MetadataEvent {
    Loaded(BuildRecord),
    Failed { path: PathBuf, message: String },
}

pub struct Orchestrator {
    scraper: ChannelScraper,
    http: Arc<dyn HttpClient>,
    latest_release: String,
    channels: Vec<Channel>,
}

impl Orchestrator {
    pub fn new(config: &Config, profile: Arc<PlatformProfile>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            scraper: ChannelScraper::new(profile, http.clone(), config.sources.clone()),
            http,
            latest_release: config.sources.latest_release.clone(),
            channels: Channel::ALL.to_vec(),
        }
    }

    /// Restrict the run to `channels`, still scraped in canonical order
    pub fn with_channels(mut self, channels: &[Channel]) -> Self {
        self.channels = Channel::ALL
            .into_iter()
            .filter(|c| channels.contains(c))
            .collect();
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.scraper.cancel_token().clone()
    }

    /// Run the discovery on a background thread
    pub fn spawn(self) -> (flume::Receiver<ScrapeEvent>, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let handle = thread::spawn(move || self.run(&tx));
        (rx, handle)
    }

    /// Scrape every channel, then look up the latest release tag
    pub fn run(&self, sender: &flume::Sender<ScrapeEvent>) {
        let outcome = self.scrape_channels(sender);
        let cancelled = self.scraper.cancel_token().is_cancelled();

        let tag = match outcome {
            Some(_) if !cancelled => self.latest_tag(),
            _ => None,
        };
        self.http.reset();

        // Receiver went away mid-run
        let Some(reached) = outcome else {
            return;
        };

        if let Some(tag) = tag {
            let _ = sender.send(ScrapeEvent::LatestTag(tag));
        }

        let terminal = if reached || cancelled {
            ScrapeEvent::Done
        } else {
            ScrapeEvent::Error(ScrapeFailure::Unreachable)
        };
        let _ = sender.send(terminal);
    }

    /// `Some(any index reached)`, or `None` when the receiver is gone
    fn scrape_channels(&self, sender: &flume::Sender<ScrapeEvent>) -> Option<bool> {
        let mut reached = false;
        for &channel in &self.channels {
            let mut discovery = self.scraper.discover(channel);
            for record in discovery.by_ref() {
                sender.send(ScrapeEvent::Found(record)).ok()?;
            }
            reached |= discovery.index_reached();
        }
        info!(channels = self.channels.len(), reached, "discovery finished");
        Some(reached)
    }

    /// Final path segment of the latest-release redirect
    pub fn latest_tag(&self) -> Option<String> {
        let response = self.http.request(Method::Get, &self.latest_release)?;
        if !response.is_ok() {
            debug!(status = response.status, "latest release lookup rejected");
            return None;
        }
        response
            .url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
    }

    /// Load (or derive) the record of one installed build on a thread
    pub fn load_installed<R>(
        store: Arc<MetadataStore<R>>,
        path: PathBuf,
    ) -> (flume::Receiver<MetadataEvent>, JoinHandle<()>)
    where
        R: VersionReader + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        let handle = thread::spawn(move || {
            let event = match store.load_or_derive(&path) {
                Ok(record) => MetadataEvent::Loaded(record),
                Err(e) => MetadataEvent::Failed {
                    message: e.to_string(),
                    path,
                },
            };
            let _ = tx.send(event);
        });
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, ScoutError};
    use crate::http::testing::StaticHttp;
    use crate::platform::Platform;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const LATEST: &str = "https://github.com/DotBow/Blender-Launcher/releases/latest";
    const DAILY: &str = "https://builder.blender.org/download";
    const DAILY_LINK: &str = "https://builder.blender.org/download/daily/blender-3.1.0-alpha+master.e1a9ba94c599-linux.x86_64-release.tar.xz";

    fn orchestrator(http: StaticHttp) -> (Orchestrator, Arc<StaticHttp>) {
        let http = Arc::new(http);
        let orchestrator = Orchestrator::new(
            &Config::default(),
            Arc::new(PlatformProfile::for_platform(Platform::Linux)),
            http.clone(),
        );
        (orchestrator, http)
    }

    fn collect(orchestrator: Orchestrator) -> Vec<ScrapeEvent> {
        let (events, handle) = orchestrator.spawn();
        handle.join().unwrap();
        events.drain().collect()
    }

    #[test]
    fn records_then_tag_then_done() {
        let page = format!(
            r#"<a ga_cat="download" href="{DAILY_LINK}">x</a><span class="build-var">Alpha</span>"#
        );
        let http = StaticHttp::new()
            .page(DAILY, &page)
            .archive(DAILY_LINK, "Wed, 21 Oct 2015 07:28:00 GMT")
            .redirect(
                LATEST,
                "https://github.com/DotBow/Blender-Launcher/releases/tag/v1.15.1",
            );
        let (orchestrator, http) = orchestrator(http);

        let events = collect(orchestrator);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], ScrapeEvent::Found(r) if r.commit_time() == "21-Oct-15-07:28"));
        assert!(matches!(&events[1], ScrapeEvent::LatestTag(tag) if tag == "v1.15.1"));
        assert!(matches!(events[2], ScrapeEvent::Done));
        assert_eq!(http.resets(), 1);
    }

    #[test]
    fn channel_selection_limits_requests() {
        let http = StaticHttp::new()
            .page("https://download.blender.org/release/", "")
            .page(DAILY, "");
        let (orchestrator, http) = orchestrator(http);
        let events = collect(orchestrator.with_channels(&[Channel::Daily, Channel::Stable]));

        assert!(matches!(events.as_slice(), [ScrapeEvent::Done]));
        assert!(http.requested(Method::Get, DAILY));
        assert!(!http.requested(
            Method::Get,
            "https://builder.blender.org/download/experimental"
        ));
    }

    #[test]
    fn unreachable_sources_end_with_error() {
        let (orchestrator, http) = orchestrator(StaticHttp::new());

        let events = collect(orchestrator);
        assert!(matches!(
            events.as_slice(),
            [ScrapeEvent::Error(ScrapeFailure::Unreachable)]
        ));
        assert_eq!(http.resets(), 1);
    }

    #[test]
    fn cancelled_run_skips_tag_lookup() {
        let http = StaticHttp::new().redirect(LATEST, "https://github.com/x/releases/tag/v1");
        let (orchestrator, http) = orchestrator(http);
        orchestrator.cancel_token().cancel();

        let events = collect(orchestrator);
        assert!(matches!(events.as_slice(), [ScrapeEvent::Done]));
        assert!(!http.requested(Method::Get, LATEST));
        assert_eq!(http.resets(), 1);
    }

    struct Banner(&'static str);

    impl VersionReader for Banner {
        fn read_version(&self, executable: &Path) -> Result<String> {
            if self.0.is_empty() {
                return Err(ScoutError::ExecutableNotFound {
                    path: executable.to_path_buf(),
                });
            }
            Ok(self.0.to_string())
        }
    }

    fn load(reader: Banner, path: PathBuf) -> MetadataEvent {
        let store = Arc::new(MetadataStore::with_reader(
            Arc::new(PlatformProfile::for_platform(Platform::Linux)),
            reader,
        ));
        let (events, handle) = Orchestrator::load_installed(store, path);
        handle.join().unwrap();
        events.recv().unwrap()
    }

    #[test]
    fn installed_build_is_loaded() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("stable").join("blender-3.4.0");
        fs::create_dir_all(&build).unwrap();

        let banner = Banner(
            "Blender 3.4.0\n\tbuild commit date: 2022-12-06\n\tbuild commit time: 10:15\n\tbuild hash: a95bf1ac01be\n",
        );
        match load(banner, build.clone()) {
            MetadataEvent::Loaded(record) => {
                assert_eq!(record.subversion(), "3.4.0");
                assert_eq!(record.build_hash(), Some("a95bf1ac01be"));
                assert_eq!(record.commit_time(), "06-Dec-22-10:15");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(build.join(".blinfo").is_file());
    }

    #[test]
    fn failed_derivation_is_reported() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("daily").join("broken");
        fs::create_dir_all(&build).unwrap();

        match load(Banner(""), build.clone()) {
            MetadataEvent::Failed { path, message } => {
                assert_eq!(path, build);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
