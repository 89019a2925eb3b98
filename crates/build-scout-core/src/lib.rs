pub mod build_info;
pub mod cancel;
pub mod config;
pub mod error;
pub mod http;
pub mod library;
pub mod markup;
pub mod metadata;
pub mod orchestrator;
pub mod platform;
pub mod scraper;
pub mod watcher;

pub use build_info::{normalize_subversion, same_build, Branch, BuildRecord, LTS_TAGS};
pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Result, ScoutError};
pub use http::{HttpClient, HttpResponse, Method, ReqwestClient};
pub use library::{Library, LibraryFolder};
pub use metadata::{
    CacheFile, ExecutableReader, MetadataStore, VersionBanner, VersionReader, CACHE_FILENAME,
};
pub use orchestrator::{MetadataEvent, Orchestrator, ScrapeEvent, ScrapeFailure};
pub use platform::{pin_locale, Platform, PlatformProfile};
pub use scraper::{Channel, ChannelScraper, Discovery};
pub use watcher::{diff_subfolders, DirectoryWatcher, WatchEvent, DEFAULT_POLL_INTERVAL};
