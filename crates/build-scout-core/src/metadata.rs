//! Installed build metadata
//!
//! Every installed build directory carries a `.blinfo` cache. The cache is
//! trusted once it is on the current schema; an older schema is migrated by
//! re-reading the build's own version banner, keeping user state.
//!
//! ```text
//! <library>/daily/blender-3.0.0-alpha+master.5ef26ee6feb1-linux.x86_64/
//! ├── blender
//! └── .blinfo   {"schema_version": "1.2", "blinfo": [{...}]}
//! ```

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::build_info::{Branch, BuildRecord};
use crate::error::{Result, ScoutError};
use crate::platform::{pin_locale, PlatformProfile};

pub const CACHE_FILENAME: &str = ".blinfo";

/// Format of every commit timestamp, e.g. `20-Aug-21-21:49`
pub const COMMIT_TIME_FORMAT: &str = "%d-%b-%y-%H:%M";

static COMMIT_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"build commit time: (.*)").unwrap());
static COMMIT_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"build commit date: (.*)").unwrap());
static BUILD_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"build hash: (.*)").unwrap());
static VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Blender (.*)").unwrap());
static EXPERIMENTAL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+(.+?)\.").unwrap());

// ============================================================================
// Cache file
// ============================================================================

/// On-disk `.blinfo` document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    /// Older launchers wrote this as `file_version`
    #[serde(default, alias = "file_version")]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub blinfo: Vec<CachedBuild>,
}

/// Persisted fields of one build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedBuild {
    #[serde(default)]
    pub branch: Branch,
    pub subversion: String,
    #[serde(default)]
    pub build_hash: Option<String>,
    pub commit_time: String,
    #[serde(default)]
    pub custom_name: String,
    #[serde(default)]
    pub is_favorite: bool,
}

impl CacheFile {
    pub fn from_record(record: &BuildRecord) -> Self {
        Self {
            schema_version: Some(BuildRecord::SCHEMA_VERSION.to_string()),
            blinfo: vec![CachedBuild {
                branch: record.branch().clone(),
                subversion: record.subversion().to_string(),
                build_hash: record.build_hash().map(str::to_string),
                commit_time: record.commit_time().to_string(),
                custom_name: record.custom_name().to_string(),
                is_favorite: record.is_favorite(),
            }],
        }
    }

    pub fn is_current(&self) -> bool {
        self.schema_version.as_deref() == Some(BuildRecord::SCHEMA_VERSION)
    }

    /// Record stored for the build at `path`, if any
    pub fn record(&self, path: &Path) -> Option<BuildRecord> {
        let cached = self.blinfo.first()?;
        let record = BuildRecord::new(
            path_link(path),
            &cached.subversion,
            cached.build_hash.clone(),
            cached.commit_time.clone(),
            cached.branch.clone(),
        )
        .with_user_state(cached.custom_name.clone(), cached.is_favorite);
        Some(record)
    }
}

fn path_link(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ============================================================================
// Version banner
// ============================================================================

/// Fields parsed from `blender -v`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBanner {
    pub subversion: String,
    pub build_hash: String,
    pub commit_time: String,
}

impl VersionBanner {
    /// Parse the banner; the error names the first missing field
    pub fn parse(output: &str) -> std::result::Result<Self, String> {
        let time = capture(&COMMIT_TIME, output, "build commit time")?;
        let date = capture(&COMMIT_DATE, output, "build commit date")?;
        let build_hash = capture(&BUILD_HASH, output, "build hash")?;
        let subversion = capture(&VERSION, output, "version")?;

        let commit = NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M")
            .map_err(|e| format!("invalid commit timestamp '{} {}': {}", date, time, e))?;

        Ok(Self {
            subversion,
            build_hash,
            commit_time: commit.format(COMMIT_TIME_FORMAT).to_string(),
        })
    }
}

fn capture(re: &Regex, output: &str, name: &str) -> std::result::Result<String, String> {
    re.captures(output)
        .map(|c| c[1].trim_end().to_string())
        .ok_or_else(|| format!("missing {} in version output", name))
}

// ============================================================================
// Executable probing
// ============================================================================

/// Source of the version banner of an installed executable
pub trait VersionReader: Send + Sync {
    fn read_version(&self, executable: &Path) -> Result<String>;
}

/// Runs `<executable> -v` and captures stdout
#[derive(Debug, Clone)]
pub struct ExecutableReader {
    locale: &'static str,
}

impl ExecutableReader {
    pub fn new(profile: &PlatformProfile) -> Self {
        Self {
            locale: profile.locale(),
        }
    }
}

impl VersionReader for ExecutableReader {
    fn read_version(&self, executable: &Path) -> Result<String> {
        if !executable.is_file() {
            return Err(ScoutError::ExecutableNotFound {
                path: executable.to_path_buf(),
            });
        }

        let mut cmd = Command::new(executable);
        cmd.arg("-v");
        cmd.env("LC_ALL", self.locale);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());
        restore_library_path(&mut cmd);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let output = cmd
            .output()
            .map_err(|e| ScoutError::extraction(executable, format!("failed to run: {}", e)))?;

        if !output.status.success() {
            return Err(ScoutError::extraction(
                executable,
                format!("exited with {}", output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Bundled launchers may rewrite `LD_LIBRARY_PATH`; hand the child the
/// user's original value, or none at all.
#[cfg(target_os = "linux")]
fn restore_library_path(cmd: &mut Command) {
    match std::env::var_os("LD_LIBRARY_PATH_ORIG") {
        Some(original) => {
            cmd.env("LD_LIBRARY_PATH", original);
        }
        None => {
            cmd.env_remove("LD_LIBRARY_PATH");
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn restore_library_path(_cmd: &mut Command) {}

// ============================================================================
// Store
// ============================================================================

/// Reads, derives and writes build metadata for installed builds
pub struct MetadataStore<R = ExecutableReader> {
    profile: Arc<PlatformProfile>,
    reader: R,
}

impl MetadataStore<ExecutableReader> {
    pub fn new(profile: Arc<PlatformProfile>) -> Self {
        let reader = ExecutableReader::new(&profile);
        Self { profile, reader }
    }
}

impl<R: VersionReader> MetadataStore<R> {
    pub fn with_reader(profile: Arc<PlatformProfile>, reader: R) -> Self {
        Self { profile, reader }
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    /// Derive a record from the installed executable at `path`
    ///
    /// User state (custom name, favorite flag) comes from `prior`.
    pub fn derive_from_install(
        &self,
        path: &Path,
        prior: Option<&BuildRecord>,
    ) -> Result<BuildRecord> {
        if !path.is_dir() {
            return Err(ScoutError::NotABuildDirectory {
                path: path.to_path_buf(),
            });
        }
        pin_locale(&self.profile);

        let output = self
            .reader
            .read_version(&self.profile.executable_in(path))?;
        let banner =
            VersionBanner::parse(&output).map_err(|message| ScoutError::extraction(path, message))?;

        let mut subversion = banner.subversion;
        let branch = install_branch(path, &mut subversion, prior);

        Ok(BuildRecord::new(
            path_link(path),
            &subversion,
            Some(banner.build_hash),
            banner.commit_time,
            branch,
        )
        .with_user_state_of(prior))
    }

    /// Cached record for `path`, deriving and persisting it when needed
    pub fn load_or_derive(&self, path: &Path) -> Result<BuildRecord> {
        let cache = match self.read_cache(path) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable build cache, re-deriving");
                None
            }
        };

        let Some((cache, prior)) = cache.and_then(|c| c.record(path).map(|r| (c, r))) else {
            let record = self.derive_from_install(path, None)?;
            self.persist(path, &record)?;
            return Ok(record);
        };

        if cache.is_current() {
            return Ok(prior);
        }

        tracing::debug!(
            path = %path.display(),
            from = cache.schema_version.as_deref().unwrap_or("none"),
            to = BuildRecord::SCHEMA_VERSION,
            "migrating build cache"
        );
        let record = self.derive_from_install(path, Some(&prior))?;
        self.persist(path, &record)?;
        Ok(record)
    }

    /// Read the raw cache file; `Ok(None)` when there is none
    pub fn read_cache(&self, path: &Path) -> Result<Option<CacheFile>> {
        let cache_path = path.join(CACHE_FILENAME);
        if !cache_path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&cache_path)?;
        let cache: CacheFile = serde_json::from_str(&content)?;
        Ok(Some(cache))
    }

    /// Overwrite the cache file of `path` with `record`
    pub fn persist(&self, path: &Path, record: &BuildRecord) -> Result<()> {
        let content = serde_json::to_string(&CacheFile::from_record(record))?;
        fs::write(path.join(CACHE_FILENAME), content)?;
        Ok(())
    }

    /// Change user-assigned state of an installed build and persist it
    pub fn update_user_state(
        &self,
        path: &Path,
        custom_name: Option<String>,
        is_favorite: Option<bool>,
    ) -> Result<BuildRecord> {
        let record = self.load_or_derive(path)?;
        let custom_name = custom_name.unwrap_or_else(|| record.custom_name().to_string());
        let is_favorite = is_favorite.unwrap_or(record.is_favorite());

        let updated = record.with_user_state(custom_name, is_favorite);
        self.persist(path, &updated)?;
        Ok(updated)
    }
}

/// Branch implied by the library subfolder a build is installed in
fn install_branch(path: &Path, subversion: &mut String, prior: Option<&BuildRecord>) -> Branch {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let folder = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str());

    match folder {
        // Same mapping as a cache reload, so `custom/stable` is promoted here too
        Some("custom") => Branch::from(name.as_str()),
        Some("daily") => {
            // No qualifier in the banner means the current stable daily
            if subversion.split(' ').count() == 1 {
                subversion.push_str(" Stable");
            }
            Branch::Daily
        }
        // Relies on the archive naming `...+<branch>.<hash>...`
        Some("experimental") => match EXPERIMENTAL_TOKEN.captures(&name) {
            Some(c) => Branch::from(&c[1]),
            None => prior
                .map(|p| p.branch().clone())
                .unwrap_or(Branch::Undetermined),
        },
        Some("stable") => Branch::Stable,
        _ => Branch::Undetermined,
    }
}
