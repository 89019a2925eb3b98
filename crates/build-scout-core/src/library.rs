//! Library folder layout
//!
//! ```text
//! <library>/
//! ├── stable/         # releases from download.blender.org
//! ├── daily/          # builder.blender.org daily builds
//! ├── experimental/   # branch and patch builds
//! └── custom/         # user-provided builds
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Subfolders of the library, one per kind of install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryFolder {
    Stable,
    Daily,
    Experimental,
    Custom,
}

impl LibraryFolder {
    pub const ALL: [LibraryFolder; 4] = [
        LibraryFolder::Stable,
        LibraryFolder::Daily,
        LibraryFolder::Experimental,
        LibraryFolder::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Daily => "daily",
            Self::Experimental => "experimental",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for LibraryFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LibraryFolder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown library folder: {}", s))
    }
}

/// Root of all installed builds
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn folder(&self, folder: LibraryFolder) -> PathBuf {
        self.root.join(folder.as_str())
    }

    /// Every build directory in the library, grouped by folder, sorted
    pub fn installed_builds(&self) -> Result<Vec<(LibraryFolder, PathBuf)>> {
        let mut builds = Vec::new();
        for folder in LibraryFolder::ALL {
            for dir in list_subdirs(&self.folder(folder))? {
                builds.push((folder, dir));
            }
        }
        Ok(builds)
    }
}

fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
