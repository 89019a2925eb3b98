//! Host platform abstraction
//!
//! Everything that varies by operating system lives in [`PlatformProfile`]:
//! - Blender executable location inside a build directory
//! - Locale pinned for timestamp handling
//! - Archive link pattern used when scraping download pages
//! - Build-variant labelling (architecture suffix on macOS)
//!
//! A profile is built once and shared; components never re-dispatch on
//! [`Platform`] themselves.

use std::path::{Path, PathBuf};
use std::sync::Once;

use regex::Regex;

/// Host operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    /// Anything else, carrying the raw `std::env::consts::OS` value
    Other(&'static str),
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    fn from_os(os: &'static str) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            other => Self::Other(other),
        }
    }

    /// Get platform name for display
    pub fn name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::MacOs => "macOS",
            Self::Other(os) => os,
        }
    }

    /// Long description, e.g. `Linux unix x86_64`
    pub fn describe(&self) -> String {
        format!(
            "{} {} {}",
            self.name(),
            std::env::consts::FAMILY,
            std::env::consts::ARCH
        )
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" | "win32" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::MacOs),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

/// Locale every timestamp is interpreted in.
///
/// chrono renders `%a`/`%b` with fixed English tables, so parsing and
/// formatting never depend on the host locale; the locale is still pinned
/// once per process and exported to probed executables.
pub fn pin_locale(profile: &PlatformProfile) {
    static PINNED: Once = Once::new();
    PINNED.call_once(|| {
        tracing::debug!(locale = profile.locale(), "pinned timestamp locale");
    });
}

/// Platform-specific constants and patterns, built once per process
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    platform: Platform,
    executable: &'static str,
    locale: &'static str,
    archive_link: Regex,
    /// Links containing this token after the archive marker are checksums
    checksum_marker: Option<&'static str>,
}

impl PlatformProfile {
    /// Profile of the running host
    pub fn current() -> Self {
        Self::for_platform(Platform::current())
    }

    pub fn for_platform(platform: Platform) -> Self {
        // Patterns are literals; a failure here is a programming error.
        let pattern = |p: &str| Regex::new(p).expect("archive link pattern");

        match platform {
            Platform::Windows => Self {
                platform,
                executable: "blender.exe",
                locale: "eng_usa",
                archive_link: pattern(r"blender-.+win.+64.+zip$"),
                checksum_marker: None,
            },
            Platform::MacOs => Self {
                platform,
                executable: "Blender/Blender.app/Contents/MacOS/Blender",
                locale: "en_US.UTF-8",
                archive_link: pattern(r"blender-.+(?i:macos|darwin).+dmg$"),
                checksum_marker: None,
            },
            Platform::Linux | Platform::Other(_) => Self {
                platform,
                executable: "blender",
                locale: "en_US.UTF-8",
                archive_link: pattern(r"blender-.+lin.+64.+tar"),
                checksum_marker: Some("sha256"),
            },
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Executable path relative to a build directory
    pub fn executable(&self) -> &'static str {
        self.executable
    }

    /// Absolute executable path for a build directory
    pub fn executable_in(&self, build_dir: &Path) -> PathBuf {
        build_dir.join(self.executable)
    }

    pub fn locale(&self) -> &'static str {
        self.locale
    }

    /// Whether `href` names a build archive for this platform
    pub fn is_archive_link(&self, href: &str) -> bool {
        let Some(found) = self.archive_link.find(href) else {
            return false;
        };
        match self.checksum_marker {
            Some(marker) => !href[found.end()..].contains(marker),
            None => true,
        }
    }

    /// Build-variant label for a link, with an architecture suffix on macOS
    pub fn variant_label(&self, label: &str, link: &str) -> String {
        if self.platform != Platform::MacOs {
            return label.to_string();
        }
        if link.contains("arm64") {
            format!("{} │ Arm", label)
        } else if link.contains("x86_64") {
            format!("{} │ Intel", label)
        } else {
            label.to_string()
        }
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_from_str() {
        assert_eq!("linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::MacOs);
        assert_eq!("Windows".parse::<Platform>().unwrap(), Platform::Windows);
        assert!("plan9".parse::<Platform>().is_err());
    }

    #[test]
    fn unknown_os_falls_back_to_linux_conventions() {
        let profile = PlatformProfile::for_platform(Platform::from_os("freebsd"));
        assert_eq!(profile.executable(), "blender");
        assert_eq!(profile.platform().name(), "freebsd");
    }

    #[test]
    fn windows_archive_links() {
        let profile = PlatformProfile::for_platform(Platform::Windows);
        assert!(profile.is_archive_link("blender-2.93.1-windows-x64.zip"));
        assert!(!profile.is_archive_link("blender-2.93.1-windows-x64.msi"));
        assert!(!profile.is_archive_link("blender-2.93.1-linux-x64.tar.xz"));
    }

    #[test]
    fn linux_archive_links_reject_checksums() {
        let profile = PlatformProfile::for_platform(Platform::Linux);
        assert!(profile.is_archive_link("blender-2.93.1-linux-x64.tar.xz"));
        assert!(!profile.is_archive_link("blender-2.93.1-linux-x64.tar.xz.sha256"));
        assert!(!profile.is_archive_link("blender-2.93.1-windows-x64.zip"));
    }

    #[test]
    fn macos_archive_links() {
        let profile = PlatformProfile::for_platform(Platform::MacOs);
        assert!(profile.is_archive_link("blender-3.0.0-macos-arm64.dmg"));
        assert!(profile.is_archive_link("blender-2.83.0-macOS.dmg"));
        assert!(!profile.is_archive_link("blender-3.0.0-macos-arm64.dmg.sha256"));
    }

    #[test]
    fn variant_label_only_suffixed_on_macos() {
        let mac = PlatformProfile::for_platform(Platform::MacOs);
        assert_eq!(
            mac.variant_label("cycles-x", "blender-3.0.0-macos-arm64.dmg"),
            "cycles-x │ Arm"
        );
        assert_eq!(
            mac.variant_label("cycles-x", "blender-3.0.0-macos-x86_64.dmg"),
            "cycles-x │ Intel"
        );

        let linux = PlatformProfile::for_platform(Platform::Linux);
        assert_eq!(
            linux.variant_label("cycles-x", "blender-3.0.0-linux-x86_64.tar.xz"),
            "cycles-x"
        );
    }

    #[test]
    fn executable_in_build_dir() {
        let profile = PlatformProfile::for_platform(Platform::MacOs);
        assert_eq!(
            profile.executable_in(Path::new("/lib/stable/b")),
            Path::new("/lib/stable/b/Blender/Blender.app/Contents/MacOS/Blender")
        );
    }
}
