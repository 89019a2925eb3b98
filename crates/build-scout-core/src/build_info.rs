//! Normalized build record
//!
//! One [`BuildRecord`] describes a single build artifact, whether it was
//! scraped from a download page or read from an installed build.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Version prefixes of long-term-support releases
pub const LTS_TAGS: &[&str] = &["2.83", "2.93", "3.3", "3.7"];

static CANDIDATE_QUALIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\brelease\b|rc\d*\b)").unwrap());
static QUALIFIER_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z ]+").unwrap());

/// Release branch a build belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Branch {
    Stable,
    Lts,
    Daily,
    /// Experimental branch, patch, or custom folder name
    Named(String),
    /// Branch could not be determined (stored as `null`)
    #[default]
    Undetermined,
}

impl Branch {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Stable => Some("stable"),
            Self::Lts => Some("lts"),
            Self::Daily => Some("daily"),
            Self::Named(name) => Some(name),
            Self::Undetermined => None,
        }
    }
}

impl From<&str> for Branch {
    fn from(s: &str) -> Self {
        match s {
            "" => Self::Undetermined,
            "stable" => Self::Stable,
            "lts" => Self::Lts,
            "daily" => Self::Daily,
            other => Self::Named(other.to_string()),
        }
    }
}

impl From<Option<String>> for Branch {
    fn from(value: Option<String>) -> Self {
        value.as_deref().map(Branch::from).unwrap_or(Self::Undetermined)
    }
}

impl From<Branch> for Option<String> {
    fn from(branch: Branch) -> Self {
        branch.as_str().map(str::to_string)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().unwrap_or("unknown"))
    }
}

/// Collapse release-candidate qualifiers into a single ` Candidate ` marker
pub fn normalize_subversion(subversion: &str) -> String {
    if !CANDIDATE_QUALIFIER.is_match(subversion) {
        return subversion.to_string();
    }
    QUALIFIER_WORDS
        .replace_all(subversion, " Candidate ")
        .trim_end()
        .to_string()
}

/// Metadata of one build artifact
#[derive(Debug, Clone)]
pub struct BuildRecord {
    link: String,
    subversion: String,
    build_hash: Option<String>,
    commit_time: String,
    branch: Branch,
    custom_name: String,
    is_favorite: bool,
    platform: Platform,
}

impl BuildRecord {
    /// Version of the on-disk `.blinfo` layout
    pub const SCHEMA_VERSION: &'static str = "1.2";

    /// Build a record, normalizing the version text and promoting LTS
    /// releases. Promotion happens here only.
    pub fn new(
        link: impl Into<String>,
        subversion: &str,
        build_hash: Option<String>,
        commit_time: impl Into<String>,
        branch: Branch,
    ) -> Self {
        let subversion = normalize_subversion(subversion);

        let branch = if branch == Branch::Stable
            && LTS_TAGS.iter().any(|tag| subversion.starts_with(tag))
        {
            Branch::Lts
        } else {
            branch
        };

        Self {
            link: link.into(),
            subversion,
            build_hash,
            commit_time: commit_time.into(),
            branch,
            custom_name: String::new(),
            is_favorite: false,
            platform: Platform::current(),
        }
    }

    /// Set user-assigned state
    pub fn with_user_state(mut self, custom_name: impl Into<String>, is_favorite: bool) -> Self {
        self.custom_name = custom_name.into();
        self.is_favorite = is_favorite;
        self
    }

    /// Carry user-assigned state forward from a previous record
    pub fn with_user_state_of(self, prior: Option<&BuildRecord>) -> Self {
        match prior {
            Some(prior) => self.with_user_state(prior.custom_name.clone(), prior.is_favorite),
            None => self,
        }
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn subversion(&self) -> &str {
        &self.subversion
    }

    pub fn build_hash(&self) -> Option<&str> {
        self.build_hash.as_deref()
    }

    pub fn commit_time(&self) -> &str {
        &self.commit_time
    }

    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    pub fn custom_name(&self) -> &str {
        &self.custom_name
    }

    pub fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Name shown to the user: the custom name when set, else the version
    pub fn display_name(&self) -> &str {
        if self.custom_name.is_empty() {
            &self.subversion
        } else {
            &self.custom_name
        }
    }
}

/// Weak equality used for de-duplication: build hashes when both sides
/// have one, version text otherwise.
impl PartialEq for BuildRecord {
    fn eq(&self, other: &Self) -> bool {
        match (&self.build_hash, &other.build_hash) {
            (Some(a), Some(b)) => a == b,
            _ => self.subversion == other.subversion,
        }
    }
}

/// Compare two possibly absent records; absence never matches.
pub fn same_build(a: Option<&BuildRecord>, b: Option<&BuildRecord>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subversion: &str, hash: Option<&str>, branch: Branch) -> BuildRecord {
        BuildRecord::new(
            "https://example.com/b.zip",
            subversion,
            hash.map(str::to_string),
            "21-Oct-15-07:28",
            branch,
        )
    }

    #[test]
    fn candidate_qualifiers_collapse() {
        assert_eq!(normalize_subversion("4.0 release candidate"), "4.0 Candidate");
        assert_eq!(normalize_subversion("2.93.0 RC"), "2.93.0 Candidate");
        assert_eq!(normalize_subversion("2.80rc1"), "2.80 Candidate 1");
    }

    #[test]
    fn plain_versions_untouched() {
        assert_eq!(normalize_subversion("3.0.0 Alpha"), "3.0.0 Alpha");
        assert_eq!(normalize_subversion("2.93.1"), "2.93.1");
        // Already normalized text stays stable on reload
        assert_eq!(normalize_subversion("4.0 Candidate"), "4.0 Candidate");
    }

    #[test]
    fn stable_lts_prefix_is_promoted() {
        assert_eq!(*record("3.3.1", None, Branch::Stable).branch(), Branch::Lts);
        assert_eq!(*record("2.93.4", None, Branch::Stable).branch(), Branch::Lts);
        assert_eq!(*record("3.4.0", None, Branch::Stable).branch(), Branch::Stable);
    }

    #[test]
    fn only_stable_is_promoted() {
        assert_eq!(*record("3.3.1", None, Branch::Daily).branch(), Branch::Daily);
    }

    #[test]
    fn equal_hashes_win_over_other_fields() {
        let a = record("3.0.0", Some("abcdef123456"), Branch::Daily);
        let b = record("2.93.0", Some("abcdef123456"), Branch::Stable);
        assert_eq!(a, b);

        let c = record("3.0.0", Some("111111111111"), Branch::Daily);
        assert_ne!(a, c);
    }

    #[test]
    fn missing_hash_falls_back_to_subversion() {
        let a = record("3.0.0 Alpha", None, Branch::Daily);
        let b = record("3.0.0 Alpha", Some("abcdef123456"), Branch::Named("x".into()));
        assert_eq!(a, b);

        let c = record("3.0.1 Alpha", None, Branch::Daily);
        assert_ne!(a, c);
    }

    #[test]
    fn absent_records_never_match() {
        let a = record("3.0.0", None, Branch::Daily);
        assert!(!same_build(None, None));
        assert!(!same_build(Some(&a), None));
        assert!(same_build(Some(&a), Some(&a.clone())));
    }

    #[test]
    fn user_state_is_carried_forward() {
        let prior = record("3.0.0", None, Branch::Daily).with_user_state("mine", true);
        let next = record("3.0.1", None, Branch::Daily).with_user_state_of(Some(&prior));
        assert_eq!(next.custom_name(), "mine");
        assert!(next.is_favorite());
        assert_eq!(next.display_name(), "mine");
    }

    #[test]
    fn branch_string_mapping() {
        assert_eq!(Branch::from("stable"), Branch::Stable);
        assert_eq!(Branch::from("cycles-x"), Branch::Named("cycles-x".into()));
        assert_eq!(Branch::from(None::<String>), Branch::Undetermined);
        assert_eq!(Option::<String>::from(Branch::Lts).as_deref(), Some("lts"));
        assert_eq!(Option::<String>::from(Branch::Undetermined), None);
    }

    #[test]
    fn branch_json_uses_null_sentinel() {
        let json = serde_json::to_string(&Branch::Undetermined).unwrap();
        assert_eq!(json, "null");
        let branch: Branch = serde_json::from_str("\"daily\"").unwrap();
        assert_eq!(branch, Branch::Daily);
    }
}
