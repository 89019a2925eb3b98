//! Polling watcher over the immediate subdirectories of a folder

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Change in the set of subdirectories between two ticks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(Vec<String>),
    Removed(Vec<String>),
    /// Same count, different names (usually a rename); carries the new names
    Changed(Vec<String>),
    /// The root could not be listed; no further events follow
    Failed { root: PathBuf, message: String },
}

/// Classify the difference between two listings
pub fn diff_subfolders(prev: &BTreeSet<String>, next: &BTreeSet<String>) -> Option<WatchEvent> {
    if prev == next {
        return None;
    }

    let appeared = || next.difference(prev).cloned().collect::<Vec<_>>();
    let event = if next.len() > prev.len() {
        WatchEvent::Added(appeared())
    } else if next.len() < prev.len() {
        WatchEvent::Removed(prev.difference(next).cloned().collect())
    } else {
        WatchEvent::Changed(appeared())
    };
    Some(event)
}

pub struct DirectoryWatcher {
    root: PathBuf,
    interval: Duration,
}

impl DirectoryWatcher {
    pub fn new(root: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            root: root.into(),
            interval,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Poll until cancelled, the receiver is dropped or listing fails
    pub fn run(&self, cancel: &CancelToken, sender: &flume::Sender<WatchEvent>) {
        if let Some(known) = self.baseline(sender) {
            self.poll(known, cancel, sender);
        }
    }

    /// Run on a background thread. The baseline listing is taken before
    /// returning, so changes made afterwards are always reported.
    pub fn spawn(self, cancel: CancelToken) -> (flume::Receiver<WatchEvent>, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let known = self.baseline(&tx);
        let handle = thread::spawn(move || {
            if let Some(known) = known {
                self.poll(known, &cancel, &tx);
            }
        });
        (rx, handle)
    }

    fn baseline(&self, sender: &flume::Sender<WatchEvent>) -> Option<BTreeSet<String>> {
        match list_subfolders(&self.root) {
            Ok(known) => Some(known),
            Err(e) => {
                self.fail(sender, e);
                None
            }
        }
    }

    fn poll(
        &self,
        mut known: BTreeSet<String>,
        cancel: &CancelToken,
        sender: &flume::Sender<WatchEvent>,
    ) {
        debug!(root = %self.root.display(), entries = known.len(), "watching");

        loop {
            thread::sleep(self.interval);
            if cancel.is_cancelled() || sender.is_disconnected() {
                debug!(root = %self.root.display(), "watcher stopped");
                return;
            }

            let next = match list_subfolders(&self.root) {
                Ok(next) => next,
                Err(e) => {
                    self.fail(sender, e);
                    return;
                }
            };

            if let Some(event) = diff_subfolders(&known, &next) {
                debug!(?event, "library folder changed");
                if sender.send(event).is_err() {
                    return;
                }
            }
            known = next;
        }
    }

    fn fail(&self, sender: &flume::Sender<WatchEvent>, error: io::Error) {
        warn!(root = %self.root.display(), error = %error, "cannot list watched folder");
        let _ = sender.send(WatchEvent::Failed {
            root: self.root.clone(),
            message: error.to_string(),
        });
    }
}

fn list_subfolders(root: &Path) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        // Follows symlinks; a dangling link is not a subfolder
        if entry.path().is_dir() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn added() {
        assert_eq!(
            diff_subfolders(&set(&["a", "b"]), &set(&["a", "b", "c"])),
            Some(WatchEvent::Added(vec!["c".into()]))
        );
    }

    #[test]
    fn removed() {
        assert_eq!(
            diff_subfolders(&set(&["a", "b", "c"]), &set(&["a", "c"])),
            Some(WatchEvent::Removed(vec!["b".into()]))
        );
    }

    #[test]
    fn same_count_different_names_is_a_change() {
        assert_eq!(
            diff_subfolders(&set(&["a", "b"]), &set(&["a", "c"])),
            Some(WatchEvent::Changed(vec!["c".into()]))
        );
    }

    #[test]
    fn identical_listing_is_silent() {
        assert_eq!(diff_subfolders(&set(&["a", "b"]), &set(&["a", "b"])), None);
        assert_eq!(diff_subfolders(&set(&[]), &set(&[])), None);
    }

    #[test]
    fn files_are_not_subfolders() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("b.txt"), "").unwrap();
        assert_eq!(list_subfolders(temp.path()).unwrap(), set(&["a"]));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_folders_are_subfolders() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("real");
        let root = temp.path().join("lib");
        fs::create_dir(&real).unwrap();
        fs::create_dir(&root).unwrap();
        std::os::unix::fs::symlink(&real, root.join("linked")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("nowhere"), root.join("dangling")).unwrap();

        assert_eq!(list_subfolders(&root).unwrap(), set(&["linked"]));
    }

    #[test]
    fn reports_new_and_removed_folders() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();

        let cancel = CancelToken::new();
        let watcher = DirectoryWatcher::new(temp.path(), Duration::from_millis(20));
        let (events, handle) = watcher.spawn(cancel.clone());

        fs::create_dir(temp.path().join("b")).unwrap();
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, WatchEvent::Added(vec!["b".into()]));

        fs::remove_dir(temp.path().join("a")).unwrap();
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, WatchEvent::Removed(vec!["a".into()]));

        cancel.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn missing_root_is_terminal() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("gone");

        let watcher = DirectoryWatcher::new(&root, Duration::from_millis(10));
        let (events, handle) = watcher.spawn(CancelToken::new());
        handle.join().unwrap();

        let received: Vec<_> = events.drain().collect();
        assert_eq!(received.len(), 1);
        assert!(matches!(&received[0], WatchEvent::Failed { root: r, .. } if *r == root));
    }

    #[test]
    fn unreadable_root_ends_run() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("library");
        fs::create_dir(&root).unwrap();

        let (tx, rx) = flume::unbounded();
        let watcher = DirectoryWatcher::new(&root, Duration::from_millis(10));
        fs::remove_dir(&root).unwrap();
        watcher.run(&CancelToken::new(), &tx);

        assert!(matches!(rx.try_recv(), Ok(WatchEvent::Failed { .. })));
        assert!(rx.try_recv().is_err());
    }
}
