use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::fs;
use tracing::{info, warn};

/// Ids of recently published items, oldest first, persisted as one decimal
/// id per line. Only the content loop owns and mutates it.
#[derive(Debug)]
pub struct RecentPosts {
    ids: VecDeque<u64>,
    capacity: usize,
    path: PathBuf,
}

impl RecentPosts {
    /// Reads the ledger file, keeping the newest `capacity` ids. A missing
    /// file starts an empty ledger; lines that are not ids are ignored.
    pub async fn load(path: impl Into<PathBuf>, capacity: usize) -> anyhow::Result<Self> {
        let path = path.into();
        let capacity = capacity.max(1);
        let mut ledger = Self { ids: VecDeque::with_capacity(capacity + 1), capacity, path };

        if fs::try_exists(&ledger.path).await.unwrap_or(false) {
            let text = fs::read_to_string(&ledger.path).await?;
            for line in text.lines() {
                match line.trim().parse::<u64>() {
                    Ok(id) => {
                        ledger.push(id);
                    }
                    Err(_) if line.trim().is_empty() => {}
                    Err(_) => warn!(line, "skipping malformed ledger line"),
                }
            }
            info!(path = %ledger.path.display(), ids = ?ledger.ids, "loaded recent posts");
        } else {
            info!(path = %ledger.path.display(), "recent posts file not found, starting with empty history");
        }
        Ok(ledger)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }

    /// Appends `id` and persists the whole ledger before returning.
    pub async fn register(&mut self, id: u64) -> anyhow::Result<()> {
        if let Some(evicted) = self.push(id) {
            info!(id, evicted, "registered post");
        } else {
            info!(id, "registered post");
        }
        self.flush().await
    }

    /// In-memory append with FIFO eviction; returns the evicted id.
    fn push(&mut self, id: u64) -> Option<u64> {
        self.ids.push_back(id);
        if self.ids.len() > self.capacity {
            self.ids.pop_front()
        } else {
            None
        }
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let mut snapshot = String::with_capacity(self.ids.len() * 8);
        for id in &self.ids {
            snapshot.push_str(&id.to_string());
            snapshot.push('\n');
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, snapshot).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RecentPosts::load(dir.path().join("recent.txt"), 20).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn load_keeps_newest_entries_and_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent.txt");
        fs::write(&path, "1\n2\n\nnot-an-id\n3\n4\n5\n").await.unwrap();

        let ledger = RecentPosts::load(&path, 3).await.unwrap();
        assert_eq!(ledger.ids().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(!ledger.contains(1));
        assert!(ledger.contains(5));
    }

    #[tokio::test]
    async fn register_evicts_oldest_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent.txt");
        let mut ledger = RecentPosts::load(&path, 3).await.unwrap();

        for id in 10..=15 {
            ledger.register(id).await.unwrap();
            assert!(ledger.len() <= 3);
        }
        assert_eq!(ledger.ids().collect::<Vec<_>>(), vec![13, 14, 15]);
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "13\n14\n15\n");

        let reloaded = RecentPosts::load(&path, 3).await.unwrap();
        assert_eq!(reloaded.ids().collect::<Vec<_>>(), vec![13, 14, 15]);
    }

    #[test]
    fn push_reports_eviction() {
        let mut ledger = RecentPosts { ids: VecDeque::new(), capacity: 2, path: PathBuf::from("unused") };
        assert_eq!(ledger.push(1), None);
        assert_eq!(ledger.push(2), None);
        assert_eq!(ledger.push(3), Some(1));
    }
}
