//! Filesystem-backed store for generated artifacts awaiting download.
//!
//! Existence of `<root>/<token>` is the whole lifecycle state: an artifact is
//! live until either a download claims it or the janitor finds it too old.
//! Both paths delete the same file and treat "already gone" as success, which
//! is all the coordination the two need.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::warn;
use uuid::Uuid;

use crate::domain::artifacts::ArtifactToken;

const PARTIAL_SUFFIX: &str = ".partial";
const CLAIM_SUFFIX: &str = ".claim";
const MAX_SAVE_ATTEMPTS: usize = 4;

/// Errors that can occur while interacting with the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("could not allocate an unused artifact token")]
    TokenExhausted,
}

/// Result of looking up a token for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The caller won the artifact; it has already been removed from the store.
    Found(Bytes),
    /// Expired, already consumed, or never existed.
    NotFound,
}

/// Tally of one janitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries this sweep deleted.
    pub removed: usize,
    /// Eligible entries whose deletion failed; they are retried next sweep.
    pub failed: usize,
    /// Directory entries that are not managed by the store.
    pub skipped: usize,
}

/// Flat directory of write-once artifacts named by their token.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durably write `data` under a fresh token.
    ///
    /// Bytes land in a `.partial` file that is renamed into place only after
    /// an fsync, so the janitor never sees a half-written artifact and the
    /// artifact's age starts at completed-write time.
    pub async fn save(&self, data: &[u8]) -> Result<ArtifactToken, ArtifactStoreError> {
        fs::create_dir_all(&self.root).await?;

        for _ in 0..MAX_SAVE_ATTEMPTS {
            let token = ArtifactToken::generate();
            let live = self.live_path(&token);
            if fs::try_exists(&live).await? {
                continue;
            }

            let partial = self.root.join(format!("{token}{PARTIAL_SUFFIX}"));
            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&partial)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            };

            let written = async {
                file.write_all(data).await?;
                file.flush().await?;
                file.sync_all().await
            }
            .await;
            drop(file);

            if let Err(err) = written {
                let _ = fs::remove_file(&partial).await;
                return Err(err.into());
            }

            if let Err(err) = fs::rename(&partial, &live).await {
                let _ = fs::remove_file(&partial).await;
                return Err(err.into());
            }

            return Ok(token);
        }

        Err(ArtifactStoreError::TokenExhausted)
    }

    /// Claim, read and delete the artifact behind `token`.
    ///
    /// The claim is an atomic rename, so among concurrent callers exactly one
    /// receives `Found`; everyone else sees `NotFound`. The file is deleted
    /// before the bytes are handed back.
    pub async fn fetch_and_delete(
        &self,
        token: &ArtifactToken,
    ) -> Result<FetchOutcome, ArtifactStoreError> {
        let live = self.live_path(token);
        let claim = self
            .root
            .join(format!("{token}.{}{CLAIM_SUFFIX}", Uuid::new_v4().simple()));

        match fs::rename(&live, &claim).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FetchOutcome::NotFound),
            Err(err) => return Err(err.into()),
        }

        let read = fs::read(&claim).await;
        if let Err(err) = fs::remove_file(&claim).await {
            if err.kind() != ErrorKind::NotFound {
                warn!(
                    target = "infra::artifacts::fetch_and_delete",
                    token = %token,
                    error = %err,
                    "failed to remove claimed artifact; janitor will reclaim it"
                );
            }
        }

        match read {
            Ok(data) => Ok(FetchOutcome::Found(Bytes::from(data))),
            // The janitor reclaimed the claim between rename and read.
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(FetchOutcome::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the artifact behind `token`. Missing artifacts are treated as success.
    pub async fn delete(&self, token: &ArtifactToken) -> Result<bool, ArtifactStoreError> {
        match fs::remove_file(self.live_path(token)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ArtifactStoreError::Io(err)),
        }
    }

    /// Completed-write time of a live artifact.
    pub async fn created_at(
        &self,
        token: &ArtifactToken,
    ) -> Result<Option<OffsetDateTime>, ArtifactStoreError> {
        match fs::metadata(self.live_path(token)).await {
            Ok(metadata) => Ok(Some(OffsetDateTime::from(metadata.modified()?))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Tokens of all live artifacts, in directory order.
    pub async fn list(&self) -> Result<Vec<ArtifactToken>, ArtifactStoreError> {
        let mut tokens = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(tokens),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if let Some(token) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ArtifactToken>().ok())
            {
                tokens.push(token);
            }
        }

        Ok(tokens)
    }

    /// Delete every managed entry at least `ttl` old.
    pub async fn delete_if_older_than(
        &self,
        ttl: Duration,
    ) -> Result<SweepReport, ArtifactStoreError> {
        self.sweep_at(ttl, OffsetDateTime::now_utc()).await
    }

    /// Sweep as if the current time were `now`.
    ///
    /// Per-entry failures are logged and counted, never propagated; only a
    /// failure to list the directory aborts the sweep.
    pub async fn sweep_at(
        &self,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<SweepReport, ArtifactStoreError> {
        let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        let mut report = SweepReport::default();

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(report),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().filter(|name| is_managed(name)) else {
                report.skipped += 1;
                continue;
            };

            let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
                Ok(modified) => OffsetDateTime::from(modified),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(
                        target = "infra::artifacts::sweep",
                        entry = name,
                        error = %err,
                        "failed to stat artifact"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            if now - modified < ttl {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => report.removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "infra::artifacts::sweep",
                        entry = name,
                        error = %err,
                        "failed to delete expired artifact"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn live_path(&self, token: &ArtifactToken) -> PathBuf {
        self.root.join(token.as_str())
    }
}

/// Live artifacts, interrupted writes and orphaned download claims.
fn is_managed(name: &str) -> bool {
    if name.parse::<ArtifactToken>().is_ok() {
        return true;
    }
    if let Some(stem) = name.strip_suffix(PARTIAL_SUFFIX) {
        return stem.parse::<ArtifactToken>().is_ok();
    }
    if let Some(stem) = name.strip_suffix(CLAIM_SUFFIX) {
        return stem
            .split_once('.')
            .is_some_and(|(token, nonce)| {
                token.parse::<ArtifactToken>().is_ok() && nonce.parse::<ArtifactToken>().is_ok()
            });
    }
    false
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use tempfile::TempDir;

    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path().join("artifacts")).expect("store");
        (dir, store)
    }

    #[tokio::test]
    async fn save_creates_missing_root() {
        let (_dir, store) = store();
        std::fs::remove_dir_all(store.root()).expect("remove root");

        let token = store.save(b"payload").await.expect("saved");
        assert!(store.root().join(token.as_str()).is_file());
    }

    #[tokio::test]
    async fn sequential_saves_yield_distinct_tokens() {
        let (_dir, store) = store();
        let mut seen = HashSet::new();
        for index in 0..64u32 {
            let token = store.save(&index.to_le_bytes()).await.expect("saved");
            assert!(seen.insert(token), "token reused");
        }
        assert_eq!(store.list().await.expect("list").len(), 64);
    }

    #[tokio::test]
    async fn first_fetch_wins_and_later_fetches_miss() {
        let (_dir, store) = store();
        let token = store.save(b"%PDF-1.4 body").await.expect("saved");

        let first = store.fetch_and_delete(&token).await.expect("fetch");
        assert_eq!(first, FetchOutcome::Found(Bytes::from_static(b"%PDF-1.4 body")));

        for _ in 0..3 {
            let again = store.fetch_and_delete(&token).await.expect("fetch");
            assert_eq!(again, FetchOutcome::NotFound);
        }
        assert!(std::fs::read_dir(store.root()).expect("read dir").next().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_fetches_have_exactly_one_winner() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let token = store.save(b"contended").await.expect("saved");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let token = token.clone();
                tokio::spawn(async move { store.fetch_and_delete(&token).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.expect("join").expect("fetch") {
                FetchOutcome::Found(bytes) => {
                    assert_eq!(bytes, Bytes::from_static(b"contended"));
                    winners += 1;
                }
                FetchOutcome::NotFound => {}
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store();
        let token = store.save(b"x").await.expect("saved");

        assert!(store.delete(&token).await.expect("first delete"));
        assert!(!store.delete(&token).await.expect("second delete"));
        assert_eq!(
            store.fetch_and_delete(&token).await.expect("fetch"),
            FetchOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn sweep_respects_ttl_boundary() {
        let (_dir, store) = store();
        let token = store.save(b"aging").await.expect("saved");
        let created = store
            .created_at(&token)
            .await
            .expect("stat")
            .expect("live artifact");
        let epsilon = time::Duration::seconds(1);

        let early = store
            .sweep_at(TTL, created + time::Duration::seconds(600) - epsilon)
            .await
            .expect("sweep");
        assert_eq!(early.removed, 0);
        assert!(store.created_at(&token).await.expect("stat").is_some());

        let late = store
            .sweep_at(TTL, created + time::Duration::seconds(600) + epsilon)
            .await
            .expect("sweep");
        assert_eq!(late.removed, 1);
        assert!(store.created_at(&token).await.expect("stat").is_none());
    }

    #[tokio::test]
    async fn sweep_continues_past_failed_deletions() {
        let (_dir, store) = store();
        let expired = [
            store.save(b"a").await.expect("saved"),
            store.save(b"b").await.expect("saved"),
            store.save(b"c").await.expect("saved"),
        ];
        // A directory under a token name cannot be removed with remove_file.
        let stuck = ArtifactToken::generate();
        std::fs::create_dir(store.root().join(stuck.as_str())).expect("mkdir");
        std::fs::write(store.root().join("README"), b"not an artifact").expect("write");

        let future = OffsetDateTime::now_utc() + time::Duration::days(1);
        let report = store.sweep_at(TTL, future).await.expect("sweep");

        assert_eq!(report.removed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        for token in &expired {
            assert!(store.created_at(token).await.expect("stat").is_none());
        }
    }

    #[tokio::test]
    async fn sweep_reclaims_orphaned_partials_and_claims() {
        let (_dir, store) = store();
        let token = ArtifactToken::generate();
        let nonce = ArtifactToken::generate();
        std::fs::write(store.root().join(format!("{token}.partial")), b"half").expect("write");
        std::fs::write(store.root().join(format!("{token}.{nonce}.claim")), b"claimed")
            .expect("write");

        let future = OffsetDateTime::now_utc() + time::Duration::days(1);
        let report = store.sweep_at(TTL, future).await.expect("sweep");
        assert_eq!(report.removed, 2);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn download_and_sweep_race_reclaims_once() {
        for _ in 0..32 {
            let (_dir, store) = store();
            let store = Arc::new(store);
            let token = store.save(b"raced").await.expect("saved");
            let future = OffsetDateTime::now_utc() + time::Duration::days(1);

            let fetcher = {
                let store = Arc::clone(&store);
                let token = token.clone();
                tokio::spawn(async move { store.fetch_and_delete(&token).await })
            };
            let sweeper = {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.sweep_at(TTL, future).await })
            };

            let fetched = fetcher.await.expect("join").expect("fetch");
            let report = sweeper.await.expect("join").expect("sweep");

            assert_eq!(report.failed, 0);
            assert!(matches!(fetched, FetchOutcome::Found(_)) || report.removed == 1);
            assert!(std::fs::read_dir(store.root()).expect("read dir").next().is_none());
        }
    }

    #[test]
    fn managed_names() {
        let token = ArtifactToken::generate();
        let nonce = ArtifactToken::generate();
        assert!(is_managed(token.as_str()));
        assert!(is_managed(&format!("{token}.partial")));
        assert!(is_managed(&format!("{token}.{nonce}.claim")));
        assert!(!is_managed("README"));
        assert!(!is_managed(&format!("{token}.claim")));
    }
}
