// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Attendance service.
//!
//! Three operations make up the whole of Rollcall: reading one slot, saving
//! one slot, and building the weekly matrix. All of them are answered from
//! the [`AttendanceCache`]. Only saving talks to the store adapter on every
//! call.
//!
//! # Saving
//!
//! A save refreshes the cache from the store adapter, applies the new slot,
//! and writes the whole document back along with the freshest version token
//! it knows of. The refresh is best effort. If it fails, the save carries on
//! with whatever the cache holds, and the store adapter decides whether that
//! is still acceptable.
//!
//! Saves are serialized. Two saves never interleave between refresh and
//! write, so one can never drop the other's change from memory.
//!
//! A failed write is not rolled back. The cache keeps showing the attempted
//! change until the next successful refresh replaces it.

use crate::{
    cache::{AttendanceCache, Snapshot},
    matrix::build_matrix,
    model::{AttendanceMatrixRow, Period, SlotKey, SlotRecord},
    store::DocumentStore,
};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Attendance operations over a cache and a store adapter.
#[derive(Debug)]
pub struct AttendanceService<S>
where
    S: DocumentStore,
{
    store: S,
    cache: AttendanceCache,
    write_lock: Mutex<()>,
}

impl<S> AttendanceService<S>
where
    S: DocumentStore,
{
    /// Construct new service around an existing cache.
    pub fn new(store: S, cache: AttendanceCache) -> Self {
        Self {
            store,
            cache,
            write_lock: Mutex::new(()),
        }
    }

    /// Construct new service, loading the cache from the store adapter.
    pub async fn open(store: S) -> Self {
        let cache = AttendanceCache::initialize(&store).await;
        Self::new(store, cache)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current cache contents.
    pub async fn snapshot(&self) -> Snapshot {
        self.cache.snapshot().await
    }

    /// Marks recorded for target date and period.
    ///
    /// Performs one best effort refresh if the cache never synchronized with
    /// a versioned store adapter. Never fails, anything unknown is empty.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_slot(&self, date: &str, period: Period) -> SlotRecord {
        if self.store.is_versioned() && !self.cache.is_synchronized().await {
            self.catch_up().await;
        }

        self.cache
            .snapshot()
            .await
            .document
            .slot(SlotKey::raw(date, period))
            .to_vec()
    }

    /// Replace marks recorded for target slot and persist the document.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Store`] with
    ///   [`StoreError::ConfigurationMissing`](crate::store::StoreError::ConfigurationMissing)
    ///   before touching cache or network if the store adapter cannot write.
    /// - Return [`ServiceError::Store`] if writing the document fails. The
    ///   cache keeps the attempted change in that case.
    #[instrument(skip(self, records), fields(slot = %key, marks = records.len()), level = "debug")]
    pub async fn save_slot(&self, key: &SlotKey, records: SlotRecord) -> Result<()> {
        self.store.verify()?;

        let _guard = self.write_lock.lock().await;

        match self.store.load().await {
            Ok(loaded) => self.cache.replace(loaded.into()).await,
            Err(error) => warn!("refresh before save failed, using cached document: {error}"),
        }

        let snapshot = self.cache.snapshot().await;
        let mut document = (*snapshot.document).clone();
        document.set_slot(key, records);
        self.cache.publish(document.clone()).await;

        let token = self.store.store(&document, snapshot.token.as_ref()).await?;
        self.cache.set_token(token).await;
        info!("saved slot {key}");

        Ok(())
    }

    /// Attendance matrix of target week, built from the cache alone.
    pub async fn build_matrix(&self, week_dates: &[impl AsRef<str>]) -> Vec<AttendanceMatrixRow> {
        build_matrix(&self.cache.snapshot().await.document, week_dates)
    }

    async fn catch_up(&self) {
        // INVARIANT: Never race a save, its result is fresher than ours.
        let Ok(_guard) = self.write_lock.try_lock() else {
            debug!("save in progress, answering from cache");
            return;
        };

        match self.store.load().await {
            Ok(loaded) => self.cache.replace(loaded.into()).await,
            Err(error) => debug!("catch up read failed, answering from cache: {error}"),
        }
    }
}

/// All possible error types of attendance operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Slot address is malformed.
    #[error(transparent)]
    Slot(#[from] crate::model::SlotError),

    /// Store adapter failed.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

/// Friendly result alias :3
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{AttendanceDocument, StudentMark, VersionToken},
        store::{Loaded, StoreError},
    };
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// In-memory versioned store whose revision can be bumped behind the
    /// service's back.
    #[derive(Default)]
    struct MemoryStore {
        state: std::sync::Mutex<(AttendanceDocument, u64)>,
        loads: AtomicUsize,
        stores: AtomicUsize,
        fail_loads: bool,
        bump_after_load: std::sync::atomic::AtomicBool,
        configured: bool,
    }

    impl MemoryStore {
        fn configured() -> Self {
            Self {
                configured: true,
                ..Self::default()
            }
        }

        fn revision(&self) -> u64 {
            self.state.lock().unwrap().1
        }

        fn document(&self) -> AttendanceDocument {
            self.state.lock().unwrap().0.clone()
        }
    }

    impl DocumentStore for MemoryStore {
        async fn load(&self) -> crate::store::Result<Loaded> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_loads {
                return Err(StoreError::Transport("offline".into()));
            }

            let mut state = self.state.lock().unwrap();
            let loaded = Loaded {
                document: state.0.clone(),
                token: (state.1 > 0).then(|| VersionToken::new(state.1.to_string())),
            };
            if self.bump_after_load.swap(false, Ordering::SeqCst) {
                state.1 += 1;
            }

            Ok(loaded)
        }

        async fn store(
            &self,
            document: &AttendanceDocument,
            expected: Option<&VersionToken>,
        ) -> crate::store::Result<Option<VersionToken>> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.lock().unwrap();
            let current = (state.1 > 0).then(|| VersionToken::new(state.1.to_string()));
            if expected != current.as_ref() {
                return Err(StoreError::Conflict);
            }

            state.0 = document.clone();
            state.1 += 1;
            Ok(Some(VersionToken::new(state.1.to_string())))
        }

        fn verify(&self) -> crate::store::Result<()> {
            if self.configured {
                Ok(())
            } else {
                Err(StoreError::ConfigurationMissing { what: "repository" })
            }
        }

        fn is_versioned(&self) -> bool {
            true
        }
    }

    fn key(date: &str, period: u8) -> SlotKey {
        SlotKey::new(date, Period::new(period).unwrap()).unwrap()
    }

    fn marks() -> SlotRecord {
        vec![StudentMark::new("Bob", true), StudentMark::new("Alice", false)]
    }

    #[tokio::test]
    async fn never_written_slot_is_empty() {
        let service = AttendanceService::open(MemoryStore::configured()).await;

        let result = service.get_slot("2024-01-01", Period::new(1).unwrap()).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn save_then_get_round_trip() -> anyhow::Result<()> {
        let service = AttendanceService::open(MemoryStore::configured()).await;

        service.save_slot(&key("2024-01-01", 1), marks()).await?;
        let result = service.get_slot("2024-01-01", Period::new(1)?).await;

        assert_eq!(result, marks());
        assert_eq!(service.store().revision(), 1);
        assert_eq!(service.snapshot().await.token, Some(VersionToken::new("1")));

        Ok(())
    }

    #[tokio::test]
    async fn save_refreshes_before_writing() -> anyhow::Result<()> {
        let store = MemoryStore::configured();
        let service = AttendanceService::open(store).await;
        service.save_slot(&key("2024-01-01", 1), marks()).await?;

        // Someone else writes a different slot directly to the store.
        {
            let mut state = service.store().state.lock().unwrap();
            state.0.attendance.insert(
                "2024-01-02_3".into(),
                vec![StudentMark::new("Carl", true)],
            );
            state.1 += 1;
        }

        service
            .save_slot(&key("2024-01-01", 2), vec![StudentMark::new("Dana", true)])
            .await?;

        let document = service.store().document();
        assert_eq!(document.slot("2024-01-01_1"), marks().as_slice());
        assert_eq!(document.slot("2024-01-02_3"), [StudentMark::new("Carl", true)]);
        assert_eq!(document.slot("2024-01-01_2"), [StudentMark::new("Dana", true)]);

        Ok(())
    }

    #[tokio::test]
    async fn stale_token_reports_conflict_and_keeps_attempt() -> anyhow::Result<()> {
        let service = AttendanceService::open(MemoryStore::configured()).await;
        service.save_slot(&key("2024-01-01", 1), marks()).await?;

        // Another writer lands between the refresh and the write.
        service
            .store()
            .bump_after_load
            .store(true, Ordering::SeqCst);
        let attempt = vec![StudentMark::new("Eve", true)];
        let result = service.save_slot(&key("2024-01-01", 1), attempt.clone()).await;

        assert!(matches!(result, Err(ServiceError::Store(StoreError::Conflict))));
        assert_eq!(service.get_slot("2024-01-01", Period::new(1)?).await, attempt);
        assert_eq!(service.store().document().slot("2024-01-01_1"), marks().as_slice());

        Ok(())
    }

    #[tokio::test]
    async fn missing_configuration_fails_fast() {
        let service = AttendanceService::open(MemoryStore::default()).await;
        let loads_before = service.store().loads.load(Ordering::SeqCst);

        let result = service.save_slot(&key("2024-01-01", 1), marks()).await;

        assert!(matches!(
            result,
            Err(ServiceError::Store(StoreError::ConfigurationMissing { .. }))
        ));
        assert_eq!(service.store().loads.load(Ordering::SeqCst), loads_before);
        assert_eq!(service.store().stores.load(Ordering::SeqCst), 0);
        assert_eq!(*service.snapshot().await.document, AttendanceDocument::default());
    }

    #[tokio::test]
    async fn failed_refresh_still_saves_from_cache() -> anyhow::Result<()> {
        let store = MemoryStore {
            fail_loads: true,
            configured: true,
            ..MemoryStore::default()
        };
        let service = AttendanceService::open(store).await;

        service.save_slot(&key("2024-01-01", 1), marks()).await?;
        assert_eq!(service.store().document().slot("2024-01-01_1"), marks().as_slice());

        Ok(())
    }

    #[tokio::test]
    async fn unsynchronized_read_catches_up() -> anyhow::Result<()> {
        let store = MemoryStore::configured();
        {
            let mut state = store.state.lock().unwrap();
            state.0.attendance.insert("2024-01-01_1".into(), marks());
        }
        let service = AttendanceService::new(store, AttendanceCache::default());

        // Revision zero hands out no token, so every read tries again.
        let result = service.get_slot("2024-01-01", Period::new(1)?).await;
        assert_eq!(result, marks());
        service.get_slot("2024-01-01", Period::new(1)?).await;
        assert_eq!(service.store().loads.load(Ordering::SeqCst), 2);

        service.save_slot(&key("2024-01-01", 2), marks()).await?;
        let loads = service.store().loads.load(Ordering::SeqCst);
        service.get_slot("2024-01-01", Period::new(1)?).await;
        assert_eq!(service.store().loads.load(Ordering::SeqCst), loads);

        Ok(())
    }

    #[tokio::test]
    async fn matrix_reads_cache_only() -> anyhow::Result<()> {
        let service = AttendanceService::open(MemoryStore::configured()).await;
        service.save_slot(&key("2024-01-01", 1), marks()).await?;
        service
            .save_slot(&key("2024-01-01", 2), vec![StudentMark::new("Alice", true)])
            .await?;
        let loads = service.store().loads.load(Ordering::SeqCst);

        let week = ["2024-01-01"];
        let first = service.build_matrix(&week).await;
        let second = service.build_matrix(&week).await;

        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|row| row.name.as_str()).collect::<Vec<_>>(),
            ["Alice", "Bob"]
        );
        assert_eq!(first[0].slots.get("0_1"), Some(&false));
        assert_eq!(first[0].slots.get("0_2"), Some(&true));
        assert_eq!(service.store().loads.load(Ordering::SeqCst), loads);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_do_not_lose_changes() -> anyhow::Result<()> {
        let service = Arc::new(AttendanceService::open(MemoryStore::configured()).await);

        let saves = (1..=8u8).map(|period| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .save_slot(
                        &key("2024-01-01", period),
                        vec![StudentMark::new(format!("Student {period}"), true)],
                    )
                    .await
            })
        });

        for result in futures::future::join_all(saves).await {
            result??;
        }

        let document = service.store().document();
        assert_eq!(document.attendance.len(), 8);
        assert_eq!(service.store().revision(), 8);

        Ok(())
    }
}
