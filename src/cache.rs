// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-process attendance cache.
//!
//! The cache holds the last known attendance document together with the
//! version token it was read or written at. Request handlers answer reads
//! from here instead of asking the store adapter every time.
//!
//! Readers always receive an immutable [`Snapshot`]. Writers build a new
//! document and swap it in as a whole, so a reader can never observe a
//! document that is only partially updated.

use crate::{
    model::{AttendanceDocument, VersionToken},
    store::{DocumentStore, Loaded},
};

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Immutable view of the cache at one point in time.
#[derive(Default, Debug, Clone)]
pub struct Snapshot {
    pub document: Arc<AttendanceDocument>,
    pub token: Option<VersionToken>,
}

impl From<Loaded> for Snapshot {
    fn from(loaded: Loaded) -> Self {
        Self {
            document: Arc::new(loaded.document),
            token: loaded.token,
        }
    }
}

/// Process-wide holder of the attendance document.
#[derive(Default, Debug)]
pub struct AttendanceCache {
    state: RwLock<Snapshot>,
}

impl AttendanceCache {
    /// Construct new cache holding target snapshot.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Initialize cache from store adapter.
    ///
    /// Starts out empty without a version token if the adapter fails, so the
    /// process can always come up.
    pub async fn initialize(store: &impl DocumentStore) -> Self {
        match store.load().await {
            Ok(loaded) => {
                info!("initial attendance document loaded");
                Self::new(loaded.into())
            }
            Err(error) => {
                warn!("starting with empty attendance document: {error}");
                Self::default()
            }
        }
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    /// Whether a version token was ever obtained.
    pub async fn is_synchronized(&self) -> bool {
        self.state.read().await.token.is_some()
    }

    /// Replace document and token wholesale.
    pub async fn replace(&self, snapshot: Snapshot) {
        *self.state.write().await = snapshot;
    }

    /// Replace only the document, keeping the current token.
    pub async fn publish(&self, document: AttendanceDocument) {
        self.state.write().await.document = Arc::new(document);
    }

    /// Record token of a successful write.
    pub async fn set_token(&self, token: Option<VersionToken>) {
        self.state.write().await.token = token;
    }
}
