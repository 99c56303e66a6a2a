// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Attendance document persistence.
//!
//! Rollcall keeps all of its data in one JSON document called the
//! __attendance document__. Where that document lives is decided by a
//! __store adapter__. Two adapters exist:
//!
//! - [`LocalStore`] keeps the document in a file on the local file system.
//!   It performs no version tracking, so concurrent writers from other
//!   processes are not detected.
//! - [`RemoteStore`] keeps the document in a Git repository hosted behind
//!   the GitHub contents API. Each revision of the document is identified by
//!   its blob SHA, which doubles as the [`VersionToken`] used to reject stale
//!   writes.
//!
//! # Loading
//!
//! A document that does not exist yet is never an error. Both adapters hand
//! back an empty document and an absent version token in that case. A blank
//! document is empty as well.
//!
//! A document whose contents cannot be parsed is reported as
//! [`StoreError::Malformed`]. Readers degrade to whatever they already hold,
//! which is an empty document at startup. Writers must never mistake it for
//! an empty document, or the next write would commit every other slot away.
//!
//! # Storing
//!
//! The full document is always written in one piece. The remote adapter
//! sends the expected version token along so that the write is rejected with
//! [`StoreError::Conflict`] when somebody else changed the document since it
//! was loaded. An absent token means the document is created.

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use crate::model::{AttendanceDocument, VersionToken};

use std::{future::Future, path::PathBuf};

/// Document together with the revision it was read at.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Loaded {
    pub document: AttendanceDocument,
    pub token: Option<VersionToken>,
}

impl Loaded {
    /// Nothing stored yet.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Layer of indirection for attendance document persistence.
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch the latest attendance document and its version token.
    fn load(&self) -> impl Future<Output = Result<Loaded>> + Send;

    /// Write the full attendance document.
    ///
    /// Returns the version token of the newly written revision, if the
    /// adapter tracks revisions at all.
    fn store(
        &self,
        document: &AttendanceDocument,
        expected: Option<&VersionToken>,
    ) -> impl Future<Output = Result<Option<VersionToken>>> + Send;

    /// Check that the adapter has everything it needs to write.
    ///
    /// Performs no I/O.
    fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the adapter hands out version tokens.
    fn is_versioned(&self) -> bool {
        false
    }
}

/// Store adapter selected through configuration at startup.
#[derive(Debug)]
pub enum ConfiguredStore {
    Local(LocalStore),
    Remote(RemoteStore),
}

impl DocumentStore for ConfiguredStore {
    async fn load(&self) -> Result<Loaded> {
        match self {
            Self::Local(store) => store.load().await,
            Self::Remote(store) => store.load().await,
        }
    }

    async fn store(
        &self,
        document: &AttendanceDocument,
        expected: Option<&VersionToken>,
    ) -> Result<Option<VersionToken>> {
        match self {
            Self::Local(store) => store.store(document, expected).await,
            Self::Remote(store) => store.store(document, expected).await,
        }
    }

    fn verify(&self) -> Result<()> {
        match self {
            Self::Local(store) => store.verify(),
            Self::Remote(store) => store.verify(),
        }
    }

    fn is_versioned(&self) -> bool {
        match self {
            Self::Local(store) => store.is_versioned(),
            Self::Remote(store) => store.is_versioned(),
        }
    }
}

/// All possible error types for document persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Remote coordinates or credential were never configured.
    #[error("remote persistence is not configured: missing {what}")]
    ConfigurationMissing { what: &'static str },

    /// Backend could not be reached at all.
    #[error("cannot reach document backend")]
    Unreachable(#[source] reqwest::Error),

    /// Credential was rejected by the backend.
    #[error("credential rejected by document backend")]
    Unauthenticated,

    /// Credential cannot access the configured repository or path.
    #[error("access to {repository} denied")]
    Forbidden { repository: String },

    /// Document changed remotely since it was loaded.
    #[error("document was changed by someone else, reload and try again")]
    Conflict,

    /// Any other delivery failure.
    #[error("document backend failed: {0}")]
    Transport(String),

    /// Document contents cannot be understood.
    #[error("malformed attendance document: {0}")]
    Malformed(String),

    /// Local document file cannot be accessed.
    #[error("failed to access attendance document at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Parse raw attendance document contents.
///
/// Blank contents hold no marks and parse as an empty document.
pub(crate) fn parse_document(data: &[u8]) -> Result<AttendanceDocument> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(AttendanceDocument::default());
    }

    serde_json::from_slice(data).map_err(|error| StoreError::Malformed(error.to_string()))
}
