// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local file system persistence.

use crate::{
    model::{AttendanceDocument, VersionToken},
    store::{parse_document, DocumentStore, Loaded, Result, StoreError},
};

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Attendance document kept in a plain JSON file.
#[derive(Clone, Debug)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// Construct new local store at target file path.
    ///
    /// Does not check if the path exists.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            source,
            path: self.path.clone(),
        }
    }
}

impl DocumentStore for LocalStore {
    /// Read attendance document from disk.
    ///
    /// A missing or blank file yields an empty document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Io`] if the file exists but cannot be read.
    /// - Return [`StoreError::Malformed`] if the file cannot be parsed.
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    async fn load(&self) -> Result<Loaded> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no attendance document yet");
                return Ok(Loaded::empty());
            }
            Err(error) => return Err(self.io_error(error)),
        };

        let document = parse_document(&data).inspect_err(|error| {
            warn!(%error, "cannot parse attendance document");
        })?;

        Ok(Loaded {
            document,
            token: None,
        })
    }

    /// Write attendance document to disk.
    ///
    /// Creates missing parent directories. The new contents are written to a
    /// sibling temporary file first and then renamed over the old document.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Io`] if any file system operation fails.
    #[instrument(skip(self, document, _expected), fields(path = %self.path.display()), level = "debug")]
    async fn store(
        &self,
        document: &AttendanceDocument,
        _expected: Option<&VersionToken>,
    ) -> Result<Option<VersionToken>> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| self.io_error(error))?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, document.to_string())
            .await
            .map_err(|error| self.io_error(error))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|error| self.io_error(error))?;
        info!("attendance document saved");

        Ok(None)
    }
}
