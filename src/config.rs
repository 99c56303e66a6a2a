// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that Rollcall uses to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # General Layout
//!
//! ```toml
//! [server]
//! port = 3000
//! static_dir = "public"
//!
//! [backend]
//! kind = "remote"
//!
//! [local]
//! path = "$XDG_DATA_HOME/rollcall/attendance.json"
//!
//! [remote]
//! api_url = "https://api.github.com"
//! repository = "owner/repo"
//! path = "data/attendance.json"
//! token = "ghp_xxxxxxxxxxxx"
//! timeout_secs = 10
//! ```
//!
//! Every section and every field is optional. Environment variables take
//! precedence over the file, see [`Settings::apply_env`].

use crate::{
    path::default_document_path,
    store::{ConfiguredStore, LocalStore, RemoteStore, StoreError},
};

use serde::{Deserialize, Serialize};
use std::{
    env,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};
use tracing::{info, warn};

/// Environment variable holding the remote credential.
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Environment variable holding the remote repository identifier.
pub const REPOSITORY_VAR: &str = "GITHUB_REPO";

/// Environment variable holding the listening port.
pub const PORT_VAR: &str = "PORT";

/// Environment variable selecting the store adapter.
pub const BACKEND_VAR: &str = "ROLLCALL_BACKEND";

/// Rollcall settings layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP server settings.
    pub server: ServerSettings,

    /// Store adapter selection.
    pub backend: BackendSettings,

    /// Local store adapter settings.
    pub local: LocalSettings,

    /// Remote store adapter settings.
    pub remote: RemoteSettings,
}

impl Settings {
    /// Override settings through process environment.
    ///
    /// Reads `PORT`, `GITHUB_TOKEN`, `GITHUB_REPO`, and `ROLLCALL_BACKEND`.
    /// Unset or empty variables leave the current value alone.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Environment`] if a variable cannot be parsed.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(port) = var(PORT_VAR) {
            self.server.port = port.parse().map_err(|_| ConfigError::Environment {
                name: PORT_VAR,
                value: port,
            })?;
        }

        if let Some(kind) = var(BACKEND_VAR) {
            self.backend.kind = kind.parse().map_err(|_| ConfigError::Environment {
                name: BACKEND_VAR,
                value: kind,
            })?;
        }

        if let Some(token) = var(TOKEN_VAR) {
            self.remote.token = Some(token);
        }

        if let Some(repository) = var(REPOSITORY_VAR) {
            self.remote.repository = Some(repository);
        }

        Ok(())
    }

    /// Construct the store adapter selected by these settings.
    ///
    /// Warns if the remote adapter is selected without a repository or a
    /// credential, since saving will not work in that case.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Store`] if the adapter cannot be constructed.
    pub fn build_store(&self) -> Result<ConfiguredStore> {
        match self.backend.kind {
            BackendKind::Local => {
                info!("using local attendance document {:?}", self.local.path.display());
                Ok(ConfiguredStore::Local(LocalStore::new(&self.local.path)))
            }
            BackendKind::Remote => {
                if !self.remote.is_complete() {
                    warn!("{TOKEN_VAR} or {REPOSITORY_VAR} not set, saving will not work");
                } else {
                    info!(
                        "using remote attendance document {}:{}",
                        self.remote.repository.as_deref().unwrap_or_default(),
                        self.remote.path
                    );
                }
                Ok(ConfiguredStore::Remote(RemoteStore::new(&self.remote)?))
            }
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every file system path.
        settings.local.path = expand(&settings.local.path)?;
        settings.server.static_dir = expand(&settings.server.static_dir)?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// HTTP server settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port to listen on.
    pub port: u16,

    /// Directory of the static frontend.
    pub static_dir: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("public"),
        }
    }
}

/// Store adapter selection.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Which store adapter to use.
    pub kind: BackendKind,
}

/// Available store adapters.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON file on the local file system.
    Local,

    /// JSON file in a remote Git repository.
    #[default]
    Remote,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(ConfigError::Environment {
                name: BACKEND_VAR,
                value: data.into(),
            }),
        }
    }
}

/// Local store adapter settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Path to the attendance document.
    pub path: PathBuf,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            path: default_document_path().unwrap_or_else(|_| PathBuf::from("attendance.json")),
        }
    }
}

/// Remote store adapter settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Base URL of the GitHub REST API.
    pub api_url: String,

    /// Repository identifier as `owner/name`.
    pub repository: Option<String>,

    /// Path of the attendance document inside the repository.
    pub path: String,

    /// Branch to commit to instead of the default branch.
    pub branch: Option<String>,

    /// Bearer credential.
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Commit message of every save.
    pub commit_message: String,

    /// Upper bound of every request in seconds.
    pub timeout_secs: u64,
}

impl RemoteSettings {
    /// Both repository and credential are present.
    pub fn is_complete(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.repository) && present(&self.token)
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            repository: None,
            path: "data/attendance.json".into(),
            branch: None,
            token: None,
            commit_message: "Update attendance list".into(),
            timeout_secs: 10,
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn expand(path: &std::path::Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Environment variable holds an unusable value.
    #[error("invalid value {value:?} for {name}")]
    Environment { name: &'static str, value: String },

    /// Store adapter cannot be constructed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
