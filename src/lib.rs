// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Attendance tracking backend.
//!
//! Rollcall records, per school day and class period, which students were
//! present. All records live in a single JSON document that is kept either
//! on the local file system or inside a remote Git repository. Request
//! handlers answer from an in-process cache and only talk to the backing
//! store when saving.
//!
//! # Architecture
//!
//! 1. [`store`] loads and writes the attendance document.
//! 2. [`cache`] keeps the last known document and its version token.
//! 3. [`service`] implements reading a slot, saving a slot, and building the
//!    weekly matrix.
//! 4. [`http`] exposes the service to browsers.

pub mod cache;
pub mod config;
pub mod http;
pub mod matrix;
pub mod model;
pub mod path;
pub mod service;
pub mod store;

pub use cache::AttendanceCache;
pub use config::Settings;
pub use model::{AttendanceDocument, AttendanceMatrixRow, Period, SlotKey, StudentMark, VersionToken};
pub use service::AttendanceService;
pub use store::{ConfiguredStore, DocumentStore};
