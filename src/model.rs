// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Attendance document layout.
//!
//! Specify the layout of the single JSON document that holds every recorded
//! slot, along with the small value types used to address it. Persistence is
//! left to the [`store`](crate::store) adapters.
//!
//! # Document Layout
//!
//! ```json
//! {
//!   "attendance": {
//!     "2024-01-01_1": [
//!       { "name": "Alice", "present": true },
//!       { "name": "Bob", "present": false }
//!     ]
//!   }
//! }
//! ```
//!
//! Each key of the `attendance` mapping is a [`SlotKey`], i.e., an ISO date
//! and a class period joined by an underscore.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Lowest class period of a school day.
pub const FIRST_PERIOD: u8 = 1;

/// Highest class period of a school day.
pub const LAST_PERIOD: u8 = 8;

/// Root persisted attendance document.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct AttendanceDocument {
    /// Every recorded slot keyed by its slot key.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attendance: BTreeMap<String, SlotRecord>,
}

impl AttendanceDocument {
    /// Marks stored under target slot, empty if nothing was recorded.
    pub fn slot(&self, key: impl AsRef<str>) -> &[StudentMark] {
        self.attendance
            .get(key.as_ref())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the marks of target slot wholesale.
    pub fn set_slot(&mut self, key: &SlotKey, records: SlotRecord) {
        self.attendance.insert(key.to_string(), records);
    }
}

impl FromStr for AttendanceDocument {
    type Err = serde_json::Error;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(data)
    }
}

impl Display for AttendanceDocument {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let data = serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?;
        fmt.write_str(data.as_str())
    }
}

// INVARIANT: The attendance mapping is never absent once loaded.
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, SlotRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered marks of one slot.
pub type SlotRecord = Vec<StudentMark>;

/// Presence flag of a single student.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StudentMark {
    /// Student name, also used as identity in the matrix.
    pub name: String,

    /// Whether the student attended.
    pub present: bool,
}

impl StudentMark {
    /// Construct new student mark.
    pub fn new(name: impl Into<String>, present: bool) -> Self {
        Self {
            name: name.into(),
            present,
        }
    }
}

/// Class period of a school day, within `1..=8`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Period(u8);

impl Period {
    /// Construct new period.
    ///
    /// # Errors
    ///
    /// - Return [`SlotError::Period`] if period is outside `1..=8`.
    pub fn new(period: u8) -> Result<Self> {
        if (FIRST_PERIOD..=LAST_PERIOD).contains(&period) {
            Ok(Self(period))
        } else {
            Err(SlotError::Period(period.to_string()))
        }
    }

    /// Every period of a school day in ascending order.
    pub fn all() -> impl Iterator<Item = Period> {
        (FIRST_PERIOD..=LAST_PERIOD).map(Period)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl FromStr for Period {
    type Err = SlotError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let period = data
            .trim()
            .parse::<u8>()
            .map_err(|_| SlotError::Period(data.into()))?;
        Self::new(period)
    }
}

impl Display for Period {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.0)
    }
}

/// Address of a slot inside the attendance document.
///
/// Formatted as `"<ISO-date>_<period>"`.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct SlotKey {
    date: String,
    period: Period,
}

impl SlotKey {
    /// Construct new slot key from a validated date and period.
    ///
    /// # Errors
    ///
    /// - Return [`SlotError::Date`] if date is not `YYYY-MM-DD`.
    pub fn new(date: impl Into<String>, period: Period) -> Result<Self> {
        let date = date.into();
        NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| SlotError::Date(date.clone()))?;

        Ok(Self { date, period })
    }

    /// Build key of arbitrary date string without validation.
    ///
    /// Used for read-only lookups, where a malformed date simply matches
    /// nothing.
    pub fn raw(date: impl AsRef<str>, period: Period) -> String {
        format!("{}_{}", date.as_ref(), period)
    }

    pub fn date(&self) -> &str {
        self.date.as_str()
    }

    pub fn period(&self) -> Period {
        self.period
    }
}

impl Display for SlotKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}_{}", self.date, self.period)
    }
}

/// Opaque identifier of a remote document revision.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for VersionToken {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.0.as_str())
    }
}

/// One student's row of the weekly attendance matrix.
#[derive(Default, Debug, PartialEq, Eq, Clone, Serialize)]
pub struct AttendanceMatrixRow {
    /// Student name.
    pub name: String,

    /// Presence keyed by `"<dayIndex>_<period>"`.
    pub slots: BTreeMap<String, bool>,
}

/// Slot addressing error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// Date is not a valid ISO calendar date.
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    Date(String),

    /// Period is not an integer within `1..=8`.
    #[error("invalid period {0:?}, expected {FIRST_PERIOD}..={LAST_PERIOD}")]
    Period(String),
}

/// Friendly result alias :3
type Result<T, E = SlotError> = std::result::Result<T, E>;
