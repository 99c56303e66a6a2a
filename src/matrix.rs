// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Weekly attendance matrix.
//!
//! Pivot the slot oriented attendance document into one row per student,
//! where each row maps `"<dayIndex>_<period>"` to the recorded presence.
//! The day index is the position of the date inside the requested week, not
//! a weekday.

use crate::model::{AttendanceDocument, AttendanceMatrixRow, Period, SlotKey};

use std::{cmp::Ordering, collections::HashMap};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Build attendance matrix of target week.
///
/// Visits every period of every date in `week_dates`. The first mark of a
/// student creates its row, later marks add to it. Rows come back sorted by
/// name, see [`compare_names`].
pub fn build_matrix(
    document: &AttendanceDocument,
    week_dates: &[impl AsRef<str>],
) -> Vec<AttendanceMatrixRow> {
    let mut rows: Vec<AttendanceMatrixRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (day, date) in week_dates.iter().enumerate() {
        for period in Period::all() {
            for mark in document.slot(SlotKey::raw(date, period)) {
                let position = *index.entry(mark.name.clone()).or_insert_with(|| {
                    rows.push(AttendanceMatrixRow {
                        name: mark.name.clone(),
                        ..AttendanceMatrixRow::default()
                    });
                    rows.len() - 1
                });
                rows[position]
                    .slots
                    .insert(format!("{day}_{period}"), mark.present);
            }
        }
    }

    // INVARIANT: Stable sort, rows with equal names keep creation order.
    rows.sort_by(|a, b| compare_names(&a.name, &b.name));
    rows
}

/// Order student names the way a reader expects in a class list.
///
/// Compares base letters without regard to case or accents first, so that
/// "Özil" files under O. Ties are broken by accents, unaccented first, then
/// by case, lowercase first.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    letters(a)
        .cmp(letters(b))
        .then_with(|| accents(a).cmp(accents(b)))
        .then_with(|| cases(a).cmp(cases(b)))
        .then_with(|| a.cmp(b))
}

fn letters(name: &str) -> impl Iterator<Item = char> + '_ {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
}

fn accents(name: &str) -> impl Iterator<Item = char> + '_ {
    name.nfd().flat_map(char::to_lowercase)
}

fn cases(name: &str) -> impl Iterator<Item = char> + '_ {
    name.nfd().map(swap_case)
}

fn swap_case(c: char) -> char {
    if c.is_uppercase() {
        c.to_lowercase().next().unwrap_or(c)
    } else {
        c.to_uppercase().next().unwrap_or(c)
    }
}
