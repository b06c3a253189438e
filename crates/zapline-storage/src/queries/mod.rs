// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions over a [`Database`](crate::Database).

pub mod contacts;
pub mod conversations;
pub mod merge;
pub mod messages;

/// `?{start}, ?{start+1}, ...` for `count` positional parameters.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
