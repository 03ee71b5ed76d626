//! Offline checks on a dumped `windows` value.

use std::collections::BTreeMap;
use std::fmt;
use winsync_core::{WindowEntry, WindowId};

/// Something suspicious in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// The same id appears more than once, which happens when two
    /// contexts raced on the identity counter.
    DuplicateId { id: WindowId, positions: Vec<usize> },
    /// Two windows cover part of the same screen area.
    Overlap { first: WindowId, second: WindowId },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DuplicateId { id, positions } => {
                write!(f, "duplicate id {} at positions {:?}", id, positions)
            }
            Finding::Overlap { first, second } => {
                write!(f, "windows {} and {} overlap", first, second)
            }
        }
    }
}

/// Check a snapshot for duplicate ids and overlapping windows.
///
/// Duplicates are reported first, in id order; overlaps follow in snapshot
/// order.
pub fn inspect_snapshot(windows: &[WindowEntry]) -> Vec<Finding> {
    let mut positions: BTreeMap<WindowId, Vec<usize>> = BTreeMap::new();
    for (i, win) in windows.iter().enumerate() {
        positions.entry(win.id).or_default().push(i);
    }

    let mut findings: Vec<Finding> = positions
        .into_iter()
        .filter(|(_, at)| at.len() > 1)
        .map(|(id, positions)| Finding::DuplicateId { id, positions })
        .collect();

    for (i, a) in windows.iter().enumerate() {
        for b in &windows[i + 1..] {
            if a.shape.intersects(&b.shape) {
                findings.push(Finding::Overlap {
                    first: a.id,
                    second: b.id,
                });
            }
        }
    }

    findings
}

/// One-line description of an entry.
pub fn describe(position: usize, entry: &WindowEntry) -> String {
    let s = entry.shape;
    let mut line = format!(
        "#{} id={} at ({}, {}) size {}x{}",
        position, entry.id, s.x, s.y, s.w, s.h
    );
    if !entry.meta_data.is_empty() {
        line.push_str(&format!(" meta={}", serde_json::Value::Object(entry.meta_data.clone())));
    }
    line
}
