//! Open-row bookkeeping for scheduling heuristics.
//!
//! Maps a bank-equivalent address prefix to the row it currently holds open,
//! how many column accesses that row has served, and when it was last
//! touched. Row policies and the capped FR-FCFS scheduler read this; the
//! controller updates it on every issued command.

use std::collections::BTreeMap;

use crate::dram::spec::DramSpec;

/// Per-open-row bookkeeping entry.
#[derive(Clone, Copy, Debug)]
pub struct RowEntry {
    /// The open row index.
    pub row: i64,
    /// Column accesses served by this row since activation.
    pub hits: i64,
    /// Cycle of the most recent activation or access.
    pub timestamp: i64,
}

/// Table of open rows, keyed by the address prefix above the row level.
#[derive(Debug)]
pub struct RowTable {
    /// Open-row entries; deterministic iteration order for victim scans.
    pub table: BTreeMap<Vec<i64>, RowEntry>,
    row_level: usize,
}

impl RowTable {
    /// Creates a table for a hierarchy whose Row level sits at `row_level`.
    pub fn new(row_level: usize) -> Self {
        Self {
            table: BTreeMap::new(),
            row_level,
        }
    }

    /// Applies the effect of an issued command.
    pub fn update<T: DramSpec>(&mut self, spec: &T, cmd: T::Command, addr_vec: &[i64], clk: i64) {
        let key = addr_vec[..self.row_level].to_vec();
        if spec.is_opening(cmd) {
            self.table.insert(
                key.clone(),
                RowEntry {
                    row: addr_vec[self.row_level],
                    hits: 0,
                    timestamp: clk,
                },
            );
        }
        if spec.is_accessing(cmd) {
            if let Some(entry) = self.table.get_mut(&key) {
                entry.hits += 1;
                entry.timestamp = clk;
            }
        }
        if spec.is_closing(cmd) {
            let scope = spec.scope(cmd);
            if scope + 1 < self.row_level {
                // Rank-scoped precharge closes every bank underneath it.
                self.table.retain(|k, _| k[..=scope] != key[..=scope]);
            } else {
                self.table.remove(&key);
            }
        }
    }

    /// Hit count of the open row at the prefix of `addr_vec`, or -1 when no
    /// row is open there. With `to_opened_row`, the open row must also be
    /// the one `addr_vec` names.
    pub fn get_hits(&self, addr_vec: &[i64], to_opened_row: bool) -> i64 {
        let key = &addr_vec[..self.row_level];
        match self.table.get(key) {
            Some(entry) if !to_opened_row || entry.row == addr_vec[self.row_level] => entry.hits,
            _ => -1,
        }
    }

    /// Number of open rows tracked.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when no rows are open.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
