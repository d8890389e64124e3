//! Row precharge policies.
//!
//! When the scheduler finds nothing to issue, the row policy may nominate an
//! open row to close speculatively, paying the precharge now to save a row
//! conflict later.

use crate::controller::rowtable::RowTable;
use crate::dram::node::Dram;
use crate::dram::spec::{DramSpec, LevelEnum};
use crate::request::RequestKind;

/// Row management policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicyKind {
    /// Keep rows open; never precharge speculatively (the default).
    Opened,
    /// Close any idle open row as soon as the bus is free.
    Closed,
    /// Close rows via the auto-precharge command variants.
    #[serde(alias = "closedAP")]
    ClosedAp,
    /// Close rows idle for longer than the timeout.
    Timeout,
}

/// Stateless row policy; `timeout` applies to [`RowPolicyKind::Timeout`].
#[derive(Clone, Copy, Debug)]
pub struct RowPolicy {
    /// Active policy.
    pub kind: RowPolicyKind,
    /// Idle-cycle bound for the timeout variant.
    pub timeout: i64,
}

impl Default for RowPolicy {
    fn default() -> Self {
        Self {
            kind: RowPolicyKind::Opened,
            timeout: 50,
        }
    }
}

impl RowPolicy {
    /// Creates a policy of the given kind with the default timeout.
    pub fn new(kind: RowPolicyKind) -> Self {
        Self {
            kind,
            timeout: Self::default().timeout,
        }
    }

    /// An address vector naming a row to precharge opportunistically, or
    /// empty when the policy declines.
    pub fn get_victim<T: DramSpec>(
        &self,
        channel: &Dram<T>,
        rowtable: &RowTable,
        clk: i64,
    ) -> Vec<i64> {
        let pre = channel.spec().pre_command();
        let pad = |key: &Vec<i64>| {
            let mut v = key.clone();
            v.resize(T::Level::COUNT, -1);
            v
        };
        match self.kind {
            RowPolicyKind::Opened | RowPolicyKind::ClosedAp => Vec::new(),
            RowPolicyKind::Closed => {
                for key in rowtable.table.keys() {
                    let victim = pad(key);
                    if channel.check(pre, &victim, clk) {
                        return victim;
                    }
                }
                Vec::new()
            }
            RowPolicyKind::Timeout => {
                for (key, entry) in &rowtable.table {
                    if clk - entry.timestamp < self.timeout {
                        continue;
                    }
                    let victim = pad(key);
                    if channel.check(pre, &victim, clk) {
                        return victim;
                    }
                }
                Vec::new()
            }
        }
    }

    /// Auto-precharge upgrade for a terminal command under `ClosedAp`.
    pub fn upgrade<T: DramSpec>(&self, spec: &T, kind: RequestKind, cmd: T::Command) -> T::Command {
        if self.kind == RowPolicyKind::ClosedAp && cmd == spec.translate(kind) {
            spec.autoprecharge(cmd).unwrap_or(cmd)
        } else {
            cmd
        }
    }
}
