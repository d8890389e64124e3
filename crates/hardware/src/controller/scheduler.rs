//! Request schedulers.
//!
//! A scheduler picks which queued request the controller should serve next.
//! All variants are stateless over the queue contents, the channel state
//! (for readiness and row-hit probes), and the open-row table; ties break by
//! arrival time, then insertion order.

use crate::controller::rowtable::RowTable;
use crate::dram::node::Dram;
use crate::dram::spec::DramSpec;
use crate::request::Request;

/// Scheduling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
pub enum SchedulerKind {
    /// Oldest request first, regardless of readiness.
    #[serde(rename = "FCFS")]
    Fcfs,
    /// First-ready, then oldest (the default).
    #[serde(rename = "FRFCFS")]
    Frfcfs,
    /// FR-FCFS with a bound on consecutive row hits.
    #[serde(rename = "FRFCFS_Cap", alias = "FRFCFS_CAP")]
    FrfcfsCap,
    /// FR-FCFS serving ready row hits ahead of everything else.
    #[serde(rename = "FRFCFS_PriorHit", alias = "FRFCFS_PRIORHIT")]
    FrfcfsPriorHit,
}

/// Stateless scheduler; `cap` bounds row-hit streaks for [`SchedulerKind::FrfcfsCap`].
#[derive(Clone, Copy, Debug)]
pub struct Scheduler {
    /// Active policy.
    pub kind: SchedulerKind,
    /// Row-hit streak bound for the capped variant.
    pub cap: i64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::Frfcfs,
            cap: 16,
        }
    }
}

impl Scheduler {
    /// Creates a scheduler of the given kind with the default cap.
    pub fn new(kind: SchedulerKind) -> Self {
        Self {
            kind,
            cap: Self::default().cap,
        }
    }

    /// Index of the preferred request in `q`, or `None` when the policy has
    /// no candidate this cycle.
    pub fn get_head<T: DramSpec>(
        &self,
        channel: &Dram<T>,
        rowtable: &RowTable,
        clk: i64,
        q: &[Request],
    ) -> Option<usize> {
        if q.is_empty() {
            return None;
        }
        let spec = channel.spec();
        let first_cmd = |r: &Request| channel.decode(spec.translate(r.kind), &r.addr_vec);
        let is_ready = |r: &Request| {
            let cmd = first_cmd(r);
            let addr = spec
                .alternate_addr_vec(channel, cmd, &r.addr_vec)
                .unwrap_or_else(|| r.addr_vec.clone());
            channel.check(cmd, &addr, clk)
        };
        let is_hit = |r: &Request| channel.check_row_hit(spec.translate(r.kind), &r.addr_vec);

        match self.kind {
            SchedulerKind::Fcfs => {
                let mut head = 0;
                for i in 1..q.len() {
                    if q[i].arrive < q[head].arrive {
                        head = i;
                    }
                }
                Some(head)
            }
            SchedulerKind::Frfcfs => {
                let mut head = 0;
                for i in 1..q.len() {
                    head = self.prefer_ready(q, head, i, &is_ready);
                }
                Some(head)
            }
            SchedulerKind::FrfcfsCap => {
                let capped_ready = |r: &Request| {
                    is_ready(r) && !(is_hit(r) && rowtable.get_hits(&r.addr_vec, true) > self.cap)
                };
                let mut head = 0;
                for i in 1..q.len() {
                    head = self.prefer_ready(q, head, i, &capped_ready);
                }
                Some(head)
            }
            SchedulerKind::FrfcfsPriorHit => {
                let ready_hit = |r: &Request| is_ready(r) && is_hit(r);
                let mut head = 0;
                for i in 1..q.len() {
                    head = self.prefer_ready(q, head, i, &ready_hit);
                }
                if ready_hit(&q[head]) {
                    Some(head)
                } else {
                    None
                }
            }
        }
    }

    fn prefer_ready(
        &self,
        q: &[Request],
        a: usize,
        b: usize,
        ready: &dyn Fn(&Request) -> bool,
    ) -> usize {
        let (ra, rb) = (ready(&q[a]), ready(&q[b]));
        if ra != rb {
            return if ra { a } else { b };
        }
        if q[a].arrive <= q[b].arrive {
            a
        } else {
            b
        }
    }
}
