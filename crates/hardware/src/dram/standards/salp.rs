//! Subarray-level-parallelism DRAM (SALP, MASA-style).
//!
//! Banks are split into subarrays, each with its own row buffer, so multiple
//! rows per bank can stay open. A bank bounds how many subarrays may be open
//! at once; activating past the bound requires first precharging one of the
//! *other* open subarrays via `PRE_OTHER`, whose target is computed from the
//! device tree rather than the request's own address.

use crate::config::{Config, ConfigError};
use crate::dram::node::Dram;
use crate::dram::spec::{empty_timing, CommandEnum, DramSpec, LevelEnum, OrgEntry, TimingEntry};
use crate::request::RequestKind;

/// SALP hierarchy levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Independent command/data bus.
    Channel,
    /// Chip-select group.
    Rank,
    /// Bank, subdivided into subarrays.
    Bank,
    /// Subarray with its own row buffer.
    SubArray,
    /// Row (tracked in the subarray's row map).
    Row,
    /// Column within a row.
    Column,
}

impl LevelEnum for Level {
    const COUNT: usize = 6;
    const ALL: &'static [Self] = &[
        Level::Channel,
        Level::Rank,
        Level::Bank,
        Level::SubArray,
        Level::Row,
        Level::Column,
    ];
    fn index(self) -> usize {
        self as usize
    }
}

/// SALP command set; `PreOther` precharges a sibling subarray.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Command {
    Act,
    Pre,
    Prea,
    PreOther,
    Rd,
    Wr,
    Rda,
    Wra,
    Ref,
    Pde,
    Pdx,
    Sre,
    Srx,
}

impl CommandEnum for Command {
    const COUNT: usize = 13;
    const ALL: &'static [Self] = &[
        Command::Act,
        Command::Pre,
        Command::Prea,
        Command::PreOther,
        Command::Rd,
        Command::Wr,
        Command::Rda,
        Command::Wra,
        Command::Ref,
        Command::Pde,
        Command::Pdx,
        Command::Sre,
        Command::Srx,
    ];
    fn index(self) -> usize {
        self as usize
    }
    fn label(self) -> &'static str {
        match self {
            Command::Act => "ACT",
            Command::Pre => "PRE",
            Command::Prea => "PREA",
            Command::PreOther => "PRE_OTHER",
            Command::Rd => "RD",
            Command::Wr => "WR",
            Command::Rda => "RDA",
            Command::Wra => "WRA",
            Command::Ref => "REF",
            Command::Pde => "PDE",
            Command::Pdx => "PDX",
            Command::Sre => "SRE",
            Command::Srx => "SRX",
        }
    }
}

/// Node states; subarrays are `Opened`/`Closed`, ranks track power mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum State {
    Opened,
    Closed,
    PowerUp,
    ActPowerDown,
    PrePowerDown,
    SelfRefreshing,
}

/// Speed grade: all timings in memory-clock cycles.
#[derive(Clone, Copy, Debug)]
#[allow(missing_docs)]
pub struct SpeedEntry {
    pub rate: i64,
    pub freq_mhz: f64,
    pub t_ck_ns: f64,
    pub n_bl: i64,
    pub n_ccd: i64,
    pub n_rtrs: i64,
    pub n_cl: i64,
    pub n_rcd: i64,
    pub n_rp: i64,
    pub n_cwl: i64,
    pub n_ras: i64,
    pub n_rc: i64,
    pub n_rtp: i64,
    pub n_wtr: i64,
    pub n_wr: i64,
    pub n_rrd: i64,
    pub n_faw: i64,
    pub n_rfc: i64,
    pub n_refi: i64,
    pub n_pd: i64,
    pub n_xp: i64,
    pub n_ckesr: i64,
    pub n_xs: i64,
}

fn org_preset(name: &str) -> Option<(i64, i64, i64, i64, i64)> {
    // (density Mb, dq, banks, total rows per bank, columns)
    match name {
        "SALP_2Gb_x8" => Some((1 << 11, 8, 8, 1 << 15, 1 << 10)),
        "SALP_4Gb_x8" => Some((1 << 12, 8, 8, 1 << 16, 1 << 10)),
        _ => None,
    }
}

fn speed_preset(name: &str) -> Option<SpeedEntry> {
    match name {
        "SALP_1600K" => Some(SpeedEntry {
            rate: 1600,
            freq_mhz: 800.0,
            t_ck_ns: 1.25,
            n_bl: 4,
            n_ccd: 4,
            n_rtrs: 2,
            n_cl: 11,
            n_rcd: 11,
            n_rp: 11,
            n_cwl: 8,
            n_ras: 28,
            n_rc: 39,
            n_rtp: 6,
            n_wtr: 6,
            n_wr: 12,
            n_rrd: 5,
            n_faw: 24,
            n_rfc: 0,
            n_refi: 6240,
            n_pd: 4,
            n_xp: 4,
            n_ckesr: 4,
            n_xs: 0,
        }),
        _ => None,
    }
}

fn t_rfc_ns(size_mb: i64) -> i64 {
    if size_mb <= 1 << 11 { 160 } else { 260 }
}

/// The SALP standard: organization, speed grade, timing tables, and the
/// bound on simultaneously open subarrays per bank.
pub struct Salp {
    org: OrgEntry,
    speed: SpeedEntry,
    timing: Vec<Vec<Vec<TimingEntry<Command>>>>,
    open_limit: usize,
}

impl Salp {
    /// Builds a SALP device. `subarrays` splits each bank's rows evenly;
    /// `open_limit` bounds concurrently open subarrays per bank.
    pub fn new(
        org_name: &str,
        speed_name: &str,
        channels: usize,
        ranks: usize,
        subarrays: usize,
        open_limit: usize,
    ) -> Result<Self, ConfigError> {
        let (size_mb, dq, banks, rows, columns) = org_preset(org_name).ok_or_else(|| {
            ConfigError::UnknownPreset {
                standard: Self::NAME,
                preset: org_name.to_string(),
            }
        })?;
        let mut speed = speed_preset(speed_name).ok_or_else(|| ConfigError::UnknownPreset {
            standard: Self::NAME,
            preset: speed_name.to_string(),
        })?;
        if subarrays == 0 || rows % subarrays as i64 != 0 {
            return Err(ConfigError::BadValue {
                key: "subarray".to_string(),
                value: subarrays.to_string(),
            });
        }
        speed.n_rfc = (t_rfc_ns(size_mb) as f64 * speed.freq_mhz / 1000.0).ceil() as i64;
        speed.n_xs = speed.n_rfc + 8;

        let org = OrgEntry {
            size_mb,
            dq,
            count: vec![
                channels as i64,
                ranks as i64,
                banks,
                subarrays as i64,
                rows / subarrays as i64,
                columns,
            ],
        };
        let timing = build_timing(&speed);
        Ok(Self {
            org,
            speed,
            timing,
            open_limit: open_limit.max(1),
        })
    }

    /// Speed grade in effect.
    pub fn speed(&self) -> &SpeedEntry {
        &self.speed
    }

    /// Bound on simultaneously open subarrays per bank.
    pub fn open_limit(&self) -> usize {
        self.open_limit
    }
}

fn build_timing(s: &SpeedEntry) -> Vec<Vec<Vec<TimingEntry<Command>>>> {
    use Command::*;
    let mut t = empty_timing::<Command>(Level::COUNT);
    let mut push = |level: Level, from: Command, to: Command, dist: usize, val: i64, sibling: bool| {
        t[level.index()][from.index()].push(TimingEntry { cmd: to, dist, val, sibling });
    };
    let reads = [Rd, Rda];
    let writes = [Wr, Wra];

    // Channel: data bus occupancy.
    for from in reads.iter().chain(&writes) {
        for to in reads.iter().chain(&writes) {
            push(Level::Channel, *from, *to, 1, s.n_bl, false);
        }
    }

    // Rank: CAS pacing and rank-to-rank turnaround.
    for from in reads {
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_ccd, false);
            push(Level::Rank, from, to, 1, s.n_bl + s.n_rtrs, true);
        }
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_cl + s.n_ccd + 2 - s.n_cwl, false);
            push(Level::Rank, from, to, 1, s.n_cl + s.n_bl + s.n_rtrs - s.n_cwl, true);
        }
    }
    for from in writes {
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_ccd, false);
            push(Level::Rank, from, to, 1, s.n_bl + s.n_rtrs, true);
        }
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_cwl + s.n_bl + s.n_wtr, false);
            push(Level::Rank, from, to, 1, s.n_cwl + s.n_bl + s.n_rtrs - s.n_cl, true);
        }
    }
    push(Level::Rank, Act, Act, 1, s.n_rrd, false);
    push(Level::Rank, Act, Act, 4, s.n_faw, false);
    push(Level::Rank, Act, Prea, 1, s.n_ras, false);
    push(Level::Rank, Rd, Prea, 1, s.n_rtp, false);
    push(Level::Rank, Wr, Prea, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::Rank, Prea, Act, 1, s.n_rp, false);

    // Rank: refresh.
    push(Level::Rank, Act, Ref, 1, s.n_rc, false);
    push(Level::Rank, Pre, Ref, 1, s.n_rp, false);
    push(Level::Rank, PreOther, Ref, 1, s.n_rp, false);
    push(Level::Rank, Prea, Ref, 1, s.n_rp, false);
    push(Level::Rank, Rda, Ref, 1, s.n_rtp + s.n_rp, false);
    push(Level::Rank, Wra, Ref, 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp, false);
    push(Level::Rank, Ref, Act, 1, s.n_rfc, false);
    push(Level::Rank, Ref, Ref, 1, s.n_rfc, false);
    push(Level::Rank, Ref, Pde, 1, s.n_rfc, false);
    push(Level::Rank, Ref, Sre, 1, s.n_rfc, false);

    // Rank: power down / self refresh.
    for from in reads {
        push(Level::Rank, from, Pde, 1, s.n_cl + s.n_bl + 1, false);
    }
    push(Level::Rank, Wr, Pde, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::Rank, Wra, Pde, 1, s.n_cwl + s.n_bl + s.n_wr + 1, false);
    push(Level::Rank, Pde, Pdx, 1, s.n_pd, false);
    for to in [Act, Pre, PreOther, Prea, Rd, Wr, Rda, Wra, Ref, Sre] {
        push(Level::Rank, Pdx, to, 1, s.n_xp, false);
    }
    push(Level::Rank, Sre, Srx, 1, s.n_ckesr, false);
    for to in [Act, Pre, PreOther, Prea, Rd, Wr, Rda, Wra, Ref, Pde, Sre] {
        push(Level::Rank, Srx, to, 1, s.n_xs, false);
    }

    // Bank: activation spacing between subarrays of the same bank.
    push(Level::Bank, Act, Act, 1, s.n_rrd, false);

    // Subarray: the row cycle, as a DDR3 bank would see it.
    push(Level::SubArray, Act, Act, 1, s.n_rc, false);
    for to in [Rd, Rda, Wr, Wra] {
        push(Level::SubArray, Act, to, 1, s.n_rcd, false);
    }
    push(Level::SubArray, Act, Pre, 1, s.n_ras, false);
    push(Level::SubArray, Act, PreOther, 1, s.n_ras, false);
    push(Level::SubArray, Rd, Pre, 1, s.n_rtp, false);
    push(Level::SubArray, Rd, PreOther, 1, s.n_rtp, false);
    push(Level::SubArray, Wr, Pre, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::SubArray, Wr, PreOther, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::SubArray, Pre, Act, 1, s.n_rp, false);
    push(Level::SubArray, PreOther, Act, 1, s.n_rp, false);
    push(Level::SubArray, Rda, Act, 1, s.n_rtp + s.n_rp, false);
    push(Level::SubArray, Wra, Act, 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp, false);

    t
}

impl DramSpec for Salp {
    type Level = Level;
    type Command = Command;
    type State = State;

    const NAME: &'static str = "SALP";

    fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let org = cfg.org.as_deref().unwrap_or("SALP_4Gb_x8");
        let speed = cfg.speed.as_deref().unwrap_or("SALP_1600K");
        Self::new(org, speed, cfg.channels, cfg.ranks, cfg.subarrays, 4)
    }

    fn org(&self) -> &OrgEntry {
        &self.org
    }

    fn frequency_mhz(&self) -> f64 {
        self.speed.freq_mhz
    }

    fn t_ck_ns(&self) -> f64 {
        self.speed.t_ck_ns
    }

    fn prefetch_size(&self) -> i64 {
        8
    }

    fn channel_width(&self) -> i64 {
        64
    }

    fn read_latency(&self) -> i64 {
        self.speed.n_cl + self.speed.n_bl
    }

    fn refresh_interval(&self) -> i64 {
        self.speed.n_refi
    }

    fn start_state(&self, level: usize) -> State {
        match Level::ALL[level] {
            Level::Rank => State::PowerUp,
            _ => State::Closed,
        }
    }

    fn scope(&self, cmd: Command) -> usize {
        match cmd {
            Command::Act | Command::Pre | Command::PreOther => Level::SubArray.index(),
            Command::Rd | Command::Wr | Command::Rda | Command::Wra => Level::Column.index(),
            Command::Prea
            | Command::Ref
            | Command::Pde
            | Command::Pdx
            | Command::Sre
            | Command::Srx => Level::Rank.index(),
        }
    }

    fn translate(&self, kind: RequestKind) -> Command {
        match kind {
            RequestKind::Read | RequestKind::Extension => Command::Rd,
            RequestKind::Write => Command::Wr,
            RequestKind::Refresh => Command::Ref,
            RequestKind::PowerDown => Command::Pde,
            RequestKind::SelfRefresh => Command::Sre,
        }
    }

    fn autoprecharge(&self, cmd: Command) -> Option<Command> {
        match cmd {
            Command::Rd => Some(Command::Rda),
            Command::Wr => Some(Command::Wra),
            _ => None,
        }
    }

    fn pre_command(&self) -> Command {
        Command::Pre
    }

    fn is_opening(&self, cmd: Command) -> bool {
        matches!(cmd, Command::Act)
    }

    fn is_accessing(&self, cmd: Command) -> bool {
        matches!(cmd, Command::Rd | Command::Wr | Command::Rda | Command::Wra)
    }

    fn is_closing(&self, cmd: Command) -> bool {
        matches!(
            cmd,
            Command::Pre | Command::Prea | Command::PreOther | Command::Rda | Command::Wra
        )
    }

    fn is_refreshing(&self, cmd: Command) -> bool {
        matches!(cmd, Command::Ref)
    }

    fn prereq(&self, node: &Dram<Self>, cmd: Command, child_id: i64) -> Option<Command> {
        match (Level::ALL[node.level()], cmd) {
            (Level::Rank, Command::Rd | Command::Wr) => match node.state {
                State::PowerUp => None,
                State::ActPowerDown | State::PrePowerDown => Some(Command::Pdx),
                State::SelfRefreshing => Some(Command::Srx),
                _ => unreachable!("rank in a subarray state"),
            },
            (Level::Bank, Command::Rd | Command::Wr) => {
                // Activating one more subarray past the bound requires first
                // precharging one of the other open subarrays.
                let target_closed = node
                    .children
                    .get(child_id as usize)
                    .is_some_and(|sa| sa.state == State::Closed);
                let open = node
                    .children
                    .iter()
                    .filter(|sa| sa.state == State::Opened)
                    .count();
                if target_closed && open >= self.open_limit {
                    Some(Command::PreOther)
                } else {
                    None
                }
            }
            (Level::SubArray, Command::Rd | Command::Wr) => match node.state {
                State::Closed => Some(Command::Act),
                State::Opened => {
                    if node.row_state.contains_key(&child_id) {
                        Some(cmd)
                    } else {
                        Some(Command::Pre)
                    }
                }
                _ => unreachable!("subarray in a rank state"),
            },
            (Level::Rank, Command::Ref) => {
                let any_open = node
                    .children
                    .iter()
                    .flat_map(|b| &b.children)
                    .any(|sa| sa.state != State::Closed);
                if any_open {
                    Some(Command::Prea)
                } else {
                    Some(Command::Ref)
                }
            }
            (Level::Rank, Command::Pde) => match node.state {
                State::PowerUp | State::ActPowerDown | State::PrePowerDown => Some(Command::Pde),
                State::SelfRefreshing => Some(Command::Srx),
                _ => unreachable!("rank in a subarray state"),
            },
            (Level::Rank, Command::Sre) => match node.state {
                State::PowerUp | State::SelfRefreshing => Some(Command::Sre),
                State::ActPowerDown | State::PrePowerDown => Some(Command::Pdx),
                _ => unreachable!("rank in a subarray state"),
            },
            _ => None,
        }
    }

    fn row_hit(&self, node: &Dram<Self>, cmd: Command, child_id: i64) -> Option<bool> {
        match (Level::ALL[node.level()], cmd) {
            (Level::SubArray, Command::Rd | Command::Wr | Command::Rda | Command::Wra) => {
                match node.state {
                    State::Opened => Some(node.row_state.contains_key(&child_id)),
                    _ => Some(false),
                }
            }
            _ => None,
        }
    }

    fn row_open(&self, node: &Dram<Self>, cmd: Command, _child_id: i64) -> Option<bool> {
        match (Level::ALL[node.level()], cmd) {
            (Level::SubArray, Command::Rd | Command::Wr | Command::Rda | Command::Wra) => {
                Some(node.state == State::Opened)
            }
            _ => None,
        }
    }

    fn apply_state(&self, node: &mut Dram<Self>, cmd: Command, child_id: i64) {
        match (Level::ALL[node.level()], cmd) {
            (Level::SubArray, Command::Act) => {
                node.state = State::Opened;
                node.row_state.insert(child_id, State::Opened);
            }
            (Level::SubArray, Command::Pre | Command::PreOther | Command::Rda | Command::Wra) => {
                node.state = State::Closed;
                node.row_state.clear();
            }
            (Level::Rank, Command::Prea) => {
                for bank in &mut node.children {
                    for sa in &mut bank.children {
                        sa.state = State::Closed;
                        sa.row_state.clear();
                    }
                }
            }
            (Level::Rank, Command::Pde) => {
                let any_open = node
                    .children
                    .iter()
                    .flat_map(|b| &b.children)
                    .any(|sa| sa.state == State::Opened);
                node.state = if any_open {
                    State::ActPowerDown
                } else {
                    State::PrePowerDown
                };
            }
            (Level::Rank, Command::Pdx | Command::Srx) => {
                node.state = State::PowerUp;
            }
            (Level::Rank, Command::Sre) => {
                node.state = State::SelfRefreshing;
            }
            _ => {}
        }
    }

    fn timing(&self, level: usize, cmd: Command) -> &[TimingEntry<Command>] {
        &self.timing[level][cmd.index()]
    }

    fn row_level(&self) -> usize {
        Level::Row.index()
    }

    fn bank_level(&self) -> usize {
        Level::Bank.index()
    }

    fn mapping_order(&self) -> Vec<usize> {
        // Subarray bits sit above the column-high bits.
        vec![
            Level::Channel.index(),
            Level::Rank.index(),
            Level::Bank.index(),
            Level::Row.index(),
            Level::Column.index(),
            Level::SubArray.index(),
        ]
    }

    fn alternate_addr_vec(
        &self,
        channel: &Dram<Self>,
        cmd: Command,
        addr_vec: &[i64],
    ) -> Option<Vec<i64>> {
        if cmd != Command::PreOther {
            return None;
        }
        let rank = &channel.children[addr_vec[Level::Rank.index()] as usize];
        let bank = &rank.children[addr_vec[Level::Bank.index()] as usize];
        let own = addr_vec[Level::SubArray.index()];
        let mut sa_id = 0;
        for sa in &bank.children {
            if sa.id as i64 != own && sa.state == State::Opened {
                sa_id = sa.id as i64;
                break;
            }
        }
        let mut offending = addr_vec.to_vec();
        offending[Level::SubArray.index()] = sa_id;
        offending[Level::Row.index()] = -1;
        Some(offending)
    }
}
