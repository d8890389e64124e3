//! DDR4 SDRAM.
//!
//! Adds a BankGroup level between rank and bank: column commands and
//! activations to the *same* group obey the long timings (nCCD_L, nRRD_L,
//! nWTR_L), while cross-group traffic uses the short ones.

use crate::config::{Config, ConfigError};
use crate::dram::node::Dram;
use crate::dram::spec::{empty_timing, CommandEnum, DramSpec, LevelEnum, OrgEntry, TimingEntry};
use crate::request::RequestKind;

/// DDR4 hierarchy levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Independent command/data bus.
    Channel,
    /// Chip-select group.
    Rank,
    /// Bank group sharing long-timing resources.
    BankGroup,
    /// Independently precharged array.
    Bank,
    /// Row (tracked in the bank's row map).
    Row,
    /// Column within a row.
    Column,
}

impl LevelEnum for Level {
    const COUNT: usize = 6;
    const ALL: &'static [Self] = &[
        Level::Channel,
        Level::Rank,
        Level::BankGroup,
        Level::Bank,
        Level::Row,
        Level::Column,
    ];
    fn index(self) -> usize {
        self as usize
    }
}

/// DDR4 command set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Command {
    Act,
    Pre,
    Prea,
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
    const COUNT: usize = 12;
    const ALL: &'static [Self] = &[
        Command::Act,
        Command::Pre,
        Command::Prea,
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

/// Node states; same shape as DDR3.
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
    pub n_ccds: i64,
    pub n_ccdl: i64,
    pub n_rtrs: i64,
    pub n_cl: i64,
    pub n_rcd: i64,
    pub n_rp: i64,
    pub n_cwl: i64,
    pub n_ras: i64,
    pub n_rc: i64,
    pub n_rtp: i64,
    pub n_wtrs: i64,
    pub n_wtrl: i64,
    pub n_wr: i64,
    pub n_rrds: i64,
    pub n_rrdl: i64,
    pub n_faw: i64,
    pub n_rfc: i64,
    pub n_refi: i64,
    pub n_pd: i64,
    pub n_xp: i64,
    pub n_ckesr: i64,
    pub n_xs: i64,
}

fn org_preset(name: &str) -> Option<(i64, i64, i64, i64, i64, i64)> {
    // (density Mb, dq, bank groups, banks per group, rows, columns)
    match name {
        "DDR4_4Gb_x8" => Some((1 << 12, 8, 4, 4, 1 << 15, 1 << 10)),
        "DDR4_8Gb_x8" => Some((1 << 13, 8, 4, 4, 1 << 16, 1 << 10)),
        "DDR4_16Gb_x8" => Some((1 << 14, 8, 4, 4, 1 << 17, 1 << 10)),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn speed_preset(name: &str) -> Option<SpeedEntry> {
    let entry = |rate: i64,
                 freq_mhz: f64,
                 t_ck_ns: f64,
                 n_ccdl: i64,
                 n_cl: i64,
                 n_rcd: i64,
                 n_rp: i64,
                 n_cwl: i64,
                 n_ras: i64,
                 n_rtp: i64,
                 n_wtrl: i64,
                 n_wr: i64,
                 n_rrds: i64,
                 n_rrdl: i64,
                 n_faw: i64,
                 n_refi: i64| SpeedEntry {
        rate,
        freq_mhz,
        t_ck_ns,
        n_bl: 4,
        n_ccds: 4,
        n_ccdl,
        n_rtrs: 2,
        n_cl,
        n_rcd,
        n_rp,
        n_cwl,
        n_ras,
        n_rc: n_ras + n_rp,
        n_rtp,
        n_wtrs: 3,
        n_wtrl,
        n_wr,
        n_rrds,
        n_rrdl,
        n_faw,
        n_rfc: 0,
        n_refi,
        n_pd: 6,
        n_xp: 8,
        n_ckesr: 7,
        n_xs: 0,
    };
    match name {
        "DDR4_2133P" => Some(entry(2133, 1066.667, 0.937, 6, 15, 15, 15, 11, 36, 8, 8, 16, 4, 6, 23, 8320)),
        "DDR4_2400R" => Some(entry(2400, 1200.0, 0.833, 6, 16, 16, 16, 12, 39, 9, 9, 18, 4, 6, 26, 9360)),
        "DDR4_3200W" => Some(entry(3200, 1600.0, 0.625, 8, 22, 22, 22, 16, 52, 12, 12, 24, 5, 8, 34, 12480)),
        _ => None,
    }
}

fn t_rfc_ns(size_mb: i64) -> i64 {
    match size_mb {
        s if s <= 1 << 12 => 260,
        s if s <= 1 << 13 => 350,
        _ => 550,
    }
}

/// The DDR4 standard: organization, speed grade, and timing tables.
pub struct Ddr4 {
    org: OrgEntry,
    speed: SpeedEntry,
    timing: Vec<Vec<Vec<TimingEntry<Command>>>>,
}

impl Ddr4 {
    /// Builds a DDR4 device from preset names and channel/rank counts.
    pub fn new(
        org_name: &str,
        speed_name: &str,
        channels: usize,
        ranks: usize,
    ) -> Result<Self, ConfigError> {
        let (size_mb, dq, groups, banks, rows, columns) =
            org_preset(org_name).ok_or_else(|| ConfigError::UnknownPreset {
                standard: Self::NAME,
                preset: org_name.to_string(),
            })?;
        let mut speed = speed_preset(speed_name).ok_or_else(|| ConfigError::UnknownPreset {
            standard: Self::NAME,
            preset: speed_name.to_string(),
        })?;
        speed.n_rfc = (t_rfc_ns(size_mb) as f64 * speed.freq_mhz / 1000.0).ceil() as i64;
        speed.n_xs = speed.n_rfc + 10;

        let org = OrgEntry {
            size_mb,
            dq,
            count: vec![channels as i64, ranks as i64, groups, banks, rows, columns],
        };
        let timing = build_timing(&speed);
        Ok(Self { org, speed, timing })
    }

    /// Speed grade in effect.
    pub fn speed(&self) -> &SpeedEntry {
        &self.speed
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

    // Rank: short CAS <-> CAS (cross-group minimum).
    for from in reads {
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_ccds, false);
        }
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_cl + s.n_ccds + 2 - s.n_cwl, false);
        }
    }
    for from in writes {
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_ccds, false);
        }
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_cwl + s.n_bl + s.n_wtrs, false);
        }
    }

    // Rank: CAS <-> CAS between sibling ranks.
    for from in reads {
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_bl + s.n_rtrs, true);
        }
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_cl + s.n_bl + s.n_rtrs - s.n_cwl, true);
        }
    }
    for from in writes {
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_bl + s.n_rtrs, true);
        }
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_cwl + s.n_bl + s.n_rtrs - s.n_cl, true);
        }
    }

    // Rank: activation pacing and precharge-all.
    push(Level::Rank, Act, Act, 1, s.n_rrds, false);
    push(Level::Rank, Act, Act, 4, s.n_faw, false);
    push(Level::Rank, Act, Prea, 1, s.n_ras, false);
    push(Level::Rank, Rd, Prea, 1, s.n_rtp, false);
    push(Level::Rank, Wr, Prea, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::Rank, Prea, Act, 1, s.n_rp, false);

    // Rank: refresh.
    push(Level::Rank, Act, Ref, 1, s.n_rc, false);
    push(Level::Rank, Pre, Ref, 1, s.n_rp, false);
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
    for to in [Act, Pre, Prea, Rd, Wr, Rda, Wra, Ref, Sre] {
        push(Level::Rank, Pdx, to, 1, s.n_xp, false);
    }
    push(Level::Rank, Sre, Srx, 1, s.n_ckesr, false);
    for to in [Act, Pre, Prea, Rd, Wr, Rda, Wra, Ref, Pde, Sre] {
        push(Level::Rank, Srx, to, 1, s.n_xs, false);
    }

    // Bank group: long timings within a group.
    for from in reads {
        for to in reads {
            push(Level::BankGroup, from, to, 1, s.n_ccdl, false);
        }
    }
    for from in writes {
        for to in writes {
            push(Level::BankGroup, from, to, 1, s.n_ccdl, false);
        }
        for to in reads {
            push(Level::BankGroup, from, to, 1, s.n_cwl + s.n_bl + s.n_wtrl, false);
        }
    }
    push(Level::BankGroup, Act, Act, 1, s.n_rrdl, false);

    // Bank: row cycle.
    push(Level::Bank, Act, Act, 1, s.n_rc, false);
    for to in [Rd, Rda, Wr, Wra] {
        push(Level::Bank, Act, to, 1, s.n_rcd, false);
    }
    push(Level::Bank, Act, Pre, 1, s.n_ras, false);
    push(Level::Bank, Rd, Pre, 1, s.n_rtp, false);
    push(Level::Bank, Wr, Pre, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::Bank, Pre, Act, 1, s.n_rp, false);
    push(Level::Bank, Rda, Act, 1, s.n_rtp + s.n_rp, false);
    push(Level::Bank, Wra, Act, 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp, false);

    t
}

impl DramSpec for Ddr4 {
    type Level = Level;
    type Command = Command;
    type State = State;

    const NAME: &'static str = "DDR4";

    fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let org = cfg.org.as_deref().unwrap_or("DDR4_4Gb_x8");
        let speed = cfg.speed.as_deref().unwrap_or("DDR4_2400R");
        Self::new(org, speed, cfg.channels, cfg.ranks)
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
            Command::Act | Command::Pre => Level::Bank.index(),
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
        matches!(cmd, Command::Pre | Command::Prea | Command::Rda | Command::Wra)
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
                _ => unreachable!("rank in a bank state"),
            },
            (Level::Bank, Command::Rd | Command::Wr) => match node.state {
                State::Closed => Some(Command::Act),
                State::Opened => {
                    if node.row_state.contains_key(&child_id) {
                        Some(cmd)
                    } else {
                        Some(Command::Pre)
                    }
                }
                _ => unreachable!("bank in a rank state"),
            },
            (Level::Rank, Command::Ref) => {
                let any_open = node
                    .children
                    .iter()
                    .flat_map(|g| &g.children)
                    .any(|b| b.state != State::Closed);
                if any_open {
                    Some(Command::Prea)
                } else {
                    Some(Command::Ref)
                }
            }
            (Level::Rank, Command::Pde) => match node.state {
                State::PowerUp | State::ActPowerDown | State::PrePowerDown => Some(Command::Pde),
                State::SelfRefreshing => Some(Command::Srx),
                _ => unreachable!("rank in a bank state"),
            },
            (Level::Rank, Command::Sre) => match node.state {
                State::PowerUp | State::SelfRefreshing => Some(Command::Sre),
                State::ActPowerDown | State::PrePowerDown => Some(Command::Pdx),
                _ => unreachable!("rank in a bank state"),
            },
            _ => None,
        }
    }

    fn row_hit(&self, node: &Dram<Self>, cmd: Command, child_id: i64) -> Option<bool> {
        match (Level::ALL[node.level()], cmd) {
            (Level::Bank, Command::Rd | Command::Wr | Command::Rda | Command::Wra) => {
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
            (Level::Bank, Command::Rd | Command::Wr | Command::Rda | Command::Wra) => {
                Some(node.state == State::Opened)
            }
            _ => None,
        }
    }

    fn apply_state(&self, node: &mut Dram<Self>, cmd: Command, child_id: i64) {
        match (Level::ALL[node.level()], cmd) {
            (Level::Bank, Command::Act) => {
                node.state = State::Opened;
                node.row_state.insert(child_id, State::Opened);
            }
            (Level::Bank, Command::Pre | Command::Rda | Command::Wra) => {
                node.state = State::Closed;
                node.row_state.clear();
            }
            (Level::Rank, Command::Prea) => {
                for group in &mut node.children {
                    for bank in &mut group.children {
                        bank.state = State::Closed;
                        bank.row_state.clear();
                    }
                }
            }
            (Level::Rank, Command::Pde) => {
                let any_open = node
                    .children
                    .iter()
                    .flat_map(|g| &g.children)
                    .any(|b| b.state == State::Opened);
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
        vec![
            Level::Channel.index(),
            Level::Rank.index(),
            Level::BankGroup.index(),
            Level::Bank.index(),
            Level::Row.index(),
            Level::Column.index(),
        ]
    }
}
