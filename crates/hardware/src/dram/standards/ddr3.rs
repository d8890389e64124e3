//! DDR3 SDRAM.
//!
//! Channel → Rank → Bank → Row → Column hierarchy, all-bank refresh, power
//! down and self refresh. Organization and speed presets follow the JEDEC
//! grades; `nRFC` is derived from the device density and the clock.

use crate::config::{Config, ConfigError};
use crate::dram::node::Dram;
use crate::dram::spec::{empty_timing, CommandEnum, DramSpec, LevelEnum, OrgEntry, TimingEntry};
use crate::request::RequestKind;

/// DDR3 hierarchy levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Independent command/data bus.
    Channel,
    /// Chip-select group sharing the bus.
    Rank,
    /// Independently precharged array.
    Bank,
    /// Row (tracked in the bank's row map, not instantiated).
    Row,
    /// Column within a row.
    Column,
}

impl LevelEnum for Level {
    const COUNT: usize = 5;
    const ALL: &'static [Self] = &[
        Level::Channel,
        Level::Rank,
        Level::Bank,
        Level::Row,
        Level::Column,
    ];
    fn index(self) -> usize {
        self as usize
    }
}

/// DDR3 command set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Activate a row.
    Act,
    /// Precharge one bank.
    Pre,
    /// Precharge all banks in a rank.
    Prea,
    /// Column read.
    Rd,
    /// Column write.
    Wr,
    /// Column read with auto-precharge.
    Rda,
    /// Column write with auto-precharge.
    Wra,
    /// All-bank refresh.
    Ref,
    /// Power-down entry.
    Pde,
    /// Power-down exit.
    Pdx,
    /// Self-refresh entry.
    Sre,
    /// Self-refresh exit.
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

/// Node states. Banks are `Opened`/`Closed`; ranks track the power mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// A row is open (banks) / the row itself is open (row map entries).
    Opened,
    /// No row open.
    Closed,
    /// Rank powered up and idle.
    PowerUp,
    /// Rank powered down with a row open.
    ActPowerDown,
    /// Rank powered down with all banks precharged.
    PrePowerDown,
    /// Rank in self refresh.
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
    pub n_xpdll: i64,
    pub n_ckesr: i64,
    pub n_xs: i64,
    pub n_xsdll: i64,
}

fn org_preset(name: &str) -> Option<(i64, i64, i64, i64, i64)> {
    // (density Mb, dq, banks, rows, columns)
    match name {
        "DDR3_1Gb_x8" => Some((1 << 10, 8, 8, 1 << 14, 1 << 10)),
        "DDR3_2Gb_x8" => Some((1 << 11, 8, 8, 1 << 15, 1 << 10)),
        "DDR3_4Gb_x8" => Some((1 << 12, 8, 8, 1 << 16, 1 << 10)),
        "DDR3_8Gb_x8" => Some((1 << 13, 8, 8, 1 << 17, 1 << 10)),
        _ => None,
    }
}

fn speed_preset(name: &str) -> Option<SpeedEntry> {
    let entry = |rate: i64,
                 freq_mhz: f64,
                 t_ck_ns: f64,
                 n_cl: i64,
                 n_rcd: i64,
                 n_rp: i64,
                 n_cwl: i64,
                 n_ras: i64,
                 n_rtp: i64,
                 n_wtr: i64,
                 n_wr: i64,
                 n_rrd: i64,
                 n_faw: i64,
                 n_refi: i64,
                 n_xpdll: i64| SpeedEntry {
        rate,
        freq_mhz,
        t_ck_ns,
        n_bl: 4,
        n_ccd: 4,
        n_rtrs: 2,
        n_cl,
        n_rcd,
        n_rp,
        n_cwl,
        n_ras,
        n_rc: n_ras + n_rp,
        n_rtp,
        n_wtr,
        n_wr,
        n_rrd,
        n_faw,
        n_rfc: 0, // density-dependent, filled at construction
        n_refi,
        n_pd: 4,
        n_xp: 4,
        n_xpdll,
        n_ckesr: 4,
        n_xs: 0, // follows nRFC, filled at construction
        n_xsdll: 512,
    };
    match name {
        "DDR3_1066F" => Some(entry(1066, 533.333, 1.875, 7, 7, 7, 6, 20, 4, 4, 8, 4, 20, 4160, 14)),
        "DDR3_1333H" => Some(entry(1333, 666.667, 1.5, 9, 9, 9, 7, 24, 5, 5, 10, 4, 20, 5200, 17)),
        "DDR3_1600K" => Some(entry(1600, 800.0, 1.25, 11, 11, 11, 8, 28, 6, 6, 12, 5, 24, 6240, 20)),
        "DDR3_1866M" => Some(entry(1866, 933.333, 1.071, 13, 13, 13, 9, 32, 7, 7, 14, 6, 26, 7280, 23)),
        _ => None,
    }
}

/// tRFC in nanoseconds by device density.
fn t_rfc_ns(size_mb: i64) -> i64 {
    match size_mb {
        s if s <= 1 << 10 => 110,
        s if s <= 1 << 11 => 160,
        s if s <= 1 << 12 => 260,
        _ => 350,
    }
}

/// The DDR3 standard: organization, speed grade, and timing tables.
pub struct Ddr3 {
    org: OrgEntry,
    speed: SpeedEntry,
    timing: Vec<Vec<Vec<TimingEntry<Command>>>>,
}

impl Ddr3 {
    /// Builds a DDR3 device from preset names and channel/rank counts.
    pub fn new(
        org_name: &str,
        speed_name: &str,
        channels: usize,
        ranks: usize,
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
        speed.n_rfc = (t_rfc_ns(size_mb) as f64 * speed.freq_mhz / 1000.0).ceil() as i64;
        speed.n_xs = speed.n_rfc + 8;

        let org = OrgEntry {
            size_mb,
            dq,
            count: vec![channels as i64, ranks as i64, banks, rows, columns],
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

    // Channel: data bus occupancy between any two column commands.
    for from in reads.iter().chain(&writes) {
        for to in reads.iter().chain(&writes) {
            push(Level::Channel, *from, *to, 1, s.n_bl, false);
        }
    }

    // Rank: CAS <-> CAS, same rank.
    for from in reads {
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_ccd, false);
        }
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_cl + s.n_ccd + 2 - s.n_cwl, false);
        }
    }
    for from in writes {
        for to in writes {
            push(Level::Rank, from, to, 1, s.n_ccd, false);
        }
        for to in reads {
            push(Level::Rank, from, to, 1, s.n_cwl + s.n_bl + s.n_wtr, false);
        }
    }

    // Rank: CAS <-> CAS, between sibling ranks (bus turnaround).
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

    // Rank: ACT <-> ACT across banks, with the four-activate window.
    push(Level::Rank, Act, Act, 1, s.n_rrd, false);
    push(Level::Rank, Act, Act, 4, s.n_faw, false);

    // Rank: precharge-all must honor the slowest bank's row cycle.
    push(Level::Rank, Act, Prea, 1, s.n_ras, false);
    push(Level::Rank, Rd, Prea, 1, s.n_rtp, false);
    push(Level::Rank, Wr, Prea, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::Rank, Prea, Act, 1, s.n_rp, false);

    // Rank: refresh interactions.
    push(Level::Rank, Act, Ref, 1, s.n_rc, false);
    push(Level::Rank, Pre, Ref, 1, s.n_rp, false);
    push(Level::Rank, Prea, Ref, 1, s.n_rp, false);
    push(Level::Rank, Rda, Ref, 1, s.n_rtp + s.n_rp, false);
    push(Level::Rank, Wra, Ref, 1, s.n_cwl + s.n_bl + s.n_wr + s.n_rp, false);
    push(Level::Rank, Ref, Act, 1, s.n_rfc, false);
    push(Level::Rank, Ref, Ref, 1, s.n_rfc, false);
    push(Level::Rank, Ref, Pde, 1, s.n_rfc, false);
    push(Level::Rank, Ref, Sre, 1, s.n_rfc, false);

    // Rank: power down.
    for from in reads {
        push(Level::Rank, from, Pde, 1, s.n_cl + s.n_bl + 1, false);
    }
    push(Level::Rank, Wr, Pde, 1, s.n_cwl + s.n_bl + s.n_wr, false);
    push(Level::Rank, Wra, Pde, 1, s.n_cwl + s.n_bl + s.n_wr + 1, false);
    push(Level::Rank, Pde, Pdx, 1, s.n_pd, false);
    for to in [Act, Pre, Prea, Rd, Wr, Rda, Wra, Ref] {
        push(Level::Rank, Pdx, to, 1, s.n_xp, false);
    }
    push(Level::Rank, Pdx, Sre, 1, s.n_xp, false);

    // Rank: self refresh.
    push(Level::Rank, Sre, Srx, 1, s.n_ckesr, false);
    for to in [Rd, Rda] {
        push(Level::Rank, Srx, to, 1, s.n_xsdll, false);
    }
    for to in [Act, Pre, Prea, Wr, Wra, Ref, Pde, Sre] {
        push(Level::Rank, Srx, to, 1, s.n_xs, false);
    }

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

impl DramSpec for Ddr3 {
    type Level = Level;
    type Command = Command;
    type State = State;

    const NAME: &'static str = "DDR3";

    fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let org = cfg.org.as_deref().unwrap_or("DDR3_2Gb_x8");
        let speed = cfg.speed.as_deref().unwrap_or("DDR3_1600K");
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
                if node.children.iter().any(|b| b.state != State::Closed) {
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
                for bank in &mut node.children {
                    bank.state = State::Closed;
                    bank.row_state.clear();
                }
            }
            (Level::Rank, Command::Pde) => {
                let any_open = node.children.iter().any(|b| b.state == State::Opened);
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
            Level::Bank.index(),
            Level::Row.index(),
            Level::Column.index(),
        ]
    }
}
