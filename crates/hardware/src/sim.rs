//! Run loops.
//!
//! Dispatches on the configured standard, then drives either the raw DRAM
//! trace replay or the trace-driven CPU model. The two clock domains advance
//! by gcd-reduced rational dispatch: a fictitious tick counter fires the
//! cores every `mem_tick` units and the memory every `cpu_tick` units.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{Config, ConfigError, SimMode, StandardKind};
use crate::dram::spec::DramSpec;
use crate::dram::standards::{Ddr3, Ddr4, Salp};
use crate::memory::Memory;
use crate::processor::trace::{Trace, TraceError};
use crate::processor::Processor;
use crate::request::{Request, RequestKind};
use crate::stats::StatsWriter;

/// Fatal simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration was missing, malformed, or inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A trace file was missing or malformed.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// The statistics file could not be written.
    #[error("cannot write stats {path}: {source}")]
    Stats {
        /// Output path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// End-of-run summary for the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimSummary {
    /// Cycles simulated (memory cycles in dram mode, CPU cycles otherwise).
    pub cycles: i64,
    /// Accepted reads.
    pub reads: u64,
    /// Accepted writes.
    pub writes: u64,
    /// Aggregate IPC; 0 in dram mode.
    pub ipc: f64,
}

/// Runs one simulation to completion and writes the statistics file.
pub fn run(cfg: &Config) -> Result<SimSummary, SimError> {
    match cfg.standard {
        StandardKind::Ddr3 => run_standard::<Ddr3>(cfg),
        StandardKind::Ddr4 => run_standard::<Ddr4>(cfg),
        StandardKind::Salp => run_standard::<Salp>(cfg),
    }
}

fn run_standard<T: DramSpec>(cfg: &Config) -> Result<SimSummary, SimError> {
    let spec = Arc::new(T::from_config(cfg)?);
    let mut memory = Memory::new(spec, cfg)?;
    match cfg.mode {
        SimMode::Dram => run_dram(cfg, &mut memory),
        SimMode::Cpu => run_cpu(cfg, &mut memory),
    }
}

fn run_dram<T: DramSpec>(cfg: &Config, memory: &mut Memory<T>) -> Result<SimSummary, SimError> {
    let path = cfg.traces.first().ok_or_else(|| {
        ConfigError::Inconsistent("dram mode requires exactly one trace".to_string())
    })?;
    let mut trace = Trace::new(path)?;

    let mut stalled: Option<Request> = None;
    let mut end = false;
    let mut reads = 0u64;
    let mut writes = 0u64;
    let mut clks = 0i64;

    while !end || memory.pending_requests() > 0 {
        if !end && stalled.is_none() {
            match trace.get_dram_request()? {
                Some((addr, kind)) => stalled = Some(Request::new(addr, kind, 0)),
                None => end = true,
            }
        }
        if let Some(req) = stalled.take() {
            let kind = req.kind;
            match memory.send(req) {
                Ok(()) => match kind {
                    RequestKind::Read => reads += 1,
                    RequestKind::Write => writes += 1,
                    _ => {}
                },
                Err(req) => stalled = Some(req),
            }
        }
        let _ = memory.tick();
        clks += 1;
    }

    let mut w = StatsWriter::new();
    w.emit("memsim.dram_cycles", clks, "memory cycles simulated");
    w.emit_u64("memsim.reads", reads, "reads accepted from the trace");
    w.emit_u64("memsim.writes", writes, "writes accepted from the trace");
    memory.report("memsim.memory", &mut w);
    let path = cfg.stats_path();
    w.write_to(&path).map_err(|source| SimError::Stats { path, source })?;

    Ok(SimSummary {
        cycles: clks,
        reads,
        writes,
        ipc: 0.0,
    })
}

fn run_cpu<T: DramSpec>(cfg: &Config, memory: &mut Memory<T>) -> Result<SimSummary, SimError> {
    if cfg.traces.is_empty() {
        return Err(ConfigError::Inconsistent("cpu mode requires at least one trace".to_string()).into());
    }
    let mut proc = Processor::new(cfg, &cfg.traces)?;

    let mem_mhz = memory.spec().frequency_mhz().round() as u64;
    let cpu_mhz = cfg.cpu_frequency_mhz;
    let g = gcd(cpu_mhz, mem_mhz);
    // Cores tick every mem_tick units, memory every cpu_tick units, so the
    // tick-count ratio matches the frequency ratio.
    let cpu_tick = (cpu_mhz / g) as i64;
    let mem_tick = (mem_mhz / g) as i64;
    let tick_mult = cpu_tick * mem_tick;

    let mut i: i64 = 0;
    loop {
        if (i % tick_mult) % mem_tick == 0 {
            proc.tick(&mut |req| memory.send(req))?;
        }
        if (i % tick_mult) % cpu_tick == 0 {
            for req in memory.tick() {
                proc.receive(&req);
            }
        }
        if cfg.early_exit {
            if proc.finished() {
                break;
            }
        } else if proc.finished() && memory.pending_requests() == 0 {
            break;
        }
        i += 1;
    }

    let mut w = StatsWriter::new();
    proc.report("memsim", &mut w);
    memory.report("memsim.memory", &mut w);
    let path = cfg.stats_path();
    w.write_to(&path).map_err(|source| SimError::Stats { path, source })?;

    Ok(SimSummary {
        cycles: proc.cpu_cycles(),
        reads: memory.incoming_reads,
        writes: memory.incoming_writes,
        ipc: proc.ipc,
    })
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}
