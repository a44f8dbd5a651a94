//! Live GPU/CPU power sampler.
//!
//! Polls a [`Probe`] at a fixed interval and appends one JSON object per
//! sample to a log file, in the format the analysis pipeline reads back.
//! The loop runs until the caller clears the `running` flag (typically from
//! a signal handler).

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::record::TelemetryRecord;

/// How often the sleep between samples re-checks the running flag.
const STOP_POLL: Duration = Duration::from_millis(50);
/// Upper bound on a single GPU query.
const GPU_QUERY_TIMEOUT: Duration = Duration::from_secs(2);
/// How often a running GPU query is checked for completion.
const QUERY_POLL: Duration = Duration::from_millis(5);

/// Fields requested from `nvidia-smi`, in column order.
const GPU_QUERY_FIELDS: &str = "name,power.draw,memory.used,utilization.gpu,utilization.memory,total_energy_consumption";

/// Source of hardware readings for one sample.
pub trait Probe {
    /// Take one reading stamped with `at`.
    fn sample(&mut self, at: DateTime<Utc>) -> Result<TelemetryRecord>;
}

/// Sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub gpu_index: u32,
    pub interval: Duration,
    pub log_path: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            gpu_index: 0,
            interval: Duration::from_secs(5),
            log_path: PathBuf::from("logs/power_log.jsonl"),
        }
    }
}

/// Sample until `running` is cleared or the probe fails.
///
/// Returns the number of records appended to the log.
pub fn run_sampler(
    config: &SamplerConfig,
    probe: &mut dyn Probe,
    running: &AtomicBool,
) -> Result<u64> {
    if let Some(parent) = config.log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let mut out = BufWriter::new(file);

    log::info!(
        "sampling GPU {} every {:?} into {}",
        config.gpu_index,
        config.interval,
        config.log_path.display()
    );

    let mut written = 0u64;
    while running.load(Ordering::SeqCst) {
        let record = match probe.sample(Utc::now()) {
            Ok(r) => r,
            Err(e) => {
                log::error!("{e}");
                break;
            }
        };
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        out.flush()?;
        written += 1;

        let deadline = Instant::now() + config.interval;
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }

    out.flush()?;
    log::info!("sampler stopped after {written} sample(s)");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Host probe
// ---------------------------------------------------------------------------

/// Aggregate CPU jiffies from `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
pub fn parse_proc_stat(text: &str) -> Option<CpuTimes> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| v.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: fields.iter().sum(),
    })
}

/// Busy percentage between two `/proc/stat` snapshots.
pub fn cpu_utilization(prev: CpuTimes, now: CpuTimes) -> Option<f64> {
    let total = now.total.checked_sub(prev.total)?;
    let idle = now.idle.checked_sub(prev.idle)?;
    if total == 0 {
        return None;
    }
    Some(100.0 * (1.0 - idle as f64 / total as f64))
}

/// GPU readings from one `nvidia-smi` query row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuReading {
    pub name: Option<String>,
    pub power_watts: Option<f64>,
    pub memory_used_mb: Option<f64>,
    pub gpu_utilization_percent: Option<f64>,
    pub memory_utilization_percent: Option<f64>,
    pub energy_mj: Option<f64>,
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse one `--format=csv,noheader,nounits` row in [`GPU_QUERY_FIELDS`] order.
/// Unsupported cells (`[N/A]`, `[Not Supported]`) are left absent.
pub fn parse_gpu_query(line: &str) -> GpuReading {
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    let num = |i: usize| cells.get(i).and_then(|c| parse_cell(c));
    GpuReading {
        name: cells
            .first()
            .filter(|c| !c.is_empty() && !c.starts_with('['))
            .map(|c| c.to_string()),
        power_watts: num(1),
        memory_used_mb: num(2),
        gpu_utilization_percent: num(3),
        memory_utilization_percent: num(4),
        energy_mj: num(5),
    }
}

/// Run `cmd` and return its trimmed stdout.
///
/// Returns `None` on any failure. A child still running at `timeout` is killed.
fn query_command(cmd: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = match Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            log::debug!("{cmd}: cannot start: {e}");
            return None;
        }
    };

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                log::debug!("{cmd}: no answer within {timeout:?}, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Ok(None) => std::thread::sleep(QUERY_POLL),
            Err(e) => {
                log::debug!("{cmd}: wait failed: {e}");
                return None;
            }
        }
    };
    if !status.success() {
        log::debug!("{cmd}: exited with {status}");
        return None;
    }

    let mut text = String::new();
    child.stdout.take()?.read_to_string(&mut text).ok()?;
    let text = text.trim();
    if text.is_empty() {
        log::debug!("{cmd}: empty output");
        return None;
    }
    Some(text.to_string())
}

/// Probe reading host CPU load from procfs and one GPU through `nvidia-smi`.
///
/// Both sources are best effort: values that cannot be read are left absent.
pub struct HostProbe {
    gpu_index: u32,
    last_cpu: Option<CpuTimes>,
    gpu_warned: bool,
}

impl HostProbe {
    pub fn new(gpu_index: u32) -> Self {
        Self {
            gpu_index,
            last_cpu: read_cpu_times(),
            gpu_warned: false,
        }
    }

    fn query_gpu(&mut self) -> Option<GpuReading> {
        let format = format!("--query-gpu={GPU_QUERY_FIELDS}");
        let index = format!("--id={}", self.gpu_index);
        let out = query_command(
            "nvidia-smi",
            &[format.as_str(), "--format=csv,noheader,nounits", index.as_str()],
            GPU_QUERY_TIMEOUT,
        );
        match out {
            Some(text) => text.lines().next().map(parse_gpu_query),
            None => {
                if !self.gpu_warned {
                    log::warn!("nvidia-smi query failed for GPU {}; GPU fields left empty", self.gpu_index);
                    self.gpu_warned = true;
                }
                None
            }
        }
    }
}

fn read_cpu_times() -> Option<CpuTimes> {
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|s| parse_proc_stat(&s))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

impl Probe for HostProbe {
    fn sample(&mut self, at: DateTime<Utc>) -> Result<TelemetryRecord> {
        let mut record = TelemetryRecord::new(at);
        record.gpu_index = Some(self.gpu_index);

        let now = read_cpu_times();
        if let (Some(prev), Some(cur)) = (self.last_cpu, now) {
            record.cpu_utilization_percent = cpu_utilization(prev, cur);
        }
        if now.is_some() {
            self.last_cpu = now;
        }

        if let Some(gpu) = self.query_gpu() {
            record.gpu_name = gpu.name;
            record.power_watts = gpu.power_watts;
            record.memory_used_mb = gpu.memory_used_mb;
            record.gpu_utilization_percent = gpu.gpu_utilization_percent;
            record.memory_utilization_percent = gpu.memory_utilization_percent;
            record.energy_mj = gpu.energy_mj;
        }
        Ok(record)
    }
}
