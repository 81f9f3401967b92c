//! System memory pressure monitoring and admission control.
//!
//! A background sampler reads system memory and the process working set
//! every 30 seconds and classifies pressure into four levels. The batch
//! indexer and pipeline consult the monitor before enqueueing work; under
//! high pressure batch sizes collapse and new indexing is rejected.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;

/// Sampling cadence.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(30);
/// Compaction cooldown under High pressure.
const COMPACTION_COOLDOWN_HIGH: Duration = Duration::from_secs(120);
/// Compaction cooldown under Critical pressure.
const COMPACTION_COOLDOWN_CRITICAL: Duration = Duration::from_secs(30);

const WORKING_SET_CRITICAL: u64 = 2 * 1024 * 1024 * 1024;
const WORKING_SET_HIGH: u64 = 1024 * 1024 * 1024;
const WORKING_SET_MODERATE: u64 = 500 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Normal = 0,
    Moderate = 1,
    High = 2,
    Critical = 3,
}

impl PressureLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Moderate,
            2 => Self::High,
            3 => Self::Critical,
            _ => Self::Normal,
        }
    }
}

/// Operation categories for admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    TextSearch,
    SymbolQuery,
    BatchIndex,
    Embedding,
    MemoryRead,
    MemoryWrite,
}

type CompactionHook = Box<dyn Fn() + Send + Sync>;

/// Classifies memory pressure and throttles work accordingly.
pub struct MemoryPressureMonitor {
    max_usage_percent: f32,
    level: AtomicU8,
    system: Mutex<System>,
    last_compaction: Mutex<Option<Instant>>,
    compaction_hook: Mutex<Option<CompactionHook>>,
}

impl MemoryPressureMonitor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            max_usage_percent: settings.memory_limits.max_usage_percent,
            level: AtomicU8::new(PressureLevel::Normal as u8),
            system: Mutex::new(System::new()),
            last_compaction: Mutex::new(None),
            compaction_hook: Mutex::new(None),
        }
    }

    /// Install the action run when pressure asks for compaction (cache
    /// clearing, segment merging).
    pub fn set_compaction_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.compaction_hook.lock() = Some(Box::new(hook));
    }

    pub fn current_level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Spawn the background sampler. Returns when the token is cancelled.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("memory pressure sampler stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        monitor.sample();
                        monitor.maybe_trigger_gc();
                    }
                }
            }
        })
    }

    /// Take one sample and update the current level.
    pub fn sample(&self) -> PressureLevel {
        let (system_percent, working_set) = {
            let mut sys = self.system.lock();
            sys.refresh_memory();
            let total = sys.total_memory().max(1);
            let used = sys.used_memory();
            let system_percent = used as f32 / total as f32 * 100.0;

            let working_set = sysinfo::get_current_pid()
                .ok()
                .and_then(|pid| {
                    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                    sys.process(pid).map(|p| p.memory())
                })
                .unwrap_or(0);
            (system_percent, working_set)
        };

        let level = classify(system_percent, working_set, self.max_usage_percent);
        let previous = PressureLevel::from_u8(
            self.level.swap(level as u8, Ordering::Relaxed),
        );
        if level != previous {
            if level >= PressureLevel::High {
                warn!(
                    "memory pressure {previous:?} -> {level:?} \
                     (system {system_percent:.1}%, working set {} MB)",
                    working_set / (1024 * 1024)
                );
            } else {
                info!("memory pressure {previous:?} -> {level:?}");
            }
        }
        level
    }

    /// Whether an operation should be rejected at the current level.
    /// Under High and Critical, only memory-store reads are permitted.
    pub fn should_throttle(&self, op: OpKind) -> bool {
        match self.current_level() {
            PressureLevel::Normal | PressureLevel::Moderate => false,
            PressureLevel::High | PressureLevel::Critical => {
                !matches!(op, OpKind::MemoryRead)
            }
        }
    }

    /// Scale a configured batch size down under pressure. High and Critical
    /// collapse it to 1.
    pub fn recommended_batch_size(&self, configured: usize) -> usize {
        match self.current_level() {
            PressureLevel::Normal => configured,
            PressureLevel::Moderate => (configured / 2).max(1),
            PressureLevel::High | PressureLevel::Critical => 1,
        }
    }

    /// Scale worker concurrency down under pressure.
    pub fn recommended_concurrency(&self, configured: usize) -> usize {
        match self.current_level() {
            PressureLevel::Normal => configured.max(1),
            PressureLevel::Moderate => (configured / 2).max(1),
            PressureLevel::High | PressureLevel::Critical => 1,
        }
    }

    /// Run the compaction hook when pressure warrants it, bounded by the
    /// per-level cooldown. Returns true when compaction ran.
    pub fn maybe_trigger_gc(&self) -> bool {
        let cooldown = match self.current_level() {
            PressureLevel::High => COMPACTION_COOLDOWN_HIGH,
            PressureLevel::Critical => COMPACTION_COOLDOWN_CRITICAL,
            _ => return false,
        };

        let mut last = self.last_compaction.lock();
        if let Some(at) = *last {
            if at.elapsed() < cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        drop(last);

        if let Some(hook) = self.compaction_hook.lock().as_ref() {
            info!("memory pressure compaction triggered");
            hook();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn force_level(&self, level: PressureLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }
}

/// Pure classification, additive thresholds on top of the configured
/// maximum usage percentage.
fn classify(system_percent: f32, working_set: u64, max_percent: f32) -> PressureLevel {
    if system_percent > max_percent + 10.0 || working_set > WORKING_SET_CRITICAL {
        PressureLevel::Critical
    } else if system_percent > max_percent + 5.0 || working_set > WORKING_SET_HIGH {
        PressureLevel::High
    } else if system_percent > max_percent || working_set > WORKING_SET_MODERATE {
        PressureLevel::Moderate
    } else {
        PressureLevel::Normal
    }
}
