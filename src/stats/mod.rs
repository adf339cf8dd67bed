//! Task and CPU statistics for the shell.
//!
//! A collector task samples the scheduler once per
//! [`STATS_SAMPLE_INTERVAL_MS`](crate::core::STATS_SAMPLE_INTERVAL_MS) and
//! publishes into a double-buffered [`Snapshot`]. Readers get either the
//! cumulative share of each task, or the momentary share computed between the
//! two most recent samples.
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{String, Vec};

use crate::core::{MAX_TASKS, STATS_LOCK_TIMEOUT_MS};
use crate::infra::snapshot::{Generations, Snapshot};
use crate::protocol::traits::timer::GatewayTimer;

/// Longest task name kept in a sample.
pub const TASK_NAME_LEN: usize = 16;

/// Scheduler view of one task at sampling time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskSample {
    pub name: String<TASK_NAME_LEN>,
    /// Scheduler handle, stable for the task's lifetime.
    pub handle: u32,
    pub priority: u8,
    pub stack_high_water: u32,
    pub core_affinity: u32,
    /// Cumulative runtime counter.
    pub runtime: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemSample {
    pub tasks: Vec<TaskSample, MAX_TASKS>,
    /// Runtime counter summed over every task.
    pub total_runtime: u64,
}

/// Provider of scheduler samples (RTOS task list, executor hooks, ...).
pub trait TaskStatsSource {
    fn sample(&mut self) -> SystemSample;
}

/// CPU share of one task, in hundredths of a percent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskUsage {
    pub name: String<TASK_NAME_LEN>,
    pub handle: u32,
    pub priority: u8,
    pub stack_high_water: u32,
    pub core_affinity: u32,
    /// Runtime over the measured window.
    pub runtime: u64,
    pub usage_centi_percent: u32,
}

impl TaskUsage {
    fn new(task: &TaskSample, runtime: u64, window: u64) -> Self {
        let usage = if window == 0 {
            0
        } else {
            (runtime.saturating_mul(10_000) / window).min(u32::MAX as u64) as u32
        };
        Self {
            name: task.name.clone(),
            handle: task.handle,
            priority: task.priority,
            stack_high_water: task.stack_high_water,
            core_affinity: task.core_affinity,
            runtime,
            usage_centi_percent: usage,
        }
    }
}

pub type CpuUsage = Vec<TaskUsage, MAX_TASKS>;

pub struct SystemStats<M: RawMutex> {
    snapshot: Snapshot<M, SystemSample>,
}

impl<M: RawMutex> Default for SystemStats<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> SystemStats<M> {
    pub const fn new() -> Self {
        Self {
            snapshot: Snapshot::new(),
        }
    }

    /// Publish a sample; the cycle is skipped if the lock stays busy.
    pub async fn publish<T: GatewayTimer>(&self, sample: SystemSample, timer: &mut T) -> bool {
        self.snapshot
            .publish_within(sample, timer, STATS_LOCK_TIMEOUT_MS)
            .await
    }

    /// Both generations, or `None` if the lock stays busy.
    pub async fn read<T: GatewayTimer>(&self, timer: &mut T) -> Option<Generations<SystemSample>> {
        self.snapshot.read_within(timer, STATS_LOCK_TIMEOUT_MS).await
    }

    /// Per-task CPU usage. `momentary` measures between the last two samples
    /// (only tasks present in both), falling back to cumulative figures until
    /// two samples exist. `None` if the lock cannot be taken in time.
    pub async fn cpu_usage<T: GatewayTimer>(&self, timer: &mut T, momentary: bool) -> Option<CpuUsage> {
        let generations = self.read(timer).await?;
        Some(compute_usage(&generations, momentary))
    }
}

fn compute_usage(generations: &Generations<SystemSample>, momentary: bool) -> CpuUsage {
    let mut usage = CpuUsage::new();
    let Some(current) = &generations.current else {
        return usage;
    };

    match (&generations.previous, momentary) {
        (Some(previous), true) => {
            let window = current.total_runtime.saturating_sub(previous.total_runtime);
            if window == 0 {
                return usage;
            }
            for task in &current.tasks {
                let Some(before) = previous.tasks.iter().find(|t| t.handle == task.handle) else {
                    continue;
                };
                let runtime = task.runtime.saturating_sub(before.runtime);
                let _ = usage.push(TaskUsage::new(task, runtime, window));
            }
        }
        _ => {
            for task in &current.tasks {
                let _ = usage.push(TaskUsage::new(task, task.runtime, current.total_runtime));
            }
        }
    }
    usage
}
