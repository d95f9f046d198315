use crate::error::WorkflowError;
use crate::traits::StepOutcome;
use crate::workflow::WorkflowStatus;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_secs: u64,
    pub steps: StepMetrics,
    pub workflows: WorkflowMetrics,
    pub performance: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepMetrics {
    pub total: u64,
    pub confirmed: u64,
    pub already_satisfied: u64,
    pub done: u64,
    pub skipped: u64,
    pub failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowMetrics {
    pub completed: u64,
    pub skipped: u64,
    pub aborted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_duration_ms: u64,
    pub avg_step_duration_ms: f64,
    pub min_step_duration_ms: u64,
    pub max_step_duration_ms: u64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    steps_total: AtomicU64,
    steps_confirmed: AtomicU64,
    steps_satisfied: AtomicU64,
    steps_done: AtomicU64,
    steps_skipped: AtomicU64,
    steps_failed: AtomicU64,
    step_duration_sum_ms: AtomicU64,
    step_min_duration_ms: AtomicU64,
    step_max_duration_ms: AtomicU64,
    workflows_completed: AtomicU64,
    workflows_skipped: AtomicU64,
    workflows_aborted: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            steps_total: AtomicU64::new(0),
            steps_confirmed: AtomicU64::new(0),
            steps_satisfied: AtomicU64::new(0),
            steps_done: AtomicU64::new(0),
            steps_skipped: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            step_duration_sum_ms: AtomicU64::new(0),
            step_min_duration_ms: AtomicU64::new(u64::MAX),
            step_max_duration_ms: AtomicU64::new(0),
            workflows_completed: AtomicU64::new(0),
            workflows_skipped: AtomicU64::new(0),
            workflows_aborted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn global() -> &'static Self {
        static INSTANCE: std::sync::OnceLock<MetricsCollector> = std::sync::OnceLock::new();
        INSTANCE.get_or_init(MetricsCollector::default)
    }

    pub fn record_step(
        &self,
        _name: &str,
        duration: Duration,
        result: &Result<StepOutcome, WorkflowError>,
    ) {
        self.steps_total.fetch_add(1, Ordering::SeqCst);

        let duration_ms = duration.as_millis() as u64;
        self.step_duration_sum_ms
            .fetch_add(duration_ms, Ordering::SeqCst);
        self.step_min_duration_ms
            .fetch_min(duration_ms, Ordering::SeqCst);
        self.step_max_duration_ms
            .fetch_max(duration_ms, Ordering::SeqCst);

        let counter = match result {
            Ok(StepOutcome::Confirmed(_)) => &self.steps_confirmed,
            Ok(StepOutcome::AlreadySatisfied { .. }) => &self.steps_satisfied,
            Ok(StepOutcome::Done { .. }) => &self.steps_done,
            Err(e) if e.is_skip() => &self.steps_skipped,
            Err(_) => &self.steps_failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_workflow(&self, status: WorkflowStatus) {
        let counter = match status {
            WorkflowStatus::Completed => &self.workflows_completed,
            WorkflowStatus::Skipped => &self.workflows_skipped,
            WorkflowStatus::Aborted => &self.workflows_aborted,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.steps_total.load(Ordering::SeqCst);
        let confirmed = self.steps_confirmed.load(Ordering::SeqCst);
        let satisfied = self.steps_satisfied.load(Ordering::SeqCst);
        let done = self.steps_done.load(Ordering::SeqCst);
        let total_duration = self.step_duration_sum_ms.load(Ordering::SeqCst);
        let min_duration = self.step_min_duration_ms.load(Ordering::SeqCst);

        let succeeded = confirmed + satisfied + done;

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_secs: self.uptime().as_secs(),
            steps: StepMetrics {
                total,
                confirmed,
                already_satisfied: satisfied,
                done,
                skipped: self.steps_skipped.load(Ordering::SeqCst),
                failed: self.steps_failed.load(Ordering::SeqCst),
                success_rate: if total > 0 {
                    succeeded as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            },
            workflows: WorkflowMetrics {
                completed: self.workflows_completed.load(Ordering::SeqCst),
                skipped: self.workflows_skipped.load(Ordering::SeqCst),
                aborted: self.workflows_aborted.load(Ordering::SeqCst),
            },
            performance: PerformanceMetrics {
                total_duration_ms: total_duration,
                avg_step_duration_ms: if total > 0 {
                    total_duration as f64 / total as f64
                } else {
                    0.0
                },
                min_step_duration_ms: if min_duration == u64::MAX {
                    0
                } else {
                    min_duration
                },
                max_step_duration_ms: self.step_max_duration_ms.load(Ordering::SeqCst),
            },
        }
    }

    pub fn to_json(&self) -> String {
        let snapshot = self.snapshot();
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn export_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json();
        tokio::fs::write(path, json).await
    }

    pub fn steps_total(&self) -> u64 {
        self.steps_total.load(Ordering::SeqCst)
    }

    pub fn steps_failed(&self) -> u64 {
        self.steps_failed.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
