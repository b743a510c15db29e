use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::error::ErrorCode;
use crate::domain::session::ResolutionSource;

const MAX_LATENCY_RECORDS: usize = 1000;

/// セッションのローカルメトリクス収集器
pub struct SessionMetrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    requests: u64,
    rejected_busy: u64,
    superseded: u64,
    resolved_final: u64,
    resolved_partial: u64,
    resolved_empty: u64,
    timeouts: u64,
    engine_errors: u64,
    failures_permission: u64,
    failures_unavailable: u64,
    failures_construction: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub source: ResolutionSource,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub requests: u64,
    pub rejected_busy: u64,
    pub superseded: u64,
    pub resolutions: ResolutionCounts,
    pub timeouts: u64,
    pub engine_errors: u64,
    pub failures: FailureCounts,
    pub avg_latency_ms: Option<f64>,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionCounts {
    pub final_result: u64,
    pub partial: u64,
    pub empty: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureCounts {
    pub permission: u64,
    pub unavailable: u64,
    pub construction: u64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_requests(&self) {
        self.counters.lock().requests += 1;
    }

    pub fn inc_rejected_busy(&self) {
        self.counters.lock().rejected_busy += 1;
    }

    pub fn inc_superseded(&self) {
        self.counters.lock().superseded += 1;
    }

    pub fn inc_timeouts(&self) {
        self.counters.lock().timeouts += 1;
    }

    pub fn inc_engine_errors(&self) {
        self.counters.lock().engine_errors += 1;
    }

    pub fn inc_failure(&self, code: ErrorCode) {
        let mut c = self.counters.lock();
        match code {
            ErrorCode::PermissionDenied => c.failures_permission += 1,
            ErrorCode::ServiceUnavailable => c.failures_unavailable += 1,
            ErrorCode::ConstructionFailed => c.failures_construction += 1,
        }
    }

    /// 解決1件を記録する（リクエスト受付から解決までの時間付き）
    pub fn record_resolution(&self, source: ResolutionSource, duration_ms: u64) {
        {
            let mut c = self.counters.lock();
            match source {
                ResolutionSource::Final => c.resolved_final += 1,
                ResolutionSource::Partial => c.resolved_partial += 1,
                ResolutionSource::Empty => c.resolved_empty += 1,
            }
        }

        let record = LatencyRecord {
            source,
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock();
        latencies.push(record);
        if latencies.len() > MAX_LATENCY_RECORDS {
            let excess = latencies.len() - MAX_LATENCY_RECORDS;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock();
        let latencies = self.latencies.lock();

        let avg_latency_ms = if latencies.is_empty() {
            None
        } else {
            let total: f64 = latencies.iter().map(|r| r.duration_ms as f64).sum();
            Some(total / latencies.len() as f64)
        };

        let recent: Vec<LatencyRecord> = latencies.iter().rev().take(20).cloned().collect();

        MetricsSummary {
            requests: c.requests,
            rejected_busy: c.rejected_busy,
            superseded: c.superseded,
            resolutions: ResolutionCounts {
                final_result: c.resolved_final,
                partial: c.resolved_partial,
                empty: c.resolved_empty,
            },
            timeouts: c.timeouts,
            engine_errors: c.engine_errors,
            failures: FailureCounts {
                permission: c.failures_permission,
                unavailable: c.failures_unavailable,
                construction: c.failures_construction,
            },
            avg_latency_ms,
            recent_latencies: recent,
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
