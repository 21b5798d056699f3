//! 모의 서버 모니터링 컨텍스트.
//!
//! 서버 `start()`에서 생성되고 `stop()`에서 해제됩니다. 전역 싱글톤이 아니며
//! 필요한 곳에 `Arc`로 전달합니다.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 서버 실행 중 누적되는 카운터.
#[derive(Debug)]
pub struct MonitoringContext {
    started_at: DateTime<Utc>,
    rest_requests: AtomicU64,
    rejected_requests: AtomicU64,
    ws_connections_current: AtomicU64,
    ws_connections_total: AtomicU64,
    candles_pushed: AtomicU64,
    candles_synthesized: AtomicU64,
}

/// 카운터 스냅샷.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitoringSnapshot {
    pub rest_requests: u64,
    pub rejected_requests: u64,
    pub ws_connections_current: u64,
    pub ws_connections_total: u64,
    pub candles_pushed: u64,
    pub candles_synthesized: u64,
}

impl Default for MonitoringContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringContext {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            rest_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            ws_connections_current: AtomicU64::new(0),
            ws_connections_total: AtomicU64::new(0),
            candles_pushed: AtomicU64::new(0),
            candles_synthesized: AtomicU64::new(0),
        }
    }

    /// 시작 시각.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record_rest_request(&self) {
        self.rest_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// rate limit 또는 파라미터 검증으로 거절된 요청.
    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_connected(&self) {
        self.ws_connections_current.fetch_add(1, Ordering::Relaxed);
        self.ws_connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_disconnected(&self) {
        // 0 아래로 내려가지 않도록
        let _ = self.ws_connections_current.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| current.checked_sub(1),
        );
    }

    pub fn record_pushed(&self, count: u64) {
        self.candles_pushed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_synthesized(&self) {
        self.candles_synthesized.fetch_add(1, Ordering::Relaxed);
    }

    /// 현재 카운터 스냅샷.
    pub fn snapshot(&self) -> MonitoringSnapshot {
        MonitoringSnapshot {
            rest_requests: self.rest_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            ws_connections_current: self.ws_connections_current.load(Ordering::Relaxed),
            ws_connections_total: self.ws_connections_total.load(Ordering::Relaxed),
            candles_pushed: self.candles_pushed.load(Ordering::Relaxed),
            candles_synthesized: self.candles_synthesized.load(Ordering::Relaxed),
        }
    }
}
