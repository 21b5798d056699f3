//! Token Bucket 기반 rate limiting.
//!
//! REST 요청은 클라이언트 IP별 버킷, WebSocket 메시지는 연결별 버킷을 사용합니다.
//! 한도는 플러그인의 `rate_limits()`에서 오며 설정으로 덮어쓸 수 있습니다.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::RateLimitSettings;
use crate::plugin::RateLimits;

/// Token Bucket.
#[derive(Debug)]
pub struct TokenBucket {
    /// 현재 토큰 수
    tokens: f64,
    /// 마지막 리필 시간
    last_refill: Instant,
    /// 최대 토큰 수 (버킷 용량)
    max_tokens: f64,
    /// 초당 리필되는 토큰 수
    refill_rate: f64,
}

impl TokenBucket {
    /// 초당 리필량과 버스트로 버킷을 생성합니다.
    pub fn new(per_second: f64, burst: u32) -> Self {
        let max_tokens = per_second.max(1.0) + burst as f64;
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate: per_second,
        }
    }

    /// 토큰 소비 시도.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// 다음 토큰까지 대기 시간 (초).
    pub fn time_until_next_token(&self) -> f64 {
        if self.tokens >= 1.0 || self.refill_rate <= 0.0 {
            0.0
        } else {
            (1.0 - self.tokens) / self.refill_rate
        }
    }
}

/// Rate Limit 확인 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// 요청 허용됨
    Allowed,
    /// Rate limit 초과
    Limited {
        /// 재시도까지 대기 시간 (초)
        retry_after: u64,
    },
}

/// IP별 REST Rate Limiter.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    requests_per_minute: u32,
    burst_size: u32,
    buckets: Arc<RwLock<HashMap<IpAddr, TokenBucket>>>,
}

impl RateLimiter {
    /// 분당 요청 수와 버스트로 생성합니다.
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            enabled: true,
            requests_per_minute,
            burst_size,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 플러그인 한도와 설정 덮어쓰기로 생성합니다.
    pub fn from_settings(limits: &RateLimits, settings: &RateLimitSettings) -> Self {
        let rpm = settings
            .rest_requests_per_minute
            .unwrap_or(limits.rest_requests_per_minute);
        Self {
            enabled: settings.enabled,
            ..Self::new(rpm, settings.burst_size)
        }
    }

    /// 제한 없는 Limiter.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, 0)
        }
    }

    /// 요청 허용 여부 확인.
    pub async fn check(&self, ip: IpAddr) -> RateLimitResult {
        if !self.enabled {
            return RateLimitResult::Allowed;
        }

        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(ip).or_insert_with(|| {
            TokenBucket::new(self.requests_per_minute as f64 / 60.0, self.burst_size)
        });

        if bucket.try_acquire() {
            RateLimitResult::Allowed
        } else {
            let retry_after = bucket.time_until_next_token().ceil() as u64;
            RateLimitResult::Limited { retry_after }
        }
    }

    /// 오래된 버킷 정리.
    pub async fn cleanup(&self, max_idle: Duration) {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < max_idle);
    }

    /// 현재 추적 중인 IP 수 반환.
    pub async fn tracked_ips(&self) -> usize {
        self.buckets.read().await.len()
    }
}

/// WebSocket 연결별 메시지 Limiter.
#[derive(Debug)]
pub struct MessageLimiter {
    bucket: Option<TokenBucket>,
}

impl MessageLimiter {
    /// 플러그인 한도와 설정 덮어쓰기로 생성합니다.
    pub fn from_settings(limits: &RateLimits, settings: &RateLimitSettings) -> Self {
        if !settings.enabled {
            return Self { bucket: None };
        }
        let per_second = settings
            .ws_messages_per_second
            .unwrap_or(limits.ws_messages_per_second);
        Self {
            bucket: Some(TokenBucket::new(per_second as f64, settings.burst_size)),
        }
    }

    /// 메시지 처리 허용 여부.
    pub fn allow(&mut self) -> bool {
        self.bucket.as_mut().map_or(true, TokenBucket::try_acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_requests() {
        let limiter = RateLimiter::new(60, 10);
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        assert_eq!(limiter.check(ip).await, RateLimitResult::Allowed);
    }

    #[tokio::test]
    async fn test_rate_limiter_limits_burst() {
        let limiter = RateLimiter::new(60, 5);
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        // 1 (초당) + 5 (버스트) = 6
        for i in 0..6 {
            assert_eq!(
                limiter.check(ip).await,
                RateLimitResult::Allowed,
                "Request {} should be allowed",
                i
            );
        }

        assert!(matches!(
            limiter.check(ip).await,
            RateLimitResult::Limited { retry_after } if retry_after >= 1
        ));
    }

    #[tokio::test]
    async fn test_rate_limiter_different_ips() {
        let limiter = RateLimiter::new(60, 0);
        let ip1: IpAddr = "192.168.1.1".parse().unwrap();
        let ip2: IpAddr = "192.168.1.2".parse().unwrap();

        assert_eq!(limiter.check(ip1).await, RateLimitResult::Allowed);
        assert!(matches!(
            limiter.check(ip1).await,
            RateLimitResult::Limited { .. }
        ));

        // IP2는 별도 버킷
        assert_eq!(limiter.check(ip2).await, RateLimitResult::Allowed);
    }

    #[tokio::test]
    async fn test_disabled_limiter() {
        let limiter = RateLimiter::disabled();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..100 {
            assert_eq!(limiter.check(ip).await, RateLimitResult::Allowed);
        }
        assert_eq!(limiter.tracked_ips().await, 0);
    }

    #[tokio::test]
    async fn test_rate_limiter_cleanup() {
        let limiter = RateLimiter::new(60, 0);
        let ip: IpAddr = "192.168.1.1".parse().unwrap();

        let _ = limiter.check(ip).await;
        assert_eq!(limiter.tracked_ips().await, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.cleanup(Duration::from_millis(10)).await;
        assert_eq!(limiter.tracked_ips().await, 0);
    }

    #[test]
    fn test_message_limiter() {
        let limits = RateLimits {
            rest_requests_per_minute: 60,
            ws_messages_per_second: 2,
        };
        let settings = RateLimitSettings {
            burst_size: 0,
            ..Default::default()
        };
        let mut limiter = MessageLimiter::from_settings(&limits, &settings);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        let off = RateLimitSettings {
            enabled: false,
            ..Default::default()
        };
        let mut limiter = MessageLimiter::from_settings(&limits, &off);
        assert!((0..100).all(|_| limiter.allow()));
    }
}
