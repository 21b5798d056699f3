//! 거래소별 인터벌 테이블.
//!
//! 정규 인터벌 문자열("1m", "1h" 등)을 초 단위 기간과 거래소 고유 토큰으로 매핑합니다.
//! WebSocket 지원 인터벌은 항상 REST 지원 인터벌의 부분집합입니다.

use std::collections::HashMap;

/// 하나의 인터벌 정의.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSpec {
    /// 정규 인터벌 이름 (예: "1h")
    pub name: &'static str,
    /// 기간 (초)
    pub seconds: i64,
    /// 거래소 고유 토큰 (예: "60", "1H", "ONE_HOUR")
    pub token: &'static str,
    /// WebSocket 스트림 지원 여부
    pub ws: bool,
}

impl IntervalSpec {
    /// 인터벌 정의를 생성합니다.
    pub const fn new(name: &'static str, seconds: i64, token: &'static str, ws: bool) -> Self {
        Self {
            name,
            seconds,
            token,
            ws,
        }
    }
}

/// 거래소 하나의 정적 인터벌 테이블.
///
/// 테이블 순서가 곧 `ws_supported_intervals`의 순서입니다.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTable(pub &'static [IntervalSpec]);

impl IntervalTable {
    /// 모든 인터벌 정의.
    pub fn specs(&self) -> &'static [IntervalSpec] {
        self.0
    }

    /// 정규 인터벌 이름으로 정의를 찾습니다.
    pub fn get(&self, name: &str) -> Option<&'static IntervalSpec> {
        self.0.iter().find(|spec| spec.name == name)
    }

    /// 인터벌 기간(초).
    pub fn seconds(&self, name: &str) -> Option<i64> {
        self.get(name).map(|spec| spec.seconds)
    }

    /// 거래소 토큰.
    pub fn token(&self, name: &str) -> Option<&'static str> {
        self.get(name).map(|spec| spec.token)
    }

    /// 거래소 토큰을 반환하되, 매핑이 없으면 입력을 그대로 반환합니다.
    pub fn token_or_passthrough<'a>(&self, name: &'a str) -> &'a str {
        self.token(name).unwrap_or(name)
    }

    /// 거래소 토큰에서 정규 인터벌 정의를 역으로 찾습니다.
    pub fn from_token(&self, token: &str) -> Option<&'static IntervalSpec> {
        self.0.iter().find(|spec| spec.token == token)
    }

    /// 기간(초)으로 정규 인터벌 정의를 찾습니다.
    pub fn from_seconds(&self, seconds: i64) -> Option<&'static IntervalSpec> {
        self.0.iter().find(|spec| spec.seconds == seconds)
    }

    /// REST 지원 인터벌 전체 (이름 -> 초).
    pub fn supported_intervals(&self) -> HashMap<String, i64> {
        self.0
            .iter()
            .map(|spec| (spec.name.to_string(), spec.seconds))
            .collect()
    }

    /// WebSocket 지원 인터벌 (테이블 순서 유지).
    pub fn ws_supported_intervals(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|spec| spec.ws)
            .map(|spec| spec.name.to_string())
            .collect()
    }
}

/// 정규 인터벌 문자열을 초로 변환합니다.
///
/// 접미사: `s` 초, `m` 분, `h` 시간, `d` 일, `w` 주, `M` 월(30일 근사).
pub fn interval_to_seconds(interval: &str) -> Option<i64> {
    let split = interval.len().checked_sub(1)?;
    if !interval.is_char_boundary(split) {
        return None;
    }
    let (count, suffix) = interval.split_at(split);
    let count: i64 = count.parse().ok().filter(|n| *n > 0)?;

    let unit = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 7 * 86_400,
        "M" => 30 * 86_400,
        _ => return None,
    };
    Some(count * unit)
}
