//! 타임스탬프 단위 정규화.
//!
//! 거래소마다 캔들 시작 시간을 초, 밀리초, 또는 ISO-8601 문자열로 보고합니다.
//! 모든 값은 캔들 시작 시각 쪽으로 내림하여 정수 초로 변환됩니다.

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CandleError, CandleResult};

/// 숫자 타임스탬프의 단위.
///
/// 어댑터는 `Seconds` 또는 `Milliseconds` 중 하나를 고정으로 선언합니다.
/// 나머지 단위는 크기 기반 추론에서만 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
    /// 초
    Seconds,
    /// 밀리초
    Milliseconds,
    /// 마이크로초
    Microseconds,
    /// 나노초
    Nanoseconds,
}

impl TimestampUnit {
    /// 1초에 해당하는 이 단위의 값.
    pub fn per_second(&self) -> i64 {
        match self {
            TimestampUnit::Seconds => 1,
            TimestampUnit::Milliseconds => 1_000,
            TimestampUnit::Microseconds => 1_000_000,
            TimestampUnit::Nanoseconds => 1_000_000_000,
        }
    }

    /// 값의 크기로 단위를 추론합니다.
    ///
    /// ISO-8601 문자열이나 해석할 수 없는 값은 `Seconds`로 취급합니다.
    pub fn infer(raw: &RawTimestamp) -> Self {
        let magnitude = match raw {
            RawTimestamp::Int(v) => v.unsigned_abs() as f64,
            RawTimestamp::Float(v) => v.abs(),
            RawTimestamp::Text(s) => match s.trim().parse::<f64>() {
                Ok(v) => v.abs(),
                Err(_) => return TimestampUnit::Seconds,
            },
        };

        if magnitude >= 1e17 {
            TimestampUnit::Nanoseconds
        } else if magnitude >= 1e14 {
            TimestampUnit::Microseconds
        } else if magnitude >= 1e11 {
            TimestampUnit::Milliseconds
        } else {
            TimestampUnit::Seconds
        }
    }
}

impl fmt::Display for TimestampUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimestampUnit::Seconds => "seconds",
            TimestampUnit::Milliseconds => "milliseconds",
            TimestampUnit::Microseconds => "microseconds",
            TimestampUnit::Nanoseconds => "nanoseconds",
        };
        f.write_str(name)
    }
}

/// 정규화 전의 원시 타임스탬프.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// 정수 값
    Int(i64),
    /// 실수 값
    Float(f64),
    /// 숫자 문자열 또는 ISO-8601 문자열
    Text(String),
}

impl RawTimestamp {
    /// JSON 값에서 원시 타임스탬프를 추출합니다.
    ///
    /// 숫자나 문자열이 아니면 `InvalidTimestamp`를 반환합니다.
    pub fn from_value(value: &Value) -> CandleResult<Self> {
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(RawTimestamp::Int(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(RawTimestamp::Float(v))
                } else {
                    Err(CandleError::InvalidTimestamp(n.to_string()))
                }
            }
            Value::String(s) => Ok(RawTimestamp::Text(s.clone())),
            other => Err(CandleError::InvalidTimestamp(other.to_string())),
        }
    }
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Int(value)
    }
}

impl From<f64> for RawTimestamp {
    fn from(value: f64) -> Self {
        RawTimestamp::Float(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

impl From<String> for RawTimestamp {
    fn from(value: String) -> Self {
        RawTimestamp::Text(value)
    }
}

/// 원시 타임스탬프를 정수 초로 정규화합니다.
///
/// ISO-8601 문자열은 선언된 단위와 무관하게 UTC로 해석됩니다.
/// 숫자 값은 단위로 나눈 뒤 캔들 시작 시각 쪽으로 내림합니다.
pub fn normalize_timestamp(raw: &RawTimestamp, unit: TimestampUnit) -> CandleResult<i64> {
    match raw {
        RawTimestamp::Int(v) => Ok(v.div_euclid(unit.per_second())),
        RawTimestamp::Float(v) => normalize_float(*v, unit),
        RawTimestamp::Text(s) => {
            let trimmed = s.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(v.div_euclid(unit.per_second()));
            }
            if let Ok(v) = trimmed.parse::<f64>() {
                return normalize_float(v, unit);
            }
            parse_iso8601(trimmed)
                .ok_or_else(|| CandleError::InvalidTimestamp(format!("'{}'", s)))
        }
    }
}

/// JSON 값을 정수 초로 정규화합니다.
pub fn normalize_value(value: &Value, unit: TimestampUnit) -> CandleResult<i64> {
    normalize_timestamp(&RawTimestamp::from_value(value)?, unit)
}

/// 초 단위 타임스탬프를 거래소 단위로 변환합니다.
///
/// REST 쿼리 파라미터(`startTime`, `since` 등) 생성 시 사용합니다.
pub fn to_exchange_unit(seconds: i64, unit: TimestampUnit) -> i64 {
    seconds * unit.per_second()
}

fn normalize_float(value: f64, unit: TimestampUnit) -> CandleResult<i64> {
    if !value.is_finite() {
        return Err(CandleError::InvalidTimestamp(value.to_string()));
    }
    Ok((value / unit.per_second() as f64).floor() as i64)
}

fn parse_iso8601(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }

    // 오프셋 없는 형식은 UTC로 간주
    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| naive.and_utc().timestamp())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_milliseconds_truncates() {
        let raw = RawTimestamp::Int(1_672_531_259_999);
        assert_eq!(
            normalize_timestamp(&raw, TimestampUnit::Milliseconds).unwrap(),
            1_672_531_259
        );
    }

    #[test]
    fn test_normalize_seconds_passthrough() {
        let raw = RawTimestamp::from(1_672_531_200_i64);
        assert_eq!(
            normalize_timestamp(&raw, TimestampUnit::Seconds).unwrap(),
            1_672_531_200
        );
    }

    #[test]
    fn test_normalize_numeric_strings() {
        assert_eq!(
            normalize_timestamp(&"1672531200000".into(), TimestampUnit::Milliseconds).unwrap(),
            1_672_531_200
        );
        assert_eq!(
            normalize_timestamp(&"1542057360.435743".into(), TimestampUnit::Seconds).unwrap(),
            1_542_057_360
        );
    }

    #[test]
    fn test_normalize_iso_ignores_unit() {
        let raw = RawTimestamp::from("2023-01-01T00:00:00Z");
        assert_eq!(
            normalize_timestamp(&raw, TimestampUnit::Milliseconds).unwrap(),
            1_672_531_200
        );

        let raw = RawTimestamp::from("2023-06-09T20:19:35.39625135Z");
        assert_eq!(
            normalize_timestamp(&raw, TimestampUnit::Seconds).unwrap(),
            1_686_341_975
        );

        let raw = RawTimestamp::from("2023-01-01 00:01:00");
        assert_eq!(
            normalize_timestamp(&raw, TimestampUnit::Seconds).unwrap(),
            1_672_531_260
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_timestamp(&"yesterday".into(), TimestampUnit::Seconds).is_err());
        assert!(normalize_timestamp(&"NaN".into(), TimestampUnit::Seconds).is_err());
        assert!(normalize_timestamp(&RawTimestamp::Float(f64::INFINITY), TimestampUnit::Seconds)
            .is_err());
        assert!(normalize_value(&json!(null), TimestampUnit::Seconds).is_err());
        assert!(normalize_value(&json!([1, 2]), TimestampUnit::Seconds).is_err());
    }

    #[test]
    fn test_normalize_value_float() {
        assert_eq!(
            normalize_value(&json!(1672531200999.9), TimestampUnit::Milliseconds).unwrap(),
            1_672_531_200
        );
    }

    #[test]
    fn test_to_exchange_unit() {
        assert_eq!(
            to_exchange_unit(1_672_531_200, TimestampUnit::Milliseconds),
            1_672_531_200_000
        );
        assert_eq!(to_exchange_unit(1_672_531_200, TimestampUnit::Seconds), 1_672_531_200);
    }

    #[test]
    fn test_infer_unit() {
        assert_eq!(
            TimestampUnit::infer(&RawTimestamp::Int(1_672_531_200)),
            TimestampUnit::Seconds
        );
        assert_eq!(
            TimestampUnit::infer(&RawTimestamp::Int(1_672_531_200_000)),
            TimestampUnit::Milliseconds
        );
        assert_eq!(
            TimestampUnit::infer(&RawTimestamp::Int(1_672_531_200_000_000)),
            TimestampUnit::Microseconds
        );
        assert_eq!(
            TimestampUnit::infer(&"1589970010253893337".into()),
            TimestampUnit::Nanoseconds
        );
        assert_eq!(
            TimestampUnit::infer(&"2023-01-01T00:00:00Z".into()),
            TimestampUnit::Seconds
        );
    }
}
