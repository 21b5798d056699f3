//! 어댑터 공통 파싱 헬퍼.
//!
//! 누락된 선택 필드는 0으로 채우고, 타입 불일치는 에러로 전파합니다.

use candles_core::{normalize_value, CandleError, CandleResult, TimestampUnit};
use serde_json::{Map, Value};

/// 값이 배열이어야 하는 위치에서 배열을 꺼냅니다.
pub fn as_array<'a>(value: &'a Value, context: &str) -> CandleResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| CandleError::unexpected(context, "array"))
}

/// 값이 객체여야 하는 위치에서 객체를 꺼냅니다.
pub fn as_object<'a>(value: &'a Value, context: &str) -> CandleResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| CandleError::unexpected(context, "object"))
}

/// 숫자 필드를 f64로 읽습니다.
///
/// 필드가 없거나 null이면 0.0, 숫자 문자열은 파싱, 그 외 타입은 에러입니다.
pub fn num(value: Option<&Value>, context: &str) -> CandleResult<f64> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| CandleError::unexpected(context, "number")),
        Some(Value::String(s)) if s.is_empty() => Ok(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CandleError::unexpected(context, "numeric string")),
        Some(_) => Err(CandleError::unexpected(context, "number")),
    }
}

/// 정수 카운트 필드(체결 건수 등)를 읽습니다. 누락 시 0.
pub fn count(value: Option<&Value>, context: &str) -> CandleResult<u64> {
    match value {
        Some(Value::Number(n)) => Ok(n
            .as_u64()
            .unwrap_or_else(|| n.as_f64().map(|f| f.max(0.0) as u64).unwrap_or(0))),
        other => num(other, context).map(|f| f.max(0.0) as u64),
    }
}

/// 필수 타임스탬프 필드를 정수 초로 읽습니다.
///
/// 타임스탬프는 선택 필드가 아니므로 누락도 에러입니다.
pub fn timestamp(value: Option<&Value>, unit: TimestampUnit, context: &str) -> CandleResult<i64> {
    match value {
        None | Some(Value::Null) => Err(CandleError::InvalidTimestamp(format!(
            "{}: missing",
            context
        ))),
        Some(v) => normalize_value(v, unit),
    }
}

/// 배열 행의 인덱스 위치 숫자를 읽습니다.
pub fn row_num(row: &[Value], index: usize, context: &str) -> CandleResult<f64> {
    num(row.get(index), context)
}

/// 문자열 필드를 읽습니다. 누락 시 빈 문자열.
pub fn text<'a>(value: Option<&'a Value>) -> &'a str {
    value.and_then(Value::as_str).unwrap_or("")
}

/// 부동소수점 값을 거래소 응답처럼 문자열로 표현합니다.
///
/// `f64`의 `Display`는 왕복 가능한 최단 표현을 사용하므로 파싱 시 원래 값이 복원됩니다.
pub fn fmt_num(value: f64) -> String {
    value.to_string()
}

/// JSON 값을 따옴표 없는 문자열로 표현합니다.
pub fn plain(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// 거래소 에러 봉투를 감지했을 때 공통 형태의 에러를 만듭니다.
pub fn reported(code: &Value, message: Option<&Value>) -> CandleError {
    CandleError::exchange(plain(Some(code)), plain(message))
}
