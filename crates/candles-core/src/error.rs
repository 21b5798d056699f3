//! 캔들 정규화 과정의 에러 타입.
//!
//! 파싱 중 발생하는 에러는 조용히 0으로 대체하지 않고 호출자에게 전파합니다.

use thiserror::Error;

/// 캔들 파싱/정규화 에러.
#[derive(Debug, Error)]
pub enum CandleError {
    /// 타임스탬프로 해석할 수 없는 값
    #[error("잘못된 타임스탬프: {0}")]
    InvalidTimestamp(String),

    /// 페이로드 구조가 기대한 JSON 타입과 다름 (거래소 와이어 포맷 변경 신호)
    #[error("예상치 못한 페이로드 ({context}): {expected} 필요")]
    UnexpectedPayload {
        /// 위치 설명 (예: "binance rest row")
        context: String,
        /// 기대한 타입
        expected: &'static str,
    },

    /// 거래소가 자체 에러 형식으로 응답함
    #[error("거래소 에러 {code}: {message}")]
    ExchangeReported { code: String, message: String },

    /// 잘못된 거래쌍 형식
    #[error("잘못된 거래쌍: {0}")]
    InvalidTradingPair(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 캔들 작업을 위한 Result 타입.
pub type CandleResult<T> = Result<T, CandleError>;

impl CandleError {
    /// 타입 불일치 에러를 생성합니다.
    pub fn unexpected(context: impl Into<String>, expected: &'static str) -> Self {
        CandleError::UnexpectedPayload {
            context: context.into(),
            expected,
        }
    }

    /// 거래소 보고 에러를 생성합니다.
    pub fn exchange(code: impl ToString, message: impl Into<String>) -> Self {
        CandleError::ExchangeReported {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// 와이어 포맷 변경을 의미하는 에러인지 확인합니다.
    ///
    /// 이 경우 재시도가 아니라 코드 수정이 필요합니다.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CandleError::UnexpectedPayload { .. } | CandleError::InvalidTimestamp(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_classification() {
        let err = CandleError::unexpected("binance rest", "array");
        assert!(err.is_format_error());

        let err = CandleError::InvalidTimestamp("abc".to_string());
        assert!(err.is_format_error());

        let err = CandleError::exchange(-1121, "Invalid symbol.");
        assert!(!err.is_format_error());
    }

    #[test]
    fn test_error_display() {
        let err = CandleError::exchange("51000", "Parameter bar error");
        assert_eq!(err.to_string(), "거래소 에러 51000: Parameter bar error");
    }
}
