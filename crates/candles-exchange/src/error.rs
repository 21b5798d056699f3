//! 거래소 통신 에러 타입.

use candles_core::CandleError;
use thiserror::Error;

/// 거래소 REST/WebSocket 통신 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 페이로드 파싱/정규화 에러
    #[error(transparent)]
    Candle(#[from] CandleError),

    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 2xx가 아닌 HTTP 응답
    #[error("API error {code}: {message}")]
    ApiError { code: u16, message: String },

    /// 응답 본문 역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 레지스트리에 없는 거래소 식별자
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Network(_)
            | ExchangeError::Timeout(_)
            | ExchangeError::WebSocket(_)
            | ExchangeError::Disconnected(_) => true,
            ExchangeError::ApiError { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// 권장 재시도 대기 시간(밀리초) 반환.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            ExchangeError::ApiError { code: 429, .. } => Some(60_000), // 1분
            ExchangeError::ApiError { code, .. } if *code >= 500 => Some(2_000),
            ExchangeError::Network(_) => Some(1_000),
            ExchangeError::Disconnected(_) => Some(5_000),
            ExchangeError::Timeout(_) => Some(500),
            ExchangeError::WebSocket(_) => Some(2_000),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                ExchangeError::Disconnected(err.to_string())
            }
            other => ExchangeError::WebSocket(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ExchangeError::Timeout("t".into()).is_retryable());
        assert!(ExchangeError::ApiError {
            code: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!ExchangeError::ApiError {
            code: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!ExchangeError::from(CandleError::unexpected("x", "array")).is_retryable());
    }

    #[test]
    fn test_retry_delay() {
        let rate_limited = ExchangeError::ApiError {
            code: 429,
            message: String::new(),
        };
        assert_eq!(rate_limited.retry_delay_ms(), Some(60_000));
        assert_eq!(ExchangeError::Network("x".into()).retry_delay_ms(), Some(1_000));
        assert_eq!(ExchangeError::UnknownExchange("x".into()).retry_delay_ms(), None);
    }
}
