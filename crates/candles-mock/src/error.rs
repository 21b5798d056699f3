//! 모의 서버 에러 타입.

use thiserror::Error;

/// 모의 거래소 서버 에러.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// 리스너 바인딩 실패
    #[error("Failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    /// 이미 실행 중
    #[error("Mock server is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("Mock server is not running")]
    NotRunning,

    /// 등록되지 않은 거래소 플러그인
    #[error("Unknown exchange plugin: {0}")]
    UnknownExchange(String),

    /// 설정 로드 실패
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// 모의 서버 작업 결과 타입.
pub type MockServerResult<T> = Result<T, MockServerError>;
