//! # Candles Core
//!
//! 멀티 거래소 캔들 수집 프레임워크의 핵심 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 어댑터와 모의 거래소 서버가 공통으로 사용하는 기본 타입을 제공합니다:
//! - `CandleData` - 정규화된 OHLCV 캔들
//! - 타임스탬프 단위 정규화 (초/밀리초/ISO-8601)
//! - 거래소별 인터벌 테이블
//! - 거래쌍 형식 변환 헬퍼
//! - 로깅 인프라

pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
