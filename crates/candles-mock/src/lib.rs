//! # Candles Mock
//!
//! 실제 거래소의 REST/WebSocket 와이어 형식을 흉내내는 모의 거래소 서버입니다.
//!
//! 거래소별 동작은 [`ExchangePlugin`]으로 분리되어 있고, 서버는 플러그인의 라우트
//! 테이블만 보고 요청을 디스패치합니다. 플러그인이 만든 페이로드는 `candles-exchange`의
//! 짝이 되는 어댑터로 그대로 파싱됩니다.
//!
//! - [`MockExchangeServer`] - 리스너, 합성 태스크, 구독 관리
//! - [`PluginRegistry`] - 거래소 식별자별 플러그인 생성
//! - [`MonitoringContext`] - 서버 실행 단위 카운터

pub mod config;
pub mod error;
pub mod monitoring;
pub mod plugin;
pub mod plugins;
pub mod rate_limit;
pub mod server;

pub use config::{LoggingSettings, MockServerConfig, RateLimitSettings, TradingPairSeed};
pub use error::{MockServerError, MockServerResult};
pub use monitoring::{MonitoringContext, MonitoringSnapshot};
pub use plugin::{
    CandlesQuery, ErrorResponse, ExchangePlugin, RateLimits, RestRequest, RestRoute,
    RouteHandler, SubscriptionAction, WsStream, WsSubscription,
};
pub use plugins::PluginRegistry;
pub use rate_limit::{MessageLimiter, RateLimitResult, RateLimiter};
pub use server::MockExchangeServer;
