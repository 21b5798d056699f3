//! 거래소 캔들 어댑터 및 네트워크 협력자.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 어댑터 능력 trait (`TradingPairFormatter`, `RestParamBuilder`, `RestResponseParser`, `WsMessageCodec`)
//! - 통합 `CandleAdapter` 인터페이스
//! - Binance, Bybit, OKX, Kraken, Gate.io, Hyperliquid, Coinbase, KuCoin 어댑터
//! - 거래소 식별자 -> 어댑터 생성자 레지스트리
//! - REST/WebSocket 네트워크 클라이언트

pub mod adapters;
pub mod common;
pub mod error;
pub mod network;
pub mod registry;
pub mod traits;

pub use adapters::*;
pub use error::*;
pub use network::{HttpNetworkClient, NetworkClient, WsConnection};
pub use registry::AdapterRegistry;
pub use traits::*;
