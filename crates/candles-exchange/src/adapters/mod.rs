//! 거래소별 캔들 어댑터.
//!
//! 각 어댑터는 `CandleAdapter`를 구현하며, 현물/무기한 변형은 시장 설정 값으로 구분합니다.

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod gate_io;
pub mod hyperliquid;
pub mod kraken;
pub mod kucoin;
pub mod okx;

pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use coinbase::CoinbaseAdvancedTradeAdapter;
pub use gate_io::GateIoAdapter;
pub use hyperliquid::HyperliquidAdapter;
pub use kraken::KrakenAdapter;
pub use kucoin::KucoinAdapter;
pub use okx::OkxAdapter;
