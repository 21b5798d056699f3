//! 모의 서버 설정.
//!
//! 선택적 설정 파일 위에 `CANDLES_MOCK__` 접두사 환경 변수를 덮어씁니다.
//! 예: `CANDLES_MOCK__PORT=9000`, `CANDLES_MOCK__RATE_LIMIT__ENABLED=false`

use std::path::Path;

use candles_core::logging::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::error::MockServerResult;

/// 모의 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MockServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트 (0 = 임의 포트)
    pub port: u16,
    /// 플러그인 식별자 (예: "binance_spot")
    pub exchange: String,
    /// 시리즈별 최대 보관 캔들 수
    pub candle_capacity: usize,
    /// 거래쌍 등록 시 생성할 과거 캔들 수
    pub initial_history: usize,
    /// 캔들 합성 주기 (밀리초)
    pub tick_interval_ms: u64,
    /// 자동 등록되는 거래쌍의 시작 가격
    pub default_initial_price: f64,
    /// Rate limit 설정
    pub rate_limit: RateLimitSettings,
    /// 로깅 설정
    pub logging: LoggingSettings,
    /// 시작 시 등록할 거래쌍
    pub trading_pairs: Vec<TradingPairSeed>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            exchange: "binance_spot".to_string(),
            candle_capacity: 1000,
            initial_history: 150,
            tick_interval_ms: 1000,
            default_initial_price: 100.0,
            rate_limit: RateLimitSettings::default(),
            logging: LoggingSettings::default(),
            trading_pairs: Vec::new(),
        }
    }
}

impl MockServerConfig {
    /// 설정 파일(선택)과 환경 변수에서 설정을 로드합니다.
    pub fn load(path: Option<&Path>) -> MockServerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("CANDLES_MOCK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 바인딩 주소 문자열.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 거래소를 지정합니다.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// 합성 주기를 지정합니다.
    pub fn with_tick_interval_ms(mut self, tick_interval_ms: u64) -> Self {
        self.tick_interval_ms = tick_interval_ms;
        self
    }

    /// Rate limit 을 끕니다 (테스트용).
    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit.enabled = false;
        self
    }
}

/// Rate limit 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// 활성화 여부
    pub enabled: bool,
    /// 플러그인 기본값 대신 사용할 분당 REST 요청 수
    pub rest_requests_per_minute: Option<u32>,
    /// 플러그인 기본값 대신 사용할 초당 WS 메시지 수
    pub ws_messages_per_second: Option<u32>,
    /// 버스트 허용량
    pub burst_size: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rest_requests_per_minute: None,
            ws_messages_per_second: None,
            burst_size: 10,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info,candles_mock=debug".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        LogConfig::new(settings.level.clone()).with_format(settings.format)
    }
}

/// 시작 시 등록할 거래쌍.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingPairSeed {
    /// 정규 거래쌍 ("BTC-USDT")
    pub trading_pair: String,
    /// 인터벌 ("1m")
    pub interval: String,
    /// 시작 가격
    pub initial_price: f64,
}

impl std::str::FromStr for TradingPairSeed {
    type Err = String;

    /// `PAIR:INTERVAL:PRICE` 형식을 파싱합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(pair), Some(interval), Some(price), None) => {
                let initial_price = price
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid price in '{}'", s))?;
                Ok(Self {
                    trading_pair: pair.to_uppercase(),
                    interval: interval.to_string(),
                    initial_price,
                })
            }
            _ => Err(format!("Expected PAIR:INTERVAL:PRICE, got '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MockServerConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:0");
        assert!(config.rate_limit.enabled);
        assert_eq!(config.tick_interval_ms, 1000);
    }

    #[test]
    fn test_load_without_file() {
        let config = MockServerConfig::load(None).unwrap();
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_pair_seed_parse() {
        let seed: TradingPairSeed = "btc-usdt:1m:50000".parse().unwrap();
        assert_eq!(seed.trading_pair, "BTC-USDT");
        assert_eq!(seed.interval, "1m");
        assert_eq!(seed.initial_price, 50000.0);

        assert!("BTC-USDT:1m".parse::<TradingPairSeed>().is_err());
        assert!("BTC-USDT:1m:abc".parse::<TradingPairSeed>().is_err());
    }
}
