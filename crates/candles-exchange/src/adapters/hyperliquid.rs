//! Hyperliquid 현물/무기한 캔들 어댑터.
//!
//! REST는 `POST /info` JSON 본문(`candleSnapshot`)을 사용합니다.
//! 무기한은 코인 이름(`BTC`), 현물은 `BASE/QUOTE` 로 식별합니다.

use candles_core::{
    sort_candles, CandleData, CandleError, CandleResult, IntervalSpec, IntervalTable,
    TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, count, num, reported, text, timestamp};
use crate::traits::{
    CandleAdapter, HttpMethod, RestParamBuilder, RestParams, RestResponseParser,
    TradingPairFormatter, WsMessageCodec,
};

/// 코인 식별 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HyperliquidCoinFormat {
    /// 기준 자산만 (`BTC`)
    BaseOnly,
    /// `BASE/QUOTE`
    Slash,
}

/// 현물/무기한 변형을 구분하는 시장 설정.
#[derive(Debug, Clone, Copy)]
pub struct HyperliquidMarket {
    /// 레지스트리 식별자
    pub id: &'static str,
    /// 코인 식별 방식
    pub coin_format: HyperliquidCoinFormat,
}

/// Hyperliquid REST 기본 URL.
pub const HYPERLIQUID_REST_URL: &str = "https://api.hyperliquid.xyz";

/// Hyperliquid WebSocket URL.
pub const HYPERLIQUID_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

/// Hyperliquid 인터벌 테이블.
pub const HYPERLIQUID_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1m", 60, "1m", true),
    IntervalSpec::new("3m", 180, "3m", true),
    IntervalSpec::new("5m", 300, "5m", true),
    IntervalSpec::new("15m", 900, "15m", true),
    IntervalSpec::new("30m", 1_800, "30m", true),
    IntervalSpec::new("1h", 3_600, "1h", true),
    IntervalSpec::new("2h", 7_200, "2h", true),
    IntervalSpec::new("4h", 14_400, "4h", true),
    IntervalSpec::new("8h", 28_800, "8h", true),
    IntervalSpec::new("12h", 43_200, "12h", true),
    IntervalSpec::new("1d", 86_400, "1d", true),
    IntervalSpec::new("3d", 259_200, "3d", true),
    IntervalSpec::new("1w", 604_800, "1w", true),
    IntervalSpec::new("1M", 2_592_000, "1M", true),
]);

/// Hyperliquid 현물.
pub const HYPERLIQUID_SPOT: HyperliquidMarket = HyperliquidMarket {
    id: "hyperliquid_spot",
    coin_format: HyperliquidCoinFormat::Slash,
};

/// Hyperliquid 무기한.
pub const HYPERLIQUID_PERPETUAL: HyperliquidMarket = HyperliquidMarket {
    id: "hyperliquid_perpetual",
    coin_format: HyperliquidCoinFormat::BaseOnly,
};

/// Hyperliquid 캔들 어댑터.
#[derive(Debug, Clone)]
pub struct HyperliquidAdapter {
    market: HyperliquidMarket,
}

impl HyperliquidAdapter {
    /// 시장 설정으로 어댑터를 생성합니다.
    pub fn new(market: HyperliquidMarket) -> Self {
        Self { market }
    }

    /// 현물 어댑터.
    pub fn spot() -> Self {
        Self::new(HYPERLIQUID_SPOT)
    }

    /// 무기한 어댑터.
    pub fn perpetual() -> Self {
        Self::new(HYPERLIQUID_PERPETUAL)
    }

    /// 시장 설정.
    pub fn market(&self) -> &HyperliquidMarket {
        &self.market
    }

    fn parse_candle(obj: &Value) -> CandleResult<CandleData> {
        let ctx = "hyperliquid candle";
        if !obj.is_object() {
            return Err(CandleError::unexpected(ctx, "object"));
        }
        Ok(CandleData::new(
            timestamp(obj.get("t"), TimestampUnit::Milliseconds, ctx)?,
            num(obj.get("o"), ctx)?,
            num(obj.get("h"), ctx)?,
            num(obj.get("l"), ctx)?,
            num(obj.get("c"), ctx)?,
            num(obj.get("v"), ctx)?,
        )
        .with_n_trades(count(obj.get("n"), ctx)?))
    }
}

impl TradingPairFormatter for HyperliquidAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        match self.market.coin_format {
            HyperliquidCoinFormat::BaseOnly => trading_pair
                .split('-')
                .next()
                .unwrap_or(trading_pair)
                .to_string(),
            HyperliquidCoinFormat::Slash => trading_pair.replace('-', "/"),
        }
    }
}

impl RestParamBuilder for HyperliquidAdapter {
    /// POST 본문 `{"type": "candleSnapshot", "req": {...}}` 를 생성합니다.
    ///
    /// 개수 파라미터는 없습니다 (최대 5000개).
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        _limit: Option<u32>,
    ) -> RestParams {
        let mut req = serde_json::Map::new();
        req.insert(
            "coin".into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        req.insert(
            "interval".into(),
            json!(HYPERLIQUID_INTERVALS.token_or_passthrough(interval)),
        );
        if let Some(start) = start_time {
            req.insert("startTime".into(), json!(self.to_exchange_time(start)));
        }
        if let Some(end) = end_time {
            req.insert("endTime".into(), json!(self.to_exchange_time(end)));
        }

        let mut params = RestParams::new();
        params.insert("type".into(), json!("candleSnapshot"));
        params.insert("req".into(), Value::Object(req));
        params
    }
}

impl RestResponseParser for HyperliquidAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };

        if let Some(error) = payload.get("error") {
            return Err(reported(&json!("422"), Some(error)));
        }

        let mut candles = as_array(payload, "hyperliquid candleSnapshot")?
            .iter()
            .map(Self::parse_candle)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for HyperliquidAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        json!({
            "method": "subscribe",
            "subscription": {
                "type": "candle",
                "coin": self.get_trading_pair_format(trading_pair),
                "interval": HYPERLIQUID_INTERVALS.token_or_passthrough(interval),
            },
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        if text(payload.get("channel")) != "candle" {
            return Ok(None);
        }

        match payload.get("data") {
            // 단일 객체 또는 배열 모두 허용
            Some(Value::Array(items)) => {
                let mut candles = items
                    .iter()
                    .map(Self::parse_candle)
                    .collect::<CandleResult<Vec<_>>>()?;
                sort_candles(&mut candles);
                Ok(Some(candles))
            }
            Some(data) => Ok(Some(vec![Self::parse_candle(data)?])),
            None => Ok(None),
        }
    }
}

impl CandleAdapter for HyperliquidAdapter {
    fn name(&self) -> &'static str {
        self.market.id
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Milliseconds
    }

    fn intervals(&self) -> IntervalTable {
        HYPERLIQUID_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        HYPERLIQUID_REST_URL
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        "/info".to_string()
    }

    fn ws_url(&self) -> &'static str {
        HYPERLIQUID_WS_URL
    }

    fn rest_method(&self) -> HttpMethod {
        HttpMethod::Post
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_formats() {
        assert_eq!(HyperliquidAdapter::perpetual().get_trading_pair_format("BTC-USD"), "BTC");
        assert_eq!(
            HyperliquidAdapter::spot().get_trading_pair_format("PURR-USDC"),
            "PURR/USDC"
        );
    }

    #[test]
    fn test_post_body() {
        let adapter = HyperliquidAdapter::perpetual();
        let body = adapter.get_rest_params("ETH-USD", "15m", Some(1_700_000_000), None, Some(10));
        assert_eq!(body["type"], json!("candleSnapshot"));
        assert_eq!(body["req"]["coin"], json!("ETH"));
        assert_eq!(body["req"]["interval"], json!("15m"));
        assert_eq!(body["req"]["startTime"], json!(1_700_000_000_000_i64));
        assert!(body["req"].get("endTime").is_none());
        assert_eq!(adapter.rest_method(), HttpMethod::Post);
    }

    #[test]
    fn test_parse_rest() {
        let adapter = HyperliquidAdapter::perpetual();
        let payload = json!([{
            "t": 1672531200000_i64, "T": 1672531259999_i64, "s": "BTC", "i": "1m",
            "o": "1", "c": "1.5", "h": "2", "l": "0.5", "v": "10", "n": 7
        }]);
        let c = &adapter.parse_rest_response(Some(&payload)).unwrap()[0];
        assert_eq!(c.timestamp, 1672531200);
        assert_eq!(c.close, 1.5);
        assert_eq!(c.n_trades, 7);
        assert!(adapter.parse_rest_response(Some(&json!({"t": 1}))).is_err());
    }

    #[test]
    fn test_ws_messages() {
        let adapter = HyperliquidAdapter::perpetual();
        let push = json!({"channel": "candle", "data": {
            "t": 1672531200000_i64, "T": 1672531259999_i64, "s": "BTC", "i": "1m",
            "o": "1", "c": "1.5", "h": "2", "l": "0.5", "v": "10", "n": 7
        }});
        assert_eq!(adapter.parse_ws_message(Some(&push)).unwrap().unwrap().len(), 1);

        let pong = json!({"channel": "pong"});
        assert!(adapter.parse_ws_message(Some(&pong)).unwrap().is_none());
        let ack = json!({"channel": "subscriptionResponse", "data": {"method": "subscribe"}});
        assert!(adapter.parse_ws_message(Some(&ack)).unwrap().is_none());
    }
}
