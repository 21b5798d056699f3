//! Bybit v5 현물/리니어 캔들 어댑터.
//!
//! 인터벌 토큰은 분 단위 숫자(`"1h" -> "60"`)이며 일 이상은 문자(`D`, `W`, `M`)입니다.
//! REST 응답은 최신순으로 정렬되어 있습니다.

use candles_core::{
    sort_candles, CandleData, CandleResult, IntervalSpec, IntervalTable, TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, as_object, num, reported, row_num, text, timestamp};
use crate::traits::{
    clamp_limit, CandleAdapter, RestParamBuilder, RestParams, RestResponseParser,
    TradingPairFormatter, WsMessageCodec,
};

/// 현물/리니어 변형을 구분하는 시장 설정.
#[derive(Debug, Clone, Copy)]
pub struct BybitMarket {
    /// 레지스트리 식별자
    pub id: &'static str,
    /// v5 `category` 파라미터
    pub category: &'static str,
    /// WebSocket URL
    pub ws_url: &'static str,
}

/// Bybit REST 기본 URL.
pub const BYBIT_REST_URL: &str = "https://api.bybit.com";

/// Bybit 요청당 최대 캔들 수.
pub const BYBIT_MAX_LIMIT: u32 = 1000;

/// Bybit 인터벌 테이블.
pub const BYBIT_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1m", 60, "1", true),
    IntervalSpec::new("3m", 180, "3", true),
    IntervalSpec::new("5m", 300, "5", true),
    IntervalSpec::new("15m", 900, "15", true),
    IntervalSpec::new("30m", 1_800, "30", true),
    IntervalSpec::new("1h", 3_600, "60", true),
    IntervalSpec::new("2h", 7_200, "120", true),
    IntervalSpec::new("4h", 14_400, "240", true),
    IntervalSpec::new("6h", 21_600, "360", true),
    IntervalSpec::new("12h", 43_200, "720", true),
    IntervalSpec::new("1d", 86_400, "D", true),
    IntervalSpec::new("1w", 604_800, "W", true),
    IntervalSpec::new("1M", 2_592_000, "M", true),
]);

/// Bybit 현물.
pub const BYBIT_SPOT: BybitMarket = BybitMarket {
    id: "bybit_spot",
    category: "spot",
    ws_url: "wss://stream.bybit.com/v5/public/spot",
};

/// Bybit USDT 리니어 무기한.
pub const BYBIT_PERPETUAL: BybitMarket = BybitMarket {
    id: "bybit_perpetual",
    category: "linear",
    ws_url: "wss://stream.bybit.com/v5/public/linear",
};

/// Bybit 캔들 어댑터.
#[derive(Debug, Clone)]
pub struct BybitAdapter {
    market: BybitMarket,
}

impl BybitAdapter {
    /// 시장 설정으로 어댑터를 생성합니다.
    pub fn new(market: BybitMarket) -> Self {
        Self { market }
    }

    /// 현물 어댑터.
    pub fn spot() -> Self {
        Self::new(BYBIT_SPOT)
    }

    /// 무기한 어댑터.
    pub fn perpetual() -> Self {
        Self::new(BYBIT_PERPETUAL)
    }

    /// 시장 설정.
    pub fn market(&self) -> &BybitMarket {
        &self.market
    }

    /// 캔들 토픽 (`kline.60.BTCUSDT`).
    pub fn topic(&self, trading_pair: &str, interval: &str) -> String {
        format!(
            "kline.{}.{}",
            BYBIT_INTERVALS.token_or_passthrough(interval),
            self.get_trading_pair_format(trading_pair)
        )
    }

    fn parse_row(row: &Value) -> CandleResult<CandleData> {
        let ctx = "bybit kline row";
        let row = as_array(row, ctx)?;
        // [startTime, open, high, low, close, volume, turnover]
        Ok(CandleData::new(
            timestamp(row.first(), TimestampUnit::Milliseconds, ctx)?,
            row_num(row, 1, ctx)?,
            row_num(row, 2, ctx)?,
            row_num(row, 3, ctx)?,
            row_num(row, 4, ctx)?,
            row_num(row, 5, ctx)?,
        )
        .with_quote_asset_volume(row_num(row, 6, ctx)?))
    }

    fn parse_ws_bar(bar: &Value) -> CandleResult<CandleData> {
        let ctx = "bybit ws kline";
        Ok(CandleData::new(
            timestamp(bar.get("start"), TimestampUnit::Milliseconds, ctx)?,
            num(bar.get("open"), ctx)?,
            num(bar.get("high"), ctx)?,
            num(bar.get("low"), ctx)?,
            num(bar.get("close"), ctx)?,
            num(bar.get("volume"), ctx)?,
        )
        .with_quote_asset_volume(num(bar.get("turnover"), ctx)?))
    }
}

impl TradingPairFormatter for BybitAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        trading_pair.replace('-', "")
    }
}

impl RestParamBuilder for BybitAdapter {
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> RestParams {
        let mut params = RestParams::new();
        params.insert("category".into(), json!(self.market.category));
        params.insert(
            "symbol".into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        params.insert(
            "interval".into(),
            json!(BYBIT_INTERVALS.token_or_passthrough(interval)),
        );
        if let Some(start) = start_time {
            params.insert("start".into(), json!(self.to_exchange_time(start)));
        }
        if let Some(end) = end_time {
            params.insert("end".into(), json!(self.to_exchange_time(end)));
        }
        params.insert("limit".into(), json!(clamp_limit(limit, BYBIT_MAX_LIMIT)));
        params
    }
}

impl RestResponseParser for BybitAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let payload = as_object(payload, "bybit rest response")?;

        if let Some(code) = payload.get("retCode") {
            if code.as_i64() != Some(0) {
                return Err(reported(code, payload.get("retMsg")));
            }
        }

        let Some(list) = payload.get("result").and_then(|r| r.get("list")) else {
            return Ok(Vec::new());
        };
        let mut candles = as_array(list, "bybit result.list")?
            .iter()
            .map(Self::parse_row)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for BybitAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        json!({
            "op": "subscribe",
            "args": [self.topic(trading_pair, interval)],
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };
        if !text(payload.get("topic")).starts_with("kline.") {
            return Ok(None);
        }
        let Some(data) = payload.get("data") else {
            return Ok(None);
        };

        let mut candles = as_array(data, "bybit ws data")?
            .iter()
            .map(Self::parse_ws_bar)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(Some(candles))
    }
}

impl CandleAdapter for BybitAdapter {
    fn name(&self) -> &'static str {
        self.market.id
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Milliseconds
    }

    fn intervals(&self) -> IntervalTable {
        BYBIT_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        BYBIT_REST_URL
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        "/v5/market/kline".to_string()
    }

    fn ws_url(&self) -> &'static str {
        self.market.ws_url
    }
}
