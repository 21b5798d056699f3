//! OKX v5 현물/스왑 캔들 어댑터.
//!
//! 스왑 상품은 `-SWAP` 접미사를 사용합니다 (`BTC-USDT-SWAP`).
//! REST 페이지네이션은 `after`(이 시각 이전), `before`(이 시각 이후) 입니다.

use candles_core::{
    sort_candles, CandleData, CandleResult, IntervalSpec, IntervalTable, TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, as_object, num, plain, reported, row_num, timestamp};
use crate::traits::{
    clamp_limit, CandleAdapter, RestParamBuilder, RestParams, RestResponseParser,
    TradingPairFormatter, WsMessageCodec,
};

/// 현물/스왑 변형을 구분하는 시장 설정.
#[derive(Debug, Clone, Copy)]
pub struct OkxMarket {
    /// 레지스트리 식별자
    pub id: &'static str,
    /// 상품 ID 접미사 (스왑은 "-SWAP")
    pub inst_suffix: &'static str,
}

/// OKX REST 기본 URL.
pub const OKX_REST_URL: &str = "https://www.okx.com";

/// OKX 캔들 채널은 business 엔드포인트에서 제공됩니다.
pub const OKX_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/business";

/// OKX 요청당 최대 캔들 수.
pub const OKX_MAX_LIMIT: u32 = 300;

/// OKX 인터벌 테이블.
pub const OKX_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1s", 1, "1s", false),
    IntervalSpec::new("1m", 60, "1m", true),
    IntervalSpec::new("3m", 180, "3m", true),
    IntervalSpec::new("5m", 300, "5m", true),
    IntervalSpec::new("15m", 900, "15m", true),
    IntervalSpec::new("30m", 1_800, "30m", true),
    IntervalSpec::new("1h", 3_600, "1H", true),
    IntervalSpec::new("2h", 7_200, "2H", true),
    IntervalSpec::new("4h", 14_400, "4H", true),
    IntervalSpec::new("6h", 21_600, "6H", true),
    IntervalSpec::new("12h", 43_200, "12H", true),
    IntervalSpec::new("1d", 86_400, "1D", true),
    IntervalSpec::new("1w", 604_800, "1W", true),
    IntervalSpec::new("1M", 2_592_000, "1M", true),
]);

/// OKX 현물.
pub const OKX_SPOT: OkxMarket = OkxMarket {
    id: "okx_spot",
    inst_suffix: "",
};

/// OKX 무기한 스왑.
pub const OKX_PERPETUAL: OkxMarket = OkxMarket {
    id: "okx_perpetual",
    inst_suffix: "-SWAP",
};

/// OKX 캔들 어댑터.
#[derive(Debug, Clone)]
pub struct OkxAdapter {
    market: OkxMarket,
}

impl OkxAdapter {
    /// 시장 설정으로 어댑터를 생성합니다.
    pub fn new(market: OkxMarket) -> Self {
        Self { market }
    }

    /// 현물 어댑터.
    pub fn spot() -> Self {
        Self::new(OKX_SPOT)
    }

    /// 무기한 어댑터.
    pub fn perpetual() -> Self {
        Self::new(OKX_PERPETUAL)
    }

    /// 시장 설정.
    pub fn market(&self) -> &OkxMarket {
        &self.market
    }

    /// WebSocket 채널 이름 (`candle1H`).
    pub fn channel(interval: &str) -> String {
        format!("candle{}", OKX_INTERVALS.token_or_passthrough(interval))
    }

    fn parse_row(row: &Value) -> CandleResult<CandleData> {
        let ctx = "okx candle row";
        let row = as_array(row, ctx)?;
        // [ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]
        Ok(CandleData::new(
            timestamp(row.first(), TimestampUnit::Milliseconds, ctx)?,
            row_num(row, 1, ctx)?,
            row_num(row, 2, ctx)?,
            row_num(row, 3, ctx)?,
            row_num(row, 4, ctx)?,
            row_num(row, 5, ctx)?,
        )
        .with_quote_asset_volume(row_num(row, 7, ctx)?))
    }

    fn parse_rows(data: &Value, context: &str) -> CandleResult<Vec<CandleData>> {
        let mut candles = as_array(data, context)?
            .iter()
            .map(Self::parse_row)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl TradingPairFormatter for OkxAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        format!("{}{}", trading_pair, self.market.inst_suffix)
    }
}

impl RestParamBuilder for OkxAdapter {
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> RestParams {
        let mut params = RestParams::new();
        params.insert(
            "instId".into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        params.insert(
            "bar".into(),
            json!(OKX_INTERVALS.token_or_passthrough(interval)),
        );
        params.insert(
            "limit".into(),
            json!(clamp_limit(limit, OKX_MAX_LIMIT).to_string()),
        );
        // after: 이 시각보다 이전 기록, before: 이 시각보다 이후 기록
        if let Some(end) = end_time {
            params.insert("after".into(), json!(self.to_exchange_time(end).to_string()));
        }
        if let Some(start) = start_time {
            params.insert(
                "before".into(),
                json!(self.to_exchange_time(start).to_string()),
            );
        }
        params
    }
}

impl RestResponseParser for OkxAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let payload = as_object(payload, "okx rest response")?;

        if let Some(code) = payload.get("code") {
            if plain(Some(code)) != "0" {
                return Err(reported(code, payload.get("msg")));
            }
        }

        match payload.get("data") {
            Some(data) => Self::parse_rows(data, "okx data"),
            None => Ok(Vec::new()),
        }
    }
}

impl WsMessageCodec for OkxAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        json!({
            "op": "subscribe",
            "args": [{
                "channel": Self::channel(interval),
                "instId": self.get_trading_pair_format(trading_pair),
            }],
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        // "pong" 텍스트, 이벤트 응답은 캔들이 아님
        let Some(payload) = payload.filter(|p| p.is_object()) else {
            return Ok(None);
        };
        if payload.get("event").is_some() {
            return Ok(None);
        }

        let is_candle_channel = payload
            .get("arg")
            .and_then(|arg| arg.get("channel"))
            .and_then(Value::as_str)
            .is_some_and(|channel| channel.starts_with("candle"));
        if !is_candle_channel {
            return Ok(None);
        }

        match payload.get("data") {
            Some(data) => Self::parse_rows(data, "okx ws data").map(Some),
            None => Ok(None),
        }
    }
}

impl CandleAdapter for OkxAdapter {
    fn name(&self) -> &'static str {
        self.market.id
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Milliseconds
    }

    fn intervals(&self) -> IntervalTable {
        OKX_INTERVALS
    }

    fn rest_url(&self) -> &'static str {
        OKX_REST_URL
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        "/api/v5/market/candles".to_string()
    }

    fn ws_url(&self) -> &'static str {
        OKX_WS_URL
    }
}
