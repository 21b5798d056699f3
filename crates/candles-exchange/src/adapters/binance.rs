//! Binance 현물/USDⓈ-M 무기한 캔들 어댑터.
//!
//! REST 행 형식: `[openTime, o, h, l, c, v, closeTime, quoteVol, nTrades, takerBase, takerQuote, ignore]`
//! 타임스탬프 단위는 밀리초입니다.

use std::sync::atomic::{AtomicU64, Ordering};

use candles_core::{
    sort_candles, CandleData, CandleResult, IntervalSpec, IntervalTable, TimestampUnit,
};
use serde_json::{json, Value};

use crate::common::{as_array, count, num, reported, row_num, text, timestamp};
use crate::traits::{
    clamp_limit, CandleAdapter, RestParamBuilder, RestParams, RestResponseParser,
    TradingPairFormatter, WsMessageCodec,
};

// ============================================================================
// 시장 설정
// ============================================================================

/// 현물/무기한 변형을 구분하는 시장 설정.
#[derive(Debug, Clone, Copy)]
pub struct BinanceMarket {
    /// 레지스트리 식별자
    pub id: &'static str,
    /// REST 기본 URL
    pub rest_url: &'static str,
    /// 캔들 엔드포인트 경로
    pub rest_path: &'static str,
    /// WebSocket URL
    pub ws_url: &'static str,
    /// 요청당 최대 캔들 수
    pub max_limit: u32,
    /// 인터벌 테이블
    pub intervals: IntervalTable,
}

const SPOT_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1s", 1, "1s", true),
    IntervalSpec::new("1m", 60, "1m", true),
    IntervalSpec::new("3m", 180, "3m", true),
    IntervalSpec::new("5m", 300, "5m", true),
    IntervalSpec::new("15m", 900, "15m", true),
    IntervalSpec::new("30m", 1_800, "30m", true),
    IntervalSpec::new("1h", 3_600, "1h", true),
    IntervalSpec::new("2h", 7_200, "2h", true),
    IntervalSpec::new("4h", 14_400, "4h", true),
    IntervalSpec::new("6h", 21_600, "6h", true),
    IntervalSpec::new("8h", 28_800, "8h", true),
    IntervalSpec::new("12h", 43_200, "12h", true),
    IntervalSpec::new("1d", 86_400, "1d", true),
    IntervalSpec::new("3d", 259_200, "3d", true),
    IntervalSpec::new("1w", 604_800, "1w", true),
    IntervalSpec::new("1M", 2_592_000, "1M", true),
]);

const PERPETUAL_INTERVALS: IntervalTable = IntervalTable(&[
    IntervalSpec::new("1m", 60, "1m", true),
    IntervalSpec::new("3m", 180, "3m", true),
    IntervalSpec::new("5m", 300, "5m", true),
    IntervalSpec::new("15m", 900, "15m", true),
    IntervalSpec::new("30m", 1_800, "30m", true),
    IntervalSpec::new("1h", 3_600, "1h", true),
    IntervalSpec::new("2h", 7_200, "2h", true),
    IntervalSpec::new("4h", 14_400, "4h", true),
    IntervalSpec::new("6h", 21_600, "6h", true),
    IntervalSpec::new("8h", 28_800, "8h", true),
    IntervalSpec::new("12h", 43_200, "12h", true),
    IntervalSpec::new("1d", 86_400, "1d", true),
    IntervalSpec::new("3d", 259_200, "3d", true),
    IntervalSpec::new("1w", 604_800, "1w", true),
    IntervalSpec::new("1M", 2_592_000, "1M", true),
]);

/// Binance 현물.
pub const BINANCE_SPOT: BinanceMarket = BinanceMarket {
    id: "binance_spot",
    rest_url: "https://api.binance.com",
    rest_path: "/api/v3/klines",
    ws_url: "wss://stream.binance.com:9443/ws",
    max_limit: 1000,
    intervals: SPOT_INTERVALS,
};

/// Binance USDⓈ-M 무기한.
pub const BINANCE_PERPETUAL: BinanceMarket = BinanceMarket {
    id: "binance_perpetual",
    rest_url: "https://fapi.binance.com",
    rest_path: "/fapi/v1/klines",
    ws_url: "wss://fstream.binance.com/ws",
    max_limit: 1500,
    intervals: PERPETUAL_INTERVALS,
};

// ============================================================================
// 어댑터
// ============================================================================

/// Binance 캔들 어댑터.
#[derive(Debug)]
pub struct BinanceAdapter {
    market: BinanceMarket,
    request_id: AtomicU64,
}

impl BinanceAdapter {
    /// 시장 설정으로 어댑터를 생성합니다.
    pub fn new(market: BinanceMarket) -> Self {
        Self {
            market,
            request_id: AtomicU64::new(1),
        }
    }

    /// 현물 어댑터.
    pub fn spot() -> Self {
        Self::new(BINANCE_SPOT)
    }

    /// 무기한 어댑터.
    pub fn perpetual() -> Self {
        Self::new(BINANCE_PERPETUAL)
    }

    /// 시장 설정.
    pub fn market(&self) -> &BinanceMarket {
        &self.market
    }

    /// 스트림 이름 (`btcusdt@kline_1m`).
    pub fn stream_name(&self, trading_pair: &str, interval: &str) -> String {
        format!(
            "{}@kline_{}",
            self.get_trading_pair_format(trading_pair).to_lowercase(),
            self.market.intervals.token_or_passthrough(interval)
        )
    }

    fn parse_row(row: &Value) -> CandleResult<CandleData> {
        let row = as_array(row, "binance kline row")?;
        let ctx = "binance kline row";
        Ok(CandleData::new(
            timestamp(row.first(), TimestampUnit::Milliseconds, ctx)?,
            row_num(row, 1, ctx)?,
            row_num(row, 2, ctx)?,
            row_num(row, 3, ctx)?,
            row_num(row, 4, ctx)?,
            row_num(row, 5, ctx)?,
        )
        .with_quote_asset_volume(row_num(row, 7, ctx)?)
        .with_n_trades(count(row.get(8), ctx)?)
        .with_taker_buy_base_volume(row_num(row, 9, ctx)?)
        .with_taker_buy_quote_volume(row_num(row, 10, ctx)?))
    }

    fn parse_ws_kline(kline: &Value) -> CandleResult<CandleData> {
        let ctx = "binance ws kline";
        Ok(CandleData::new(
            timestamp(kline.get("t"), TimestampUnit::Milliseconds, ctx)?,
            num(kline.get("o"), ctx)?,
            num(kline.get("h"), ctx)?,
            num(kline.get("l"), ctx)?,
            num(kline.get("c"), ctx)?,
            num(kline.get("v"), ctx)?,
        )
        .with_quote_asset_volume(num(kline.get("q"), ctx)?)
        .with_n_trades(count(kline.get("n"), ctx)?)
        .with_taker_buy_base_volume(num(kline.get("V"), ctx)?)
        .with_taker_buy_quote_volume(num(kline.get("Q"), ctx)?))
    }
}

impl TradingPairFormatter for BinanceAdapter {
    fn get_trading_pair_format(&self, trading_pair: &str) -> String {
        // "BTC-USDT" -> "BTCUSDT"
        trading_pair.replace('-', "")
    }
}

impl RestParamBuilder for BinanceAdapter {
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
            "symbol".into(),
            json!(self.get_trading_pair_format(trading_pair)),
        );
        params.insert(
            "interval".into(),
            json!(self.market.intervals.token_or_passthrough(interval)),
        );
        params.insert(
            "limit".into(),
            json!(clamp_limit(limit, self.market.max_limit)),
        );
        if let Some(start) = start_time {
            params.insert("startTime".into(), json!(self.to_exchange_time(start)));
        }
        if let Some(end) = end_time {
            params.insert("endTime".into(), json!(self.to_exchange_time(end)));
        }
        params
    }
}

impl RestResponseParser for BinanceAdapter {
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>> {
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };

        // {"code": -1121, "msg": "Invalid symbol."}
        if let Some(code) = payload.get("code") {
            return Err(reported(code, payload.get("msg")));
        }

        let mut candles = as_array(payload, "binance rest response")?
            .iter()
            .map(Self::parse_row)
            .collect::<CandleResult<Vec<_>>>()?;
        sort_candles(&mut candles);
        Ok(candles)
    }
}

impl WsMessageCodec for BinanceAdapter {
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value {
        json!({
            "method": "SUBSCRIBE",
            "params": [self.stream_name(trading_pair, interval)],
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        })
    }

    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };

        // 결합 스트림: {"stream": "...", "data": {...}}
        let event = match (payload.get("stream"), payload.get("data")) {
            (Some(_), Some(data)) => data,
            _ => payload,
        };

        if text(event.get("e")) != "kline" {
            return Ok(None);
        }
        match event.get("k") {
            Some(kline) if kline.is_object() => Ok(Some(vec![Self::parse_ws_kline(kline)?])),
            Some(_) => Err(candles_core::CandleError::unexpected(
                "binance ws kline",
                "object",
            )),
            None => Ok(None),
        }
    }
}

impl CandleAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        self.market.id
    }

    fn timestamp_unit(&self) -> TimestampUnit {
        TimestampUnit::Milliseconds
    }

    fn intervals(&self) -> IntervalTable {
        self.market.intervals
    }

    fn rest_url(&self) -> &'static str {
        self.market.rest_url
    }

    fn rest_path(&self, _trading_pair: &str) -> String {
        self.market.rest_path.to_string()
    }

    fn ws_url(&self) -> &'static str {
        self.market.ws_url
    }
}
