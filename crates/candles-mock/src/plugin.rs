//! 모의 거래소 플러그인 계약.
//!
//! 플러그인은 어댑터의 역방향입니다. 정규 `CandleData`를 거래소 와이어 형식으로 만들고,
//! 클라이언트 요청(REST 파라미터, WS 구독)을 정규 형식으로 되돌립니다.
//! 플러그인이 만든 페이로드는 짝이 되는 어댑터가 그대로 파싱할 수 있어야 합니다.

use std::collections::HashMap;

use axum::http::StatusCode;
use candles_core::{
    interval_to_seconds, normalize_timestamp, split_concatenated_symbol, CandleData,
    IntervalTable, RawTimestamp, TimestampUnit, COMMON_QUOTES,
};
use candles_exchange::{CandleAdapter, HttpMethod};
use serde_json::{json, Value};

// ============================================================================
// 라우팅
// ============================================================================

/// REST 핸들러 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteHandler {
    /// 캔들 조회
    Candles,
    /// 연결 확인
    Ping,
    /// 서버 시각
    Time,
    /// 거래소/심볼 정보
    ExchangeInfo,
    /// WebSocket 토큰 발급 (KuCoin)
    WsToken,
}

/// 선언형 REST 라우트.
///
/// `path`는 `{name}` 형식의 경로 변수를 포함할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestRoute {
    pub path: String,
    pub method: HttpMethod,
    pub handler: RouteHandler,
}

impl RestRoute {
    pub fn get(path: impl Into<String>, handler: RouteHandler) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            handler,
        }
    }

    pub fn post(path: impl Into<String>, handler: RouteHandler) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Post,
            handler,
        }
    }
}

/// 경로 템플릿(`/products/{product_id}/candles`)과 실제 경로를 매칭합니다.
pub fn match_path_template(template: &str, path: &str) -> Option<HashMap<String, String>> {
    let template_parts: Vec<&str> = template.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    if template_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (expected, actual) in template_parts.iter().zip(&path_parts) {
        match expected
            .strip_prefix('{')
            .and_then(|name| name.strip_suffix('}'))
        {
            Some(name) => {
                params.insert(name.to_string(), (*actual).to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}

/// URL에서 경로 부분만 꺼냅니다 (`wss://host:9443/ws` -> `/ws`).
pub fn url_path(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    match without_scheme.find('/') {
        Some(index) => without_scheme[index..].to_string(),
        None => "/".to_string(),
    }
}

// ============================================================================
// 요청/응답 모델
// ============================================================================

/// 플러그인에 전달되는 REST 요청.
#[derive(Debug, Clone, Default)]
pub struct RestRequest {
    /// 경로 변수
    pub path_params: HashMap<String, String>,
    /// 쿼리 파라미터
    pub query: HashMap<String, String>,
    /// JSON 본문 (POST)
    pub body: Option<Value>,
}

impl RestRequest {
    /// 쿼리 파라미터.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// 경로 변수.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }
}

/// 정규 형식으로 되돌린 캔들 조회 조건. 시각은 초 단위입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandlesQuery {
    pub trading_pair: String,
    pub interval: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<usize>,
}

impl CandlesQuery {
    pub fn new(trading_pair: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            trading_pair: trading_pair.into(),
            interval: interval.into(),
            start_time: None,
            end_time: None,
            limit: None,
        }
    }

    /// 시계열에서 조건에 맞는 캔들을 고릅니다.
    ///
    /// 시작 시각이 있으면 앞에서부터, 없으면 가장 최근 캔들부터 `limit`개를 반환합니다.
    pub fn select(&self, candles: &[CandleData]) -> Vec<CandleData> {
        let in_range: Vec<CandleData> = candles
            .iter()
            .filter(|c| self.start_time.map_or(true, |start| c.timestamp >= start))
            .filter(|c| self.end_time.map_or(true, |end| c.timestamp <= end))
            .cloned()
            .collect();

        match self.limit {
            Some(limit) if in_range.len() > limit => {
                if self.start_time.is_some() {
                    in_range[..limit].to_vec()
                } else {
                    in_range[in_range.len() - limit..].to_vec()
                }
            }
            _ => in_range,
        }
    }
}

/// 거래소 형식 에러 응답.
///
/// `body`가 문자열이면 일반 텍스트로 응답합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn bad_request(body: Value) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }
}

// ============================================================================
// WebSocket 구독 모델
// ============================================================================

/// 구독/해지.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// 정규 형식 스트림 (거래쌍, 인터벌).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WsStream {
    pub trading_pair: String,
    pub interval: String,
}

impl WsStream {
    pub fn new(trading_pair: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            trading_pair: trading_pair.into(),
            interval: interval.into(),
        }
    }
}

/// 클라이언트 구독 요청을 해석한 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsSubscription {
    pub action: SubscriptionAction,
    pub streams: Vec<WsStream>,
}

impl WsSubscription {
    pub fn subscribe(streams: Vec<WsStream>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            streams,
        }
    }

    pub fn unsubscribe(streams: Vec<WsStream>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            streams,
        }
    }
}

/// 거래소 기본 rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    /// 분당 REST 요청 수
    pub rest_requests_per_minute: u32,
    /// 연결당 초당 WS 메시지 수
    pub ws_messages_per_second: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            rest_requests_per_minute: 1200,
            ws_messages_per_second: 10,
        }
    }
}

// ============================================================================
// 플러그인 trait
// ============================================================================

/// 모의 거래소 플러그인.
///
/// 거래쌍과 인터벌은 항상 정규 형식(`BTC-USDT`, `1h`)으로 주고받습니다.
pub trait ExchangePlugin: Send + Sync {
    /// 짝이 되는 어댑터.
    fn adapter(&self) -> &dyn CandleAdapter;

    /// 레지스트리 식별자.
    fn id(&self) -> &'static str {
        self.adapter().name()
    }

    /// 실제 거래소 REST 기본 URL.
    fn rest_url(&self) -> &'static str {
        self.adapter().rest_url()
    }

    /// 실제 거래소 WebSocket URL.
    fn wss_url(&self) -> &'static str {
        self.adapter().ws_url()
    }

    /// REST 라우트 테이블.
    fn rest_routes(&self) -> Vec<RestRoute>;

    /// WebSocket 경로. 기본값은 실제 WS URL의 경로입니다.
    fn ws_routes(&self) -> Vec<String> {
        vec![url_path(self.wss_url())]
    }

    /// `parse_rest_response`의 역함수.
    fn format_rest_candles(&self, candles: &[CandleData], trading_pair: &str, interval: &str)
        -> Value;

    /// `parse_ws_message`의 역함수.
    fn format_ws_candle_message(
        &self,
        candle: &CandleData,
        trading_pair: &str,
        interval: &str,
        is_final: bool,
    ) -> Value;

    /// 구독/해지 요청을 해석합니다. 구독 메시지가 아니면 `None`.
    fn parse_ws_subscription(&self, message: &Value) -> Option<WsSubscription>;

    /// 구독 성공 응답.
    fn create_ws_subscription_success(&self, message: &Value, subscription: &WsSubscription)
        -> Value;

    /// 구독자 집합의 키.
    fn create_ws_subscription_key(&self, trading_pair: &str, interval: &str) -> String {
        format!("{}_{}", trading_pair, interval)
    }

    /// 캔들 REST 파라미터를 검증하고 정규 조회 조건으로 바꿉니다.
    fn parse_rest_candles_params(&self, request: &RestRequest)
        -> Result<CandlesQuery, ErrorResponse>;

    /// ping 메시지에 대한 응답. ping이 아니면 `None`.
    fn create_ws_pong(&self, _message: &Value) -> Option<Value> {
        None
    }

    /// 알 수 없는 요청에 대한 에러 응답 (프로토콜이 정의하는 경우만).
    fn create_ws_error(&self, _message: &Value) -> Option<Value> {
        None
    }

    /// 연결 직후 보내는 환영 메시지.
    fn ws_welcome(&self, _connection_id: &str) -> Option<Value> {
        None
    }

    /// rate limit 초과 응답.
    fn create_rate_limit_error(&self, retry_after: u64) -> ErrorResponse {
        ErrorResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({
                "error": "Too Many Requests",
                "message": "Rate limit exceeded. Please try again later.",
                "retry_after": retry_after,
            }),
        )
    }

    fn rate_limits(&self) -> RateLimits {
        RateLimits::default()
    }

    /// 캔들 조회에 API 키가 필요한지 여부.
    fn api_key_required(&self) -> bool {
        false
    }

    fn format_server_time(&self, now_ms: i64) -> Value {
        json!({ "serverTime": now_ms })
    }

    fn format_ping(&self) -> Value {
        json!({})
    }

    fn format_exchange_info(&self, trading_pairs: &[String]) -> Value {
        json!({
            "exchange": self.id(),
            "symbols": trading_pairs
                .iter()
                .map(|pair| json!({
                    "symbol": self.adapter().get_trading_pair_format(pair),
                    "tradingPair": pair,
                    "status": "TRADING",
                }))
                .collect::<Vec<_>>(),
            "intervals": self.adapter().get_ws_supported_intervals(),
        })
    }

    /// WebSocket 토큰 응답 (`ws_endpoint`는 모의 서버의 WS 주소).
    fn create_ws_token(&self, _ws_endpoint: &str) -> Value {
        json!({})
    }
}

// ============================================================================
// 플러그인 공용 헬퍼
// ============================================================================

/// 거래소 토큰 또는 정규 이름을 정규 인터벌 이름으로 바꿉니다.
pub fn canonical_interval(table: &IntervalTable, token: &str) -> Option<String> {
    table
        .from_token(token)
        .or_else(|| table.get(token))
        .map(|spec| spec.name.to_string())
}

/// 인터벌 기간(초). 테이블에 없으면 정규 표기에서 계산하고, 그것도 안 되면 1분.
pub fn interval_seconds(table: &IntervalTable, interval: &str) -> i64 {
    table
        .seconds(interval)
        .or_else(|| interval_to_seconds(interval))
        .unwrap_or(60)
}

/// 연결된 심볼(`BTCUSDT`)을 정규 거래쌍으로 되돌립니다.
pub fn canonical_concatenated(symbol: &str) -> Option<String> {
    split_concatenated_symbol(symbol, COMMON_QUOTES).map(|pair| pair.to_string())
}

/// 구분자로 연결된 심볼(`BTC_USDT`)을 정규 거래쌍으로 되돌립니다.
pub fn canonical_separated(symbol: &str, separator: char) -> Option<String> {
    match symbol.split_once(separator) {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
            Some(format!("{}-{}", base.to_uppercase(), quote.to_uppercase()))
        }
        _ => None,
    }
}

/// 거래소 단위 시각 문자열을 초로 바꿉니다.
pub fn parse_time(value: &str, unit: TimestampUnit) -> Option<i64> {
    normalize_timestamp(&RawTimestamp::from(value), unit).ok()
}

/// JSON 숫자/문자열 시각을 초로 바꿉니다.
pub fn parse_time_value(value: &Value, unit: TimestampUnit) -> Option<i64> {
    candles_core::normalize_value(value, unit).ok()
}

/// 개수 파라미터.
pub fn parse_limit(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candles_exchange::adapters::okx::OKX_INTERVALS;

    #[test]
    fn test_match_path_template() {
        let params = match_path_template(
            "/api/v3/brokerage/market/products/{product_id}/candles",
            "/api/v3/brokerage/market/products/BTC-USD/candles",
        )
        .unwrap();
        assert_eq!(params["product_id"], "BTC-USD");

        assert!(match_path_template("/api/v3/klines", "/api/v3/klines").unwrap().is_empty());
        assert!(match_path_template("/api/v3/klines", "/api/v3/ticker").is_none());
        assert!(match_path_template("/a/{b}", "/a/b/c").is_none());
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("wss://stream.binance.com:9443/ws"), "/ws");
        assert_eq!(url_path("wss://ws.kraken.com"), "/");
        assert_eq!(url_path("wss://api.gateio.ws/ws/v4/"), "/ws/v4/");
    }

    #[test]
    fn test_canonical_helpers() {
        assert_eq!(canonical_interval(&OKX_INTERVALS, "1H").as_deref(), Some("1h"));
        assert_eq!(canonical_interval(&OKX_INTERVALS, "1h").as_deref(), Some("1h"));
        assert!(canonical_interval(&OKX_INTERVALS, "7x").is_none());
        assert_eq!(canonical_concatenated("btcusdt").as_deref(), Some("BTC-USDT"));
        assert_eq!(canonical_separated("ETH_USDT", '_').as_deref(), Some("ETH-USDT"));
        assert!(canonical_separated("ETHUSDT", '_').is_none());
        assert_eq!(parse_time("1672531200000", TimestampUnit::Milliseconds), Some(1672531200));
    }

    #[test]
    fn test_query_select() {
        let candles: Vec<CandleData> = (0..10)
            .map(|i| CandleData::new(i * 60, 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect();

        let mut query = CandlesQuery::new("BTC-USDT", "1m");
        query.limit = Some(3);
        let latest = query.select(&candles);
        assert_eq!(latest.first().map(|c| c.timestamp), Some(420));

        query.start_time = Some(120);
        let from_start = query.select(&candles);
        assert_eq!(from_start.first().map(|c| c.timestamp), Some(120));
        assert_eq!(from_start.len(), 3);

        query.limit = None;
        query.end_time = Some(240);
        assert_eq!(query.select(&candles).len(), 3);
    }
}
