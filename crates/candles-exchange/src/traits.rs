//! 어댑터 능력(capability) trait 정의.
//!
//! 거래소 어댑터는 네 가지 작은 능력 trait을 구현하고,
//! `CandleAdapter`가 이를 묶어 피드 계층이 호출하는 단일 인터페이스를 제공합니다.
//! 현물/무기한 변형은 서브타입이 아니라 시장 설정 값으로 표현합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use candles_core::{
    to_exchange_unit, CandleData, CandleError, CandleResult, IntervalTable, TimestampUnit,
};
use serde_json::Value;
use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};
use crate::network::NetworkClient;

/// REST 쿼리/본문 파라미터.
pub type RestParams = serde_json::Map<String, Value>;

/// REST 캔들 엔드포인트의 HTTP 메서드.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// 정규 거래쌍(`BASE-QUOTE`)을 거래소 심볼로 변환합니다.
pub trait TradingPairFormatter {
    /// 순수 문자열 변환. 실패하지 않습니다.
    fn get_trading_pair_format(&self, trading_pair: &str) -> String;
}

/// REST 파라미터 생성.
pub trait RestParamBuilder {
    /// 거래소 REST 파라미터를 생성합니다.
    ///
    /// - 인터벌은 거래소 토큰으로 변환하며, 매핑이 없으면 그대로 전달합니다.
    /// - `start_time`/`end_time`(초)은 거래소 단위로 변환하고, `None`이면 생략합니다.
    fn get_rest_params(
        &self,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> RestParams;
}

/// REST 응답 파싱.
pub trait RestResponseParser {
    /// 캔들 배열을 찾아 타임스탬프 오름차순 `CandleData`로 변환합니다.
    ///
    /// `None`은 빈 결과입니다. 거래소 에러 봉투는 `ExchangeReported`로 반환합니다.
    fn parse_rest_response(&self, payload: Option<&Value>) -> CandleResult<Vec<CandleData>>;
}

/// WebSocket 구독/메시지 코덱.
pub trait WsMessageCodec {
    /// 하나의 (거래쌍, 인터벌) 스트림 구독 메시지.
    fn get_ws_subscription_payload(&self, trading_pair: &str, interval: &str) -> Value;

    /// 캔들 업데이트를 파싱합니다.
    ///
    /// ping/heartbeat, 구독 응답, 다른 채널 메시지처럼 캔들 업데이트가 아니면 `None`.
    fn parse_ws_message(&self, payload: Option<&Value>) -> CandleResult<Option<Vec<CandleData>>>;
}

/// 피드 계층이 호출하는 통합 어댑터 인터페이스.
#[async_trait]
pub trait CandleAdapter:
    TradingPairFormatter + RestParamBuilder + RestResponseParser + WsMessageCodec + Send + Sync
{
    /// 레지스트리 식별자 (예: "binance_spot").
    fn name(&self) -> &'static str;

    /// 숫자 타임스탬프 단위.
    fn timestamp_unit(&self) -> TimestampUnit;

    /// 인터벌 테이블.
    fn intervals(&self) -> IntervalTable;

    /// 운영 REST 기본 URL.
    fn rest_url(&self) -> &'static str;

    /// 캔들 엔드포인트 경로. 경로 템플릿을 쓰는 거래소는 거래쌍을 채워 넣습니다.
    fn rest_path(&self, trading_pair: &str) -> String;

    /// 운영 WebSocket URL.
    fn ws_url(&self) -> &'static str;

    /// REST 캔들 엔드포인트 메서드.
    fn rest_method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    /// 기본 URL과 거래쌍으로 전체 REST 엔드포인트를 만듭니다.
    fn rest_endpoint(&self, base_url: &str, trading_pair: &str) -> String {
        format!(
            "{}{}",
            base_url.trim_end_matches('/'),
            self.rest_path(trading_pair)
        )
    }

    /// 초 단위 시각을 거래소 단위로 변환합니다.
    fn to_exchange_time(&self, seconds: i64) -> i64 {
        to_exchange_unit(seconds, self.timestamp_unit())
    }

    /// REST 지원 인터벌 (이름 -> 초).
    fn get_supported_intervals(&self) -> HashMap<String, i64> {
        self.intervals().supported_intervals()
    }

    /// WebSocket 지원 인터벌 (REST 지원 인터벌의 부분집합).
    fn get_ws_supported_intervals(&self) -> Vec<String> {
        self.intervals().ws_supported_intervals()
    }

    /// REST로 캔들을 조회합니다.
    ///
    /// 클라이언트가 기본 URL을 재정의하면 그 URL을 사용합니다.
    /// 2xx가 아닌 응답의 본문이 거래소 에러 봉투이면 `ExchangeReported`로 변환합니다.
    async fn fetch_rest_candles(
        &self,
        client: &dyn NetworkClient,
        trading_pair: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> ExchangeResult<Vec<CandleData>> {
        let base = client.rest_base_url().unwrap_or(self.rest_url());
        let url = self.rest_endpoint(base, trading_pair);
        let params = self.get_rest_params(trading_pair, interval, start_time, end_time, limit);

        debug!(exchange = self.name(), %url, "Fetching candles");

        let result = match self.rest_method() {
            HttpMethod::Get => client.get_rest_data(&url, &params).await,
            HttpMethod::Post => client.post_rest_data(&url, &Value::Object(params)).await,
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(ExchangeError::ApiError { code, message }) => {
                if let Ok(body) = serde_json::from_str::<Value>(&message) {
                    if let Err(err @ CandleError::ExchangeReported { .. }) =
                        self.parse_rest_response(Some(&body))
                    {
                        return Err(err.into());
                    }
                }
                return Err(ExchangeError::ApiError { code, message });
            }
            Err(other) => return Err(other),
        };

        Ok(self.parse_rest_response(Some(&payload))?)
    }
}

/// `limit`을 거래소 최대 페이지 크기로 제한합니다. `None`이면 최대값.
pub fn clamp_limit(limit: Option<u32>, max: u32) -> u32 {
    limit.map(|l| l.clamp(1, max)).unwrap_or(max)
}
