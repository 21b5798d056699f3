//! 정규화된 OHLCV 캔들 모델.
//!
//! 모든 어댑터는 거래소 원시 데이터를 이 구조체로 변환합니다.
//! 거래소가 보고하지 않는 필드는 항상 0으로 채워집니다.

use serde::{Deserialize, Serialize};

use crate::error::CandleResult;
use crate::types::timestamp::{normalize_timestamp, RawTimestamp, TimestampUnit};

/// 하나의 (거래쌍, 인터벌)에 대한 OHLCV 캔들.
///
/// 생성 후에는 변경되지 않는 값 객체로 취급합니다.
/// OHLC 일관성(`low <= open, close <= high`)은 거래소 보고값을 그대로 신뢰하며 재검증하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleData {
    /// 캔들 시작 시각 (epoch 초)
    pub timestamp: i64,
    /// 시가
    pub open: f64,
    /// 고가
    pub high: f64,
    /// 저가
    pub low: f64,
    /// 종가
    pub close: f64,
    /// 거래량 (기준 자산)
    pub volume: f64,
    /// 거래대금 (호가 자산)
    #[serde(default)]
    pub quote_asset_volume: f64,
    /// 체결 건수
    #[serde(default)]
    pub n_trades: u64,
    /// 테이커 매수 거래량 (기준 자산)
    #[serde(default)]
    pub taker_buy_base_volume: f64,
    /// 테이커 매수 거래대금 (호가 자산)
    #[serde(default)]
    pub taker_buy_quote_volume: f64,
}

impl CandleData {
    /// 초 단위 타임스탬프로 캔들을 생성합니다.
    ///
    /// 부가 필드는 0으로 초기화되며 `with_*` 메서드로 채웁니다.
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            quote_asset_volume: 0.0,
            n_trades: 0,
            taker_buy_base_volume: 0.0,
            taker_buy_quote_volume: 0.0,
        }
    }

    /// 단위를 모르는 원시 타임스탬프로 캔들을 생성합니다.
    ///
    /// 숫자 값은 크기로 단위(초/밀리초/마이크로초/나노초)를 추론하고,
    /// ISO-8601 문자열은 UTC로 해석합니다.
    pub fn from_raw_timestamp(
        raw: impl Into<RawTimestamp>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> CandleResult<Self> {
        let raw = raw.into();
        let unit = TimestampUnit::infer(&raw);
        let timestamp = normalize_timestamp(&raw, unit)?;
        Ok(Self::new(timestamp, open, high, low, close, volume))
    }

    /// 거래대금을 설정합니다.
    pub fn with_quote_asset_volume(mut self, value: f64) -> Self {
        self.quote_asset_volume = value;
        self
    }

    /// 체결 건수를 설정합니다.
    pub fn with_n_trades(mut self, value: u64) -> Self {
        self.n_trades = value;
        self
    }

    /// 테이커 매수 거래량을 설정합니다.
    pub fn with_taker_buy_base_volume(mut self, value: f64) -> Self {
        self.taker_buy_base_volume = value;
        self
    }

    /// 테이커 매수 거래대금을 설정합니다.
    pub fn with_taker_buy_quote_volume(mut self, value: f64) -> Self {
        self.taker_buy_quote_volume = value;
        self
    }

    /// 밀리초 단위 타임스탬프. 항상 `timestamp`에서 파생됩니다.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp * 1000
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 고가와 저가의 차이.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// 대표 가격 (고가 + 저가 + 종가) / 3.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// 캔들을 타임스탬프 오름차순으로 정렬합니다 (안정 정렬).
///
/// 최신순으로 응답하는 거래소(Bybit, OKX, Coinbase, KuCoin) 파싱 결과에 사용합니다.
pub fn sort_candles(candles: &mut [CandleData]) {
    candles.sort_by_key(|c| c.timestamp);
}
