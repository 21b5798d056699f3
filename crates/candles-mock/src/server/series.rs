//! 거래쌍/인터벌별 캔들 시계열과 합성.
//!
//! 시계열은 `(거래쌍, 인터벌)`에서 유도한 시드로 난수를 초기화하므로 같은 조건이면
//! 같은 가격 경로를 만듭니다. 봉 경계는 항상 인터벌 격자에 맞춰집니다.

use std::collections::VecDeque;

use candles_core::CandleData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 봉 하나의 종가 변동 폭 (±0.5%).
const MAX_CLOSE_CHANGE: f64 = 0.005;

/// 꼬리 길이 상한 (0.2%).
const MAX_WICK: f64 = 0.002;

/// FNV-1a 해시로 시계열 시드를 만듭니다.
pub fn series_seed(trading_pair: &str, interval: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    format!("{}|{}", trading_pair, interval)
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// 인터벌 격자에 맞춘 시각.
pub fn align_to_interval(timestamp: i64, interval_secs: i64) -> i64 {
    timestamp - timestamp.rem_euclid(interval_secs.max(1))
}

/// 한 시계열의 보관 캔들과 합성 상태.
#[derive(Debug)]
pub struct CandleSeries {
    candles: VecDeque<CandleData>,
    capacity: usize,
    interval_secs: i64,
    last_timestamp: i64,
    last_close: f64,
    /// 열린 상태로 내보낸 봉의 시작 시각
    open_bar: Option<i64>,
    rng: StdRng,
}

impl CandleSeries {
    /// 과거 `history`개 봉을 생성하여 시계열을 만듭니다.
    ///
    /// 마지막 과거 봉은 `now`가 속한 봉 바로 앞 봉입니다.
    pub fn new(
        seed: u64,
        interval_secs: i64,
        initial_price: f64,
        history: usize,
        capacity: usize,
        now: i64,
    ) -> Self {
        let interval_secs = interval_secs.max(1);
        let capacity = capacity.max(1);
        let current = align_to_interval(now, interval_secs);

        let mut series = Self {
            candles: VecDeque::with_capacity(capacity.min(history.max(1))),
            capacity,
            interval_secs,
            last_timestamp: current - interval_secs * (history as i64 + 1),
            last_close: initial_price,
            open_bar: None,
            rng: StdRng::seed_from_u64(seed),
        };
        for _ in 0..history {
            let timestamp = series.last_timestamp + interval_secs;
            series.push_bar(timestamp);
        }
        // 과거 봉이 없으면 현재 봉 직전 경계에서 시작
        series.last_timestamp = current - interval_secs;
        series
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    /// 다음 봉 경계를 지났으면 정확히 한 개의 봉을 합성합니다.
    ///
    /// 새 봉의 시가는 직전 종가이고, 시작 시각은 직전 봉 + 인터벌입니다.
    pub fn advance(&mut self, now: i64) -> Option<CandleData> {
        let next = self.last_timestamp + self.interval_secs;
        if now < next {
            return None;
        }
        let candle = self.push_bar(next);
        if !self.is_closed(&candle, now) {
            self.open_bar = Some(candle.timestamp);
        }
        Some(candle)
    }

    /// 열린 상태로 합성된 봉이 `now`에 마감되었으면 한 번만 돌려줍니다.
    pub fn take_closed(&mut self, now: i64) -> Option<CandleData> {
        let timestamp = self.open_bar?;
        if now < timestamp + self.interval_secs {
            return None;
        }
        self.open_bar = None;
        self.candles
            .iter()
            .rev()
            .find(|c| c.timestamp == timestamp)
            .cloned()
    }

    /// `now` 시점에 봉이 마감되었는지 여부.
    pub fn is_closed(&self, candle: &CandleData, now: i64) -> bool {
        now >= candle.timestamp + self.interval_secs
    }

    /// 보관 중인 캔들 (오래된 순).
    pub fn candles(&self) -> Vec<CandleData> {
        self.candles.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&CandleData> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    fn push_bar(&mut self, timestamp: i64) -> CandleData {
        let candle = self.synthesize(timestamp, self.last_close);
        if self.candles.len() >= self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle.clone());
        self.last_timestamp = timestamp;
        self.last_close = candle.close;
        candle
    }

    fn synthesize(&mut self, timestamp: i64, open: f64) -> CandleData {
        let close = open * (1.0 + self.rng.gen_range(-MAX_CLOSE_CHANGE..=MAX_CLOSE_CHANGE));
        let high = open.max(close) * (1.0 + self.rng.gen_range(0.0..=MAX_WICK));
        let low = open.min(close) * (1.0 - self.rng.gen_range(0.0..=MAX_WICK));
        let volume = self.rng.gen_range(1.0..100.0);
        let taker_share = self.rng.gen_range(0.3..0.7);
        let typical = (high + low + close) / 3.0;

        CandleData::new(timestamp, open, high, low, close, volume)
            .with_quote_asset_volume(volume * typical)
            .with_n_trades(self.rng.gen_range(10..500))
            .with_taker_buy_base_volume(volume * taker_share)
            .with_taker_buy_quote_volume(volume * taker_share * typical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_672_531_230; // 2023-01-01 00:00:30 UTC

    fn series(history: usize, capacity: usize) -> CandleSeries {
        CandleSeries::new(series_seed("BTC-USDT", "1m"), 60, 100.0, history, capacity, NOW)
    }

    #[test]
    fn test_history_ends_before_current_bar() {
        let s = series(150, 1000);
        let candles = s.candles();
        assert_eq!(candles.len(), 150);
        assert_eq!(candles.last().unwrap().timestamp, 1_672_531_200 - 60);
        assert_eq!(candles[0].open, 100.0);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].timestamp, pair[0].timestamp + 60);
            assert_eq!(pair[1].open, pair[0].close);
        }
    }

    #[test]
    fn test_deterministic_history() {
        assert_eq!(series(20, 100).candles(), series(20, 100).candles());
        assert_ne!(series_seed("BTC-USDT", "1m"), series_seed("BTC-USDT", "5m"));
    }

    #[test]
    fn test_advance_one_bar_per_call() {
        let mut s = series(5, 100);
        let last = s.latest().unwrap().clone();

        // 몇 구간이 밀려 있어도 한 번에 한 봉만 전진
        let next = s.advance(NOW + 600).unwrap();
        assert_eq!(next.timestamp, last.timestamp + 60);
        assert_eq!(next.open, last.close);
        assert!(next.low <= next.open.min(next.close));
        assert!(next.high >= next.open.max(next.close));

        let after = s.advance(NOW + 600).unwrap();
        assert_eq!(after.timestamp, next.timestamp + 60);
    }

    #[test]
    fn test_advance_waits_for_boundary() {
        let mut s = series(5, 100);
        // 현재 봉(00:00:00) 생성
        let current = s.advance(NOW).unwrap();
        assert_eq!(current.timestamp, 1_672_531_200);
        assert!(!s.is_closed(&current, NOW));
        assert!(s.advance(NOW + 10).is_none());
        assert!(s.advance(1_672_531_260).is_some());
    }

    #[test]
    fn test_open_bar_closes_once() {
        let mut s = series(5, 100);
        let current = s.advance(NOW).unwrap();
        assert!(s.take_closed(NOW + 10).is_none());

        let closed = s.take_closed(1_672_531_260).unwrap();
        assert_eq!(closed, current);
        assert!(s.take_closed(1_672_531_260).is_none());

        // 이미 마감된 채로 합성된 봉은 다시 내보내지 않음
        s.advance(NOW + 600).unwrap();
        assert!(s.take_closed(NOW + 600).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut s = series(3, 3);
        let first = s.candles()[0].timestamp;
        s.advance(NOW).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.candles()[0].timestamp, first + 60);
    }

    #[test]
    fn test_empty_history_starts_at_initial_price() {
        let mut s = series(0, 10);
        assert!(s.is_empty());
        let bar = s.advance(NOW).unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.timestamp, 1_672_531_200);
    }

    #[test]
    fn test_align() {
        assert_eq!(align_to_interval(NOW, 60), 1_672_531_200);
        assert_eq!(align_to_interval(NOW, 3600), 1_672_531_200);
    }
}
