//! 거래쌍 타입과 형식 변환 헬퍼.
//!
//! 정규 형식은 `"BASE-QUOTE"` 입니다 (예: `BTC-USDT`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CandleError, CandleResult};

/// 연결된 심볼(`BTCUSDT`)을 분해할 때 시도하는 호가 자산 목록.
///
/// 긴 접미사가 먼저 매칭되도록 길이 내림차순으로 정렬되어 있습니다.
pub const COMMON_QUOTES: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "EUR", "USD", "GBP", "BTC", "ETH", "BNB", "TRY",
];

/// 정규 형식 거래쌍.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    /// 기준 자산 (예: BTC)
    pub base: String,
    /// 호가 자산 (예: USDT)
    pub quote: String,
}

impl TradingPair {
    /// 새 거래쌍을 생성합니다. 자산 이름은 대문자로 정규화됩니다.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// `"BASE-QUOTE"` 문자열을 파싱합니다.
    pub fn parse(s: &str) -> CandleResult<Self> {
        match s.split_once('-') {
            Some((base, quote))
                if !base.is_empty() && !quote.is_empty() && !quote.contains('-') =>
            {
                Ok(Self::new(base, quote))
            }
            _ => Err(CandleError::InvalidTradingPair(s.to_string())),
        }
    }

    /// 임의 구분자로 연결한 심볼을 반환합니다.
    pub fn joined(&self, separator: &str) -> String {
        format!("{}{}{}", self.base, separator, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = CandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// 구분자 없는 거래소 심볼을 정규 거래쌍으로 분해합니다.
///
/// `quotes` 중 가장 먼저 매칭되는 접미사를 호가 자산으로 사용합니다.
/// 기준 자산이 비게 되는 경우는 매칭으로 보지 않습니다.
pub fn split_concatenated_symbol(symbol: &str, quotes: &[&str]) -> Option<TradingPair> {
    let upper = symbol.to_uppercase();
    quotes.iter().find_map(|quote| {
        upper
            .strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| TradingPair::new(base, *quote))
    })
}
