//! 거래소 식별자 -> 어댑터 생성자 레지스트리.
//!
//! 프로세스 시작 시 한 번 구성하고 필요한 곳에 참조로 전달합니다.

use std::collections::BTreeMap;

use crate::adapters::{
    BinanceAdapter, BybitAdapter, CoinbaseAdvancedTradeAdapter, GateIoAdapter,
    HyperliquidAdapter, KrakenAdapter, KucoinAdapter, OkxAdapter,
};
use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::CandleAdapter;

/// 어댑터 생성 함수.
pub type AdapterFactory = fn() -> Box<dyn CandleAdapter>;

/// 명시적 어댑터 레지스트리.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<&'static str, AdapterFactory>,
}

impl AdapterRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 제공 거래소를 모두 등록한 레지스트리.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("binance_spot", || Box::new(BinanceAdapter::spot()));
        registry.register("binance_perpetual", || Box::new(BinanceAdapter::perpetual()));
        registry.register("bybit_spot", || Box::new(BybitAdapter::spot()));
        registry.register("bybit_perpetual", || Box::new(BybitAdapter::perpetual()));
        registry.register("okx_spot", || Box::new(OkxAdapter::spot()));
        registry.register("okx_perpetual", || Box::new(OkxAdapter::perpetual()));
        registry.register("kraken_spot", || Box::new(KrakenAdapter::new()));
        registry.register("gate_io_spot", || Box::new(GateIoAdapter::spot()));
        registry.register("gate_io_perpetual", || Box::new(GateIoAdapter::perpetual()));
        registry.register("hyperliquid_spot", || Box::new(HyperliquidAdapter::spot()));
        registry.register("hyperliquid_perpetual", || {
            Box::new(HyperliquidAdapter::perpetual())
        });
        registry.register("coinbase_advanced_trade", || {
            Box::new(CoinbaseAdvancedTradeAdapter::new())
        });
        registry.register("kucoin_spot", || Box::new(KucoinAdapter::new()));
        registry
    }

    /// 생성자를 등록합니다. 같은 식별자는 덮어씁니다.
    pub fn register(&mut self, id: &'static str, factory: AdapterFactory) {
        self.factories.insert(id, factory);
    }

    /// 어댑터를 생성합니다.
    pub fn create(&self, id: &str) -> ExchangeResult<Box<dyn CandleAdapter>> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| ExchangeError::UnknownExchange(id.to_string()))
    }

    /// 등록 여부.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// 등록된 식별자 (정렬됨).
    pub fn ids(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_exchanges() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.ids().len(), 13);
        for id in registry.ids() {
            let adapter = registry.create(id).unwrap();
            assert_eq!(adapter.name(), id);
        }
    }

    #[test]
    fn test_unknown_exchange() {
        let registry = AdapterRegistry::with_defaults();
        assert!(matches!(
            registry.create("mtgox"),
            Err(ExchangeError::UnknownExchange(_))
        ));
        assert!(!registry.contains("mtgox"));
    }
}
