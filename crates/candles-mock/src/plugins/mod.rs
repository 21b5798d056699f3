//! 거래소별 모의 플러그인과 플러그인 레지스트리.

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod gate_io;
pub mod hyperliquid;
pub mod kraken;
pub mod kucoin;
pub mod okx;

use std::collections::BTreeMap;

pub use binance::BinancePlugin;
pub use bybit::BybitPlugin;
pub use coinbase::CoinbasePlugin;
pub use gate_io::GateIoPlugin;
pub use hyperliquid::HyperliquidPlugin;
pub use kraken::KrakenPlugin;
pub use kucoin::KucoinPlugin;
pub use okx::OkxPlugin;

use crate::error::{MockServerError, MockServerResult};
use crate::plugin::ExchangePlugin;

/// 플러그인 생성 함수.
pub type PluginFactory = fn() -> Box<dyn ExchangePlugin>;

/// 거래소 식별자 -> 플러그인 생성자.
///
/// 식별자는 어댑터 레지스트리와 같습니다.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<&'static str, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 제공 거래소를 모두 등록한 레지스트리.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("binance_spot", || Box::new(BinancePlugin::spot()));
        registry.register("binance_perpetual", || Box::new(BinancePlugin::perpetual()));
        registry.register("bybit_spot", || Box::new(BybitPlugin::spot()));
        registry.register("bybit_perpetual", || Box::new(BybitPlugin::perpetual()));
        registry.register("okx_spot", || Box::new(OkxPlugin::spot()));
        registry.register("okx_perpetual", || Box::new(OkxPlugin::perpetual()));
        registry.register("kraken_spot", || Box::new(KrakenPlugin::new()));
        registry.register("gate_io_spot", || Box::new(GateIoPlugin::spot()));
        registry.register("gate_io_perpetual", || Box::new(GateIoPlugin::perpetual()));
        registry.register("hyperliquid_spot", || Box::new(HyperliquidPlugin::spot()));
        registry.register("hyperliquid_perpetual", || {
            Box::new(HyperliquidPlugin::perpetual())
        });
        registry.register("coinbase_advanced_trade", || Box::new(CoinbasePlugin::new()));
        registry.register("kucoin_spot", || Box::new(KucoinPlugin::new()));
        registry
    }

    /// 생성자를 등록합니다. 같은 식별자는 덮어씁니다.
    pub fn register(&mut self, id: &'static str, factory: PluginFactory) {
        self.factories.insert(id, factory);
    }

    pub fn create(&self, id: &str) -> MockServerResult<Box<dyn ExchangePlugin>> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| MockServerError::UnknownExchange(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// 등록된 식별자 (정렬됨).
    pub fn ids(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candles_exchange::AdapterRegistry;

    #[test]
    fn test_plugins_match_adapter_registry() {
        let plugins = PluginRegistry::with_defaults();
        assert_eq!(plugins.ids(), AdapterRegistry::with_defaults().ids());
        for id in plugins.ids() {
            let plugin = plugins.create(id).unwrap();
            assert_eq!(plugin.id(), id);
            assert_eq!(plugin.adapter().name(), id);
            assert!(!plugin.rest_routes().is_empty());
        }
    }

    #[test]
    fn test_unknown_plugin() {
        let registry = PluginRegistry::with_defaults();
        assert!(matches!(
            registry.create("mtgox"),
            Err(MockServerError::UnknownExchange(_))
        ));
    }
}
