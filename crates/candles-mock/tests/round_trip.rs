//! 플러그인이 만든 페이로드가 짝이 되는 어댑터로 그대로 파싱되는지 확인합니다.

use candles_core::CandleData;
use candles_mock::{ExchangePlugin, PluginRegistry, SubscriptionAction, WsStream};
use proptest::prelude::*;
use serde_json::{json, Value};

/// 거래소별로 실제로 거래되는 형태의 거래쌍.
fn trading_pair_for(id: &str) -> &'static str {
    match id {
        "kraken_spot" | "coinbase_advanced_trade" | "hyperliquid_perpetual" => "BTC-USD",
        "hyperliquid_spot" => "PURR-USDC",
        _ => "BTC-USDT",
    }
}

fn ws_interval(plugin: &dyn ExchangePlugin) -> String {
    plugin
        .adapter()
        .get_ws_supported_intervals()
        .into_iter()
        .next()
        .unwrap_or_else(|| "1m".to_string())
}

fn assert_ohlcv_eq(id: &str, parsed: &[CandleData], expected: &[CandleData]) {
    assert_eq!(parsed.len(), expected.len(), "{id}: candle count");
    for (p, e) in parsed.iter().zip(expected) {
        assert_eq!(p.timestamp, e.timestamp, "{id}: timestamp");
        assert_eq!(p.open, e.open, "{id}: open");
        assert_eq!(p.high, e.high, "{id}: high");
        assert_eq!(p.low, e.low, "{id}: low");
        assert_eq!(p.close, e.close, "{id}: close");
        assert_eq!(p.volume, e.volume, "{id}: volume");
    }
}

/// 시간 순으로 정렬된 정시 캔들 시퀀스.
fn candle_sequence() -> impl Strategy<Value = Vec<CandleData>> {
    (
        440_000i64..470_000,
        prop::collection::vec(
            (
                1.0f64..100_000.0,
                -0.05f64..0.05,
                0.0f64..0.01,
                0.0f64..0.01,
                0.001f64..1_000.0,
                1u64..10_000,
            ),
            1..8,
        ),
    )
        .prop_map(|(hour, bars)| {
            bars.into_iter()
                .enumerate()
                .map(|(i, (open, change, up, down, volume, trades))| {
                    let close = open * (1.0 + change);
                    let high = open.max(close) * (1.0 + up);
                    let low = open.min(close) * (1.0 - down);
                    CandleData::new((hour + i as i64) * 3600, open, high, low, close, volume)
                        .with_quote_asset_volume(volume * close)
                        .with_n_trades(trades)
                })
                .collect()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rest_payloads_parse_back(candles in candle_sequence()) {
        let registry = PluginRegistry::with_defaults();
        for id in registry.ids() {
            let plugin = registry.create(id).unwrap();
            let pair = trading_pair_for(id);
            let payload = plugin.format_rest_candles(&candles, pair, "1h");
            let parsed = plugin
                .adapter()
                .parse_rest_response(Some(&payload))
                .unwrap_or_else(|e| panic!("{id}: {e}"));
            assert_ohlcv_eq(id, &parsed, &candles);
        }
    }

    #[test]
    fn ws_pushes_parse_back(candles in candle_sequence(), is_final in any::<bool>()) {
        let registry = PluginRegistry::with_defaults();
        for id in registry.ids() {
            let plugin = registry.create(id).unwrap();
            let pair = trading_pair_for(id);
            let interval = ws_interval(plugin.as_ref());
            for candle in &candles {
                let message = plugin.format_ws_candle_message(candle, pair, &interval, is_final);
                let parsed = plugin
                    .adapter()
                    .parse_ws_message(Some(&message))
                    .unwrap_or_else(|e| panic!("{id}: {e}"))
                    .unwrap_or_else(|| panic!("{id}: push not recognized as candle update"));
                assert_ohlcv_eq(id, &parsed, std::slice::from_ref(candle));
            }
        }
    }
}

#[test]
fn adapter_subscription_payloads_are_understood() {
    let registry = PluginRegistry::with_defaults();
    for id in registry.ids() {
        let plugin = registry.create(id).unwrap();
        let pair = trading_pair_for(id);
        let interval = ws_interval(plugin.as_ref());

        let payload = plugin.adapter().get_ws_subscription_payload(pair, &interval);
        let subscription = plugin
            .parse_ws_subscription(&payload)
            .unwrap_or_else(|| panic!("{id}: subscription payload not recognized: {payload}"));
        assert_eq!(subscription.action, SubscriptionAction::Subscribe, "{id}");
        assert_eq!(
            subscription.streams,
            vec![WsStream::new(pair, interval.as_str())],
            "{id}: stream"
        );

        let ack = plugin.create_ws_subscription_success(&payload, &subscription);
        assert!(
            plugin.adapter().parse_ws_message(Some(&ack)).unwrap().is_none(),
            "{id}: ack parsed as candle update: {ack}"
        );
    }
}

#[test]
fn control_messages_are_not_candles() {
    let pings: Vec<Value> = vec![
        json!("ping"),
        json!({"op": "ping"}),
        json!({"event": "ping", "reqid": 1}),
        json!({"method": "ping"}),
        json!({"id": "1", "type": "ping"}),
        json!({"channel": "spot.ping"}),
        json!({"channel": "futures.ping"}),
    ];
    let registry = PluginRegistry::with_defaults();
    for id in registry.ids() {
        let plugin = registry.create(id).unwrap();
        let adapter = plugin.adapter();

        for ping in &pings {
            if let Some(pong) = plugin.create_ws_pong(ping) {
                assert!(
                    adapter.parse_ws_message(Some(&pong)).unwrap().is_none(),
                    "{id}: pong parsed as candle update: {pong}"
                );
            }
        }
        if let Some(error) = plugin.create_ws_error(&json!({"unknown": true})) {
            assert!(
                adapter.parse_ws_message(Some(&error)).unwrap().is_none(),
                "{id}: error parsed as candle update: {error}"
            );
        }
        if let Some(welcome) = plugin.ws_welcome("conn-1") {
            assert!(adapter.parse_ws_message(Some(&welcome)).unwrap().is_none(), "{id}");
        }
    }
}

#[test]
fn rate_limit_bodies_are_exchange_shaped() {
    let registry = PluginRegistry::with_defaults();
    for id in registry.ids() {
        let plugin = registry.create(id).unwrap();
        let error = plugin.create_rate_limit_error(1);
        assert!(
            error.status.as_u16() == 429 || error.status.as_u16() == 200,
            "{id}: unexpected status {}",
            error.status
        );
        if error.body.is_object() {
            assert!(
                plugin.adapter().parse_rest_response(Some(&error.body)).is_err(),
                "{id}: rate limit body parsed as candles"
            );
        }
    }
}
