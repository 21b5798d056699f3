//! 등록된 모든 어댑터에 공통으로 적용되는 계약 테스트.

use candles_core::CandleError;
use candles_exchange::{AdapterRegistry, ExchangeError, HttpNetworkClient};
use serde_json::json;

#[test]
fn none_payloads_are_tolerated() {
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids() {
        let adapter = registry.create(id).unwrap();
        assert!(
            adapter.parse_rest_response(None).unwrap().is_empty(),
            "{id}: parse_rest_response(None)"
        );
        assert!(
            adapter.parse_ws_message(None).unwrap().is_none(),
            "{id}: parse_ws_message(None)"
        );
    }
}

#[test]
fn ws_intervals_are_subset_of_rest_intervals() {
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids() {
        let adapter = registry.create(id).unwrap();
        let rest = adapter.get_supported_intervals();
        let ws = adapter.get_ws_supported_intervals();
        assert!(!ws.is_empty(), "{id}: no ws intervals");
        for interval in &ws {
            assert!(rest.contains_key(interval), "{id}: {interval} not in rest table");
        }
    }
}

#[test]
fn unknown_intervals_pass_through() {
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids() {
        let adapter = registry.create(id).unwrap();
        let params = adapter.get_rest_params("BTC-USDT", "7x", None, None, None);
        assert!(
            params.to_string_lossy().contains("7x"),
            "{id}: unmapped interval was not passed through"
        );
    }
}

#[test]
fn time_bounds_omitted_when_absent() {
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids() {
        let adapter = registry.create(id).unwrap();
        let params = adapter.get_rest_params("BTC-USDT", "1m", None, None, None);
        let text = params.to_string_lossy();
        for key in ["startTime", "endTime", "start\"", "end\"", "since", "from", "\"to\"", "after", "before", "startAt", "endAt"] {
            assert!(!text.contains(key), "{id}: unexpected {key} in {text}");
        }
    }
}

#[test]
fn wrong_top_level_type_is_an_error() {
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids() {
        let adapter = registry.create(id).unwrap();
        for payload in [json!("garbage"), json!(42), json!(true)] {
            assert!(
                adapter.parse_rest_response(Some(&payload)).is_err(),
                "{id}: top-level {payload} was swallowed"
            );
        }
    }
}

/// 객체 envelope을 쓰는 거래소는 envelope 없이 배열만 와도 실패해야 함.
#[test]
fn bare_array_is_an_error_for_enveloped_exchanges() {
    let rows = json!([[1672531200000i64, "1", "2", "0.5", "1.5", "3"]]);
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids().into_iter().filter(|id| enveloped_nesting(id).is_some()) {
        let adapter = registry.create(id).unwrap();
        assert!(
            adapter.parse_rest_response(Some(&rows)).is_err(),
            "{id}: bare array accepted without envelope"
        );
    }
}

#[test]
fn wrong_nested_type_is_an_error() {
    let registry = AdapterRegistry::with_defaults();
    for id in registry.ids() {
        let adapter = registry.create(id).unwrap();
        let payload = enveloped_nesting(id).unwrap_or_else(|| json!({"unexpected": "garbage"}));
        let err = adapter
            .parse_rest_response(Some(&payload))
            .expect_err(&format!("{id}: nested type mismatch was swallowed: {payload}"));
        assert!(
            matches!(err, CandleError::UnexpectedPayload { .. }),
            "{id}: expected type error, got {err:?}"
        );
    }
}

/// 성공 envelope 안의 캔들 위치에 문자열을 넣은 응답.
fn enveloped_nesting(id: &str) -> Option<serde_json::Value> {
    let exchange = id.split('_').next().unwrap_or(id);
    match exchange {
        "bybit" => Some(json!({"retCode": 0, "retMsg": "OK", "result": {"list": "garbage"}})),
        "okx" => Some(json!({"code": "0", "msg": "", "data": "garbage"})),
        "kraken" => Some(json!({"error": [], "result": {"XXBTZUSD": "garbage", "last": 0}})),
        "coinbase" => Some(json!({"candles": "garbage"})),
        "kucoin" => Some(json!({"code": "200000", "data": "garbage"})),
        _ => None,
    }
}

trait LossyString {
    fn to_string_lossy(&self) -> String;
}

impl LossyString for serde_json::Map<String, serde_json::Value> {
    fn to_string_lossy(&self) -> String {
        serde_json::Value::Object(self.clone()).to_string()
    }
}

#[tokio::test]
async fn fetch_rest_candles_uses_base_url_override() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            mockito::Matcher::UrlEncoded("interval".into(), "1m".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[[1672531200000,"50000.0","51000.0","49000.0","50500.0","100.0",1672531259999,"5000000.0",1000,"60.0","3000000.0","0"]]"#,
        )
        .create_async()
        .await;

    let registry = AdapterRegistry::with_defaults();
    let adapter = registry.create("binance_spot").unwrap();
    let client = HttpNetworkClient::new()
        .unwrap()
        .with_rest_base_url(server.url());

    let candles = adapter
        .fetch_rest_candles(&client, "BTC-USDT", "1m", None, None, Some(1))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].timestamp, 1672531200);
    assert_eq!(candles[0].close, 50500.0);
}

#[tokio::test]
async fn fetch_rest_candles_surfaces_exchange_error_envelope() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v5/market/candles")
        .match_query(mockito::Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":"51000","msg":"Parameter bar error","data":[]}"#)
        .create_async()
        .await;

    let adapter = AdapterRegistry::with_defaults().create("okx_spot").unwrap();
    let client = HttpNetworkClient::new()
        .unwrap()
        .with_rest_base_url(server.url());

    let err = adapter
        .fetch_rest_candles(&client, "BTC-USDT", "1h", None, None, None)
        .await
        .unwrap_err();

    match err {
        ExchangeError::Candle(CandleError::ExchangeReported { code, message }) => {
            assert_eq!(code, "51000");
            assert_eq!(message, "Parameter bar error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn fetch_rest_candles_posts_for_hyperliquid() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/info")
        .match_body(mockito::Matcher::PartialJson(json!({
            "type": "candleSnapshot",
            "req": {"coin": "BTC", "interval": "1m"}
        })))
        .with_status(200)
        .with_body(
            r#"[{"t":1672531200000,"T":1672531259999,"s":"BTC","i":"1m","o":"1","c":"2","h":"3","l":"0.5","v":"4","n":5}]"#,
        )
        .create_async()
        .await;

    let adapter = AdapterRegistry::with_defaults()
        .create("hyperliquid_perpetual")
        .unwrap();
    let client = HttpNetworkClient::new()
        .unwrap()
        .with_rest_base_url(server.url());

    let candles = adapter
        .fetch_rest_candles(&client, "BTC-USD", "1m", Some(1672531200), None, None)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(candles[0].high, 3.0);
    assert_eq!(candles[0].n_trades, 5);
}
