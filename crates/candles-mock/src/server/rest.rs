//! REST 요청 디스패치.
//!
//! 라우트 테이블의 핸들러 종류에 따라 플러그인에 위임합니다.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Query, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::AppState;
use crate::plugin::{match_path_template, ErrorResponse, RestRequest, RestRoute, RouteHandler};
use crate::rate_limit::RateLimitResult;

/// 요청 본문 크기 상한.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// API 키로 인정하는 헤더.
const API_KEY_HEADERS: [&str; 3] = ["x-api-key", "x-mbx-apikey", "ok-access-key"];

pub(crate) async fn handle_rest(state: AppState, route: RestRoute, request: Request) -> Response {
    state.monitoring.record_rest_request();

    let client_ip = extract_client_ip(&request);
    if let RateLimitResult::Limited { retry_after } =
        state.shared.rate_limiter.check(client_ip).await
    {
        state.monitoring.record_rejected();
        warn!(
            client_ip = %client_ip,
            path = %route.path,
            retry_after,
            "Rate limit exceeded"
        );
        let mut response =
            error_response(state.shared.plugin.create_rate_limit_error(retry_after));
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let plugin = &state.shared.plugin;
    if plugin.api_key_required() && !has_api_key(&request) {
        state.monitoring.record_rejected();
        return error_response(ErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "API key required" }),
        ));
    }

    let rest_request = build_rest_request(&route, request).await;

    match route.handler {
        RouteHandler::Candles => {
            let query = match plugin.parse_rest_candles_params(&rest_request) {
                Ok(query) => query,
                Err(err) => {
                    state.monitoring.record_rejected();
                    debug!(path = %route.path, status = %err.status, "Invalid candle request");
                    return error_response(err);
                }
            };
            state
                .shared
                .ensure_requested(&query.trading_pair, &query.interval)
                .await;
            let candles = query.select(
                &state
                    .shared
                    .candles(&query.trading_pair, &query.interval)
                    .await,
            );
            debug!(
                trading_pair = %query.trading_pair,
                interval = %query.interval,
                count = candles.len(),
                "Serving candles"
            );
            Json(plugin.format_rest_candles(&candles, &query.trading_pair, &query.interval))
                .into_response()
        }
        RouteHandler::Ping => Json(plugin.format_ping()).into_response(),
        RouteHandler::Time => {
            Json(plugin.format_server_time(Utc::now().timestamp_millis())).into_response()
        }
        RouteHandler::ExchangeInfo => {
            let pairs = state.shared.trading_pairs().await;
            Json(plugin.format_exchange_info(&pairs)).into_response()
        }
        RouteHandler::WsToken => Json(plugin.create_ws_token(&state.ws_endpoint)).into_response(),
    }
}

async fn build_rest_request(route: &RestRoute, request: Request) -> RestRequest {
    let path_params = match_path_template(&route.path, request.uri().path()).unwrap_or_default();
    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<Value>(&bytes).ok(),
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            None
        }
    };

    RestRequest {
        path_params,
        query,
        body,
    }
}

/// 플러그인 에러를 응답으로 바꿉니다. 문자열 본문은 일반 텍스트입니다.
pub(crate) fn error_response(err: ErrorResponse) -> Response {
    match err.body {
        Value::String(text) => (err.status, text).into_response(),
        body => (err.status, Json(body)).into_response(),
    }
}

fn has_api_key(request: &Request) -> bool {
    API_KEY_HEADERS
        .iter()
        .any(|name| request.headers().contains_key(*name))
}

/// 요청에서 클라이언트 IP 추출.
///
/// 연결 정보, X-Forwarded-For, X-Real-IP 순으로 확인합니다.
fn extract_client_ip(request: &Request) -> IpAddr {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }

    // 첫 번째 IP 사용 (클라이언트 원본 IP)
    if let Some(ip) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
    {
        return ip;
    }

    if let Some(ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
    {
        return ip;
    }

    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
