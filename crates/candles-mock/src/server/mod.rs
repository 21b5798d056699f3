//! 모의 거래소 서버 런타임.
//!
//! 활성 플러그인의 라우트 테이블로 axum 라우터를 구성하고, 시계열별 캔들을 주기적으로
//! 합성하여 WebSocket 구독자에게 플러그인 형식으로 push 합니다.
//!
//! # 종료 순서
//!
//! 1. 합성 태스크 취소
//! 2. 모든 WebSocket 연결 종료
//! 3. HTTP 리스너 종료

mod rest;
mod series;
mod ws;

pub use series::{align_to_interval, series_seed, CandleSeries};

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use candles_core::CandleData;
use candles_exchange::HttpMethod;
use chrono::Utc;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MockServerConfig;
use crate::error::{MockServerError, MockServerResult};
use crate::monitoring::MonitoringContext;
use crate::plugin::{interval_seconds, url_path, ExchangePlugin};
use crate::plugins::PluginRegistry;
use crate::rate_limit::RateLimiter;

/// 리스너 종료 대기 상한.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 유휴 rate limit 버킷 정리 주기.
const BUCKET_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// 시계열 키 (거래쌍, 인터벌).
type SeriesKey = (String, String);

// ============================================================================
// 공유 상태
// ============================================================================

/// 연결 송신 태스크로 보내는 메시지.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    /// JSON 메시지. 문자열 값은 따옴표 없는 텍스트로 보냅니다.
    Message(Value),
    /// 연결 종료
    Close,
}

/// 핸들러와 합성 태스크가 공유하는 상태.
pub(crate) struct ServerShared {
    pub(crate) plugin: Arc<dyn ExchangePlugin>,
    pub(crate) config: MockServerConfig,
    pub(crate) rate_limiter: RateLimiter,
    series: RwLock<HashMap<SeriesKey, CandleSeries>>,
    /// 구독 키 -> 연결 ID 집합. 빈 집합은 남기지 않습니다.
    subscriptions: RwLock<HashMap<String, HashSet<Uuid>>>,
    connections: RwLock<HashMap<Uuid, mpsc::Sender<Outbound>>>,
}

impl ServerShared {
    fn new(plugin: Arc<dyn ExchangePlugin>, config: MockServerConfig) -> Self {
        let rate_limiter = RateLimiter::from_settings(&plugin.rate_limits(), &config.rate_limit);
        Self {
            plugin,
            config,
            rate_limiter,
            series: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    fn interval_secs(&self, interval: &str) -> i64 {
        interval_seconds(&self.plugin.adapter().intervals(), interval)
    }

    /// 시계열이 없으면 `initial_price`로 생성합니다. 새로 만들었으면 `true`.
    pub(crate) async fn ensure_series(
        &self,
        trading_pair: &str,
        interval: &str,
        initial_price: f64,
    ) -> bool {
        let key = (trading_pair.to_string(), interval.to_string());
        let mut series = self.series.write().await;
        if series.contains_key(&key) {
            return false;
        }
        series.insert(
            key,
            CandleSeries::new(
                series_seed(trading_pair, interval),
                self.interval_secs(interval),
                initial_price,
                self.config.initial_history,
                self.config.candle_capacity,
                Utc::now().timestamp(),
            ),
        );
        info!(trading_pair, interval, initial_price, "Trading pair registered");
        true
    }

    /// 요청된 시계열을 보장합니다. 처음 보는 거래쌍은 기본 가격으로 자동 등록됩니다.
    pub(crate) async fn ensure_requested(&self, trading_pair: &str, interval: &str) {
        if self
            .ensure_series(trading_pair, interval, self.config.default_initial_price)
            .await
        {
            debug!(trading_pair, interval, "Auto-registered requested trading pair");
        }
    }

    pub(crate) async fn candles(&self, trading_pair: &str, interval: &str) -> Vec<CandleData> {
        self.series
            .read()
            .await
            .get(&(trading_pair.to_string(), interval.to_string()))
            .map(CandleSeries::candles)
            .unwrap_or_default()
    }

    pub(crate) async fn latest(&self, trading_pair: &str, interval: &str) -> Option<CandleData> {
        self.series
            .read()
            .await
            .get(&(trading_pair.to_string(), interval.to_string()))
            .and_then(|series| series.latest().cloned())
    }

    /// 등록된 거래쌍 (중복 제거, 정렬).
    pub(crate) async fn trading_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .series
            .read()
            .await
            .keys()
            .map(|(pair, _)| pair.clone())
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    pub(crate) async fn register_connection(&self, id: Uuid, sender: mpsc::Sender<Outbound>) {
        self.connections.write().await.insert(id, sender);
    }

    /// 연결을 제거하고, 연결이 속한 모든 구독 집합에서 뺍니다.
    pub(crate) async fn remove_connection(&self, id: Uuid) {
        self.connections.write().await.remove(&id);

        let mut subscriptions = self.subscriptions.write().await;
        // 순회 중 변경하지 않도록 키를 먼저 수집
        let keys: Vec<String> = subscriptions
            .iter()
            .filter(|(_, members)| members.contains(&id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            Self::remove_member(&mut subscriptions, &key, id);
        }
    }

    pub(crate) async fn subscribe(&self, key: String, id: Uuid) {
        self.subscriptions
            .write()
            .await
            .entry(key)
            .or_default()
            .insert(id);
    }

    pub(crate) async fn unsubscribe(&self, key: &str, id: Uuid) {
        let mut subscriptions = self.subscriptions.write().await;
        Self::remove_member(&mut subscriptions, key, id);
    }

    fn remove_member(subscriptions: &mut HashMap<String, HashSet<Uuid>>, key: &str, id: Uuid) {
        if let Some(members) = subscriptions.get_mut(key) {
            members.remove(&id);
            if members.is_empty() {
                subscriptions.remove(key);
            }
        }
    }

    pub(crate) async fn subscriber_count(&self, key: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(key)
            .map_or(0, HashSet::len)
    }

    pub(crate) async fn subscription_keys(&self) -> Vec<String> {
        self.subscriptions.read().await.keys().cloned().collect()
    }

    /// 합성 한 주기. 경계를 지난 시계열마다 봉 하나를 만들고 구독자에게 push 합니다.
    ///
    /// 열린 채로 push 했던 봉이 이번 경계에서 마감되면 `is_final = true`로 한 번 더 보냅니다.
    async fn synthesize_tick(&self, now: i64, monitoring: &MonitoringContext) {
        let mut produced: Vec<(SeriesKey, CandleData, bool)> = Vec::new();
        {
            let mut series = self.series.write().await;
            for (key, s) in series.iter_mut() {
                if let Some(closed) = s.take_closed(now) {
                    produced.push((key.clone(), closed, true));
                }
                if let Some(candle) = s.advance(now) {
                    monitoring.record_synthesized();
                    let is_final = s.is_closed(&candle, now);
                    produced.push((key.clone(), candle, is_final));
                }
            }
        }

        for ((trading_pair, interval), candle, is_final) in produced {

            let key = self
                .plugin
                .create_ws_subscription_key(&trading_pair, &interval);
            // 구독자 집합 스냅샷
            let subscribers: Vec<Uuid> = self
                .subscriptions
                .read()
                .await
                .get(&key)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default();
            if subscribers.is_empty() {
                continue;
            }

            let message =
                self.plugin
                    .format_ws_candle_message(&candle, &trading_pair, &interval, is_final);
            let connections = self.connections.read().await;
            let mut pushed = 0;
            for id in subscribers {
                let Some(sender) = connections.get(&id) else {
                    continue;
                };
                match sender.try_send(Outbound::Message(message.clone())) {
                    Ok(()) => pushed += 1,
                    Err(e) => warn!(connection_id = %id, "Dropping candle push: {}", e),
                }
            }
            monitoring.record_pushed(pushed);
            debug!(%key, timestamp = candle.timestamp, pushed, "Candle pushed");
        }
    }

    /// 모든 연결에 종료를 요청하고 연결 테이블을 비웁니다.
    async fn close_connections(&self) -> usize {
        let senders: Vec<(Uuid, mpsc::Sender<Outbound>)> =
            self.connections.write().await.drain().collect();
        let count = senders.len();
        for (id, sender) in senders {
            match sender.try_send(Outbound::Close) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // 막힌 연결은 기다리지 않고 리스너 종료 타임아웃에 맡김
                    warn!(connection_id = %id, "Outbound queue full, skipping close frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = %id, "Connection already closed");
                }
            }
        }
        self.subscriptions.write().await.clear();
        count
    }
}

/// axum 핸들러 상태.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) shared: Arc<ServerShared>,
    pub(crate) monitoring: Arc<MonitoringContext>,
    /// 토큰 응답에 넣을 WS 엔드포인트
    pub(crate) ws_endpoint: Arc<str>,
}

fn build_router(state: AppState) -> Router {
    let plugin = state.shared.plugin.clone();
    let mut router: Router<AppState> = Router::new();

    for route in plugin.rest_routes() {
        let path = route.path.clone();
        let method = route.method;
        let handler = move |axum::extract::State(state): axum::extract::State<AppState>,
                            request: axum::extract::Request| {
            let route = route.clone();
            async move { rest::handle_rest(state, route, request).await }
        };
        router = match method {
            HttpMethod::Get => router.route(&path, get(handler)),
            HttpMethod::Post => router.route(&path, post(handler)),
        };
    }
    for path in plugin.ws_routes() {
        router = router.route(&path, get(ws::websocket_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

// ============================================================================
// 서버
// ============================================================================

struct RunningServer {
    addr: SocketAddr,
    monitoring: Arc<MonitoringContext>,
    synthesis_token: CancellationToken,
    listener_token: CancellationToken,
    synthesis_task: JoinHandle<()>,
    server_task: JoinHandle<()>,
}

/// 모의 거래소 서버.
///
/// ```no_run
/// use candles_mock::{MockExchangeServer, MockServerConfig};
///
/// # async fn run() -> candles_mock::MockServerResult<()> {
/// let config = MockServerConfig::default().with_exchange("okx_spot");
/// let mut server = MockExchangeServer::from_config(config)?;
/// server.add_trading_pair("BTC-USDT", "1m", 50_000.0).await;
/// let addr = server.start().await?;
/// println!("listening on {}", addr);
/// server.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct MockExchangeServer {
    shared: Arc<ServerShared>,
    running: Option<RunningServer>,
}

impl MockExchangeServer {
    pub fn new(plugin: Arc<dyn ExchangePlugin>, config: MockServerConfig) -> Self {
        Self {
            shared: Arc::new(ServerShared::new(plugin, config)),
            running: None,
        }
    }

    /// 설정의 `exchange`로 기본 레지스트리에서 플러그인을 골라 생성합니다.
    pub fn from_config(config: MockServerConfig) -> MockServerResult<Self> {
        let plugin = PluginRegistry::with_defaults().create(&config.exchange)?;
        Ok(Self::new(Arc::from(plugin), config))
    }

    pub fn plugin(&self) -> &Arc<dyn ExchangePlugin> {
        &self.shared.plugin
    }

    pub fn config(&self) -> &MockServerConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// 거래쌍을 등록하고 결정적 과거 캔들을 생성합니다. 이미 있으면 무시합니다.
    pub async fn add_trading_pair(&self, trading_pair: &str, interval: &str, initial_price: f64) {
        self.shared
            .ensure_series(trading_pair, interval, initial_price)
            .await;
    }

    /// 리스너를 바인딩하고 HTTP 서버와 합성 태스크를 시작합니다.
    pub async fn start(&mut self) -> MockServerResult<SocketAddr> {
        if self.running.is_some() {
            return Err(MockServerError::AlreadyRunning);
        }

        for seed in &self.shared.config.trading_pairs {
            self.shared
                .ensure_series(&seed.trading_pair, &seed.interval, seed.initial_price)
                .await;
        }

        let listener = TcpListener::bind(self.shared.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let monitoring = Arc::new(MonitoringContext::new());

        let state = AppState {
            shared: self.shared.clone(),
            monitoring: monitoring.clone(),
            ws_endpoint: Arc::from(self.ws_url_for(addr)),
        };
        let app = build_router(state);

        let listener_token = CancellationToken::new();
        let shutdown = listener_token.clone().cancelled_owned();
        let server_task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown)
            .await;
            if let Err(e) = result {
                error!("Mock server error: {}", e);
            }
        });

        let synthesis_token = CancellationToken::new();
        let synthesis_task = tokio::spawn(run_synthesis(
            self.shared.clone(),
            monitoring.clone(),
            Duration::from_millis(self.shared.config.tick_interval_ms.max(1)),
            synthesis_token.clone(),
        ));

        info!(
            exchange = self.shared.plugin.id(),
            %addr,
            "Mock exchange server started"
        );

        self.running = Some(RunningServer {
            addr,
            monitoring,
            synthesis_token,
            listener_token,
            synthesis_task,
            server_task,
        });
        Ok(addr)
    }

    /// 합성 태스크 취소 -> WS 연결 종료 -> 리스너 종료 순으로 서버를 멈춥니다.
    pub async fn stop(&mut self) -> MockServerResult<()> {
        let running = self.running.take().ok_or(MockServerError::NotRunning)?;

        running.synthesis_token.cancel();
        if let Err(e) = running.synthesis_task.await {
            warn!("Synthesis task ended abnormally: {}", e);
        }

        let closed = self.shared.close_connections().await;
        debug!(closed, "WebSocket connections closed");

        running.listener_token.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, running.server_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Server task ended abnormally: {}", e),
            Err(_) => warn!("Server shutdown timed out"),
        }

        info!(
            exchange = self.shared.plugin.id(),
            addr = %running.addr,
            "Mock exchange server stopped"
        );
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// REST 기본 URL (`http://127.0.0.1:port`).
    pub fn url(&self) -> MockServerResult<String> {
        self.local_addr()
            .map(|addr| format!("http://{}", addr))
            .ok_or(MockServerError::NotRunning)
    }

    /// 플러그인의 첫 WS 경로를 붙인 WebSocket URL.
    pub fn ws_url(&self) -> MockServerResult<String> {
        self.local_addr()
            .map(|addr| self.ws_url_for(addr))
            .ok_or(MockServerError::NotRunning)
    }

    fn ws_url_for(&self, addr: SocketAddr) -> String {
        let path = self
            .shared
            .plugin
            .ws_routes()
            .into_iter()
            .next()
            .unwrap_or_else(|| url_path(self.shared.plugin.wss_url()));
        format!("ws://{}{}", addr, path)
    }

    /// 보관 중인 캔들 (오래된 순).
    pub async fn candles(&self, trading_pair: &str, interval: &str) -> Vec<CandleData> {
        self.shared.candles(trading_pair, interval).await
    }

    /// 구독 키의 구독자 수.
    pub async fn subscriber_count(&self, key: &str) -> usize {
        self.shared.subscriber_count(key).await
    }

    /// 현재 구독 키 목록.
    pub async fn subscription_keys(&self) -> Vec<String> {
        self.shared.subscription_keys().await
    }

    /// 실행 중일 때만 존재하는 모니터링 컨텍스트.
    pub fn monitoring(&self) -> Option<Arc<MonitoringContext>> {
        self.running.as_ref().map(|r| r.monitoring.clone())
    }

    /// 포트 바인딩 없이 요청을 처리하는 라우터 (oneshot 테스트용).
    pub fn router(&self) -> Router {
        let (monitoring, ws_endpoint) = match &self.running {
            Some(running) => (running.monitoring.clone(), self.ws_url_for(running.addr)),
            None => (
                Arc::new(MonitoringContext::new()),
                format!("ws://{}", self.shared.config.bind_address()),
            ),
        };
        build_router(AppState {
            shared: self.shared.clone(),
            monitoring,
            ws_endpoint: Arc::from(ws_endpoint),
        })
    }

    /// 합성 한 주기를 즉시 실행합니다.
    pub async fn tick(&self, now: i64) {
        let monitoring = self
            .monitoring()
            .unwrap_or_else(|| Arc::new(MonitoringContext::new()));
        self.shared.synthesize_tick(now, &monitoring).await;
    }
}

impl Drop for MockExchangeServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.synthesis_token.cancel();
            running.listener_token.cancel();
        }
    }
}

async fn run_synthesis(
    shared: Arc<ServerShared>,
    monitoring: Arc<MonitoringContext>,
    tick: Duration,
    token: CancellationToken,
) {
    // 첫 합성은 한 주기 뒤
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cleanup =
        tokio::time::interval_at(Instant::now() + BUCKET_CLEANUP_INTERVAL, BUCKET_CLEANUP_INTERVAL);
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Synthesis loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                shared.synthesize_tick(Utc::now().timestamp(), &monitoring).await;
            }
            _ = cleanup.tick() => {
                shared.rate_limiter.cleanup(BUCKET_CLEANUP_INTERVAL * 10).await;
            }
        }
    }
}
