//! 어댑터가 사용하는 네트워크 협력자.
//!
//! 어댑터는 직접 소켓을 열지 않고 `NetworkClient`를 통해 REST/WebSocket I/O를 수행합니다.
//! `HttpNetworkClient`는 기본 URL 재정의를 지원하므로 어댑터를 모의 서버로 향하게 할 수 있습니다.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::RestParams;

/// REST/WebSocket I/O 추상화.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// 어댑터 기본 REST URL 대신 사용할 URL (테스트용).
    fn rest_base_url(&self) -> Option<&str> {
        None
    }

    /// 어댑터 기본 WebSocket URL 대신 사용할 URL (테스트용).
    fn ws_base_url(&self) -> Option<&str> {
        None
    }

    /// GET 요청 후 JSON 본문을 반환합니다.
    async fn get_rest_data(&self, url: &str, params: &RestParams) -> ExchangeResult<Value>;

    /// JSON 본문으로 POST 요청 후 JSON 본문을 반환합니다.
    async fn post_rest_data(&self, url: &str, body: &Value) -> ExchangeResult<Value>;

    /// WebSocket 연결을 수립합니다.
    async fn establish_ws_connection(&self, url: &str) -> ExchangeResult<WsConnection>;
}

/// reqwest + tokio-tungstenite 기반 네트워크 클라이언트.
#[derive(Debug, Clone)]
pub struct HttpNetworkClient {
    client: Client,
    rest_base_url: Option<String>,
    ws_base_url: Option<String>,
}

impl HttpNetworkClient {
    /// 기본 타임아웃 (초)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// 기본 타임아웃으로 클라이언트를 생성합니다.
    pub fn new() -> ExchangeResult<Self> {
        Self::with_timeout(Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
    }

    /// 응답 대기 시간 상한을 지정하여 생성합니다.
    pub fn with_timeout(timeout: Duration) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        Ok(Self {
            client,
            rest_base_url: None,
            ws_base_url: None,
        })
    }

    /// REST 기본 URL을 재정의합니다.
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = Some(url.into());
        self
    }

    /// WebSocket URL을 재정의합니다.
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = Some(url.into());
        self
    }

    async fn handle_response(response: reqwest::Response) -> ExchangeResult<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // 거래소 에러 봉투가 JSON이면 어댑터가 해석할 수 있도록 코드와 본문을 그대로 전달
            warn!(status = status.as_u16(), "Non-success response: {}", body);
            return Err(ExchangeError::ApiError {
                code: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse response: {} - Body: {}", e, body);
            ExchangeError::Parse(e.to_string())
        })
    }
}

/// 파라미터 맵을 쿼리 문자열 쌍으로 변환합니다.
///
/// 문자열은 따옴표 없이, 그 외 값은 JSON 표현으로 전송됩니다. null은 생략됩니다.
pub fn to_query_pairs(params: &RestParams) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    fn rest_base_url(&self) -> Option<&str> {
        self.rest_base_url.as_deref()
    }

    fn ws_base_url(&self) -> Option<&str> {
        self.ws_base_url.as_deref()
    }

    async fn get_rest_data(&self, url: &str, params: &RestParams) -> ExchangeResult<Value> {
        debug!("GET {} {:?}", url, params);
        let response = self
            .client
            .get(url)
            .query(&to_query_pairs(params))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn post_rest_data(&self, url: &str, body: &Value) -> ExchangeResult<Value> {
        debug!("POST {} {}", url, body);
        let response = self.client.post(url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn establish_ws_connection(&self, url: &str) -> ExchangeResult<WsConnection> {
        debug!("WS connect {}", url);
        let (stream, _) = connect_async(url).await?;
        Ok(WsConnection { stream })
    }
}

/// 하나의 WebSocket 연결.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsConnection {
    /// JSON 값을 텍스트 프레임으로 전송합니다. 문자열 값은 따옴표 없이 보냅니다.
    pub async fn send_json(&mut self, value: &Value) -> ExchangeResult<()> {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    /// 다음 메시지를 JSON으로 반환합니다.
    ///
    /// JSON이 아닌 텍스트(예: "pong")는 JSON 문자열로 반환합니다.
    /// 서버 ping은 자동으로 응답하며, 연결이 닫히면 `None`을 반환합니다.
    pub async fn next_json(&mut self) -> ExchangeResult<Option<Value>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => {
                    let value = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    return Ok(Some(value));
                }
                Message::Binary(bytes) => {
                    if let Ok(value) = serde_json::from_slice(&bytes) {
                        return Ok(Some(value));
                    }
                }
                Message::Ping(data) => {
                    self.stream.send(Message::Pong(data)).await?;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    /// 연결을 닫습니다.
    pub async fn close(&mut self) -> ExchangeResult<()> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs() {
        let mut params = RestParams::new();
        params.insert("symbol".into(), json!("BTCUSDT"));
        params.insert("limit".into(), json!(1000));
        params.insert("skip".into(), Value::Null);

        let pairs = to_query_pairs(&params);
        assert!(pairs.contains(&("symbol".to_string(), "BTCUSDT".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "1000".to_string())));
        assert_eq!(pairs.len(), 2);
    }

    #[tokio::test]
    async fn test_get_rest_data_against_stub() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "BTCUSDT".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[[1672531200000,"1","2","0.5","1.5","10"]]"#)
            .create_async()
            .await;

        let client = HttpNetworkClient::new().unwrap();
        let mut params = RestParams::new();
        params.insert("symbol".into(), json!("BTCUSDT"));

        let body = client
            .get_rest_data(&format!("{}/api/v3/klines", server.url()), &params)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body[0][0], json!(1672531200000_i64));
    }

    #[tokio::test]
    async fn test_non_success_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fail")
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create_async()
            .await;

        let client = HttpNetworkClient::new().unwrap();
        let err = client
            .get_rest_data(&format!("{}/fail", server.url()), &RestParams::new())
            .await
            .unwrap_err();

        match err {
            ExchangeError::ApiError { code, message } => {
                assert_eq!(code, 400);
                assert!(message.contains("-1121"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
