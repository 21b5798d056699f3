//! 모의 거래소 서버 CLI.
//!
//! 선택한 거래소의 REST/WebSocket 형식으로 합성 캔들을 제공합니다.

use std::path::PathBuf;

use candles_core::logging::{init_logging, LogConfig};
use candles_mock::{MockExchangeServer, MockServerConfig, PluginRegistry, TradingPairSeed};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "candles-mock")]
#[command(about = "Mock exchange server for candle feed testing", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로 (toml, yaml, json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// 거래소 식별자 (예: binance_spot, okx_perpetual)
    #[arg(long)]
    exchange: Option<String>,

    /// 바인딩할 호스트
    #[arg(long)]
    host: Option<String>,

    /// 리스닝할 포트
    #[arg(long)]
    port: Option<u16>,

    /// 시작 시 등록할 거래쌍 (PAIR:INTERVAL:PRICE, 반복 가능)
    #[arg(long = "pair")]
    pairs: Vec<TradingPairSeed>,

    /// 사용 가능한 거래소 목록을 출력하고 종료
    #[arg(long)]
    list_exchanges: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.list_exchanges {
        for id in PluginRegistry::with_defaults().ids() {
            println!("{}", id);
        }
        return Ok(());
    }

    let mut config = MockServerConfig::load(cli.config.as_deref())?;
    if let Some(exchange) = cli.exchange {
        config.exchange = exchange;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.trading_pairs.extend(cli.pairs);

    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let mut server = MockExchangeServer::from_config(config)?;
    let addr = server.start().await?;
    info!(
        exchange = server.plugin().id(),
        rest = %server.url()?,
        ws = %server.ws_url()?,
        "Listening on {}",
        addr
    );

    shutdown_signal().await;

    server.stop().await?;
    info!("Mock exchange server shut down");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 반환합니다.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
