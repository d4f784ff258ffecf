//! # statsink
//!
//! 부하 지표 수신 서버 바이너리 진입점.
//! 설정 로드, 로깅 초기화, 서버와 소비자 태스크 기동, 시그널 기반 종료.

mod consumer;
mod lifecycle;

use anyhow::{Context, Result};
use clap::Parser;
use statsink_core::config::AppConfig;
use statsink_ws::{ShutdownOutcome, StatServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;

/// 소비자가 남은 샘플을 비우는 최대 대기 시간
const CONSUMER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket 부하 지표 수신 서버
#[derive(Parser, Debug)]
#[command(name = "statsink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (JSON, 기본: 내장 기본값)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 바인드 주소 (예: 0.0.0.0:8080)
    #[arg(long, short = 'a')]
    address: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 종료 대기 시간 (초)
    #[arg(long)]
    shutdown_timeout: Option<u64>,
}

/// 설정 파일 로드 후 CLI 인자로 덮어쓰기
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("설정 파일 로드 실패: {}", path.display()))?,
        None => AppConfig::default(),
    };

    if let Some(address) = &args.address {
        config.server.address = address.clone();
    }
    if let Some(secs) = args.shutdown_timeout {
        config.server.shutdown_timeout_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "statsink={0},statsink_app={0},statsink_core={0},statsink_ws={0}",
        args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let config = load_config(&args)?;
    info!(
        address = %config.server.address,
        keepalive_secs = config.server.keepalive_period_secs,
        capacity = config.server.stats_channel_capacity,
        "statsink 시작"
    );

    let lifecycle = LifecycleManager::new();

    let (stats_tx, stats_rx) = mpsc::channel(config.server.stats_channel_capacity);
    let consumer = tokio::spawn(consumer::run(stats_rx, lifecycle.subscribe()));

    let server = Arc::new(StatServer::new(config.server.clone(), stats_tx));
    let mut serve_task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.listen_and_serve().await }
    });

    tokio::select! {
        result = &mut serve_task => {
            // 종료 요청 전에 서버가 끝나는 경우는 바인드/수락 실패뿐
            result??;
            warn!("종료 요청 없이 서버가 끝남");
            return Ok(());
        }
        signal = lifecycle.wait_for_signal() => {
            let signal = signal.context("시그널 핸들러 등록 실패")?;
            info!(%signal, "종료 시작");
        }
    }

    match server.shutdown(config.server.shutdown_timeout()).await {
        ShutdownOutcome::Completed => info!("모든 연결 종료"),
        ShutdownOutcome::TimedOut => warn!(
            open_connections = server.open_connections(),
            "일부 연결이 종료 기한 내에 닫히지 않음"
        ),
    }
    serve_task.await??;
    drop(server);

    // 서버 드레인 이후에 소비자를 멈춘다
    let _ = lifecycle.shutdown();
    match tokio::time::timeout(CONSUMER_DRAIN_TIMEOUT, consumer).await {
        Ok(summary) => {
            let summary = summary?;
            info!(
                samples = summary.samples,
                revisions = summary.revisions,
                "statsink 종료"
            );
        }
        Err(_) => warn!("소비자 종료 타임아웃"),
    }

    Ok(())
}
