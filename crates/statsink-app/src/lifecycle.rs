//! 프로세스 라이프사이클.
//!
//! 종료 시그널을 받아 서버 드레인을 시작하고, 드레인이 끝나면
//! 소비자 등 후속 태스크에 정지를 알린다.

use std::fmt;
use tokio::sync::watch;
use tracing::info;

/// 수신한 종료 시그널
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Interrupt => f.write_str("SIGINT"),
            StopSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// 라이프사이클 관리자. 정지 신호는 false → true 한 번만 바뀐다.
pub struct LifecycleManager {
    stop_tx: watch::Sender<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            stop_tx: watch::channel(false).0,
        }
    }

    /// 정지 신호 수신기
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// 후속 태스크에 정지 알림. 처음 호출이면 true.
    pub fn shutdown(&self) -> bool {
        let first = !self.stop_tx.send_replace(true);
        if first {
            info!("후속 태스크 정지 신호 발송");
        }
        first
    }

    /// SIGINT/SIGTERM 대기 (non-unix는 Ctrl+C)
    pub async fn wait_for_signal(&self) -> std::io::Result<StopSignal> {
        #[cfg(unix)]
        let received = {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            tokio::select! {
                _ = sigint.recv() => StopSignal::Interrupt,
                _ = sigterm.recv() => StopSignal::Terminate,
            }
        };

        #[cfg(not(unix))]
        let received = {
            tokio::signal::ctrl_c().await?;
            StopSignal::Interrupt
        };

        info!("{received} 수신, 서버 드레인 시작");
        Ok(received)
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
