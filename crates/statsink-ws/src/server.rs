//! 지표 수신 서버.
//!
//! WebSocket으로 부하 지표를 받아 출력 채널로 보낸다. `shutdown`이 호출될 때까지
//! 동작하며, 종료 시 열린 연결에 재연결 요청을 보내고 드레인을 기다린다.
//!
//! 상태 전이: Serving → Draining (종료 신호) → Stopped (모든 핸들러 종료 또는 타임아웃)

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::serve::{Listener, ListenerExt};
use axum::Router;
use socket2::{SockRef, TcpKeepalive};
use statsink_core::config::StatServerConfig;
use statsink_core::models::stat::StatMessage;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::error::ServerError;
use crate::handler::{self, ConnectionContext};
use crate::probe;
use crate::tracker::ConnectionTracker;
use crate::upgrade;

/// 종료 결과 — 어느 쪽이든 호출자에게 에러로 전파하지 않는다
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// 모든 연결이 기한 내 종료
    Completed,
    /// 기한 초과 (일부 연결이 남음)
    TimedOut,
}

/// 요청 핸들러 공유 상태
#[derive(Clone)]
struct AcceptState {
    connection: ConnectionContext,
    tracker: ConnectionTracker,
    span: Span,
}

/// WebSocket 부하 지표 수신 서버
pub struct StatServer {
    config: StatServerConfig,
    /// 서빙 시작 신호 — 바인드된 주소, 한 번만 설정
    serving_tx: watch::Sender<Option<SocketAddr>>,
    /// 종료 신호 — false → true 단방향
    stop_tx: watch::Sender<bool>,
    /// 리스너 종료 완료 신호
    listener_closed_tx: watch::Sender<bool>,
    stats_tx: mpsc::Sender<StatMessage>,
    tracker: ConnectionTracker,
    span: Span,
}

impl StatServer {
    /// 새 서버 생성. `shutdown` 호출 전까지 수신 지표를 `stats_tx`로 보낸다.
    pub fn new(config: StatServerConfig, stats_tx: mpsc::Sender<StatMessage>) -> Self {
        let span = info_span!("stats-websocket-server", address = %config.address);
        Self {
            config,
            serving_tx: watch::channel(None).0,
            stop_tx: watch::channel(false).0,
            listener_closed_tx: watch::channel(false).0,
            stats_tx,
            tracker: ConnectionTracker::new(),
            span,
        }
    }

    /// 설정된 바인드 주소
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// 바인드된 주소 (서빙 전이면 None)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.serving_tx.borrow()
    }

    /// 현재 열린 연결 수
    pub fn open_connections(&self) -> usize {
        self.tracker.open_connections()
    }

    /// 종료 신호 전송 여부
    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// 서빙 시작까지 대기 후 바인드된 주소 반환
    pub async fn wait_serving(&self) -> SocketAddr {
        let mut serving_rx = self.serving_tx.subscribe();
        loop {
            if let Some(addr) = *serving_rx.borrow_and_update() {
                return addr;
            }
            // 송신단은 self가 소유하므로 닫히지 않는다
            let _ = serving_rx.changed().await;
        }
    }

    /// 설정된 주소에서 연결을 받는다.
    ///
    /// 서버가 실패하거나 `shutdown`이 호출될 때까지 블록된다.
    /// `shutdown`으로 끝나면 `Ok(())`, 그 외에는 에러를 반환한다.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        async {
            let listener = self.listen().await?;
            self.serve(listener).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn listen(&self) -> Result<TcpListener, ServerError> {
        info!("시작");
        self.config.validate()?;
        TcpListener::bind(&self.config.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.config.address.clone(),
                source,
            })
    }

    async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let listener = with_keepalive(listener, self.config.keepalive_period());

        let mut stop_rx = self.stop_tx.subscribe();
        self.serving_tx.send_replace(Some(local_addr));
        info!(%local_addr, "지표 수신 대기");

        // 종료 신호가 오면 accept 루프를 버려 리스너를 닫는다.
        // 이미 생성된 연결 태스크는 계속 실행되며 드레인은 추적기가 맡는다.
        let result = tokio::select! {
            result = axum::serve(listener, self.router()).into_future() => result,
            _ = async move {
                let _ = stop_rx.wait_for(|stopped| *stopped).await;
            } => Ok(()),
        };

        self.listener_closed_tx.send_replace(true);
        debug!("리스너 종료");
        result.map_err(ServerError::Serve)
    }

    /// 모든 경로를 하나의 핸들러로 라우팅
    fn router(&self) -> Router {
        let state = AcceptState {
            connection: ConnectionContext {
                stats_tx: self.stats_tx.clone(),
                stop_rx: self.stop_tx.subscribe(),
            },
            tracker: self.tracker.clone(),
            span: self.span.clone(),
        };

        Router::new()
            .fallback(handle_request)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// 주어진 시간 동안 graceful하게 종료한 뒤 반환한다.
    ///
    /// 서빙 시작 전에 호출되면 시작될 때까지 기다린다.
    /// 여러 번 호출해도 안전하며 종료 신호는 처음 한 번만 바뀐다.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownOutcome {
        self.drain(timeout).instrument(self.span.clone()).await
    }

    async fn drain(&self, timeout: Duration) -> ShutdownOutcome {
        self.wait_serving().await;
        info!("종료 시작");

        if self.stop_tx.send_replace(true) {
            debug!("이미 종료 신호가 전송됨");
        }
        let deadline = Instant::now() + timeout;

        let mut closed_rx = self.listener_closed_tx.subscribe();
        let listener_closed = tokio::time::timeout_at(deadline, async move {
            let _ = closed_rx.wait_for(|closed| *closed).await;
        })
        .await;
        if listener_closed.is_err() {
            warn!("리스너 종료 타임아웃");
        }

        // 남은 시간 안에 모든 클라이언트 연결이 닫히기를 기다린다
        if self.tracker.wait_idle_until(deadline).await {
            info!("종료 완료");
            ShutdownOutcome::Completed
        } else {
            warn!(
                open_connections = self.tracker.open_connections(),
                "종료 타임아웃"
            );
            ShutdownOutcome::TimedOut
        }
    }
}

/// 요청 하나 처리: 헬스 프로브 → 업그레이드 → 핸들러 생성
async fn handle_request(State(state): State<AcceptState>, mut req: Request) -> Response {
    debug!("요청 진입");
    if let Some(response) = probe::handle_healthz(req.headers()) {
        return response;
    }

    let (response, pending) = match upgrade::accept(&mut req) {
        Ok(accepted) => accepted,
        Err(err) => {
            error!("WebSocket 업그레이드 실패: {err}");
            return err.into_response();
        }
    };

    let guard = state.tracker.register();
    let connection = state.connection;
    tokio::spawn(
        async move {
            match pending.into_stream().await {
                Ok(ws) => handler::serve_connection(ws, connection, guard).await,
                Err(err) => error!("WebSocket 업그레이드 실패: {err}"),
            }
        }
        .instrument(state.span),
    );

    response
}

/// accept된 모든 소켓에 keep-alive를 적용하는 리스너
fn with_keepalive(
    listener: TcpListener,
    period: Duration,
) -> impl Listener<Io = TcpStream, Addr = SocketAddr> {
    listener.tap_io(move |tcp| set_keepalive(tcp, period))
}

/// 죽은 피어를 전송 계층에서 회수하도록 keep-alive 설정
fn set_keepalive(tcp: &mut TcpStream, period: Duration) {
    let keepalive = TcpKeepalive::new().with_time(period);
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    let keepalive = keepalive.with_interval(period);

    if let Err(e) = SockRef::from(&*tcp).set_tcp_keepalive(&keepalive) {
        warn!("TCP keep-alive 설정 실패: {e}");
    }
}
