//! 연결 핸들러.
//!
//! 업그레이드된 연결 하나를 소유한다. 수신 루프에서 프레임을 디코딩해
//! 출력 채널로 보내고, 서버 종료 신호가 오면 재연결 요청 close 프레임을 보낸다.
//!
//! 출력 채널 전송은 blocking이다. 소비자가 느리면 수신 루프도 멈춘다 (backpressure).

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use statsink_core::models::stat::StatMessage;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error};

use crate::codec::{self, FrameKind};
use crate::tracker::ConnectionGuard;

/// 서비스 재시작 close 코드 — 클라이언트는 즉시 재연결한다
/// (<https://www.iana.org/assignments/websocket/websocket.xhtml>)
pub const CLOSE_CODE_SERVICE_RESTART: u16 = 1012;

/// close 프레임 사유 문자열
const CLOSE_REASON_RESTARTING: &str = "Restarting";

/// 핸들러가 서버에서 넘겨받는 공유 자원
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// 출력 채널 송신단
    pub stats_tx: mpsc::Sender<StatMessage>,
    /// 서버 종료 신호 (true = 종료)
    pub stop_rx: watch::Receiver<bool>,
}

/// 수신 루프 진행 여부
enum Flow {
    Continue,
    ConsumerGone,
}

/// 연결 하나를 끝까지 처리하고 자원을 정리한다.
///
/// 종료 감시 태스크를 조인한 뒤 `guard`를 drop해 등록을 해제한다.
pub async fn serve_connection<S>(
    ws: WebSocketStream<S>,
    ctx: ConnectionContext,
    guard: ConnectionGuard,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut stream) = ws.split();
    let (ended_tx, ended_rx) = oneshot::channel::<()>();
    let (force_close_tx, mut force_close_rx) = oneshot::channel::<()>();

    let watcher = tokio::spawn(watch_shutdown(sink, ctx.stop_rx, ended_rx, force_close_tx));

    debug!("WebSocket 연결 업그레이드 완료, 수신 루프 진입");

    loop {
        // 읽기 대기만 종료 신호와 경쟁한다. 이미 받은 프레임의 전달은 끝까지 진행.
        let next = tokio::select! {
            biased;
            _ = &mut force_close_rx => {
                debug!("종료 신호로 연결 닫힘");
                break;
            }
            next = stream.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                if is_abnormal_closure(&err) {
                    debug!("핸들러 연결 끊김: {err}");
                } else {
                    error!("핸들러 에러로 종료: {err}");
                }
                break;
            }
            None => {
                debug!("클라이언트가 연결 종료");
                break;
            }
        };

        if let Flow::ConsumerGone = forward_frame(&message, &ctx.stats_tx).await {
            debug!("출력 채널 닫힘, 수신 루프 종료");
            break;
        }
    }

    let _ = ended_tx.send(());
    if let Err(e) = watcher.await {
        error!("종료 감시 태스크 실패: {e}");
    }
    drop(guard);
}

/// 프레임 하나를 디코딩해 샘플을 순서대로 전달
async fn forward_frame(message: &Message, stats_tx: &mpsc::Sender<StatMessage>) -> Flow {
    let decoded = match message {
        Message::Binary(data) => codec::decode(FrameKind::Binary, data),
        Message::Text(text) => codec::decode(FrameKind::Text, text.as_bytes()),
        Message::Frame(frame) => codec::decode(FrameKind::Other("raw"), frame.payload()),
        // 제어 프레임은 WebSocket 계층이 처리
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => return Flow::Continue,
    };

    let samples = match decoded {
        Ok(samples) => samples,
        Err(err) if err.is_decode_error() => {
            error!("프레임 디코딩 실패: {err}");
            return Flow::Continue;
        }
        Err(err) => {
            error!("알 수 없는 메시지 타입 폐기: {err}");
            return Flow::Continue;
        }
    };

    for sample in samples {
        debug!(key = %sample.key, pod = %sample.stat.pod_name, "지표 메시지 수신");
        if stats_tx.send(sample).await.is_err() {
            return Flow::ConsumerGone;
        }
    }
    Flow::Continue
}

/// 종료 신호와 연결 종료 중 먼저 온 쪽을 처리
async fn watch_shutdown<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut stop_rx: watch::Receiver<bool>,
    ended_rx: oneshot::Receiver<()>,
    force_close_tx: oneshot::Sender<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        true = stop_requested(&mut stop_rx) => {
            debug!("클라이언트에 종료 메시지 전송");
            let frame = CloseFrame {
                code: CloseCode::from(CLOSE_CODE_SERVICE_RESTART),
                reason: CLOSE_REASON_RESTARTING.into(),
            };
            if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                error!("클라이언트 종료 메시지 전송 실패: {e}");
            }
            let _ = force_close_tx.send(());
        }
        _ = ended_rx => {
            debug!("핸들러 종료 완료");
        }
    }
}

/// 종료 신호 대기. 서버가 사라지면 false.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) -> bool {
    let stopped = stop_rx.wait_for(|stopped| *stopped).await.is_ok();
    stopped
}

/// 클로징 핸드셰이크 없는 단절 (비정상 종료) 여부
fn is_abnormal_closure(err: &WsError) -> bool {
    match err {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{WireStat, WireStatMessage, WireStatMessages};
    use crate::tracker::ConnectionTracker;
    use prost::Message as _;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::protocol::Role;

    struct Harness {
        client: WebSocketStream<DuplexStream>,
        stats_rx: mpsc::Receiver<StatMessage>,
        stop_tx: watch::Sender<bool>,
        tracker: ConnectionTracker,
        handler: JoinHandle<()>,
    }

    async fn start(capacity: usize) -> Harness {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let (stats_tx, stats_rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let tracker = ConnectionTracker::new();
        let ctx = ConnectionContext { stats_tx, stop_rx };
        let handler = tokio::spawn(serve_connection(server, ctx, tracker.register()));

        Harness {
            client,
            stats_rx,
            stop_tx,
            tracker,
            handler,
        }
    }

    fn batch(pods: &[Option<&str>]) -> Vec<u8> {
        let messages = pods
            .iter()
            .map(|pod| WireStatMessage {
                namespace: "ns".to_string(),
                name: "rev".to_string(),
                stat: pod.map(|p| WireStat {
                    pod_name: p.to_string(),
                    request_count: 1.0,
                    ..WireStat::default()
                }),
            })
            .collect();
        WireStatMessages { messages }.encode_to_vec()
    }

    async fn recv_pod(rx: &mut mpsc::Receiver<StatMessage>) -> String {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("샘플 수신 타임아웃")
            .expect("채널 닫힘")
            .stat
            .pod_name
    }

    async fn join(handler: JoinHandle<()>) {
        tokio::time::timeout(Duration::from_secs(5), handler)
            .await
            .expect("핸들러 종료 타임아웃")
            .unwrap();
    }

    #[tokio::test]
    async fn forwards_batch_and_skips_empty_records() {
        let mut h = start(16).await;

        h.client
            .send(Message::Binary(batch(&[Some("p1"), None, Some("p2")]).into()))
            .await
            .unwrap();

        assert_eq!(recv_pod(&mut h.stats_rx).await, "p1");
        assert_eq!(recv_pod(&mut h.stats_rx).await, "p2");

        h.client.close(None).await.unwrap();
        join(h.handler).await;
        assert_eq!(h.tracker.open_connections(), 0);
        assert!(h.stats_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_text_keeps_connection_open() {
        let mut h = start(16).await;

        h.client
            .send(Message::Text(r#"{"Key": nope"#.into()))
            .await
            .unwrap();
        h.client.send(Message::Ping(Vec::new().into())).await.unwrap();
        h.client
            .send(Message::Text(r#"{"Stat":{"pod_name":"json-pod"}}"#.into()))
            .await
            .unwrap();
        h.client
            .send(Message::Binary(batch(&[Some("bin-pod")]).into()))
            .await
            .unwrap();

        assert_eq!(recv_pod(&mut h.stats_rx).await, "json-pod");
        assert_eq!(recv_pod(&mut h.stats_rx).await, "bin-pod");
        assert!(!h.handler.is_finished());

        h.client.close(None).await.unwrap();
        join(h.handler).await;
    }

    #[tokio::test]
    async fn stop_signal_sends_restart_close_frame() {
        let mut h = start(16).await;

        h.stop_tx.send_replace(true);

        let frame = match h.client.next().await {
            Some(Ok(Message::Close(Some(frame)))) => frame,
            other => panic!("close 프레임 기대, 실제: {other:?}"),
        };
        assert_eq!(u16::from(frame.code), CLOSE_CODE_SERVICE_RESTART);
        assert_eq!(frame.reason.as_str(), "Restarting");

        join(h.handler).await;
        assert_eq!(h.tracker.open_connections(), 0);
    }

    #[tokio::test]
    async fn peer_vanishing_ends_handler() {
        let h = start(16).await;

        drop(h.client);

        join(h.handler).await;
        assert_eq!(h.tracker.open_connections(), 0);
    }

    #[tokio::test]
    async fn consumer_gone_ends_handler() {
        let mut h = start(16).await;
        drop(h.stats_rx);

        h.client
            .send(Message::Binary(batch(&[Some("p1")]).into()))
            .await
            .unwrap();

        join(h.handler).await;
        assert_eq!(h.tracker.open_connections(), 0);
    }

    #[tokio::test]
    async fn accepted_samples_survive_shutdown_under_backpressure() {
        let mut h = start(1).await;

        h.client
            .send(Message::Binary(
                batch(&[Some("p1"), Some("p2"), Some("p3")]).into(),
            ))
            .await
            .unwrap();

        // 채널 용량 1 — 핸들러는 두 번째 전송에서 대기 중
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.stop_tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.handler.is_finished());
        assert_eq!(h.tracker.open_connections(), 1);

        assert_eq!(recv_pod(&mut h.stats_rx).await, "p1");
        assert_eq!(recv_pod(&mut h.stats_rx).await, "p2");
        assert_eq!(recv_pod(&mut h.stats_rx).await, "p3");

        join(h.handler).await;
        assert_eq!(h.tracker.open_connections(), 0);
    }

    #[test]
    fn abnormal_closure_classification() {
        assert!(is_abnormal_closure(&WsError::Protocol(
            ProtocolError::ResetWithoutClosingHandshake
        )));
        assert!(is_abnormal_closure(&WsError::Io(io::Error::from(
            io::ErrorKind::ConnectionReset
        ))));
        assert!(!is_abnormal_closure(&WsError::Protocol(
            ProtocolError::UnmaskedFrameFromClient
        )));
        assert!(!is_abnormal_closure(&WsError::Io(io::Error::from(
            io::ErrorKind::PermissionDenied
        ))));
    }
}
