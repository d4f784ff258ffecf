//! WebSocket 업그레이드.
//!
//! 핸드셰이크 검증과 `101 Switching Protocols` 응답은 tungstenite가 만든다.
//! 여기서는 axum 요청을 넘기고 hyper의 업그레이드 핸들을 꺼내 서버 역할 스트림으로 감싼다.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::server::create_response;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::WebSocketStream;

/// 업그레이드된 서버 측 WebSocket 스트림
pub type ServerStream = WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>;

/// 업그레이드 거부 사유
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// 핸드셰이크 헤더 검증 실패
    #[error("핸드셰이크 거부: {0}")]
    Handshake(#[from] WsError),

    #[error("업그레이드할 수 없는 연결")]
    ConnectionNotUpgradable,
}

impl UpgradeError {
    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeError::Handshake(WsError::Protocol(ProtocolError::WrongHttpMethod)) => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            UpgradeError::Handshake(_) => StatusCode::BAD_REQUEST,
            UpgradeError::ConnectionNotUpgradable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UpgradeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, self.to_string()).into_response();
        if matches!(
            self,
            UpgradeError::Handshake(WsError::Protocol(
                ProtocolError::MissingSecWebSocketVersionHeader
            ))
        ) {
            response.headers_mut().insert(
                header::SEC_WEBSOCKET_VERSION,
                HeaderValue::from_static("13"),
            );
        }
        response
    }
}

/// 승인된 업그레이드. 응답을 돌려준 뒤 `into_stream`으로 소켓을 얻는다.
pub struct PendingUpgrade {
    on_upgrade: OnUpgrade,
}

impl PendingUpgrade {
    /// 업그레이드 완료 대기 후 서버 역할 WebSocket 스트림 생성
    pub async fn into_stream(self) -> Result<ServerStream, hyper::Error> {
        let upgraded = self.on_upgrade.await?;
        Ok(WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await)
    }
}

/// 요청 헤더로 101 응답 생성 (본문 없음)
fn handshake_response(req: &Request) -> Result<Response, UpgradeError> {
    let mut head = axum::http::Request::new(());
    *head.method_mut() = req.method().clone();
    *head.uri_mut() = req.uri().clone();
    *head.version_mut() = req.version();
    *head.headers_mut() = req.headers().clone();

    let (parts, ()) = create_response(&head)?.into_parts();
    Ok(Response::from_parts(parts, Body::empty()))
}

/// 요청을 업그레이드로 수락. 101 응답과 대기 핸들을 반환한다.
pub fn accept(req: &mut Request) -> Result<(Response, PendingUpgrade), UpgradeError> {
    let response = handshake_response(req)?;
    let on_upgrade = req
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or(UpgradeError::ConnectionNotUpgradable)?;

    Ok((response, PendingUpgrade { on_upgrade }))
}
