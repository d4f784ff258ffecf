//! # statsink-ws
//!
//! WebSocket 부하 지표 수신 서버.
//! 다수 클라이언트가 업그레이드된 연결로 푸시하는 인스턴스별 부하 지표를
//! 수신해 디코딩하고, 단일 출력 채널로 소비자에게 순서대로 전달한다.
//!
//! ## 구조
//!
//! - [`codec`] — 바이너리(protobuf 배치) / 텍스트(JSON 단건) 프레임 디코딩
//! - [`proto`] — protobuf 와이어 메시지 정의
//! - [`probe`] — 헬스 프로브 요청 판별 및 응답
//! - [`upgrade`] — WebSocket 업그레이드 핸드셰이크
//! - [`handler`] — 연결별 수신 루프와 종료 감시
//! - [`tracker`] — 열린 연결 수 추적
//! - [`server`] — 리스너 라이프사이클과 graceful shutdown
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use statsink_core::config::StatServerConfig;
//! use statsink_ws::StatServer;
//!
//! let (stats_tx, mut stats_rx) = tokio::sync::mpsc::channel(1000);
//! let server = Arc::new(StatServer::new(StatServerConfig::default(), stats_tx));
//! tokio::spawn({
//!     let server = server.clone();
//!     async move { server.listen_and_serve().await }
//! });
//! // ...
//! server.shutdown(Duration::from_secs(5)).await;
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod probe;
pub mod proto;
pub mod server;
pub mod tracker;
pub mod upgrade;

pub use error::{CodecError, ServerError};
pub use handler::CLOSE_CODE_SERVICE_RESTART;
pub use server::{ShutdownOutcome, StatServer};
