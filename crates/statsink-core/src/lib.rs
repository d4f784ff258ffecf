//! # statsink-core
//!
//! statsink 도메인 모델, 에러 타입, 설정.
//! 수신 서버와 바이너리가 공유하는 핵심 타입을 제공한다.
//!
//! ## 구조
//!
//! - [`models`] — 도메인 데이터 구조체 (serde Serialize/Deserialize)
//! - [`error`] — 핵심 에러 타입 (thiserror)
//! - [`config`] — 서버 설정 구조체 및 JSON 파일 로드

pub mod config;
pub mod error;
pub mod models;
