//! 프레임 코덱.
//!
//! 안전한 프로토콜 전환을 위해 두 가지 와이어 포맷을 받는다:
//! - 바이너리 프레임: protobuf `WireStatMessages` 배치
//! - 텍스트 프레임: JSON `StatMessage` 단건
//!
//! 순수 함수이며 I/O가 없다.

use prost::Message;
use statsink_core::models::stat::StatMessage;

use crate::error::CodecError;
use crate::proto::WireStatMessages;

/// 수신 프레임 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// protobuf 배치
    Binary,
    /// JSON 단건
    Text,
    /// 그 외 (이름만 보존)
    Other(&'static str),
}

/// 프레임 하나를 0개 이상의 샘플로 디코딩
pub fn decode(kind: FrameKind, payload: &[u8]) -> Result<Vec<StatMessage>, CodecError> {
    match kind {
        FrameKind::Binary => decode_batch(payload),
        FrameKind::Text => decode_single(payload).map(|message| vec![message]),
        FrameKind::Other(name) => Err(CodecError::UnsupportedFrame(name)),
    }
}

/// 바이너리 배치 디코딩. 페이로드 없는 레코드는 건너뛴다.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<StatMessage>, CodecError> {
    let batch = WireStatMessages::decode(payload)?;
    Ok(batch
        .messages
        .into_iter()
        .filter_map(|record| record.into_stat_message())
        .collect())
}

/// JSON 단건 디코딩. 첫 번째 문서만 읽고 뒤따르는 데이터는 무시한다.
pub fn decode_single(payload: &[u8]) -> Result<StatMessage, CodecError> {
    let mut documents = serde_json::Deserializer::from_slice(payload).into_iter::<StatMessage>();
    match documents.next() {
        Some(result) => Ok(result?),
        None => Err(CodecError::EmptyDocument),
    }
}
