//! 수신 서버 에러 타입.

use statsink_core::error::CoreError;
use thiserror::Error;

/// 프레임 단위 코덱 에러. 연결을 종료시키지 않는다.
#[derive(Debug, Error)]
pub enum CodecError {
    /// 바이너리 배치 디코딩 실패
    #[error("protobuf 디코딩 실패: {0}")]
    Protobuf(#[from] prost::DecodeError),

    /// 텍스트 문서 디코딩 실패
    #[error("JSON 디코딩 실패: {0}")]
    Json(#[from] serde_json::Error),

    /// 텍스트 프레임에 문서가 없음
    #[error("빈 텍스트 프레임")]
    EmptyDocument,

    /// 바이너리/텍스트 외 프레임
    #[error("지원하지 않는 프레임 종류: {0}")]
    UnsupportedFrame(&'static str),
}

impl CodecError {
    /// 페이로드 디코딩 실패 여부 (미지원 프레임은 false)
    pub fn is_decode_error(&self) -> bool {
        !matches!(self, CodecError::UnsupportedFrame(_))
    }
}

/// 서버 범위 에러. `listen_and_serve` 호출자에게 전파된다.
#[derive(Debug, Error)]
pub enum ServerError {
    /// 주소 바인드 실패
    #[error("바인드 실패 {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// 리스너 실행 중 예기치 않은 실패
    #[error("리스너 실패: {0}")]
    Serve(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
