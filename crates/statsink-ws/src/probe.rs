//! 헬스 프로브 필터.
//!
//! kubelet 활성/준비 프로브는 업그레이드를 시도하지 않고 바로 200으로 응답한다.
//! 서버가 연결을 받고 있다는 사실 자체를 활성 근거로 본다.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

/// kubelet 프로브 User-Agent 접두사
pub const KUBE_PROBE_UA_PREFIX: &str = "kube-probe/";

/// kubelet 프로브 표식 헤더 (값이 비어 있으면 무시)
pub const KUBELET_PROBE_HEADER: &str = "k-kubelet-probe";

/// 프로브 요청 여부
pub fn is_kubelet_probe(headers: &HeaderMap) -> bool {
    let ua_matches = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.starts_with(KUBE_PROBE_UA_PREFIX));

    let header_matches = headers
        .get(KUBELET_PROBE_HEADER)
        .is_some_and(|v| !v.is_empty());

    ua_matches || header_matches
}

/// 프로브면 200 응답, 아니면 None (업그레이드로 진행)
pub fn handle_healthz(headers: &HeaderMap) -> Option<Response> {
    is_kubelet_probe(headers).then(|| StatusCode::OK.into_response())
}
