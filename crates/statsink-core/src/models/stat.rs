//! 부하 지표 모델.
//!
//! 원격 인스턴스가 보고하는 부하 샘플. JSON 표현은 기존 클라이언트와의
//! 호환을 위해 `Key`/`Stat` 대문자 키로 쓰고, 읽을 때는 소문자 키도 받는다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 스케일 대상 워크로드 식별자 (namespace/name)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionKey {
    /// 네임스페이스
    #[serde(rename = "Namespace", alias = "namespace")]
    pub namespace: String,
    /// 리비전 이름
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
}

impl RevisionKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RevisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// 단일 인스턴스의 보고 구간 부하 지표
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stat {
    /// 보고 인스턴스 (파드) 이름
    pub pod_name: String,
    /// 평균 동시 요청 수
    pub average_concurrent_requests: f64,
    /// 프록시 경유 평균 동시 요청 수
    pub average_proxied_concurrent_requests: f64,
    /// 보고 구간 요청 수
    pub request_count: f64,
    /// 보고 구간 프록시 경유 요청 수
    pub proxied_request_count: f64,
    /// 프로세스 가동 시간 (초)
    pub process_uptime: f64,
    /// 측정 시각 (Unix epoch 밀리초)
    pub timestamp: i64,
}

impl Stat {
    /// 측정 시각을 `DateTime`으로 변환 (범위 밖이면 None)
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// 디코딩된 정규 샘플 — 출력 채널로 전달되는 단위
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatMessage {
    #[serde(rename = "Key", alias = "key")]
    pub key: RevisionKey,
    #[serde(rename = "Stat", alias = "stat")]
    pub stat: Stat,
}
