//! Protobuf 와이어 메시지.
//!
//! 바이너리 프레임은 `WireStatMessages` 배치로 인코딩된다.
//! `stat`이 비어 있는 레코드는 향후 스키마 확장을 위한 예약 슬롯이다.

use statsink_core::models::stat::{RevisionKey, Stat, StatMessage};

/// 단일 인스턴스 부하 지표
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireStat {
    #[prost(string, tag = "1")]
    pub pod_name: ::prost::alloc::string::String,
    #[prost(double, tag = "2")]
    pub average_concurrent_requests: f64,
    #[prost(double, tag = "3")]
    pub average_proxied_concurrent_requests: f64,
    #[prost(double, tag = "4")]
    pub request_count: f64,
    #[prost(double, tag = "5")]
    pub proxied_request_count: f64,
    #[prost(double, tag = "6")]
    pub process_uptime: f64,
    #[prost(int64, tag = "7")]
    pub timestamp: i64,
}

/// 배치 내 레코드 하나
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireStatMessage {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub stat: ::core::option::Option<WireStat>,
}

/// 바이너리 배치 엔벨로프
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireStatMessages {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<WireStatMessage>,
}

impl WireStatMessage {
    /// 정규 샘플로 변환. 페이로드가 없는 레코드는 None.
    pub fn into_stat_message(self) -> Option<StatMessage> {
        let stat = self.stat?;
        Some(StatMessage {
            key: RevisionKey {
                namespace: self.namespace,
                name: self.name,
            },
            stat: Stat {
                pod_name: stat.pod_name,
                average_concurrent_requests: stat.average_concurrent_requests,
                average_proxied_concurrent_requests: stat.average_proxied_concurrent_requests,
                request_count: stat.request_count,
                proxied_request_count: stat.proxied_request_count,
                process_uptime: stat.process_uptime,
                timestamp: stat.timestamp,
            },
        })
    }
}

impl From<&StatMessage> for WireStatMessage {
    fn from(message: &StatMessage) -> Self {
        let stat = &message.stat;
        Self {
            namespace: message.key.namespace.clone(),
            name: message.key.name.clone(),
            stat: Some(WireStat {
                pod_name: stat.pod_name.clone(),
                average_concurrent_requests: stat.average_concurrent_requests,
                average_proxied_concurrent_requests: stat.average_proxied_concurrent_requests,
                request_count: stat.request_count,
                proxied_request_count: stat.proxied_request_count,
                process_uptime: stat.process_uptime,
                timestamp: stat.timestamp,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_converts_to_none() {
        let record = WireStatMessage {
            namespace: "ns".to_string(),
            name: "rev".to_string(),
            stat: None,
        };
        assert!(record.into_stat_message().is_none());
    }

    #[test]
    fn record_keeps_key_and_values() {
        let message = StatMessage {
            key: RevisionKey::new("ns", "rev"),
            stat: Stat {
                pod_name: "pod-a".to_string(),
                average_proxied_concurrent_requests: 0.25,
                process_uptime: 12.5,
                timestamp: 1_000,
                ..Stat::default()
            },
        };
        let converted = WireStatMessage::from(&message).into_stat_message().unwrap();
        assert_eq!(converted, message);
    }
}
