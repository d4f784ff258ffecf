//! 애플리케이션 설정 구조체.
//!
//! 수신 서버 바인드 주소, keep-alive 주기, 종료 타임아웃, 출력 채널 용량을 정의한다.
//! JSON 파일에서 로드하며 누락된 필드는 기본값으로 채운다.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 지표 수신 서버 설정
    #[serde(default)]
    pub server: StatServerConfig,
}

impl AppConfig {
    /// JSON 설정 파일 로드
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;

        debug!("설정 로드 완료: {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        self.server.validate()
    }
}

// ============================================================
// 수신 서버 설정
// ============================================================

/// 지표 수신 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatServerConfig {
    /// 바인드 주소 (기본: 0.0.0.0:8080)
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP keep-alive 프로브 주기 (초, 기본: 180)
    #[serde(default = "default_keepalive_period_secs")]
    pub keepalive_period_secs: u64,
    /// 종료 시 연결 드레인 대기 시간 (초, 기본: 5)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// 출력 채널 용량 (기본: 1000)
    #[serde(default = "default_stats_channel_capacity")]
    pub stats_channel_capacity: usize,
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_keepalive_period_secs() -> u64 {
    180
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_stats_channel_capacity() -> usize {
    1_000
}

impl Default for StatServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            keepalive_period_secs: default_keepalive_period_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            stats_channel_capacity: default_stats_channel_capacity(),
        }
    }
}

impl StatServerConfig {
    /// 지정 주소용 기본 설정
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// TCP keep-alive 주기
    pub fn keepalive_period(&self) -> Duration {
        Duration::from_secs(self.keepalive_period_secs)
    }

    /// 종료 타임아웃
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.address.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "server.address".to_string(),
                message: "바인드 주소가 비어 있음".to_string(),
            });
        }
        if self.keepalive_period_secs == 0 {
            return Err(CoreError::Validation {
                field: "server.keepalive_period_secs".to_string(),
                message: "0보다 커야 함".to_string(),
            });
        }
        if self.stats_channel_capacity == 0 {
            return Err(CoreError::Validation {
                field: "server.stats_channel_capacity".to_string(),
                message: "0보다 커야 함".to_string(),
            });
        }
        Ok(())
    }
}
