//! 데모 소비자.
//!
//! 출력 채널에서 샘플을 읽어 로그로 남긴다. 집계나 스케일 결정은 하지 않는다.

use statsink_core::models::stat::{RevisionKey, StatMessage};
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// 소비 결과 요약
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    /// 받은 샘플 수
    pub samples: u64,
    /// 보고한 리비전 수
    pub revisions: usize,
}

#[derive(Default)]
struct Tally {
    samples: u64,
    revisions: HashSet<RevisionKey>,
}

impl Tally {
    fn record(&mut self, sample: StatMessage) {
        debug!(
            key = %sample.key,
            pod = %sample.stat.pod_name,
            concurrency = sample.stat.average_concurrent_requests,
            requests = sample.stat.request_count,
            observed_at = ?sample.stat.observed_at(),
            "샘플 수신"
        );
        self.samples += 1;
        self.revisions.insert(sample.key);
    }

    fn summary(&self) -> ConsumerSummary {
        ConsumerSummary {
            samples: self.samples,
            revisions: self.revisions.len(),
        }
    }
}

/// 채널이 닫히거나 종료 신호가 올 때까지 소비. 종료 시 버퍼에 남은 샘플까지 읽는다.
pub async fn run(
    mut stats_rx: mpsc::Receiver<StatMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ConsumerSummary {
    let mut tally = Tally::default();

    loop {
        tokio::select! {
            biased;
            sample = stats_rx.recv() => match sample {
                Some(sample) => tally.record(sample),
                None => break,
            },
            true = shutdown_requested(&mut shutdown_rx) => {
                while let Ok(sample) = stats_rx.try_recv() {
                    tally.record(sample);
                }
                break;
            }
        }
    }

    debug!("소비자 종료");
    tally.summary()
}

async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    let requested = shutdown_rx.wait_for(|requested| *requested).await.is_ok();
    requested
}
