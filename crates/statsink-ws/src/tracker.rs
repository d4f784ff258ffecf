//! 열린 연결 추적기.
//!
//! 서버 인스턴스별 원자 카운터. 핸들러가 `register()`로 가드를 받고
//! 가드가 drop되면 카운트가 줄어든다. 종료 조정자는 0이 될 때까지 기다린다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct TrackerInner {
    open: AtomicUsize,
    idle: Notify,
}

/// 열린 연결 추적기 (복제 시 같은 카운터 공유)
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

/// 연결 등록 가드 — drop 시 등록 해제
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 연결 등록
    pub fn register(&self) -> ConnectionGuard {
        self.inner.open.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// 현재 열린 연결 수
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::Acquire)
    }

    /// 열린 연결이 0이 될 때까지 대기
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // 카운트 확인 전에 등록해야 확인 직후의 알림을 놓치지 않는다
            notified.as_mut().enable();
            if self.open_connections() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// 기한까지 대기. 0에 도달하면 true, 기한 초과면 false.
    pub async fn wait_idle_until(&self, deadline: Instant) -> bool {
        tokio::time::timeout_at(deadline, self.wait_idle())
            .await
            .is_ok()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.open.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn register_and_drop() {
        let tracker = ConnectionTracker::new();
        let a = tracker.register();
        let b = tracker.clone().register();
        assert_eq!(tracker.open_connections(), 2);

        drop(a);
        assert_eq!(tracker.open_connections(), 1);
        drop(b);
        assert_eq!(tracker.open_connections(), 0);
    }

    #[tokio::test]
    async fn idle_tracker_returns_immediately() {
        let tracker = ConnectionTracker::new();
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(tracker.wait_idle_until(deadline).await);
    }

    #[tokio::test]
    async fn wakes_when_last_guard_dropped() {
        let tracker = ConnectionTracker::new();
        let guards: Vec<_> = (0..3).map(|_| tracker.register()).collect();

        let waiter = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                tracker
                    .wait_idle_until(Instant::now() + Duration::from_secs(5))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guards);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_while_connection_open() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.register();

        let started = Instant::now();
        let idle = tracker
            .wait_idle_until(started + Duration::from_millis(250))
            .await;

        assert!(!idle);
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(tracker.open_connections(), 1);
    }
}
