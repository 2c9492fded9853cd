//! 플러그인 이름별 직렬화 락

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 이름별 비동기 락
///
/// 같은 이름에 대한 install/update/uninstall/toggle은 순서대로 실행되고,
/// 다른 이름끼리는 동시에 진행된다. 마지막 보유자가 놓으면 항목도 사라진다.
#[derive(Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름 락 획득
    pub async fn acquire(&self, name: &str) -> NameGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        NameGuard {
            owner: self,
            name: name.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// 아무도 잡고 있지 않은 락 정리
    pub fn prune(&self) {
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// 추적 중인 이름 수
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 잡고 있는 이름 락
///
/// drop 시 기다리는 쪽이 없으면 맵에서 이름을 지운다.
pub struct NameGuard<'a> {
    owner: &'a NameLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        // 대기자는 맵 락 아래에서 Arc를 복제하므로 여기서의 카운트는 정확하다
        let mut locks = self.owner.locks.lock();
        let idle = locks
            .get(&self.name)
            .map(|lock| Arc::ptr_eq(lock, OwnedMutexGuard::mutex(&guard)) && Arc::strong_count(lock) == 2)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.name);
        }
        drop(locks);
        drop(guard);
    }
}
