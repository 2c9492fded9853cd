//! Plugin Events - 구독 버스와 호스트 시그널
//!
//! - `SubscriptionBus`: 플러그인 이름별 콜백 목록 (생명주기 전이마다 호출)
//! - `HostSignal`: 모든 실행 컨텍스트로 브로드캐스트되는 시그널 (생명주기, reload)

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use plugkit_foundation::DEFAULT_CHANNEL_CAPACITY;

use super::entity::Plugin;

// ============================================================================
// LifecycleEvent / PluginEvent
// ============================================================================

/// 생명주기 전이 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Installed,
    Updated,
    Activated,
    Deactivated,
    Uninstalled,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::Updated => "updated",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Uninstalled => "uninstalled",
        };
        f.write_str(s)
    }
}

/// 플러그인 이벤트 - 전이 후의 엔티티를 담는다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    pub kind: LifecycleEvent,
    pub plugin: Plugin,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PluginEvent {
    pub fn new(kind: LifecycleEvent, plugin: Plugin) -> Self {
        Self {
            kind,
            plugin,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 실행 컨텍스트로 전달되는 시그널
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum HostSignal {
    /// 생명주기 전이
    Lifecycle(PluginEvent),

    /// 배치 작업 후 한 번 전송되는 reload 요청
    Reload { names: Vec<String> },
}

// ============================================================================
// SubscriptionBus
// ============================================================================

/// 구독 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// 구독 콜백
pub type Subscriber = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

/// 구독 버스
///
/// 같은 이름의 재설치/업데이트에도 구독은 유지되며, 제거 시점에만 정리된다.
pub struct SubscriptionBus {
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, Subscriber)>>>,
    next_id: AtomicU64,
    signals: broadcast::Sender<HostSignal>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (signals, _) = broadcast::channel(capacity.max(1));
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            signals,
        }
    }

    /// 이름에 콜백 등록
    pub fn subscribe<F>(&self, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        debug!("Subscribed {:?} to {}", id, name);
        id
    }

    /// 콜백 해제 (해제되었으면 true)
    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(list) = subscribers.get_mut(name) else {
            return false;
        };

        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(name);
        }
        removed
    }

    /// 이름의 구독자 수
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers.read().get(name).map_or(0, Vec::len)
    }

    /// 구독자 호출 + 시그널 브로드캐스트
    ///
    /// 콜백 패닉은 다른 콜백에 영향을 주지 않는다.
    pub fn notify(&self, kind: LifecycleEvent, plugin: &Plugin) {
        let event = PluginEvent::new(kind, plugin.clone());

        // 콜백이 버스를 다시 호출할 수 있으므로 락 밖에서 실행
        let callbacks: Vec<Subscriber> = self
            .subscribers
            .read()
            .get(&plugin.name)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        debug!(
            "Notifying {} subscribers: {} {}",
            callbacks.len(),
            plugin.name,
            kind
        );

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!("Subscriber for {} panicked on {}", plugin.name, kind);
            }
        }

        // 수신자가 없어도 OK
        let _ = self.signals.send(HostSignal::Lifecycle(event));
    }

    /// 제거된 플러그인의 구독 정리
    pub fn drop_plugin(&self, name: &str) {
        if self.subscribers.write().remove(name).is_some() {
            debug!("Dropped subscribers of {}", name);
        }
    }

    /// reload 시그널 (fire-and-forget)
    pub fn broadcast_reload(&self, names: Vec<String>) {
        debug!("Broadcasting reload for {:?}", names);
        let _ = self.signals.send(HostSignal::Reload { names });
    }

    /// 시그널 수신자
    pub fn signals(&self) -> broadcast::Receiver<HostSignal> {
        self.signals.subscribe()
    }
}

impl Default for SubscriptionBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::entity::InstallOptions;
    use std::sync::atomic::AtomicUsize;

    fn plugin(name: &str) -> Plugin {
        Plugin {
            name: name.into(),
            origin: name.into(),
            url: format!("plugin://{}/index.js", name),
            version: Some("1.0.0".into()),
            activation_points: vec!["init".into()],
            active: true,
            install_options: InstallOptions::default(),
            description: None,
        }
    }

    #[test]
    fn test_subscribe_notify_unsubscribe() {
        let bus = SubscriptionBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let id = bus.subscribe("demo", move |event| {
            assert_eq!(event.plugin.name, "demo");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(LifecycleEvent::Installed, &plugin("demo"));
        bus.notify(LifecycleEvent::Installed, &plugin("other"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(bus.unsubscribe("demo", id));
        assert!(!bus.unsubscribe("demo", id));

        bus.notify(LifecycleEvent::Updated, &plugin("demo"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = SubscriptionBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.subscribe("demo", |_| panic!("boom"));
        let counter = calls.clone();
        bus.subscribe("demo", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(LifecycleEvent::Activated, &plugin("demo"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_plugin() {
        let bus = SubscriptionBus::new();
        bus.subscribe("demo", |_| {});
        assert_eq!(bus.subscriber_count("demo"), 1);

        bus.drop_plugin("demo");
        assert_eq!(bus.subscriber_count("demo"), 0);
    }

    #[tokio::test]
    async fn test_signals() {
        let bus = SubscriptionBus::new();
        let mut rx = bus.signals();

        bus.notify(LifecycleEvent::Installed, &plugin("demo"));
        bus.broadcast_reload(vec!["demo".into()]);

        match rx.recv().await.unwrap() {
            HostSignal::Lifecycle(event) => assert_eq!(event.kind, LifecycleEvent::Installed),
            other => panic!("unexpected signal: {:?}", other),
        }
        assert_eq!(
            rx.recv().await.unwrap(),
            HostSignal::Reload {
                names: vec!["demo".into()]
            }
        );
    }

    #[test]
    fn test_signal_wire_format() {
        let signal = HostSignal::Reload {
            names: vec!["demo".into()],
        };
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["signal"], "reload");
    }
}
