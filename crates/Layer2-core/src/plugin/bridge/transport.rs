//! Bridge Transport - 요청 프레임 전달 계층
//!
//! - `LocalTransport`: 같은 프로세스의 호스트를 직접 호출
//! - `ChannelTransport`: mpsc 채널 너머의 호스트 태스크(`serve`)로 전달

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use plugkit_foundation::{Error, Result};

use crate::plugin::events::HostSignal;
use crate::plugin::host::PluginHost;

/// 채널로 전달되는 프레임 (요청 + 응답 sender)
pub type Frame = (String, oneshot::Sender<String>);

/// Bridge transport trait
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// 요청 프레임 전송 및 응답 프레임 수신
    async fn call(&self, frame: String) -> Result<String>;

    /// 호스트 시그널 구독 (지원하지 않으면 None)
    fn signals(&self) -> Option<broadcast::Receiver<HostSignal>>;
}

// ============================================================================
// LocalTransport
// ============================================================================

/// 같은 프로세스 호스트 직접 호출
pub struct LocalTransport {
    host: Arc<PluginHost>,
}

impl LocalTransport {
    pub fn new(host: Arc<PluginHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl BridgeTransport for LocalTransport {
    async fn call(&self, frame: String) -> Result<String> {
        Ok(self.host.handle_frame(&frame).await)
    }

    fn signals(&self) -> Option<broadcast::Receiver<HostSignal>> {
        Some(self.host.signals())
    }
}

// ============================================================================
// ChannelTransport
// ============================================================================

/// 채널 기반 transport
pub struct ChannelTransport {
    requests: mpsc::Sender<Frame>,
    signals: Option<broadcast::Sender<HostSignal>>,
}

impl ChannelTransport {
    /// 요청 채널과 함께 생성 (수신 측은 `serve`에 넘긴다)
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                requests: tx,
                signals: None,
            },
            rx,
        )
    }

    /// 시그널 중계 연결
    pub fn with_signals(mut self, signals: broadcast::Sender<HostSignal>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

#[async_trait]
impl BridgeTransport for ChannelTransport {
    async fn call(&self, frame: String) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.requests
            .send((frame, reply_tx))
            .await
            .map_err(|_| Error::Bridge("Host is not running".into()))?;

        reply_rx
            .await
            .map_err(|_| Error::Bridge("Host dropped the request".into()))
    }

    fn signals(&self) -> Option<broadcast::Receiver<HostSignal>> {
        self.signals.as_ref().map(broadcast::Sender::subscribe)
    }
}

/// 호스트 서비스 루프
///
/// 프레임마다 태스크를 띄우므로 서로 다른 이름의 작업은 동시에 진행된다.
/// 모든 sender가 닫히면 종료한다.
pub async fn serve(host: Arc<PluginHost>, mut requests: mpsc::Receiver<Frame>) {
    info!("Bridge host loop started");

    while let Some((frame, reply)) = requests.recv().await {
        let host = host.clone();
        tokio::spawn(async move {
            let response = host.handle_frame(&frame).await;
            if reply.send(response).is_err() {
                debug!("Bridge caller went away before the response");
            }
        });
    }

    info!("Bridge host loop stopped");
}

/// 시그널 중계 (호스트 → 다른 broadcast 채널)
///
/// 실행 컨텍스트 쪽 채널에 호스트 시그널을 그대로 전달한다.
pub fn forward_signals(
    mut source: broadcast::Receiver<HostSignal>,
    sink: broadcast::Sender<HostSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match source.recv().await {
                Ok(signal) => {
                    let _ = sink.send(signal);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Signal relay lagged by {}", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::bridge::protocol::{BridgeRequest, BridgeResponse};
    use crate::plugin::resolver::{MemoryPackage, MemoryResolver};
    use crate::plugin::store::PluginStore;
    use tempfile::TempDir;

    async fn host() -> (Arc<PluginHost>, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(PluginStore::open(temp.path().join("plugins")).await.unwrap());
        (
            Arc::new(PluginHost::new(store, Arc::new(MemoryResolver::new()))),
            temp,
        )
    }

    #[tokio::test]
    async fn test_channel_transport() {
        let (host, _temp) = host().await;
        let (transport, rx) = ChannelTransport::channel(8);
        let server = tokio::spawn(serve(host, rx));

        let frame = BridgeRequest::List.encode().unwrap();
        let response = transport.call(frame).await.unwrap();
        let result = BridgeResponse::decode(&response).unwrap().into_result().unwrap();
        assert_eq!(result, serde_json::json!([]));

        drop(transport);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_transport_without_host() {
        let (transport, rx) = ChannelTransport::channel(1);
        drop(rx);

        let err = transport.call("{}".into()).await.unwrap_err();
        assert!(matches!(err, Error::Bridge(_)));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_forward_signals() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(PluginStore::open(temp.path().join("plugins")).await.unwrap());
        let resolver = MemoryResolver::new().with_package(
            "demo",
            MemoryPackage::new(serde_json::json!({
                "name": "demo",
                "main": "index.js",
                "activationPoints": ["init"]
            })),
        );
        let host = PluginHost::new(store, Arc::new(resolver));

        let (sink, mut rx) = broadcast::channel(8);
        let relay = forward_signals(host.signals(), sink);

        host.install(vec!["demo".into()]).await;

        match rx.recv().await.unwrap() {
            HostSignal::Lifecycle(event) => assert_eq!(event.plugin.name, "demo"),
            other => panic!("unexpected signal: {:?}", other),
        }
        relay.abort();
    }
}
