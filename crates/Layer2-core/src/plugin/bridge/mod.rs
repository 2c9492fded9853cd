//! Plugin Bridge - 실행 컨텍스트 측 facade
//!
//! 호스트의 install / uninstall / update / toggle_active / get_active를 비동기로 노출합니다.
//! 호출은 JSON 프레임으로 transport를 건너가고, 응답의 플러그인은 모두 새로 재구성된
//! `Plugin` 값으로 돌려줍니다. wire 형식은 facade 밖으로 나가지 않습니다.
//!
//! ```text
//! ┌──────────────────┐  BridgeRequest (JSON)  ┌──────────────────┐
//! │  PluginBridge    │ ─────────────────────▶ │  PluginHost      │
//! │  (실행 컨텍스트)  │ ◀───────────────────── │  (특권 프로세스)  │
//! └──────────────────┘  BridgeResponse (JSON) └──────────────────┘
//!           ▲                                          │
//!           └──────────── HostSignal (broadcast) ──────┘
//! ```

mod handler;
mod protocol;
mod transport;

pub use protocol::{BridgeRequest, BridgeResponse};
pub use transport::{forward_signals, serve, BridgeTransport, ChannelTransport, Frame, LocalTransport};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use plugkit_foundation::{Error, Result};

use super::entity::{Plugin, Specifier};
use super::events::HostSignal;
use super::host::PluginHost;
use super::outcome::{InstallOutcome, UninstallReport, UpdateReport};
use handler::rehydrate_list;

/// 실행 컨텍스트 측 facade
#[derive(Clone)]
pub struct PluginBridge {
    transport: Arc<dyn BridgeTransport>,
}

impl PluginBridge {
    pub fn new(transport: Arc<dyn BridgeTransport>) -> Self {
        Self { transport }
    }

    /// 같은 프로세스 호스트에 연결
    pub fn local(host: Arc<PluginHost>) -> Self {
        Self::new(Arc::new(LocalTransport::new(host)))
    }

    async fn call(&self, request: BridgeRequest) -> Result<Value> {
        let frame = request.encode()?;
        let response = self.transport.call(frame).await?;
        BridgeResponse::decode(&response)?.into_result()
    }

    // ========================================================================
    // 생명주기
    // ========================================================================

    pub async fn install(&self, specifiers: Vec<Specifier>) -> Result<InstallOutcome> {
        let result = self.call(BridgeRequest::Install { specifiers }).await?;
        InstallOutcome::from_wire(result)
    }

    pub async fn uninstall(&self, names: Vec<String>, reload: bool) -> Result<UninstallReport> {
        let result = self.call(BridgeRequest::Uninstall { names, reload }).await?;
        UninstallReport::from_wire(result)
    }

    pub async fn update(&self, names: Vec<String>, reload: bool) -> Result<UpdateReport> {
        let result = self.call(BridgeRequest::Update { names, reload }).await?;
        UpdateReport::from_wire(result)
    }

    /// 새 버전 문자열, 최신이면 None
    pub async fn is_update_available(&self, name: &str) -> Result<Option<String>> {
        let result = self
            .call(BridgeRequest::IsUpdateAvailable {
                name: name.to_string(),
            })
            .await?;

        match result {
            Value::Bool(false) | Value::Null => Ok(None),
            Value::String(version) => Ok(Some(version)),
            other => Err(Error::Bridge(format!("Unexpected update check result: {}", other))),
        }
    }

    pub async fn toggle_active(&self, name: &str, active: bool) -> Result<Plugin> {
        let result = self
            .call(BridgeRequest::ToggleActive {
                name: name.to_string(),
                active,
            })
            .await?;
        Plugin::rehydrate(result)
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get_active(&self) -> Result<Vec<Plugin>> {
        rehydrate_list(self.call(BridgeRequest::GetActive).await?)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Plugin>> {
        match self
            .call(BridgeRequest::Get {
                name: name.to_string(),
            })
            .await?
        {
            Value::Null => Ok(None),
            value => Plugin::rehydrate(value).map(Some),
        }
    }

    pub async fn list(&self) -> Result<Vec<Plugin>> {
        rehydrate_list(self.call(BridgeRequest::List).await?)
    }

    /// 호스트 시그널 구독
    pub fn signals(&self) -> Option<broadcast::Receiver<HostSignal>> {
        self.transport.signals()
    }
}
