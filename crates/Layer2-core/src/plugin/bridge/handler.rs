//! 특권 프로세스 측 요청 처리

use serde_json::{json, Value};
use tracing::{debug, warn};

use plugkit_foundation::Result;

use super::protocol::{BridgeRequest, BridgeResponse};
use crate::plugin::entity::Plugin;
use crate::plugin::host::PluginHost;

impl PluginHost {
    /// 요청 하나 처리
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let method = request.method();
        debug!("Bridge call: {}", method);

        match self.dispatch(request).await {
            Ok(result) => BridgeResponse::ok(result),
            Err(e) => {
                warn!("Bridge call {} failed: {}", method, e);
                BridgeResponse::err(&e)
            }
        }
    }

    /// 프레임 하나 처리 (디코딩 실패도 에러 응답으로 돌려준다)
    pub async fn handle_frame(&self, frame: &str) -> String {
        let response = match BridgeRequest::decode(frame) {
            Ok(request) => self.handle(request).await,
            Err(e) => BridgeResponse::err(&e),
        };

        response.encode().unwrap_or_else(|e| {
            // 응답 직렬화 실패는 최소 형태로 보고
            json!({
                "status": "err",
                "error": {"kind": "internal", "message": e.to_string()}
            })
            .to_string()
        })
    }

    async fn dispatch(&self, request: BridgeRequest) -> Result<Value> {
        match request {
            BridgeRequest::Install { specifiers } => self.install(specifiers).await.to_wire(),
            BridgeRequest::Uninstall { names, reload } => {
                self.uninstall(names, reload).await.to_wire()
            }
            BridgeRequest::Update { names, reload } => self.update(names, reload).await.to_wire(),
            BridgeRequest::IsUpdateAvailable { name } => {
                let available = self.is_update_available(&name).await?;
                Ok(available.map_or(Value::Bool(false), Value::String))
            }
            BridgeRequest::ToggleActive { name, active } => {
                to_value(&self.toggle_active(&name, active).await?)
            }
            BridgeRequest::GetActive => to_value(&self.get_active().await),
            BridgeRequest::Get { name } => to_value(&self.get(&name).await),
            BridgeRequest::List => to_value(&self.list().await),
        }
    }
}

fn to_value<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// `Plugin` 목록 응답 복원
pub(crate) fn rehydrate_list(value: Value) -> Result<Vec<Plugin>> {
    match value {
        Value::Array(items) => items.into_iter().map(Plugin::rehydrate).collect(),
        other => Err(plugkit_foundation::Error::Bridge(format!(
            "Expected plugin list, got {}",
            other
        ))),
    }
}
