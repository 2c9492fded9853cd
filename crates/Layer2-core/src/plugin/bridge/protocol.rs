//! Bridge 프로토콜 - 프로세스 경계를 넘는 JSON 메시지

use plugkit_foundation::{Error, Result, WireError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::entity::Specifier;

/// 실행 컨텍스트 → 특권 프로세스 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum BridgeRequest {
    Install {
        specifiers: Vec<Specifier>,
    },
    Uninstall {
        names: Vec<String>,
        #[serde(default = "default_reload")]
        reload: bool,
    },
    Update {
        names: Vec<String>,
        #[serde(default = "default_reload")]
        reload: bool,
    },
    IsUpdateAvailable {
        name: String,
    },
    ToggleActive {
        name: String,
        active: bool,
    },
    GetActive,
    Get {
        name: String,
    },
    List,
}

fn default_reload() -> bool {
    true
}

impl BridgeRequest {
    /// 요청 이름 (로그용)
    pub fn method(&self) -> &'static str {
        match self {
            BridgeRequest::Install { .. } => "install",
            BridgeRequest::Uninstall { .. } => "uninstall",
            BridgeRequest::Update { .. } => "update",
            BridgeRequest::IsUpdateAvailable { .. } => "is_update_available",
            BridgeRequest::ToggleActive { .. } => "toggle_active",
            BridgeRequest::GetActive => "get_active",
            BridgeRequest::Get { .. } => "get",
            BridgeRequest::List => "list",
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| Error::Bridge(format!("Malformed request: {}", e)))
    }
}

/// 특권 프로세스 → 실행 컨텍스트 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BridgeResponse {
    Ok { result: Value },
    Err { error: WireError },
}

impl BridgeResponse {
    pub fn ok(result: Value) -> Self {
        BridgeResponse::Ok { result }
    }

    pub fn err(error: &Error) -> Self {
        BridgeResponse::Err {
            error: error.to_wire(),
        }
    }

    /// 결과 값으로 변환 (에러는 원래 종류로 복원)
    pub fn into_result(self) -> Result<Value> {
        match self {
            BridgeResponse::Ok { result } => Ok(result),
            BridgeResponse::Err { error } => Err(Error::from_wire(error)),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| Error::Bridge(format!("Malformed response: {}", e)))
    }
}
