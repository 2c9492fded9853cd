//! 배치 작업 결과
//!
//! install / update / uninstall은 항목별로 실패를 격리하고, 호출자가 어떤 항목이
//! 성공했는지 알 수 있도록 항목별 결과를 돌려준다.

use plugkit_foundation::{Error, Result, WireError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::Plugin;

// ============================================================================
// Install
// ============================================================================

/// specifier 하나의 설치 결과
#[derive(Debug)]
pub struct InstallResult {
    pub specifier: String,
    pub result: Result<Plugin>,
}

/// 설치 배치 결과
#[derive(Debug)]
pub enum InstallOutcome {
    /// 확인 단계에서 취소됨 (파일시스템 변경 없음)
    Cancelled,

    /// 항목별 결과
    Completed(Vec<InstallResult>),
}

impl InstallOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallOutcome::Cancelled)
    }

    pub fn results(&self) -> &[InstallResult] {
        match self {
            InstallOutcome::Cancelled => &[],
            InstallOutcome::Completed(results) => results,
        }
    }

    /// 성공한 플러그인
    pub fn plugins(&self) -> Vec<&Plugin> {
        self.results()
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .collect()
    }

    /// 실패한 항목 (specifier, error)
    pub fn errors(&self) -> Vec<(&str, &Error)> {
        self.results()
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.specifier.as_str(), e)))
            .collect()
    }

    pub fn to_wire(&self) -> Result<Value> {
        let wire = match self {
            InstallOutcome::Cancelled => WireBatch {
                cancelled: true,
                items: Vec::new(),
            },
            InstallOutcome::Completed(results) => WireBatch {
                cancelled: false,
                items: results
                    .iter()
                    .map(|r| WireItem::from_result(&r.specifier, &r.result, |p| Some(p), false))
                    .collect::<Result<_>>()?,
            },
        };
        Ok(serde_json::to_value(wire)?)
    }

    pub fn from_wire(value: Value) -> Result<Self> {
        let wire: WireBatch = parse_wire(value)?;
        if wire.cancelled {
            return Ok(InstallOutcome::Cancelled);
        }

        let results = wire
            .items
            .into_iter()
            .map(|item| {
                let specifier = item.subject.clone();
                let result = item.into_result().and_then(|(plugin, _)| {
                    plugin.ok_or_else(|| Error::Bridge(format!("No plugin for {}", specifier)))
                });
                InstallResult { specifier, result }
            })
            .collect();
        Ok(InstallOutcome::Completed(results))
    }
}

// ============================================================================
// Update
// ============================================================================

/// 업데이트 상태
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateStatus {
    /// 새 버전으로 교체됨
    Updated(Plugin),

    /// 이미 최신 (변경 없음)
    UpToDate(Plugin),
}

impl UpdateStatus {
    pub fn plugin(&self) -> &Plugin {
        match self {
            UpdateStatus::Updated(p) | UpdateStatus::UpToDate(p) => p,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateStatus::Updated(_))
    }
}

/// 이름 하나의 업데이트 결과
#[derive(Debug)]
pub struct UpdateItem {
    pub name: String,
    pub result: Result<UpdateStatus>,
}

/// 업데이트 배치 결과
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub items: Vec<UpdateItem>,
}

impl UpdateReport {
    /// 성공한 항목의 플러그인 (변경 여부와 무관)
    pub fn plugins(&self) -> Vec<&Plugin> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().ok().map(UpdateStatus::plugin))
            .collect()
    }

    /// 실제로 업데이트된 이름
    pub fn updated(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| matches!(&i.result, Ok(s) if s.is_updated()))
            .map(|i| i.name.as_str())
            .collect()
    }

    pub fn errors(&self) -> Vec<(&str, &Error)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.name.as_str(), e)))
            .collect()
    }

    pub fn to_wire(&self) -> Result<Value> {
        let items = self
            .items
            .iter()
            .map(|i| {
                let updated = matches!(&i.result, Ok(s) if s.is_updated());
                WireItem::from_result(&i.name, &i.result, |s| Some(s.plugin()), updated)
            })
            .collect::<Result<_>>()?;

        Ok(serde_json::to_value(WireBatch {
            cancelled: false,
            items,
        })?)
    }

    pub fn from_wire(value: Value) -> Result<Self> {
        let wire: WireBatch = parse_wire(value)?;
        let items = wire
            .items
            .into_iter()
            .map(|item| {
                let name = item.subject.clone();
                let result = item.into_result().and_then(|(plugin, updated)| {
                    let plugin = plugin
                        .ok_or_else(|| Error::Bridge(format!("No plugin for {}", name)))?;
                    Ok(if updated {
                        UpdateStatus::Updated(plugin)
                    } else {
                        UpdateStatus::UpToDate(plugin)
                    })
                });
                UpdateItem { name, result }
            })
            .collect();
        Ok(UpdateReport { items })
    }
}

// ============================================================================
// Uninstall
// ============================================================================

/// 이름 하나의 제거 결과 (`Ok(false)`는 설치되어 있지 않았음)
#[derive(Debug)]
pub struct UninstallItem {
    pub name: String,
    pub result: Result<bool>,
}

/// 제거 배치 결과
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub items: Vec<UninstallItem>,
}

impl UninstallReport {
    /// 모든 항목이 성공했는지
    pub fn succeeded(&self) -> bool {
        self.items.iter().all(|i| i.result.is_ok())
    }

    /// 실제로 제거된 이름
    pub fn removed(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| matches!(i.result, Ok(true)))
            .map(|i| i.name.as_str())
            .collect()
    }

    pub fn errors(&self) -> Vec<(&str, &Error)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.name.as_str(), e)))
            .collect()
    }

    pub fn to_wire(&self) -> Result<Value> {
        let items = self
            .items
            .iter()
            .map(|i| WireItem::from_result(&i.name, &i.result, |_| None, matches!(i.result, Ok(true))))
            .collect::<Result<_>>()?;

        Ok(serde_json::to_value(WireBatch {
            cancelled: false,
            items,
        })?)
    }

    pub fn from_wire(value: Value) -> Result<Self> {
        let wire: WireBatch = parse_wire(value)?;
        let items = wire
            .items
            .into_iter()
            .map(|item| UninstallItem {
                name: item.subject.clone(),
                result: item.into_result().map(|(_, removed)| removed),
            })
            .collect();
        Ok(UninstallReport { items })
    }
}

// ============================================================================
// Wire 형식
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct WireBatch {
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    items: Vec<WireItem>,
}

/// 항목 하나 - `changed`는 업데이트/제거 여부
#[derive(Debug, Serialize, Deserialize)]
struct WireItem {
    subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plugin: Option<Value>,
    #[serde(default)]
    changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
}

impl WireItem {
    fn from_result<T>(
        subject: &str,
        result: &Result<T>,
        plugin_of: impl Fn(&T) -> Option<&Plugin>,
        changed: bool,
    ) -> Result<Self> {
        Ok(match result {
            Ok(value) => WireItem {
                subject: subject.to_string(),
                plugin: plugin_of(value).map(serde_json::to_value).transpose()?,
                changed,
                error: None,
            },
            Err(e) => WireItem {
                subject: subject.to_string(),
                plugin: None,
                changed: false,
                error: Some(e.to_wire()),
            },
        })
    }

    fn into_result(self) -> Result<(Option<Plugin>, bool)> {
        if let Some(error) = self.error {
            return Err(Error::from_wire(error));
        }
        let plugin = self.plugin.map(Plugin::rehydrate).transpose()?;
        Ok((plugin, self.changed))
    }
}

fn parse_wire<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Bridge(format!("Malformed batch result: {}", e)))
}
