//! Plugin Entity - 설치된 플러그인의 표현
//!
//! - `Plugin`: 실행 컨텍스트에 전달되는 읽기 전용 projection (wire에서 재구성됨)
//! - `PluginRecord`: 특권 프로세스의 저장소 항목 (Plugin + 설치 경로 + 타임스탬프)
//! - `InstallOptions` / `Specifier`: resolver 힌트와 설치 요청 형태

use chrono::{DateTime, Utc};
use plugkit_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::manifest::is_valid_name;

/// 플러그인 모듈 locator scheme
pub const PLUGIN_SCHEME: &str = "plugin://";

// ============================================================================
// InstallOptions - resolver 힌트
// ============================================================================

/// 설치 옵션 - 업데이트 시 그대로 재사용된다
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOptions {
    /// 고정 버전 (없으면 최신, wire에서는 `false`)
    #[serde(default, with = "version_pin")]
    pub version: Option<String>,

    /// 전체 메타데이터 요청 여부
    #[serde(default)]
    pub full_metadata: bool,
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_full_metadata(mut self) -> Self {
        self.full_metadata = true;
        self
    }

    /// 고정 버전을 제거한 복사본 (최신 버전 조회용)
    pub fn latest(&self) -> Self {
        Self {
            version: None,
            full_metadata: self.full_metadata,
        }
    }
}

/// `version: string | false` 형태의 직렬화
mod version_pin {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(v),
            None => serializer.serialize_bool(false),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Pin {
        Version(String),
        Flag(bool),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Pin>::deserialize(deserializer)? {
            Some(Pin::Version(v)) if !v.is_empty() => Some(v),
            _ => None,
        })
    }
}

// ============================================================================
// Specifier - 설치 요청
// ============================================================================

/// 설치 specifier (문자열 또는 옵션 포함 객체)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Specifier {
    /// 경로, 레지스트리 이름, URL
    Plain(String),

    /// 옵션이 붙은 specifier
    Detailed {
        specifier: String,
        #[serde(default, with = "version_pin")]
        version: Option<String>,
        #[serde(default, rename = "fullMetadata")]
        full_metadata: bool,
    },
}

impl Specifier {
    pub fn with_options(specifier: impl Into<String>, options: InstallOptions) -> Self {
        Specifier::Detailed {
            specifier: specifier.into(),
            version: options.version,
            full_metadata: options.full_metadata,
        }
    }

    /// specifier 문자열
    pub fn as_str(&self) -> &str {
        match self {
            Specifier::Plain(s) => s,
            Specifier::Detailed { specifier, .. } => specifier,
        }
    }

    /// (specifier, options)로 분해
    pub fn into_parts(self) -> (String, InstallOptions) {
        match self {
            Specifier::Plain(s) => (s, InstallOptions::default()),
            Specifier::Detailed {
                specifier,
                version,
                full_metadata,
            } => (
                specifier,
                InstallOptions {
                    version,
                    full_metadata,
                },
            ),
        }
    }
}

impl From<&str> for Specifier {
    fn from(s: &str) -> Self {
        Specifier::Plain(s.to_string())
    }
}

impl From<String> for Specifier {
    fn from(s: String) -> Self {
        Specifier::Plain(s)
    }
}

// ============================================================================
// PluginUrl - plugin://<name>/<main>
// ============================================================================

/// 실행 컨텍스트에서 해석 가능한 모듈 locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginUrl {
    pub name: String,
    pub main: String,
}

impl PluginUrl {
    pub fn new(name: impl Into<String>, main: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main: main.into(),
        }
    }

    /// locator 파싱
    ///
    /// scoped 이름(`@scope/name`)은 앞의 두 세그먼트를 이름으로 취급한다.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("Invalid plugin url: {}", url));

        let rest = url.strip_prefix(PLUGIN_SCHEME).ok_or_else(invalid)?;
        let split_at = if rest.starts_with('@') {
            let first = rest.find('/').ok_or_else(invalid)?;
            first + 1 + rest[first + 1..].find('/').ok_or_else(invalid)?
        } else {
            rest.find('/').ok_or_else(invalid)?
        };

        let (name, main) = (&rest[..split_at], &rest[split_at + 1..]);
        if !is_valid_name(name) || main.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(name, main))
    }
}

impl std::fmt::Display for PluginUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", PLUGIN_SCHEME, self.name, self.main)
    }
}

// ============================================================================
// Plugin - 플러그인 엔티티
// ============================================================================

/// 플러그인 엔티티
///
/// 실행 컨텍스트에서 쓰는 값은 항상 wire에서 새로 재구성된 사본이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    /// 고유 이름 (버전과 무관하게 고정)
    pub name: String,

    /// 설치에 사용한 specifier
    pub origin: String,

    /// 모듈 locator (`plugin://<name>/<main>`)
    pub url: String,

    /// 매니페스트 버전
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// activation point 목록
    #[serde(default)]
    pub activation_points: Vec<String>,

    /// 실행 컨텍스트에 로드 가능한지
    #[serde(default)]
    pub active: bool,

    /// resolver 힌트
    #[serde(default)]
    pub install_options: InstallOptions,

    /// 설명
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Plugin {
    /// locator 파싱
    pub fn locator(&self) -> Result<PluginUrl> {
        PluginUrl::parse(&self.url)
    }

    /// activation point 선언 여부
    pub fn declares(&self, point: &str) -> bool {
        self.activation_points.iter().any(|p| p == point)
    }

    /// wire 값에서 재구성
    pub fn rehydrate(value: serde_json::Value) -> Result<Self> {
        let plugin: Plugin = serde_json::from_value(value)
            .map_err(|e| Error::Bridge(format!("Malformed plugin payload: {}", e)))?;
        if plugin.name.is_empty() {
            return Err(Error::Bridge("Plugin payload without name".into()));
        }
        Ok(plugin)
    }
}

// ============================================================================
// PluginRecord - 저장소 항목
// ============================================================================

/// 저장소 항목 - 엔티티 + 설치 경로
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    #[serde(flatten)]
    pub plugin: Plugin,

    /// 절대 설치 경로
    pub path: PathBuf,

    /// 최초 설치 시간
    pub installed_at: DateTime<Utc>,

    /// 마지막 변경 시간
    pub updated_at: DateTime<Utc>,
}

impl PluginRecord {
    pub fn new(plugin: Plugin, path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            plugin,
            path: path.into(),
            installed_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.plugin.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Plugin {
        Plugin {
            name: "demo".into(),
            origin: "./demo".into(),
            url: PluginUrl::new("demo", "index.js").to_string(),
            version: Some("1.0.0".into()),
            activation_points: vec!["init".into()],
            active: true,
            install_options: InstallOptions::default(),
            description: None,
        }
    }

    #[test]
    fn test_url_roundtrip() {
        let url = PluginUrl::new("demo", "dist/index.js");
        assert_eq!(url.to_string(), "plugin://demo/dist/index.js");
        assert_eq!(PluginUrl::parse("plugin://demo/dist/index.js").unwrap(), url);

        let scoped = PluginUrl::parse("plugin://@acme/demo/index.js").unwrap();
        assert_eq!(scoped.name, "@acme/demo");
        assert_eq!(scoped.main, "index.js");
    }

    #[test]
    fn test_url_rejects_garbage() {
        assert!(PluginUrl::parse("file:///etc/passwd").is_err());
        assert!(PluginUrl::parse("plugin://demo").is_err());
        assert!(PluginUrl::parse("plugin://../x/index.js").is_err());
        assert!(PluginUrl::parse("plugin://@acme/index.js").is_err());
    }

    #[test]
    fn test_install_options_wire_format() {
        let opts = InstallOptions::default();
        assert_eq!(
            serde_json::to_value(&opts).unwrap(),
            json!({"version": false, "fullMetadata": false})
        );

        let opts: InstallOptions =
            serde_json::from_value(json!({"version": "1.2.3", "fullMetadata": true})).unwrap();
        assert_eq!(opts.version.as_deref(), Some("1.2.3"));
        assert!(opts.full_metadata);
        assert_eq!(opts.latest().version, None);

        let opts: InstallOptions = serde_json::from_value(json!({"version": false})).unwrap();
        assert_eq!(opts.version, None);
    }

    #[test]
    fn test_specifier_forms() {
        let plain: Specifier = serde_json::from_value(json!("./demo")).unwrap();
        assert_eq!(plain.into_parts(), ("./demo".to_string(), InstallOptions::default()));

        let detailed: Specifier =
            serde_json::from_value(json!({"specifier": "demo", "version": "0.0.1"})).unwrap();
        assert_eq!(detailed.as_str(), "demo");
        let (_, opts) = detailed.into_parts();
        assert_eq!(opts.version.as_deref(), Some("0.0.1"));
    }

    #[test]
    fn test_record_flattens_plugin() {
        let record = PluginRecord::new(sample(), "/plugins/demo");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["name"], "demo");
        assert_eq!(value["activationPoints"], json!(["init"]));
        assert_eq!(value["path"], "/plugins/demo");

        let back: PluginRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.plugin, record.plugin);
    }

    #[test]
    fn test_rehydrate() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(Plugin::rehydrate(value).unwrap(), sample());
        assert!(Plugin::rehydrate(json!({"url": "x"})).is_err());
    }
}
