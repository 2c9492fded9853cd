//! Plugin Manifest - 패키지 매니페스트 검증
//!
//! 플러그인 패키지의 `package.json`을 파싱하고 플러그인 계약을 만족하는지 검사합니다.
//! 검증은 순수 함수이며 어떤 부수 효과도 없습니다.

use plugkit_foundation::{Error, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// 매니페스트 파일명
pub const MANIFEST_FILE: &str = "package.json";

// ============================================================================
// PluginVersion - 시맨틱 버전
// ============================================================================

/// 플러그인 버전 (`major.minor.patch[-pre][+build]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// pre-release 식별자 (예: `beta.2` → `["beta", "2"]`)
    pub pre: Vec<String>,
}

impl PluginVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
        }
    }

    /// 버전 문자열 파싱 (예: "1.2.3", "v1.2.3-beta.1+build.5")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        // build 메타데이터는 비교에 쓰이지 않음
        let s = s.split('+').next()?;

        let (core, pre) = match s.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (s, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let pre = match pre {
            Some(pre) => {
                let ids: Vec<String> = pre.split('.').map(String::from).collect();
                if ids.iter().any(|id| id.is_empty()) {
                    return None;
                }
                ids
            }
            None => Vec::new(),
        };

        Some(Self {
            major: parts[0].parse().ok()?,
            minor: parts[1].parse().ok()?,
            patch: parts[2].parse().ok()?,
            pre,
        })
    }

    /// pre-release 버전인지
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| compare_pre(&self.pre, &other.pre))
    }
}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre.join("."))?;
        }
        Ok(())
    }
}

/// pre-release 비교: 없는 쪽이 더 크고, 숫자 식별자는 숫자로 비교
fn compare_pre(a: &[String], b: &[String]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    a.len().cmp(&b.len())
}

/// 원격 버전이 로컬 버전보다 새로운지 판단
///
/// 로컬 버전이 없으면 항상 새로 받아야 한다. 둘 중 하나라도 파싱할 수 없으면
/// 문자열이 다를 때만 업데이트로 본다.
pub fn is_newer(local: Option<&str>, remote: Option<&str>) -> bool {
    let Some(local) = local else {
        return true;
    };
    let Some(remote) = remote else {
        return false;
    };

    match (PluginVersion::parse(local), PluginVersion::parse(remote)) {
        (Some(local), Some(remote)) => local < remote,
        _ => local.trim() != remote.trim(),
    }
}

// ============================================================================
// ValidatedManifest - 검증된 매니페스트
// ============================================================================

/// 플러그인 계약을 통과한 매니페스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedManifest {
    /// 플러그인 이름 (scoped 가능: `@scope/name`)
    pub name: String,

    /// 엔트리 파일 (패키지 루트 기준 상대 경로)
    pub main: String,

    /// 버전
    pub version: Option<String>,

    /// activation point 목록 (비어있지 않음)
    pub activation_points: Vec<String>,

    /// 설명
    pub description: Option<String>,
}

/// 매니페스트 검증
///
/// - 매니페스트가 없거나, 파싱할 수 없거나, `name`/`main`이 없으면 `ManifestInvalid`
/// - `activationPoints`가 없거나 비어있으면 `NoActivationPoints`
pub fn validate(raw: Option<&[u8]>, specifier: &str) -> Result<ValidatedManifest> {
    let manifest = inspect(raw, specifier)?;
    if manifest.activation_points.is_empty() {
        return Err(Error::NoActivationPoints(manifest.name));
    }
    Ok(manifest)
}

/// activation point 검사 없이 매니페스트 해석
///
/// 비활성 상태로 등록해야 하는 플러그인의 이름/엔트리를 얻을 때 쓴다.
pub fn inspect(raw: Option<&[u8]>, specifier: &str) -> Result<ValidatedManifest> {
    let invalid = || Error::ManifestInvalid(specifier.to_string());

    let raw = raw.ok_or_else(invalid)?;
    let manifest: Value = serde_json::from_slice(raw).map_err(|_| invalid())?;
    let manifest = manifest.as_object().ok_or_else(invalid)?;

    let name = manifest
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| is_valid_name(n))
        .ok_or_else(invalid)?
        .to_string();

    let main = manifest
        .get("main")
        .and_then(Value::as_str)
        .map(normalize_entry)
        .filter(|m| is_valid_entry(m))
        .ok_or_else(invalid)?;

    let version = manifest
        .get("version")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from);

    let description = manifest
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);

    let mut activation_points: Vec<String> = Vec::new();
    if let Some(points) = manifest.get("activationPoints").and_then(Value::as_array) {
        for point in points.iter().filter_map(Value::as_str).map(str::trim) {
            if !point.is_empty() && !activation_points.iter().any(|p| p == point) {
                activation_points.push(point.to_string());
            }
        }
    }

    Ok(ValidatedManifest {
        name,
        main,
        version,
        activation_points,
        description,
    })
}

/// 검증과 무관하게 매니페스트에서 이름만 읽기
///
/// 검증에 실패한 업데이트가 어떤 엔트리를 비활성화해야 하는지 찾을 때 쓴다.
pub fn peek_name(raw: Option<&[u8]>) -> Option<String> {
    let manifest: Value = serde_json::from_slice(raw?).ok()?;
    manifest
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| is_valid_name(n))
        .map(String::from)
}

/// 매니페스트에서 버전만 읽기
pub fn peek_version(raw: &[u8]) -> Option<String> {
    let manifest: Value = serde_json::from_slice(raw).ok()?;
    manifest
        .get("version")
        .and_then(Value::as_str)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 플러그인 이름 검사 (`name` 또는 `@scope/name`)
///
/// 이름은 설치 디렉토리 경로가 되므로 경로 탈출이 가능한 형태는 거부한다.
pub fn is_valid_name(name: &str) -> bool {
    let segments: Vec<&str> = match name.strip_prefix('@') {
        Some(scoped) => {
            let segments: Vec<&str> = scoped.split('/').collect();
            if segments.len() != 2 {
                return false;
            }
            segments
        }
        None => vec![name],
    };

    segments.iter().all(|segment| {
        !segment.is_empty()
            && *segment != "."
            && *segment != ".."
            && !segment.starts_with('.')
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
    })
}

fn normalize_entry(main: &str) -> String {
    let main = main.trim().replace('\\', "/");
    main.trim_start_matches("./").to_string()
}

fn is_valid_entry(main: &str) -> bool {
    !main.is_empty()
        && !main.starts_with('/')
        && main.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}
