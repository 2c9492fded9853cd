//! Plugin Source - specifier 형태 분류

use std::path::PathBuf;

/// 플러그인 설치 소스
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    /// 로컬 디렉토리
    Directory(PathBuf),

    /// 로컬 tarball (.tgz / .tar.gz)
    Archive(PathBuf),

    /// HTTP tarball URL
    Url(String),

    /// 레지스트리 패키지 (name 또는 name@version)
    Registry {
        name: String,
        version: Option<String>,
    },
}

impl PluginSource {
    /// 소스 문자열에서 파싱
    pub fn parse(specifier: &str) -> Option<Self> {
        let specifier = specifier.trim();
        if specifier.is_empty() {
            return None;
        }

        if specifier.starts_with("http://") || specifier.starts_with("https://") {
            return Some(PluginSource::Url(specifier.to_string()));
        }

        let path = PathBuf::from(specifier.strip_prefix("file:").unwrap_or(specifier));
        if path.is_dir() {
            return Some(PluginSource::Directory(path));
        }
        if path.is_file() && is_archive(specifier) {
            return Some(PluginSource::Archive(path));
        }
        if looks_like_path(specifier) {
            // 존재하지 않는 경로 - resolver가 실패를 보고하도록 디렉토리로 분류
            return Some(PluginSource::Directory(path));
        }

        Self::parse_registry(specifier)
    }

    /// 레지스트리 specifier 파싱 (예: "demo", "demo@1.0.0", "@scope/demo@latest")
    pub fn parse_registry(specifier: &str) -> Option<Self> {
        let (scope, rest) = match specifier.strip_prefix('@') {
            Some(rest) => ("@", rest),
            None => ("", specifier),
        };

        let (name, version) = match rest.split_once('@') {
            Some((name, version)) => (name, Some(version.to_string())),
            None => (rest, None),
        };

        let name = format!("{}{}", scope, name);
        if !super::manifest::is_valid_name(&name) {
            return None;
        }

        Some(PluginSource::Registry {
            name,
            version: version.filter(|v| !v.is_empty()),
        })
    }
}

impl std::fmt::Display for PluginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginSource::Directory(path) | PluginSource::Archive(path) => {
                write!(f, "{}", path.display())
            }
            PluginSource::Url(url) => write!(f, "{}", url),
            PluginSource::Registry { name, version } => match version {
                Some(v) => write!(f, "{}@{}", name, v),
                None => write!(f, "{}", name),
            },
        }
    }
}

/// tarball 확장자 여부
pub fn is_archive(specifier: &str) -> bool {
    let lower = specifier.to_ascii_lowercase();
    lower.ends_with(".tgz") || lower.ends_with(".tar.gz")
}

fn looks_like_path(specifier: &str) -> bool {
    specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.starts_with('~')
        || specifier.starts_with("file:")
        || specifier.contains('\\')
        || (specifier.len() > 2 && specifier.as_bytes()[1] == b':')
        || is_archive(specifier)
}
