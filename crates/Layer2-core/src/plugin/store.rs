//! Plugin Store - 설치된 플러그인 레지스트리
//!
//! `<pluginsPath>/plugins.json`을 통해 설치된 플러그인 목록을 관리합니다.
//! 특권 프로세스에서 유일한 진실의 원천이며, 모든 변경은 반환 전에 디스크에 기록됩니다.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use plugkit_foundation::{Error, Result};

use super::entity::{Plugin, PluginRecord};

/// 저장소 파일명
pub const STORE_FILE: &str = "plugins.json";

// ============================================================================
// StoreFile - plugins.json 구조
// ============================================================================

/// plugins.json 파일 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFile {
    /// 파일 버전
    #[serde(default = "default_version")]
    version: String,

    /// 설치된 플러그인 목록
    #[serde(default)]
    plugins: Vec<PluginRecord>,
}

fn default_version() -> String {
    "1.0".to_string()
}

// ============================================================================
// PluginStore - 플러그인 저장소
// ============================================================================

/// 플러그인 저장소
pub struct PluginStore {
    /// 플러그인 디렉토리 (pluginsPath)
    base_dir: PathBuf,

    /// 이름별 항목
    entries: RwLock<HashMap<String, PluginRecord>>,

    /// 파일 쓰기 직렬화
    persist_lock: Mutex<()>,
}

impl PluginStore {
    /// 새 저장소 생성 (로드는 하지 않음)
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entries: RwLock::new(HashMap::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// 생성 후 디스크에서 로드
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(base_dir);
        store.load().await?;
        Ok(store)
    }

    /// 플러그인 디렉토리
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// plugins.json 경로
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join(STORE_FILE)
    }

    /// 플러그인 설치 경로
    pub fn plugin_dir(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.base_dir.clone(), |path, segment| path.join(segment))
    }

    // ========================================================================
    // 로드 / 저장
    // ========================================================================

    /// plugins.json 로드
    ///
    /// 파일이 없거나 비어있으면 빈 레지스트리로 시작한다.
    pub async fn load(&self) -> Result<()> {
        let path = self.store_file();

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using empty store", path.display());
                self.entries.write().await.clear();
                return Ok(());
            }
            Err(e) => return Err(Error::filesystem(&path, e)),
        };

        let file: StoreFile = if content.trim().is_empty() {
            StoreFile {
                version: default_version(),
                plugins: Vec::new(),
            }
        } else {
            serde_json::from_str(&content)?
        };

        let mut entries = self.entries.write().await;
        entries.clear();
        for record in file.plugins {
            if entries.contains_key(record.name()) {
                warn!("Duplicate store entry for {}, keeping the last one", record.name());
            }
            entries.insert(record.name().to_string(), record);
        }

        info!("Loaded {} installed plugins", entries.len());
        Ok(())
    }

    /// plugins.json 저장 (tmp 파일 + rename)
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.entries.read().await.clone();
        self.write_file(&snapshot).await
    }

    /// 변경을 사본에 적용해 기록한 뒤, 기록이 성공해야 메모리에 반영
    ///
    /// 쓰기에 실패하면 메모리 상태는 디스크와 같은 이전 상태로 남는다.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut HashMap<String, PluginRecord>) -> Option<T>,
    ) -> Result<Option<T>> {
        let _guard = self.persist_lock.lock().await;

        let mut next = self.entries.read().await.clone();
        let Some(value) = change(&mut next) else {
            return Ok(None);
        };

        self.write_file(&next).await?;
        *self.entries.write().await = next;
        Ok(Some(value))
    }

    async fn write_file(&self, entries: &HashMap<String, PluginRecord>) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| Error::filesystem(&self.base_dir, e))?;

        let mut plugins: Vec<PluginRecord> = entries.values().cloned().collect();
        plugins.sort_by(|a, b| a.plugin.name.cmp(&b.plugin.name));
        let file = StoreFile {
            version: default_version(),
            plugins,
        };

        let content = serde_json::to_string_pretty(&file)?;
        let path = self.store_file();
        let tmp = self.base_dir.join(format!("{}.tmp", STORE_FILE));

        fs::write(&tmp, content)
            .await
            .map_err(|e| Error::filesystem(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::filesystem(&path, e))?;

        debug!("Saved {} with {} plugins", STORE_FILE, file.plugins.len());
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 이름으로 엔티티 조회
    pub async fn get(&self, name: &str) -> Option<Plugin> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|r| r.plugin.clone())
    }

    /// 이름으로 저장소 항목 조회
    pub async fn get_record(&self, name: &str) -> Option<PluginRecord> {
        self.entries.read().await.get(name).cloned()
    }

    /// 활성화된 플러그인 (이름순)
    pub async fn get_active(&self) -> Vec<Plugin> {
        let mut active: Vec<Plugin> = self
            .entries
            .read()
            .await
            .values()
            .filter(|r| r.plugin.active)
            .map(|r| r.plugin.clone())
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        active
    }

    /// 전체 플러그인 (이름순)
    pub async fn list(&self) -> Vec<Plugin> {
        let mut all: Vec<Plugin> = self
            .entries
            .read()
            .await
            .values()
            .map(|r| r.plugin.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// 플러그인 존재 여부
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// 플러그인 수
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 비어있는지 확인
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // ========================================================================
    // 변경
    // ========================================================================

    /// 플러그인 기록 (유일한 생성/교체 경로)
    ///
    /// 같은 이름이 있으면 제자리에서 교체하고 최초 설치 시간은 유지한다.
    pub async fn upsert(&self, plugin: Plugin, path: impl Into<PathBuf>) -> Result<PluginRecord> {
        let record = PluginRecord::new(plugin, path);

        let record = self
            .commit(move |entries| {
                let mut record = record;
                if let Some(existing) = entries.get(record.name()) {
                    record.installed_at = existing.installed_at;
                }
                entries.insert(record.name().to_string(), record.clone());
                Some(record)
            })
            .await?
            .ok_or_else(|| Error::Internal("store upsert produced no record".into()))?;

        info!(
            "Registered plugin: {} v{}",
            record.name(),
            record.plugin.version.as_deref().unwrap_or("?")
        );
        Ok(record)
    }

    /// 활성화 상태 변경
    pub async fn set_active(&self, name: &str, active: bool) -> Result<Option<Plugin>> {
        let updated = self
            .commit(|entries| {
                let record = entries.get_mut(name)?;
                record.plugin.active = active;
                record.updated_at = Utc::now();
                Some(record.plugin.clone())
            })
            .await?;

        if updated.is_some() {
            info!("Plugin {} {}", name, if active { "activated" } else { "deactivated" });
        }
        Ok(updated)
    }

    /// 플러그인 제거 기록
    pub async fn remove(&self, name: &str) -> Result<Option<PluginRecord>> {
        let removed = self.commit(|entries| entries.remove(name)).await?;

        match &removed {
            Some(_) => info!("Removed plugin from store: {}", name),
            None => debug!("Plugin not in store: {}", name),
        }
        Ok(removed)
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::entity::{InstallOptions, PluginUrl};
    use tempfile::TempDir;

    fn plugin(name: &str, version: &str) -> Plugin {
        Plugin {
            name: name.into(),
            origin: format!("./{}", name),
            url: PluginUrl::new(name, "index.js").to_string(),
            version: Some(version.into()),
            activation_points: vec!["init".into()],
            active: true,
            install_options: InstallOptions::default(),
            description: None,
        }
    }

    async fn test_store() -> (PluginStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = PluginStore::new(temp.path().join("plugins"));
        (store, temp)
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let (store, _temp) = test_store().await;
        store.load().await.unwrap();
        store.load().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_empty_file_is_empty() {
        let (store, _temp) = test_store().await;
        fs::create_dir_all(store.base_dir()).await.unwrap();
        fs::write(store.store_file(), "").await.unwrap();

        store.load().await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_upsert_persists_immediately() {
        let (store, _temp) = test_store().await;
        let path = store.plugin_dir("demo");
        store.upsert(plugin("demo", "1.0.0"), &path).await.unwrap();

        let reopened = PluginStore::open(store.base_dir()).await.unwrap();
        let record = reopened.get_record("demo").await.unwrap();
        assert_eq!(record.plugin.version.as_deref(), Some("1.0.0"));
        assert_eq!(record.path, path);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let (store, _temp) = test_store().await;
        let path = store.plugin_dir("demo");

        let first = store.upsert(plugin("demo", "1.0.0"), &path).await.unwrap();
        let second = store.upsert(plugin("demo", "2.0.0"), &path).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(second.installed_at, first.installed_at);
        assert_eq!(store.get("demo").await.unwrap().version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_set_active() {
        let (store, _temp) = test_store().await;
        store
            .upsert(plugin("demo", "1.0.0"), store.plugin_dir("demo"))
            .await
            .unwrap();
        assert_eq!(store.get_active().await.len(), 1);

        store.set_active("demo", false).await.unwrap();
        assert!(store.get_active().await.is_empty());
        assert_eq!(store.list().await.len(), 1);

        assert!(store.set_active("missing", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, _temp) = test_store().await;
        store
            .upsert(plugin("demo", "1.0.0"), store.plugin_dir("demo"))
            .await
            .unwrap();

        assert!(store.remove("demo").await.unwrap().is_some());
        assert!(store.remove("demo").await.unwrap().is_none());

        let reopened = PluginStore::open(store.base_dir()).await.unwrap();
        assert!(!reopened.contains("demo").await);
    }

    /// 임시 파일 자리에 디렉토리를 두어 기록이 실패하게 만든다
    async fn block_writes(store: &PluginStore) {
        fs::create_dir_all(store.base_dir().join(format!("{}.tmp", STORE_FILE)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_upsert_leaves_memory_untouched() {
        let (store, _temp) = test_store().await;
        block_writes(&store).await;

        let err = store
            .upsert(plugin("demo", "1.0.0"), store.plugin_dir("demo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));

        assert!(store.get("demo").await.is_none());
        assert!(store.get_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_entry() {
        let (store, _temp) = test_store().await;
        store
            .upsert(plugin("demo", "1.0.0"), store.plugin_dir("demo"))
            .await
            .unwrap();
        block_writes(&store).await;

        assert!(store.remove("demo").await.is_err());
        assert!(store.contains("demo").await);

        assert!(store.set_active("demo", false).await.is_err());
        assert!(store.get("demo").await.unwrap().active);

        // 디스크와 메모리가 같은 상태
        let reopened = PluginStore::open(store.base_dir()).await.unwrap();
        assert!(reopened.get("demo").await.unwrap().active);
    }

    #[tokio::test]
    async fn test_scoped_plugin_dir() {
        let (store, _temp) = test_store().await;
        assert_eq!(
            store.plugin_dir("@acme/demo"),
            store.base_dir().join("@acme").join("demo")
        );
    }
}
