//! 호스트 생명주기 통합 테스트 - 설치/업데이트/제거/구독
//!
//! `cargo test -p plugkit-core --test lifecycle`

use plugkit_core::{
    Error, LifecycleEvent, LocalResolver, MemoryPackage, MemoryResolver, PluginHost, PluginStore,
    SourceResolver, UpdateStatus,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn manifest(name: &str, version: &str, points: &[&str]) -> MemoryPackage {
    MemoryPackage::new(json!({
        "name": name,
        "version": version,
        "main": "index.js",
        "activationPoints": points
    }))
    .with_file("index.js", "module.exports = {}")
}

async fn host_with(resolver: Arc<MemoryResolver>) -> (Arc<PluginHost>, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(PluginStore::open(temp.path().join("plugins")).await.unwrap());
    (Arc::new(PluginHost::new(store, resolver)), temp)
}

#[tokio::test]
async fn test_install_is_idempotent() {
    let resolver = Arc::new(MemoryResolver::new().with_package("a", manifest("a", "0.0.1", &["init"])));
    let (host, _temp) = host_with(resolver).await;

    let first = host.install(vec!["a".into()]).await;
    let second = host.install(vec!["a".into()]).await;

    assert_eq!(first.plugins()[0].name, "a");
    assert_eq!(first.plugins()[0], second.plugins()[0]);
    assert_eq!(host.list().await.len(), 1);
    assert!(host.plugins_path().join("a").join("index.js").exists());
}

#[tokio::test]
async fn test_install_rejects_missing_activation_points() {
    let resolver = Arc::new(
        MemoryResolver::new()
            .with_package("empty", manifest("empty", "1.0.0", &[]))
            .with_package("good", manifest("good", "1.0.0", &["init"])),
    );
    let (host, _temp) = host_with(resolver).await;

    let outcome = host.install(vec!["empty".into(), "good".into()]).await;
    let errors = outcome.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "empty");
    assert!(matches!(errors[0].1, Error::NoActivationPoints(_)));

    // 다른 항목은 영향을 받지 않음
    assert_eq!(outcome.plugins().len(), 1);
    assert!(host.get("good").await.unwrap().active);

    // 등록은 되지만 활성화되지 않음
    let empty = host.get("empty").await.unwrap();
    assert!(!empty.active);
    assert!(host.get_active().await.iter().all(|p| p.name != "empty"));
}

#[tokio::test]
async fn test_install_rejects_invalid_manifest() {
    let resolver = Arc::new(
        MemoryResolver::new()
            .with_package("nameless", MemoryPackage::new(json!({"version": "1.0.0"})))
            .with_package("garbage", MemoryPackage::raw("not json"))
            .with_package("bare", MemoryPackage::without_manifest()),
    );
    let (host, _temp) = host_with(resolver).await;

    let outcome = host
        .install(vec!["nameless".into(), "garbage".into(), "bare".into()])
        .await;
    assert_eq!(outcome.errors().len(), 3);
    for (_, err) in outcome.errors() {
        assert!(matches!(err, Error::ManifestInvalid(_)), "unexpected: {:?}", err);
    }
    assert!(host.list().await.is_empty());
}

#[tokio::test]
async fn test_unknown_specifier_fails_resolution() {
    let (host, _temp) = host_with(Arc::new(MemoryResolver::new())).await;

    let outcome = host.install(vec!["missing".into()]).await;
    assert!(matches!(
        outcome.errors()[0].1,
        Error::ResolutionFailed { .. }
    ));
}

#[tokio::test]
async fn test_update_flow() {
    let resolver = Arc::new(MemoryResolver::new().with_package("a", manifest("a", "0.0.1", &["init"])));
    let (host, _temp) = host_with(resolver.clone()).await;
    host.install(vec!["a".into()]).await;

    // 최신이면 그대로
    assert_eq!(host.is_update_available("a").await.unwrap(), None);
    let report = host.update(vec!["a".into()], false).await;
    assert!(matches!(report.items[0].result, Ok(UpdateStatus::UpToDate(_))));

    // 새 버전 게시
    resolver.publish("a", manifest("a", "0.0.2", &["init"]));
    assert_eq!(
        host.is_update_available("a").await.unwrap(),
        Some("0.0.2".to_string())
    );

    let mut signals = host.signals();
    let report = host.update(vec!["a".into()], true).await;
    assert_eq!(report.updated(), vec!["a"]);
    assert_eq!(host.get("a").await.unwrap().version.as_deref(), Some("0.0.2"));
    assert_eq!(host.is_update_available("a").await.unwrap(), None);

    // Updated 이벤트 다음에 reload 한 번
    let mut saw_reload = false;
    while let Ok(signal) = signals.try_recv() {
        if let plugkit_core::HostSignal::Reload { names } = signal {
            assert_eq!(names, vec!["a"]);
            saw_reload = true;
        }
    }
    assert!(saw_reload);
}

#[tokio::test]
async fn test_update_keeps_inactive_flag() {
    let resolver = Arc::new(MemoryResolver::new().with_package("a", manifest("a", "1.0.0", &["init"])));
    let (host, _temp) = host_with(resolver.clone()).await;
    host.install(vec!["a".into()]).await;
    host.toggle_active("a", false).await.unwrap();

    resolver.publish("a", manifest("a", "1.1.0", &["init"]));
    host.update(vec!["a".into()], false).await;

    let plugin = host.get("a").await.unwrap();
    assert_eq!(plugin.version.as_deref(), Some("1.1.0"));
    assert!(!plugin.active);
}

#[tokio::test]
async fn test_subscribers_follow_lifecycle() {
    let resolver = Arc::new(MemoryResolver::new().with_package("a", manifest("a", "1.0.0", &["init"])));
    let (host, _temp) = host_with(resolver).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let id = host.subscribe("a", move |event| sink.lock().unwrap().push(event.kind));

    host.install(vec!["a".into()]).await;
    host.toggle_active("a", false).await.unwrap();
    host.toggle_active("a", true).await.unwrap();

    assert!(host.unsubscribe("a", id));
    host.toggle_active("a", false).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            LifecycleEvent::Installed,
            LifecycleEvent::Deactivated,
            LifecycleEvent::Activated
        ]
    );
}

#[tokio::test]
async fn test_uninstall_removes_artifacts() {
    let resolver = Arc::new(
        MemoryResolver::new().with_package("@scope/a", manifest("@scope/a", "1.0.0", &["init"])),
    );
    let (host, _temp) = host_with(resolver).await;
    host.install(vec!["@scope/a".into()]).await;

    let dir = host.plugins_path().join("@scope").join("a");
    assert!(dir.exists());

    let report = host.uninstall(vec!["@scope/a".into()], false).await;
    assert!(report.succeeded());
    assert_eq!(report.removed(), vec!["@scope/a"]);
    assert!(!dir.exists());
    assert!(!host.plugins_path().join("@scope").exists());
    assert!(host.get("@scope/a").await.is_none());

    // 두 번째 제거는 no-op
    let report = host.uninstall(vec!["@scope/a".into()], false).await;
    assert!(report.succeeded());
    assert!(report.removed().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_uninstall_keeps_entry_when_files_cannot_be_removed() {
    use std::os::unix::fs::PermissionsExt;

    let resolver = Arc::new(
        MemoryResolver::new()
            .with_package("@locked/a", manifest("@locked/a", "1.0.0", &["init"]))
            .with_package("b", manifest("b", "1.0.0", &["init"])),
    );
    let (host, _temp) = host_with(resolver).await;
    host.install(vec!["@locked/a".into(), "b".into()]).await;

    let scope = host.plugins_path().join("@locked");
    std::fs::set_permissions(&scope, std::fs::Permissions::from_mode(0o555)).unwrap();

    // root는 권한을 무시하므로 검사할 수 없음
    if std::fs::write(scope.join(".writable"), "").is_ok() {
        std::fs::set_permissions(&scope, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let report = host.uninstall(vec!["@locked/a".into(), "b".into()], false).await;
    std::fs::set_permissions(&scope, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.removed(), vec!["b"]);
    assert_eq!(report.errors().len(), 1);
    assert_eq!(report.errors()[0].0, "@locked/a");
    assert!(matches!(report.errors()[0].1, Error::Filesystem { .. }));

    // 실패한 이름은 항목과 파일이 그대로
    assert!(host.get("@locked/a").await.is_some());
    assert!(scope.join("a").join("index.js").exists());

    // 다른 이름은 영향 없음
    assert!(host.get("b").await.is_none());
    assert!(!host.plugins_path().join("b").exists());
}

#[tokio::test]
async fn test_failed_registry_write_leaves_no_plugin() {
    let resolver = Arc::new(MemoryResolver::new().with_package("a", manifest("a", "1.0.0", &["init"])));
    let (host, temp) = host_with(resolver).await;
    std::fs::create_dir_all(host.plugins_path().join("plugins.json.tmp")).unwrap();

    let outcome = host.install(vec!["a".into()]).await;
    assert!(matches!(outcome.errors()[0].1, Error::Filesystem { .. }));
    assert!(host.get("a").await.is_none());
    assert!(!host.plugins_path().join("a").exists());

    // 디스크와 메모리가 같은 상태
    std::fs::remove_dir(host.plugins_path().join("plugins.json.tmp")).unwrap();
    let store = PluginStore::open(temp.path().join("plugins")).await.unwrap();
    assert!(store.get("a").await.is_none());
}

#[tokio::test]
async fn test_concurrent_install_and_uninstall() {
    let resolver = Arc::new(
        MemoryResolver::new()
            .with_package("a", manifest("a", "1.0.0", &["init"]))
            .with_package("b", manifest("b", "1.0.0", &["init"])),
    );
    let (host, _temp) = host_with(resolver).await;
    host.install(vec!["b".into()]).await;

    let (installed, removed) = tokio::join!(
        host.install(vec!["a".into()]),
        host.uninstall(vec!["b".into()], false)
    );

    assert_eq!(installed.plugins().len(), 1);
    assert!(removed.succeeded());

    let names: Vec<String> = host.list().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["a"]);
}

#[tokio::test]
async fn test_registry_survives_restart() {
    let resolver = Arc::new(MemoryResolver::new().with_package("a", manifest("a", "1.0.0", &["init"])));
    let (host, temp) = host_with(resolver).await;
    host.install(vec!["a".into()]).await;
    host.toggle_active("a", false).await.unwrap();
    host.shutdown().await.unwrap();

    let store = PluginStore::open(temp.path().join("plugins")).await.unwrap();
    let plugin = store.get("a").await.unwrap();
    assert_eq!(plugin.version.as_deref(), Some("1.0.0"));
    assert!(!plugin.active);
}

#[tokio::test]
async fn test_install_from_local_directory() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("my-plugin");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(
        source.join("package.json"),
        json!({
            "name": "my-plugin",
            "version": "0.1.0",
            "main": "index.js",
            "activationPoints": ["init"]
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(source.join("index.js"), "").unwrap();

    let store = Arc::new(PluginStore::open(temp.path().join("plugins")).await.unwrap());
    let host = PluginHost::new(store, Arc::new(LocalResolver::new()));

    let outcome = host.install(vec![source.display().to_string().into()]).await;
    let plugin = outcome.plugins()[0].clone();
    assert_eq!(plugin.name, "my-plugin");
    assert_eq!(plugin.url, "plugin://my-plugin/index.js");
    assert!(host.plugins_path().join("my-plugin").join("index.js").exists());

    // 원본은 그대로
    assert!(source.join("index.js").exists());

    // 같은 소스 resolver로도 해석 가능
    let resolver = SourceResolver::new("http://127.0.0.1:9");
    let raw = plugkit_core::PackageResolver::manifest(
        &resolver,
        &source.display().to_string(),
        &Default::default(),
    )
    .await
    .unwrap();
    assert!(raw.is_some());
}
