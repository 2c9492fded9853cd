//! plugkit-core: Core Runtime for Plugkit
//!
//! Layer2 - 플러그인 런타임 레이어
//!
//! # 주요 모듈
//!
//! - `plugin::host`: 특권 호스트 (설치/제거/업데이트/활성화, 레지스트리 소유)
//! - `plugin::resolver`: 소스 해석 (로컬 디렉토리, 아카이브, URL, npm 레지스트리)
//! - `plugin::bridge`: 실행 컨텍스트 ↔ 호스트 요청 채널
//! - `plugin::activation`: activation point 등록 및 실행
//! - `plugin::extension`: 이름 붙은 확장 지점
//!
//! # 사용 예시
//!
//! ```ignore
//! use plugkit_core::{ActivationManager, PluginBridge, PluginHost, SourceResolver};
//!
//! let config = RuntimeConfig::load()?;
//! let host = Arc::new(PluginHost::open(&config, Arc::new(SourceResolver::from_config(&config))).await?);
//!
//! // 설치 (여러 개를 동시에)
//! let outcome = host.install(vec!["@scope/demo".into(), "./local-plugin".into()]).await;
//! for err in outcome.errors() {
//!     eprintln!("{}", err);
//! }
//!
//! // 실행 컨텍스트
//! let manager = ActivationManager::new(PluginBridge::local(host), Arc::new(loader));
//! manager.register_active().await?;
//! let report = manager.trigger("init").await;
//! ```

pub mod plugin;

// Re-exports: Host
pub use plugin::{
    ConfirmFn,
    ConfirmInstall,
    NameGuard,
    NameLocks,
    PluginHost,
    PluginInstaller,
    // Store
    PluginRecord,
    PluginStore,
    UNVERSIONED,
};

// Re-exports: Entity
pub use plugin::{
    is_newer,
    is_valid_name,
    InstallOptions,
    // Manifest
    PluginVersion,
    Plugin,
    PluginSource,
    PluginUrl,
    Specifier,
    ValidatedManifest,
    MANIFEST_FILE,
    PLUGIN_SCHEME,
};

// Re-exports: Outcome
pub use plugin::{
    InstallOutcome,
    InstallResult,
    UninstallItem,
    UninstallReport,
    UpdateItem,
    UpdateReport,
    UpdateStatus,
};

// Re-exports: Resolver
pub use plugin::{
    LocalResolver,
    MemoryPackage,
    MemoryResolver,
    PackageResolver,
    RegistryResolver,
    ResolvedPackage,
    SourceResolver,
};

// Re-exports: Events
pub use plugin::{
    HostSignal,
    LifecycleEvent,
    PluginEvent,
    Subscriber,
    SubscriptionBus,
    SubscriptionId,
};

// Re-exports: Bridge
pub use plugin::{
    forward_signals,
    serve,
    BridgeRequest,
    BridgeResponse,
    BridgeTransport,
    ChannelTransport,
    Frame,
    LocalTransport,
    PluginBridge,
};

// Re-exports: Activation
pub use plugin::{
    ActivationContext,
    ActivationHook,
    ActivationManager,
    ActivationState,
    FnHook,
    // Loader
    HookModule,
    ModuleLoader,
    PluginModule,
    ProcessModuleLoader,
    StaticModuleLoader,
    TriggerReport,
};

// Re-exports: Extension
pub use plugin::{
    Extension,
    ExtensionHandler,
    ExtensionPoint,
    ExtensionRegistry,
    ExtensionResponse,
    ExtensionResult,
};

// Re-exports: Foundation
pub use plugkit_foundation::{Error, ErrorKind, Result, RuntimeConfig};
