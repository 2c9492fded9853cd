//! # Plugin Runtime
//!
//! 동적 플러그인 설치/관리 및 activation 런타임
//!
//! ## 개요
//!
//! 특권 프로세스(호스트)가 플러그인 디렉토리와 레지스트리를 소유하고, 실행 컨텍스트는
//! bridge를 통해서만 호스트에 요청합니다:
//! - 설치 / 제거 / 업데이트 (로컬 디렉토리, 아카이브, URL, npm 레지스트리)
//! - 활성화 토글 및 업데이트 확인
//! - 생명주기 이벤트 구독
//! - activation point 등록/실행 및 확장 지점
//!
//! ## 아키텍처
//!
//! ```text
//! ┌────────────────────────── 호스트 ──────────────────────────┐
//! │  PluginHost                                                 │
//! │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────┐ │
//! │  │ PluginStore  │  │PluginInstaller│  │ SubscriptionBus │ │
//! │  │ plugins.json │  │ + Resolver    │  │ (이벤트/시그널)  │ │
//! │  └──────────────┘  └───────────────┘  └─────────────────┘ │
//! └───────────────────────────┬─────────────────────────────────┘
//!                             │ BridgeRequest / BridgeResponse (JSON)
//! ┌───────────────────────────┴──────── 실행 컨텍스트 ──────────┐
//! │  PluginBridge ──▶ ActivationManager ──▶ ModuleLoader        │
//! │                          │                                  │
//! │                          └──▶ ExtensionRegistry             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! let host = Arc::new(PluginHost::open(&config, Arc::new(SourceResolver::from_config(&config))).await?);
//! host.install(vec!["@scope/demo".into()]).await;
//!
//! let manager = ActivationManager::new(PluginBridge::local(host), Arc::new(loader));
//! manager.register_active().await?;
//! manager.trigger("init").await;
//! ```

mod activation;
mod bridge;
mod entity;
mod events;
mod extension;
mod host;
mod installer;
mod loader;
mod lock;
mod manifest;
mod outcome;
mod resolver;
mod source;
mod store;

pub use activation::{
    ActivationContext, ActivationHook, ActivationManager, ActivationState, FnHook, TriggerReport,
};
pub use bridge::{
    forward_signals, serve, BridgeRequest, BridgeResponse, BridgeTransport, ChannelTransport,
    Frame, LocalTransport, PluginBridge,
};
pub use entity::{InstallOptions, Plugin, PluginRecord, PluginUrl, Specifier, PLUGIN_SCHEME};
pub use events::{HostSignal, LifecycleEvent, PluginEvent, Subscriber, SubscriptionBus, SubscriptionId};
pub use extension::{
    Extension, ExtensionHandler, ExtensionPoint, ExtensionRegistry, ExtensionResponse,
    ExtensionResult,
};
pub use host::{ConfirmFn, ConfirmInstall, PluginHost, UNVERSIONED};
pub use installer::PluginInstaller;
pub use loader::{
    HookModule, ModuleLoader, PluginModule, ProcessModuleLoader, StaticModuleLoader,
    ENV_ACTIVATION_POINT, ENV_PLUGIN,
};
pub use lock::{NameGuard, NameLocks};
pub use manifest::{is_newer, is_valid_name, PluginVersion, ValidatedManifest, MANIFEST_FILE};
pub use outcome::{
    InstallOutcome, InstallResult, UninstallItem, UninstallReport, UpdateItem, UpdateReport,
    UpdateStatus,
};
pub use resolver::{
    LocalResolver, MemoryPackage, MemoryResolver, PackageResolver, RegistryResolver,
    ResolvedPackage, SourceResolver,
};
pub use source::PluginSource;
pub use store::{PluginStore, STORE_FILE};
