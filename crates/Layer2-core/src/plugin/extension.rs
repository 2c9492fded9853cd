//! Extension Points - 호스트가 선언하는 확장 지점
//!
//! 호스트는 이름 있는 확장 지점을 선언하고, 플러그인은 activation 중에 그 지점에
//! 응답(값 또는 핸들러)을 등록합니다. 실행 순서는 priority 오름차순, 같은 priority는
//! 등록 순서입니다.

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use plugkit_foundation::{Error, Result};

// ============================================================================
// ExtensionHandler / ExtensionResponse
// ============================================================================

/// 확장 핸들러 - 입력을 받아 값을 돌려준다
#[async_trait]
pub trait ExtensionHandler: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value>;
}

/// 동기 클로저 핸들러
struct FnHandler<F>(F);

#[async_trait]
impl<F> ExtensionHandler for FnHandler<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    async fn call(&self, input: Value) -> Result<Value> {
        (self.0)(input)
    }
}

/// 확장 응답
#[derive(Clone)]
pub enum ExtensionResponse {
    /// 고정 값 (입력과 무관)
    Value(Value),

    /// 호출 가능한 핸들러
    Handler(Arc<dyn ExtensionHandler>),
}

impl ExtensionResponse {
    /// 클로저를 핸들러로 감싸기
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        ExtensionResponse::Handler(Arc::new(FnHandler(f)))
    }

    async fn respond(&self, input: Value) -> Result<Value> {
        match self {
            ExtensionResponse::Value(value) => Ok(value.clone()),
            ExtensionResponse::Handler(handler) => handler.call(input).await,
        }
    }
}

impl std::fmt::Debug for ExtensionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionResponse::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ExtensionResponse::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl From<Value> for ExtensionResponse {
    fn from(value: Value) -> Self {
        ExtensionResponse::Value(value)
    }
}

// ============================================================================
// Extension
// ============================================================================

/// 확장 지점에 등록된 확장
#[derive(Debug, Clone)]
pub struct Extension {
    /// 지점 안에서 고유한 이름
    pub name: String,

    /// 등록한 플러그인 (호스트가 직접 등록하면 None)
    pub owner: Option<String>,

    /// 실행 순서 (낮을수록 먼저)
    pub priority: i32,

    pub response: ExtensionResponse,
}

impl Extension {
    pub fn new(name: impl Into<String>, response: impl Into<ExtensionResponse>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            priority: 0,
            response: response.into(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// 확장 하나의 실행 결과
#[derive(Debug)]
pub struct ExtensionResult {
    pub name: String,
    pub result: Result<Value>,
}

// ============================================================================
// ExtensionPoint
// ============================================================================

/// 확장 지점
pub struct ExtensionPoint {
    name: String,
    extensions: RwLock<Vec<Extension>>,
}

impl ExtensionPoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 확장 등록 (같은 이름은 교체)
    pub fn register(&self, extension: Extension) {
        let mut extensions = self.extensions.write();
        extensions.retain(|e| e.name != extension.name);

        // 같은 priority 안에서는 등록 순서 유지
        let index = extensions
            .iter()
            .position(|e| e.priority > extension.priority)
            .unwrap_or(extensions.len());
        debug!(
            "Registering extension {} on {} (priority {})",
            extension.name, self.name, extension.priority
        );
        extensions.insert(index, extension);
    }

    /// 이름으로 해제
    pub fn unregister(&self, name: &str) -> bool {
        let mut extensions = self.extensions.write();
        let before = extensions.len();
        extensions.retain(|e| e.name != name);
        extensions.len() != before
    }

    /// 플러그인이 등록한 확장 모두 해제
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let mut extensions = self.extensions.write();
        let before = extensions.len();
        extensions.retain(|e| e.owner.as_deref() != Some(owner));
        before - extensions.len()
    }

    pub fn clear(&self) {
        self.extensions.write().clear();
    }

    pub fn get(&self, name: &str) -> Option<Extension> {
        self.extensions.read().iter().find(|e| e.name == name).cloned()
    }

    /// 실행 순서대로 확장 이름
    pub fn names(&self) -> Vec<String> {
        self.extensions.read().iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Extension> {
        self.extensions.read().clone()
    }

    /// 모든 확장을 같은 입력으로 실행 (실행 순서대로 결과)
    ///
    /// 한 확장의 실패나 패닉은 다른 확장에 영향을 주지 않는다.
    pub async fn execute(&self, input: Value) -> Vec<ExtensionResult> {
        let extensions = self.snapshot();
        join_all(extensions.into_iter().map(|extension| {
            let input = input.clone();
            let point = self.name.clone();
            async move {
                let result = AssertUnwindSafe(extension.response.respond(input))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Internal(format!(
                            "extension {} panicked on {}",
                            extension.name, point
                        )))
                    });
                if let Err(e) = &result {
                    warn!("Extension {} on {} failed: {}", extension.name, point, e);
                }
                ExtensionResult {
                    name: extension.name,
                    result,
                }
            }
        }))
        .await
    }

    /// 확장을 순서대로 연결 실행
    ///
    /// 핸들러는 이전 출력을 입력으로 받는다. 고정 값은 이전 출력이 배열이면 뒤에
    /// 붙고, 아니면 출력을 대체한다. 첫 실패에서 멈춘다.
    pub async fn execute_serial(&self, input: Value) -> Result<Value> {
        let mut throughput = input;

        for extension in self.snapshot() {
            throughput = match (&extension.response, throughput) {
                (ExtensionResponse::Handler(handler), current) => AssertUnwindSafe(handler.call(current))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Internal(format!(
                            "extension {} panicked on {}",
                            extension.name, self.name
                        )))
                    })?,
                (ExtensionResponse::Value(value), Value::Array(mut items)) => {
                    match value {
                        Value::Array(more) => items.extend(more.iter().cloned()),
                        other => items.push(other.clone()),
                    }
                    Value::Array(items)
                }
                (ExtensionResponse::Value(value), _) => value.clone(),
            };
        }

        Ok(throughput)
    }

    /// 타입이 있는 `execute`
    pub async fn execute_as<I, T>(&self, input: &I) -> Result<Vec<Result<T>>>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        Ok(self
            .execute(input)
            .await
            .into_iter()
            .map(|r| r.result.and_then(|v| Ok(serde_json::from_value(v)?)))
            .collect())
    }

    /// 타입이 있는 `execute_serial`
    pub async fn execute_serial_as<I, T>(&self, input: &I) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let output = self.execute_serial(serde_json::to_value(input)?).await?;
        Ok(serde_json::from_value(output)?)
    }
}

// ============================================================================
// ExtensionRegistry
// ============================================================================

/// 확장 지점 레지스트리 (실행 컨텍스트마다 하나)
#[derive(Default)]
pub struct ExtensionRegistry {
    points: RwLock<HashMap<String, Arc<ExtensionPoint>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 확장 지점 선언 (이미 있으면 기존 것을 반환)
    pub fn add(&self, name: &str) -> Arc<ExtensionPoint> {
        self.points
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ExtensionPoint::new(name)))
            .clone()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ExtensionPoint>> {
        self.points.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExtensionPoint>> {
        self.points.read().get(name).cloned()
    }

    /// 선언된 지점 이름 (정렬)
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.points.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 지점에 확장 등록 (지점이 없으면 선언)
    pub fn register(
        &self,
        point: &str,
        name: impl Into<String>,
        response: impl Into<ExtensionResponse>,
        priority: i32,
    ) {
        self.add(point)
            .register(Extension::new(name, response).with_priority(priority));
    }

    /// 소유자가 있는 확장 등록
    pub fn register_extension(&self, point: &str, extension: Extension) {
        self.add(point).register(extension);
    }

    pub fn unregister(&self, point: &str, name: &str) -> bool {
        self.get(point).map_or(false, |p| p.unregister(name))
    }

    /// 플러그인이 등록한 모든 확장 해제
    pub fn unregister_owner(&self, owner: &str) -> usize {
        let points: Vec<Arc<ExtensionPoint>> = self.points.read().values().cloned().collect();
        let removed: usize = points.iter().map(|p| p.unregister_owner(owner)).sum();
        if removed > 0 {
            debug!("Removed {} extensions owned by {}", removed, owner);
        }
        removed
    }

    /// 지점 실행 (지점이 없으면 빈 결과)
    pub async fn execute(&self, point: &str, input: Value) -> Vec<ExtensionResult> {
        match self.get(point) {
            Some(point) => point.execute(input).await,
            None => Vec::new(),
        }
    }

    /// 지점 연결 실행 (지점이 없으면 입력 그대로)
    pub async fn execute_serial(&self, point: &str, input: Value) -> Result<Value> {
        match self.get(point) {
            Some(point) => point.execute_serial(input).await,
            None => Ok(input),
        }
    }
}
