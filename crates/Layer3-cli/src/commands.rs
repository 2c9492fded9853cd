//! 서브커맨드 구현 - 모두 bridge facade를 통해 호스트에 요청

use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use plugkit_core::{
    ActivationManager, InstallOptions, Plugin, PluginBridge, PluginHost, ProcessModuleLoader,
    SourceResolver, Specifier,
};
use plugkit_foundation::{Error, RuntimeConfig};

use crate::confirm::StdinConfirm;

/// 같은 프로세스에 호스트를 띄우고 bridge로 연결
async fn connect(config: &RuntimeConfig, prompt: bool) -> anyhow::Result<(PluginBridge, Arc<PluginHost>)> {
    let resolver = Arc::new(SourceResolver::from_config(config));
    let mut host = PluginHost::open(config, resolver)
        .await
        .context("Failed to open plugin host")?;
    if prompt {
        host = host.with_confirm(StdinConfirm);
    }

    debug!("Using plugins directory {}", host.plugins_path().display());
    let host = Arc::new(host);
    Ok((PluginBridge::local(host.clone()), host))
}

fn describe(plugin: &Plugin) -> String {
    format!(
        "{}@{}{}",
        plugin.name,
        plugin.version.as_deref().unwrap_or("-"),
        if plugin.active { "" } else { " (inactive)" }
    )
}

/// 항목별 실패 출력 후 실패가 있으면 에러
fn report_errors(errors: Vec<(&str, &Error)>) -> anyhow::Result<()> {
    for (subject, err) in &errors {
        eprintln!("✗ {}: {}", subject, err);
    }
    if !errors.is_empty() {
        bail!("{} operation(s) failed", errors.len());
    }
    Ok(())
}

pub async fn install(
    config: &RuntimeConfig,
    specifiers: Vec<String>,
    version: Option<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let (bridge, host) = connect(config, config.confirm_install() && !yes).await?;

    let specifiers: Vec<Specifier> = specifiers
        .into_iter()
        .map(|spec| match &version {
            Some(v) => Specifier::with_options(spec, InstallOptions::new().with_version(v.clone())),
            None => Specifier::from(spec),
        })
        .collect();

    let outcome = bridge.install(specifiers).await?;
    if outcome.is_cancelled() {
        println!("Install cancelled.");
        return Ok(());
    }

    for plugin in outcome.plugins() {
        println!("✓ Installed {}", describe(plugin));
    }
    host.shutdown().await?;
    report_errors(outcome.errors())
}

pub async fn uninstall(config: &RuntimeConfig, names: Vec<String>) -> anyhow::Result<()> {
    let (bridge, host) = connect(config, false).await?;

    let report = bridge.uninstall(names, true).await?;
    for item in &report.items {
        match &item.result {
            Ok(true) => println!("✓ Uninstalled {}", item.name),
            Ok(false) => println!("- {} is not installed", item.name),
            Err(_) => {}
        }
    }
    host.shutdown().await?;
    report_errors(report.errors())
}

pub async fn update(config: &RuntimeConfig, names: Vec<String>) -> anyhow::Result<()> {
    let (bridge, host) = connect(config, false).await?;

    let names = if names.is_empty() {
        bridge.list().await?.into_iter().map(|p| p.name).collect()
    } else {
        names
    };
    if names.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    let report = bridge.update(names, true).await?;
    for item in &report.items {
        if let Ok(status) = &item.result {
            if status.is_updated() {
                println!("✓ Updated {}", describe(status.plugin()));
            } else {
                println!("- {} is up to date", item.name);
            }
        }
    }
    host.shutdown().await?;
    report_errors(report.errors())
}

pub async fn check(config: &RuntimeConfig, name: &str) -> anyhow::Result<()> {
    let (bridge, _host) = connect(config, false).await?;

    match bridge.is_update_available(name).await? {
        Some(version) => println!("{}: update available ({})", name, version),
        None => println!("{}: up to date", name),
    }
    Ok(())
}

pub async fn list(config: &RuntimeConfig, all: bool) -> anyhow::Result<()> {
    let (bridge, _host) = connect(config, false).await?;

    let plugins = if all {
        bridge.list().await?
    } else {
        bridge.get_active().await?
    };
    if plugins.is_empty() {
        println!("No plugins.");
        return Ok(());
    }

    for plugin in &plugins {
        println!("{}", describe(plugin));
        if let Some(description) = &plugin.description {
            println!("    {}", description);
        }
        println!("    points: {}", plugin.activation_points.join(", "));
    }
    Ok(())
}

pub async fn toggle(config: &RuntimeConfig, name: &str, active: bool) -> anyhow::Result<()> {
    let (bridge, host) = connect(config, false).await?;

    let plugin = bridge.toggle_active(name, active).await?;
    println!(
        "✓ {} {}",
        if active { "Enabled" } else { "Disabled" },
        describe(&plugin)
    );
    host.shutdown().await?;
    Ok(())
}

pub async fn trigger(config: &RuntimeConfig, point: &str) -> anyhow::Result<()> {
    let (bridge, host) = connect(config, false).await?;

    let timeout = Duration::from_secs(config.hook_timeout_secs());
    let loader = ProcessModuleLoader::new(host.plugins_path()).with_timeout(timeout);
    let manager = ActivationManager::new(bridge, Arc::new(loader));
    manager.register_active().await?;

    let report = manager.trigger(point).await;
    println!("{}: {} hook(s) invoked", point, report.invoked);

    for name in manager.extensions().names() {
        if let Some(extensions) = manager.extensions().get(&name) {
            println!("  [{}] {} extension(s): {}", name, extensions.len(), extensions.names().join(", "));
        }
    }

    for err in &report.errors {
        eprintln!("✗ {}", err);
    }
    if !report.is_ok() {
        bail!("{} hook(s) failed", report.errors.len());
    }
    Ok(())
}
