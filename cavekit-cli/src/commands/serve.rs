//! Serve a deployment over HTTP.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use cavekit_axum::{AxumAdapterOptions, AxumCaveAdapter, PermissionPolicy};
use cavekit_core::Cave;
use cavekit_server::{create_cave_server, CaveServerSpec, HealthCheck};
use cavekit_store::{AdapterFactories, PersistenceRegistry};

use crate::site::SiteConfig;

/// Builds the cave, binds persistence, applies the axum adapter, and
/// serves the assembled router until interrupted.
pub async fn serve(config_path: &Path, port_override: Option<u16>) -> Result<()> {
    let site = SiteConfig::from_file(config_path)?;
    let port = port_override.unwrap_or(site.listen.port);
    let cave = Arc::new(Cave::new(site.cave.clone()));

    let data_dir = site.store.as_ref().map(|store| store.data_dir.clone());
    let registry = Arc::new(
        PersistenceRegistry::build(&site.tomes, &AdapterFactories::with_defaults(data_dir)).await,
    );

    let permission = site.permission.as_ref().map(|configured| {
        let mut policy = PermissionPolicy::new(configured.rule.clone());
        if let Some(order) = &configured.level_order {
            policy = policy.with_level_order(order.clone());
        }
        policy
    });
    let adapter = Arc::new(AxumCaveAdapter::new(AxumAdapterOptions {
        registry_path: site.registry_path.clone(),
        permission,
    }));
    adapter.register_health_check(None, None);

    let context = create_cave_server(
        CaveServerSpec::new(cave)
            .with_tomes(site.tomes.clone())
            .with_variables(site.variables.clone())
            .with_sections(site.sections.clone())
            .with_store(registry)
            .with_plugin(adapter.clone()),
    )
    .await
    .context("startup failed")?;

    let router = adapter.into_router();
    let addr = format!("{}:{}", site.listen.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        cave = %context.cave.name(),
        %addr,
        tomes = context.tome_configs.len(),
        "cave server listening"
    );
    println!(
        "cavekit serving {} at http://{}",
        context.cave.name(),
        addr
    );
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
