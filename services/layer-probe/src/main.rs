//! WMS layer probe.
//!
//! Runs the full materialization pipeline against a live server using the
//! headless collaborators: fetches capabilities, expands every advertised
//! layer, and prints the resulting layer stack.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wms_layer::headless::{RecordingBackend, ScriptedMap};
use wms_layer::{EngineConfig, EngineContext, HostMap, LayerDescriptor, WmsLayer};

#[derive(Parser, Debug)]
#[command(name = "layer-probe")]
#[command(about = "Expand a WMS server's advertised layers")]
struct Args {
    /// WMS service base URL
    #[arg(env = "WMS_URL")]
    url: String,

    /// WMS protocol version
    #[arg(long, default_value = "1.3.0")]
    wms_version: String,

    /// Projection reported by the headless map
    #[arg(long, default_value = "EPSG:3857")]
    projection: String,

    /// Give up on extent resolution after this many seconds
    #[arg(long, default_value = "30")]
    extent_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = EngineConfig {
        extent_timeout: Some(Duration::from_secs(args.extent_timeout_secs)),
        ..EngineConfig::default()
    };
    let backend = RecordingBackend::new();
    let ctx = EngineContext::with_http(config, backend.clone())
        .context("failed to build engine context")?;

    let map = ScriptedMap::new(args.projection);

    let mut descriptor = LayerDescriptor::all_layers(&args.url);
    descriptor.version = args.wms_version;

    info!(url = %args.url, "expanding advertised layers");
    let parent = WmsLayer::new(descriptor, ctx);
    parent
        .add_to(map.clone() as Arc<dyn HostMap>)
        .await
        .with_context(|| format!("failed to expand layers from {}", args.url))?;

    let children = parent.children();
    println!("{} layer(s) advertised by {}", children.len(), args.url);
    for child in &children {
        let descriptor = child.descriptor();
        let name = descriptor.name.as_deref().unwrap_or("?");
        let extent = child
            .handle_id()
            .and_then(|id| backend.handle_state(id))
            .map(|state| {
                let e = state.extent.to_array();
                format!("[{:.3}, {:.3}, {:.3}, {:.3}]", e[0], e[1], e[2], e[3])
            })
            .unwrap_or_else(|| "unresolved".to_string());
        println!(
            "  z={:<5} {:<30} v{:<6} extent {}",
            child.z_index(),
            name,
            descriptor.version,
            extent
        );
    }

    Ok(())
}
