//! Command handlers

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use miao_battery::{
    BatteryReader, BatterySource, ConfigAdapter, ConfigSource, ConfigUpdate, ConsoleFormat,
    ConsoleRenderer, DeviceConfig, FileConfigSource, Poller, Renderer, StatusFileRenderer,
};
use miao_transport::protocol::device;
use miao_transport::{
    hex_dump, select_candidate, DeviceLocator, DeviceSession, HidApiBackend, HidBackend,
};
use tokio::sync::mpsc;
use tracing::info;

/// Consumer id used for the terminal
const CONSOLE_CONSUMER: &str = "console";

/// List HID interfaces, marking the one discovery would select
pub fn list(vid: Option<u16>, pid: Option<u16>, all: bool) -> Result<()> {
    let backend: Arc<dyn HidBackend> = Arc::new(HidApiBackend::new()?);
    let locator = DeviceLocator::new(backend);

    let vid = vid.unwrap_or(device::VENDOR_ID);
    let pid = pid.unwrap_or(device::PRODUCT_ID);
    let candidates = if all {
        locator.list(None, None)?
    } else {
        locator.list(Some(vid), Some(pid))?
    };

    if candidates.is_empty() {
        println!("No HID interfaces found for {vid:04X}:{pid:04X}");
        return Ok(());
    }

    let selected = select_candidate(&candidates, vid, pid).map(|c| c.path.clone());
    println!("Found {} HID interface(s):", candidates.len());
    for candidate in &candidates {
        let marker = if selected.as_deref() == Some(candidate.path.as_str()) {
            "*"
        } else {
            " "
        };
        let interface = candidate
            .interface_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {:04X}:{:04X}  if={:<2}  {}",
            marker, candidate.vendor_id, candidate.product_id, interface, candidate.path
        );
    }
    if selected.is_some() {
        println!("(* = interface used for battery reads)");
    }
    Ok(())
}

/// Options for a single read
pub struct ReadOptions {
    pub path: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub delay_ms: u64,
    pub retry: u32,
    pub quiet: bool,
    pub hex: bool,
}

/// Read the battery once and print it
pub async fn read(opts: ReadOptions) -> Result<()> {
    let config = DeviceConfig {
        hid_path: opts.path,
        vendor_id: opts.vid,
        product_id: opts.pid,
        init_delay_ms: opts.delay_ms,
        retry_count: opts.retry,
        ..Default::default()
    };

    let backend: Arc<dyn HidBackend> = Arc::new(HidApiBackend::new()?);
    let reader = BatteryReader::new(Arc::clone(&backend));

    if opts.hex {
        let path = reader.resolve_path(&config)?;
        let mut session = DeviceSession::open(backend.as_ref(), &path)?;
        session.activate()?;
        tokio::time::sleep(config.init_delay()).await;
        let report = session.read_report()?;
        println!("{path}");
        println!("{}", hex_dump(&report));
        return Ok(());
    }

    match reader.read(&config).await {
        Ok(level) if opts.quiet => println!("{level}"),
        Ok(level) => println!("Battery: {level}%"),
        Err(_) if opts.quiet => std::process::exit(1),
        Err(e) => return Err(e).context("battery read failed"),
    }
    Ok(())
}

/// Options for continuous polling
pub struct WatchOptions {
    pub config: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub format: ConsoleFormat,
}

/// Poll until Ctrl-C, printing every committed change
pub async fn watch(opts: WatchOptions) -> Result<()> {
    let config_path = opts.config.unwrap_or_else(FileConfigSource::default_path);
    info!("Config: {}", config_path.display());

    let backend: Arc<dyn HidBackend> = Arc::new(HidApiBackend::new()?);
    let source: Arc<dyn BatterySource> = Arc::new(BatteryReader::new(backend));

    let mut renderers: Vec<Box<dyn Renderer>> = vec![Box::new(ConsoleRenderer::new(opts.format))];
    if let Some(dir) = opts.export_dir {
        let export = StatusFileRenderer::new(&dir)
            .with_context(|| format!("creating export directory {}", dir.display()))?;
        info!("Exporting status to {}", export.path().display());
        renderers.push(Box::new(export));
    }

    let (poller, poller_task) = Poller::spawn(source, renderers, DeviceConfig::default());

    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let adapter = ConfigAdapter::new(FileConfigSource::new(config_path));
    let adapter_task = tokio::spawn(adapter.run(updates_rx, poller.clone()));
    let reload_task = spawn_reload_on_hangup(updates_tx)?;

    poller.register(CONSOLE_CONSUMER);

    tokio::signal::ctrl_c().await?;
    info!("Stopping");

    poller.unregister(CONSOLE_CONSUMER);
    poller.shutdown();
    reload_task.abort();
    adapter_task.abort();
    poller_task.await?;
    Ok(())
}

#[cfg(unix)]
fn spawn_reload_on_hangup(
    updates: mpsc::UnboundedSender<ConfigUpdate>,
) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if updates.send(ConfigUpdate::Reload).is_err() {
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(
    updates: mpsc::UnboundedSender<ConfigUpdate>,
) -> Result<tokio::task::JoinHandle<()>> {
    // No SIGHUP; keep the sender alive so the adapter keeps running
    Ok(tokio::spawn(async move {
        std::future::pending::<()>().await;
        drop(updates);
    }))
}

/// Print the effective configuration as JSON
pub async fn show_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(FileConfigSource::default_path);
    let source = FileConfigSource::new(&path);
    let raw = source
        .fetch()
        .await
        .with_context(|| format!("loading {}", path.display()))?;
    let config = miao_battery::reconcile(&raw);

    println!("# {}", source.path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
