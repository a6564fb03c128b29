// # nimd - Network Interface Manager Daemon
//
// This daemon is a THIN integration layer. Selection, verification and
// publication logic all live in nim-core; nimd only:
//
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Registers collaborators (probe, publishers) and the host provisioner
// 4. Feeds startup configuration and address changes to the manager
// 5. Runs the manager until SIGTERM or SIGINT
//
// ## Configuration
//
// ### Probe
// - `NIM_PROBE_URL`: Controller URL used for reachability tests (required)
// - `NIM_PROBE_USER_AGENT`: User agent for probe requests
//
// ### State
// - `NIM_STATE_DIR`: Directory for published state (in-memory when unset)
// - `NIM_RESOLV_CONF`: Resolver file to generate (default /etc/resolv.conf)
// - `NIM_RUN_DIR`: Directory for wireless configuration files (default /run/nim)
// - `NIM_OVERRIDE_FILE`: JSON port configuration to announce as `override`
//
// ### Timers
// - `NIM_DPC_TEST_DURATION_SECS`: Wait before retesting a candidate
// - `NIM_NETWORK_TEST_INTERVAL_SECS`: Period of the applied configuration re-test
// - `NIM_NETWORK_TEST_BETTER_INTERVAL_SECS`: Delay before looking for a better candidate (0 disables)
// - `NIM_TEST_SEND_TIMEOUT_SECS`: Timeout of one reachability request
// - `NIM_ADDRESS_POLL_SECS`: Interface address polling period
//
// ### Verification
// - `NIM_MAX_RETEST_COUNT`: Retries for local failures before giving up on a candidate
//
// ### Logging
// - `NIM_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export NIM_PROBE_URL=https://controller.example.com/api/v2/edgedevice/ping
// export NIM_STATE_DIR=/persist/status/nim
// export NIM_OVERRIDE_FILE=/config/DevicePortConfig/override.json
//
// nimd
// ```

mod host;
mod watch;

use anyhow::{Context, Result};
use nim_core::engine::{DpcManager, NimEvent};
use nim_core::traits::PortProvisioner;
use nim_core::types::{DevicePortConfig, LAST_RESORT_KEY, OVERRIDE_KEY, last_resort_port_config};
use nim_core::{CollaboratorRegistry, NimConfig, ProbeConfig, PublisherConfig};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::host::HostProvisioner;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed to flush state once a shutdown signal arrived
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the inbound event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

const DEFAULT_ADDRESS_POLL_SECS: u64 = 5;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum NimExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<NimExitCode> for ExitCode {
    fn from(code: NimExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
struct Config {
    probe_url: String,
    probe_user_agent: Option<String>,
    state_dir: Option<PathBuf>,
    resolv_conf: Option<PathBuf>,
    run_dir: PathBuf,
    override_file: Option<PathBuf>,
    dpc_test_duration_secs: Option<u64>,
    network_test_interval_secs: Option<u64>,
    network_test_better_interval_secs: Option<u64>,
    test_send_timeout_secs: Option<u64>,
    address_poll_secs: u64,
    max_retest_count: Option<u32>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |name: &str| -> Result<Option<u64>> { parse_var(&lookup, name) };

        Ok(Self {
            probe_url: lookup("NIM_PROBE_URL").context("NIM_PROBE_URL is required")?,
            probe_user_agent: lookup("NIM_PROBE_USER_AGENT"),
            state_dir: lookup("NIM_STATE_DIR").map(PathBuf::from),
            resolv_conf: lookup("NIM_RESOLV_CONF").map(PathBuf::from),
            run_dir: lookup("NIM_RUN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(host::DEFAULT_RUN_DIR)),
            override_file: lookup("NIM_OVERRIDE_FILE").map(PathBuf::from),
            dpc_test_duration_secs: number("NIM_DPC_TEST_DURATION_SECS")?,
            network_test_interval_secs: number("NIM_NETWORK_TEST_INTERVAL_SECS")?,
            network_test_better_interval_secs: number("NIM_NETWORK_TEST_BETTER_INTERVAL_SECS")?,
            test_send_timeout_secs: number("NIM_TEST_SEND_TIMEOUT_SECS")?,
            address_poll_secs: number("NIM_ADDRESS_POLL_SECS")?
                .unwrap_or(DEFAULT_ADDRESS_POLL_SECS),
            max_retest_count: parse_var(&lookup, "NIM_MAX_RETEST_COUNT")?,
            log_level: lookup("NIM_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks URL scheme, paths, numeric ranges and the log level before
    /// anything is started.
    fn validate(&self) -> Result<()> {
        if self.probe_url.is_empty() {
            anyhow::bail!(
                "NIM_PROBE_URL is required. \
                Set it via: export NIM_PROBE_URL=https://controller.example.com/api/v2/edgedevice/ping"
            );
        }

        if !self.probe_url.starts_with("https://") && !self.probe_url.starts_with("http://") {
            anyhow::bail!(
                "NIM_PROBE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.probe_url
            );
        }

        if let Some(ref dir) = self.state_dir
            && dir.as_os_str().is_empty()
        {
            anyhow::bail!("NIM_STATE_DIR cannot be empty when set");
        }

        if let Some(ref path) = self.resolv_conf
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "NIM_RESOLV_CONF parent directory does not exist: {}",
                parent.display()
            );
        }

        if let Some(ref path) = self.override_file
            && !path.exists()
        {
            anyhow::bail!("NIM_OVERRIDE_FILE does not exist: {}", path.display());
        }

        check_range("NIM_DPC_TEST_DURATION_SECS", self.dpc_test_duration_secs, 1..=3600)?;
        check_range(
            "NIM_NETWORK_TEST_INTERVAL_SECS",
            self.network_test_interval_secs,
            10..=86400,
        )?;
        if self.network_test_better_interval_secs != Some(0) {
            check_range(
                "NIM_NETWORK_TEST_BETTER_INTERVAL_SECS",
                self.network_test_better_interval_secs,
                10..=86400,
            )?;
        }
        check_range("NIM_TEST_SEND_TIMEOUT_SECS", self.test_send_timeout_secs, 1..=300)?;
        check_range("NIM_ADDRESS_POLL_SECS", Some(self.address_poll_secs), 1..=300)?;
        check_range("NIM_MAX_RETEST_COUNT", self.max_retest_count, 1..=100)?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "NIM_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the manager configuration, keeping library defaults for unset values
    fn nim_config(&self) -> NimConfig {
        let mut config = NimConfig::new(ProbeConfig::Http {
            url: self.probe_url.clone(),
            user_agent: self.probe_user_agent.clone(),
        });

        if let Some(ref dir) = self.state_dir {
            config.publisher = PublisherConfig::File { dir: dir.clone() };
        }
        if let Some(ref path) = self.resolv_conf {
            config.resolv_conf_path = path.clone();
        }
        if let Some(secs) = self.dpc_test_duration_secs {
            config.timers.dpc_test_duration_secs = secs;
        }
        if let Some(secs) = self.network_test_interval_secs {
            config.timers.network_test_interval_secs = secs;
        }
        if let Some(secs) = self.network_test_better_interval_secs {
            config.timers.network_test_better_interval_secs = secs;
        }
        if let Some(secs) = self.test_send_timeout_secs {
            config.timers.test_send_timeout_secs = secs;
        }
        if let Some(count) = self.max_retest_count {
            config.verify.max_retest_count = count;
        }
        config
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", name, value, e))
        })
        .transpose()
}

fn check_range<T>(name: &str, value: Option<T>, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if let Some(value) = value
        && !range.contains(&value)
    {
        anyhow::bail!(
            "{} must be between {} and {}. Got: {}",
            name,
            range.start(),
            range.end(),
            value
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return NimExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return NimExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NimExitCode::ConfigError.into();
    }

    info!("Starting nimd daemon");
    info!("Controller URL: {}", config.probe_url);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NimExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            NimExitCode::RuntimeError
        } else {
            NimExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = CollaboratorRegistry::with_builtin_publishers();

    #[cfg(feature = "http")]
    {
        info!("Registering HTTP probe");
        nim_probe_http::register(&registry);
    }

    let nim_config = config.nim_config();
    let probe = registry.create_probe(&nim_config.probe)?;
    let publisher = registry.create_publisher(&nim_config.publisher).await?;
    info!(
        "Probe: {}, publisher: {}",
        nim_config.probe.type_name(),
        nim_config.publisher.type_name()
    );

    let provisioner = HostProvisioner::new(&config.run_dir);
    let interfaces: Arc<dyn PortProvisioner> = Arc::new(provisioner.clone());

    let (mut manager, mut monitor) =
        DpcManager::new(probe, Box::new(provisioner), publisher, nim_config)?;

    tokio::spawn(async move {
        while let Some(event) = monitor.recv().await {
            debug!("Manager event: {:?}", event);
        }
    });

    manager.ingest_port_config_list().await;

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    // Fallback candidate built from the raw interfaces
    match host::raw_interfaces(host::SYS_CLASS_NET).await {
        Ok(if_names) if !if_names.is_empty() => {
            info!("Fallback interfaces: {}", if_names.join(", "));
            manager.update_last_resort_port_config(&if_names).await;
            event_tx
                .send(NimEvent::PortConfigModify {
                    key: LAST_RESORT_KEY.to_string(),
                    config: last_resort_port_config(&if_names),
                })
                .await?;
        }
        Ok(_) => warn!("No physical interfaces found, no fallback configuration"),
        Err(e) => warn!("Failed to list {}: {}", host::SYS_CLASS_NET, e),
    }

    if let Some(ref path) = config.override_file {
        let config = load_override(path).await?;
        info!("Announcing override configuration from {}", path.display());
        event_tx
            .send(NimEvent::PortConfigModify {
                key: OVERRIDE_KEY.to_string(),
                config,
            })
            .await?;
    }

    let mut changes =
        watch::address_changes(interfaces, Duration::from_secs(config.address_poll_secs));
    let address_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(if_name) = changes.next().await {
            if address_tx
                .send(NimEvent::AddressChange { if_name })
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let run = manager.run_with_shutdown(event_rx, Some(shutdown_rx));
    tokio::pin!(run);

    info!("Daemon initialized successfully");

    let signal = tokio::select! {
        result = &mut run => {
            warn!("Manager stopped before a shutdown signal");
            return result.map_err(Into::into);
        }
        signal = wait_for_shutdown() => signal?,
    };

    info!("Received shutdown signal: {}", signal);
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, run).await {
        Ok(result) => {
            result?;
            info!("Shutting down daemon");
            Ok(())
        }
        Err(_) => Err(anyhow::anyhow!(
            "Shutdown timeout after {:?}",
            SHUTDOWN_TIMEOUT
        )),
    }
}

/// Read the static override configuration
async fn load_override(path: &std::path::Path) -> Result<DevicePortConfig> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: DevicePortConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    if config.key.is_empty() {
        config.key = OVERRIDE_KEY.to_string();
    }
    Ok(config)
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
