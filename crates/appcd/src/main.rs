// # appcd - App Connector Daemon
//
// This is a thin integration layer. All routing decisions live in appc-core.
//
// The appcd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Creating the route info store and route advertiser
// 4. Feeding DNS responses copied from the local resolver into the engine
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Routing
// - `APPC_DOMAINS`: Comma-separated domains to route (`*.example.com` for subdomains)
// - `APPC_ROUTES`: Comma-separated operator prefixes (e.g. `10.0.0.0/8,2001:db8::/32`)
// - `APPC_STALE_AFTER_SECS`: Seconds before an unseen discovered route is withdrawn
// - `APPC_CLEANUP_INTERVAL_SECS`: Minimum seconds between stale-route collections per domain
//
// ### DNS Tap
// - `APPC_TAP_ADDR`: UDP address receiving copies of DNS responses (default 127.0.0.1:5354)
//
// ### State Store
// - `APPC_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `APPC_STATE_STORE_PATH`: Path to route file (for file store)
//
// ## Example
//
// ```bash
// export APPC_DOMAINS=example.com,*.corp.example
// export APPC_ROUTES=10.0.0.0/8
// export APPC_STATE_STORE_TYPE=file
// export APPC_STATE_STORE_PATH=/var/lib/appc/routes.json
//
// appcd
// ```

mod advertiser;

use anyhow::{Context, Result};
use appc_core::config::{AppcConfig, EngineConfig, StateStoreConfig};
use appc_core::traits::RouteInfoStore;
use appc_core::{AppConnector, EngineEvent, FileRouteInfoStore, MemoryRouteInfoStore};
use ipnet::IpNet;
use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use advertiser::LoggingRouteAdvertiser;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_TAP_ADDR: &str = "127.0.0.1:5354";

/// Largest DNS message carried over UDP with EDNS
const MAX_DNS_MESSAGE: usize = 65_535;

/// Upper bound on draining the apply queue at shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum AppcExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<AppcExitCode> for ExitCode {
    fn from(code: AppcExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
#[derive(Debug)]
struct Config {
    domains: Vec<String>,
    routes: Vec<IpNet>,
    state_store_type: String,
    state_store_path: Option<String>,
    stale_after_secs: u64,
    cleanup_interval_secs: u64,
    tap_addr: SocketAddr,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let routes = split_list(get("APPC_ROUTES"))
            .into_iter()
            .map(|s| {
                s.parse::<IpNet>()
                    .with_context(|| format!("APPC_ROUTES entry '{}' is not a valid prefix", s))
            })
            .collect::<Result<Vec<_>>>()?;

        let seconds = |key: &str| -> Result<u64> {
            match get(key) {
                Some(s) => s
                    .trim()
                    .parse()
                    .with_context(|| format!("{} '{}' is not a number", key, s)),
                None => Ok(0),
            }
        };
        let stale_after_secs = seconds("APPC_STALE_AFTER_SECS")?;
        let cleanup_interval_secs = seconds("APPC_CLEANUP_INTERVAL_SECS")?;

        let tap_addr = get("APPC_TAP_ADDR").unwrap_or_else(|| DEFAULT_TAP_ADDR.to_string());
        let tap_addr = tap_addr
            .parse()
            .with_context(|| format!("APPC_TAP_ADDR '{}' is not a socket address", tap_addr))?;

        Ok(Self {
            domains: split_list(get("APPC_DOMAINS")),
            routes,
            state_store_type: get("APPC_STATE_STORE_TYPE").unwrap_or_else(|| "memory".to_string()),
            state_store_path: get("APPC_STATE_STORE_PATH"),
            stale_after_secs,
            cleanup_interval_secs,
            tap_addr,
            log_level: get("APPC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration and build the engine configuration from it
    fn validate(&self) -> Result<AppcConfig> {
        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            "file" => match &self.state_store_path {
                Some(path) if !path.is_empty() => StateStoreConfig::File { path: path.clone() },
                _ => anyhow::bail!(
                    "APPC_STATE_STORE_PATH is required when APPC_STATE_STORE_TYPE=file. \
                    Set it via: export APPC_STATE_STORE_PATH=/var/lib/appc/routes.json"
                ),
            },
            other => anyhow::bail!(
                "APPC_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        };

        if self.domains.is_empty() && self.routes.is_empty() {
            warn!("Neither APPC_DOMAINS nor APPC_ROUTES is set; nothing will be advertised");
        }

        parse_log_level(&self.log_level)?;

        let config = AppcConfig {
            domains: self.domains.clone(),
            routes: self.routes.clone(),
            state_store,
            engine: EngineConfig {
                stale_after_secs: self.stale_after_secs,
                cleanup_interval_secs: self.cleanup_interval_secs,
                ..Default::default()
            },
        };
        config.validate()?;

        Ok(config)
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "APPC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AppcExitCode::ConfigError.into();
        }
    };

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AppcExitCode::ConfigError.into();
    }

    let appc_config = match config.validate() {
        Ok(appc_config) => appc_config,
        Err(e) => {
            error!("Configuration validation error: {:#}", e);
            return AppcExitCode::ConfigError.into();
        }
    };

    info!("Starting appcd daemon");
    info!(
        "Configuration loaded: {} domain(s), {} operator route(s)",
        appc_config.domains.len(),
        appc_config.routes.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AppcExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(appc_config, config.tap_addr).await {
            error!("Daemon error: {:#}", e);
            AppcExitCode::RuntimeError
        } else {
            AppcExitCode::CleanShutdown
        }
    });

    result.into()
}

async fn create_store(config: &StateStoreConfig) -> Result<Box<dyn RouteInfoStore>> {
    Ok(match config {
        StateStoreConfig::File { path } => {
            info!("Using file route store: {}", path);
            Box::new(FileRouteInfoStore::new(path).await?)
        }
        StateStoreConfig::Memory => {
            info!("Using in-memory route store");
            Box::new(MemoryRouteInfoStore::new())
        }
    })
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: AppcConfig, tap_addr: SocketAddr) -> Result<()> {
    let store = create_store(&config.state_store).await?;
    let advertiser = Box::new(LoggingRouteAdvertiser::new());

    let (appc, events) = AppConnector::new(advertiser, store, config)?;
    let event_logger = tokio::spawn(log_events(events));

    let socket = UdpSocket::bind(tap_addr)
        .await
        .with_context(|| format!("Failed to bind DNS tap socket {}", tap_addr))?;
    info!("Listening for DNS responses on {}", tap_addr);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut buf = vec![0u8; MAX_DNS_MESSAGE];
    loop {
        tokio::select! {
            received = &mut shutdown => {
                info!("Received shutdown signal: {}", received?);
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    debug!("DNS response from {} ({} bytes)", peer, len);
                    appc.observe_dns_response(&buf[..len]).await;
                }
                Err(e) => warn!("DNS tap receive failed: {}", e),
            },
        }
    }

    info!("Shutting down app connector");
    tokio::time::timeout(SHUTDOWN_TIMEOUT, appc.shutdown())
        .await
        .map_err(|_| anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT))??;

    // The event channel closes once the engine is gone.
    let _ = event_logger.await;
    Ok(())
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::ControlRoutesFailed { routes, error } => {
                warn!("Operator routes {:?} not applied: {}", routes, error)
            }
            EngineEvent::AdvertiseFailed { domain, error, .. }
            | EngineEvent::UnadvertiseFailed { domain, error, .. } => {
                warn!("Route change for {} failed: {}", domain, error)
            }
            other => debug!("Engine event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
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
