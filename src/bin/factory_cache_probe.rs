//! Factory cache probe
//!
//! Loads the client configuration, then repeatedly opens a burst of clients
//! against every configured echo endpoint and reports cache metrics.
//!
//! Usage: factory_cache_probe [clients_per_endpoint] [rounds]

use anyhow::{bail, Context, Result};
use servicemodel_client::bin_common::runner::interruptible_sleep;
use servicemodel_client::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, BinaryRunner, RunConfig,
};
use servicemodel_client::servicemodel::{
    Binding, BindingTimeouts, ChannelFactoryCacheManager, ClientBase, EndpointRegistry, LoopbackBinding,
    LoopbackChannel, ServiceModelConfig,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_CLIENTS: usize = 4;

struct ProbeApp {
    run_config: RunConfig,
    manager: Arc<ChannelFactoryCacheManager>,
    registry: Arc<EndpointRegistry<LoopbackChannel>>,
    clients_per_endpoint: usize,
    timeout: Duration,
    replies: usize,
    failures: usize,
}

impl ProbeApp {
    /// Open, use and close one client
    async fn probe_client(
        manager: Arc<ChannelFactoryCacheManager>,
        registry: Arc<EndpointRegistry<LoopbackChannel>>,
        endpoint: String,
        id: usize,
        timeout: Duration,
    ) -> servicemodel_client::servicemodel::Result<bool> {
        let client = Arc::new(
            ClientBase::<LoopbackChannel>::builder(manager)
                .configuration(registry, endpoint.as_str())
                .build()?,
        );
        client.open_async(timeout).await?;
        let reply = client.channel()?.echo(&format!("{} #{}", endpoint, id))?;
        let shared = client.is_using_cached_factory();
        client.close_async(timeout).await?;
        info!("[{}] client {} got '{}' (shared factory: {})", endpoint, id, reply, shared);
        Ok(shared)
    }

    async fn run_round(&mut self, round: u32) {
        let mut tasks = Vec::new();
        for endpoint in self.registry.names() {
            for id in 0..self.clients_per_endpoint {
                tasks.push(tokio::spawn(Self::probe_client(
                    Arc::clone(&self.manager),
                    Arc::clone(&self.registry),
                    endpoint.to_string(),
                    id,
                    self.timeout,
                )));
            }
        }

        let mut shared = 0;
        for task in futures::future::join_all(tasks).await {
            match task {
                Ok(Ok(was_shared)) => {
                    self.replies += 1;
                    shared += usize::from(was_shared);
                }
                Ok(Err(e)) => {
                    self.failures += 1;
                    warn!("Probe client failed: {}", e);
                }
                Err(e) => {
                    self.failures += 1;
                    error!("Probe task panicked: {}", e);
                }
            }
        }

        info!(
            "Round {}: {} clients on shared factories, {} cache entries",
            round,
            shared,
            self.manager.total_entries()
        );
        match serde_json::to_string_pretty(&self.manager.all_metrics()) {
            Ok(json) => info!("Cache metrics:\n{}", json),
            Err(e) => warn!("Could not serialize cache metrics: {}", e),
        }
    }
}

impl BinaryRunner for ProbeApp {
    async fn run(&mut self) -> Result<()> {
        for round in 1..=self.run_config.rounds {
            self.run_round(round).await;
            if round < self.run_config.rounds {
                if let Some(interval) = self.run_config.round_interval() {
                    if !interruptible_sleep(interval).await {
                        break;
                    }
                }
            }
        }

        let released = self.manager.shutdown();
        info!("Released {} cached channel factories", released);
        if self.failures > 0 {
            bail!("{} probe clients failed", self.failures);
        }
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn summary(&self) -> Option<String> {
        Some(format!("Replies: {}, failures: {}", self.replies, self.failures))
    }
}

/// Positional argument `index`, or `default` when absent
fn parse_count<T>(args: &[String], index: usize, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match args.get(index) {
        Some(value) => value
            .parse()
            .with_context(|| format!("argument {} must be a positive integer, got '{}'", index + 1, value)),
        None => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = load_config_from_env();
    let config = ServiceModelConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    init_tracing_with_level(&config.log_level);
    config.log();

    let args = parse_args();
    let clients_per_endpoint = parse_count(&args, 0, DEFAULT_CLIENTS)?.max(1);
    let rounds: u32 = parse_count(&args, 1, 1)?;

    let timeouts = BindingTimeouts {
        open: config.timeouts.open(),
        close: config.timeouts.close(),
        ..BindingTimeouts::default()
    };
    let mut bindings: HashMap<String, Arc<dyn Binding<LoopbackChannel>>> = HashMap::new();
    bindings.insert(
        "loopback".to_string(),
        Arc::new(LoopbackBinding::new().with_timeouts(timeouts)),
    );

    let registry = EndpointRegistry::from_section(&config.client, &bindings)?;
    if registry.is_empty() {
        bail!("No IEchoService endpoints configured in {}", config_path.display());
    }

    let mut app = ProbeApp {
        run_config: RunConfig::new("Factory Cache Probe")
            .with_rounds(rounds)
            .with_round_interval(1.0),
        manager: Arc::new(ChannelFactoryCacheManager::new(&config.cache)),
        registry: Arc::new(registry),
        clients_per_endpoint,
        timeout: config.timeouts.open(),
        replies: 0,
        failures: 0,
    };

    app.execute().await
}
