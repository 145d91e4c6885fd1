use endpoint_health_checker::cli::Cli;
use endpoint_health_checker::config::Config;

#[cfg(feature = "kubernetes")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use endpoint_health_checker::core::cluster::election::ElectionConfig;
    use endpoint_health_checker::core::cluster::kube::{KubeLeaseElector, PodClient, PodStream};
    use endpoint_health_checker::core::{
        HealthChecker, LeadershipGate, Scheduler, TargetSet, Watcher,
    };
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    let cli = Cli::parse_args();
    let config = Config::from_cli(&cli)?;
    init_tracing(&cli.log_level);
    info!(identity = %config.identity, "starting endpoint health checker");

    let client = kube::Client::try_default().await?;

    let targets = Arc::new(TargetSet::new());
    let stream = Arc::new(PodStream::new(client.clone()));
    let pods = Arc::new(PodClient::new(client.clone()));
    let checker = Arc::new(HealthChecker::new(
        pods,
        config.probe_retries,
        config.probe_timeout,
    ));
    let watcher = Arc::new(Watcher::new(Arc::clone(&targets), stream));
    let scheduler = Arc::new(Scheduler::new(
        targets,
        checker,
        config.probe_interval,
        config.workers,
    ));
    let elector = Arc::new(KubeLeaseElector::new(
        client,
        &config.lease_namespace,
        &config.lease_name,
        ElectionConfig {
            lease_duration: config.lease_duration,
            renew_deadline: config.renew_deadline,
            retry_period: config.retry_period,
            identity: config.identity.clone(),
        },
    ));
    let gate = LeadershipGate::new(elector, watcher, scheduler);

    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_stop.cancel();
        }
    });

    gate.run(stop).await?;
    info!("shutdown complete");
    Ok(())
}

#[cfg(not(feature = "kubernetes"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    let _ = Config::from_cli(&cli)?;
    eprintln!("built without the `kubernetes` feature; no cluster backend available");
    std::process::exit(1);
}

#[cfg(feature = "kubernetes")]
fn init_tracing(default_directive: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
