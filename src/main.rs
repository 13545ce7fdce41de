use std::sync::Arc;

use log::{error, info};

use synapse_load::archetype::Archetype;
use synapse_load::client::HttpClient;
use synapse_load::config::{RuntimeConfig, Settings};
use synapse_load::metrics::MetricsHub;
use synapse_load::population::{PopulationManager, RunLength};
use synapse_load::session::RunContext;
use synapse_load::users::UserPool;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info");
    env_logger::init_from_env(env);

    #[cfg(feature = "tracing")]
    console_subscriber::init();

    let settings = Settings::from_env()?;
    let users = UserPool::load_from_source(&settings.users_path)?;
    let runtime = RuntimeConfig::load(&settings.config_path)?;

    let metrics = Arc::new(MetricsHub::new()?);
    let client = HttpClient::new(&settings.base_url, settings.request_timeout)?;

    let ctx = Arc::new(RunContext {
        client: Arc::new(client),
        users,
        shared_secret: runtime.shared_secret,
        reporter: metrics.clone(),
    });

    let length = match settings.duration {
        Some(duration) => RunLength::For(duration),
        None => RunLength::Indefinite,
    };

    info!(
        "Simulating {} sessions against {}",
        settings.sessions, settings.base_url
    );

    let manager = PopulationManager::new(ctx);
    let reports = manager
        .run(&Archetype::builtin(), settings.sessions, length)
        .await?;

    let unauthenticated = reports.iter().filter(|r| !r.authenticated).count();
    let tasks: u64 = reports.iter().map(|r| r.tally.total()).sum();
    let failed: u64 = reports.iter().map(|r| r.tally.failed).sum();
    info!(
        "{} sessions finished ({} never authenticated), {} tasks, {} failed",
        reports.len(),
        unauthenticated,
        tasks,
        failed
    );

    match metrics.render() {
        Ok(text) => info!("Request metrics:\n{}", text),
        Err(e) => error!("Failed to render metrics: {}", e),
    }

    Ok(())
}
