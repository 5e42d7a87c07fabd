use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use autoharvest::config::ScrapeConfig;
use autoharvest::harvester::{Harvester, default_roster};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting autoharvest");

    let config = ScrapeConfig::from_env()?;
    let harvester = Arc::new(Harvester::new(config)?);
    let roster = Arc::new(default_roster());

    // Run once immediately
    if let Err(e) = harvester.run_sweep(&roster).await {
        error!("Error during initial sweep: {e:#}");
    }

    // Re-sweep every 6 hours
    let sched = JobScheduler::new().await?;

    let job_harvester = harvester.clone();
    let job_roster = roster.clone();
    sched
        .add(Job::new_async("0 0 */6 * * *", move |_uuid, _l| {
            let harvester = job_harvester.clone();
            let roster = job_roster.clone();
            Box::pin(async move {
                if let Err(e) = harvester.run_sweep(&roster).await {
                    error!("Error during scheduled sweep: {e:#}");
                }
            })
        })?)
        .await?;

    info!("Scheduler started - sweeping every 6 hours");
    sched.start().await?;

    // Keep the program running
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    }
}
