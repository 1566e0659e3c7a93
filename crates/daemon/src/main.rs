use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use pg_s3_backup_daemon::cli::{self, Mode};
use pg_s3_backup_daemon::config::{self, Config, Settings};
use pg_s3_backup_daemon::{scheduler, BackupJob};
use pg_s3_backup_dump::PgDump;
use pg_s3_backup_storage::{ArtifactStore, S3Uploader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::parse_args(env::args().skip(1))?;
    if args.mode == Mode::Help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let cfg = match &args.config_path {
        Some(path) => {
            info!(?path, "loading config file");
            config::load_config(path)?
        }
        None => Config::default(),
    };
    let settings = Settings::from_env(&cfg)?;
    let job = Arc::new(build_job(&settings).await?);

    if args.mode == Mode::RunOnce {
        run_once(&job).await
    } else {
        run_service(job, &settings).await
    }
}

async fn build_job(settings: &Settings) -> Result<BackupJob> {
    let dumper = PgDump::new(&settings.dump_command, settings.database.clone())
        .context("preparing dump command")?
        .with_timeout(settings.stage_timeout);
    let uploader = S3Uploader::connect(settings.remote.clone())
        .await
        .with_timeout(settings.stage_timeout);
    let store = ArtifactStore::new(&settings.staging_dir)?;

    info!(
        program = %dumper.program().display(),
        database = %settings.database.name,
        bucket = %settings.remote.bucket,
        staging_dir = %settings.staging_dir.display(),
        "backup pipeline configured"
    );
    Ok(BackupJob::new(
        Arc::new(dumper),
        Arc::new(uploader),
        store,
        settings.remote.key_prefix.clone(),
    ))
}

async fn run_once(job: &BackupJob) -> Result<()> {
    let run = job.trigger().await;
    let report = serde_json::to_string_pretty(&run).context("serialize run report")?;
    println!("{report}");
    if !run.succeeded() {
        bail!("backup run {} failed", run.id);
    }
    Ok(())
}

async fn run_service(job: Arc<BackupJob>, settings: &Settings) -> Result<()> {
    let sched = scheduler::start(&settings.schedule, move || {
        let job = Arc::clone(&job);
        async move {
            job.trigger().await;
        }
    })?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested; stopping scheduler");
    sched.shutdown();
    Ok(())
}
