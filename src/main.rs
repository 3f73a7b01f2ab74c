/*!
 * audit-export - one export cycle per invocation
 *
 * Configuration comes entirely from the environment; see `config` for the
 * variables. Exit codes: 0 on success (including a failed checkpoint
 * commit), 1 when the cycle aborts, 2 on configuration errors.
 */

use audit_export::{
    config::ExporterConfig,
    error::{ExportError, Result, EXIT_SUCCESS},
    logging,
    pipeline::{CommitOutcome, CycleReport, ExportContext, ExportSettings, Orchestrator, SystemClock},
    protocol::{
        s3::{S3Client, S3Config},
        DynamoCheckpointStore, GitHubAuditClient, S3ArchiveStore,
    },
};
use aws_config::BehaviorVersion;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!(category = %e.category(), "{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let config = ExporterConfig::from_env();

    let log_format = config
        .as_ref()
        .map(|c| c.log_format)
        .unwrap_or_default();
    if let Err(e) = logging::init_logging(log_format) {
        eprintln!("Error: {}", e);
    }

    let config = config?;
    info!(
        org = %config.source.org,
        bucket = %config.archive.bucket,
        table = %config.checkpoint.table,
        version = audit_export::VERSION,
        "starting audit export"
    );

    let ctx = build_context(&config).await?;
    let report = Orchestrator::new(&ctx).run_cycle().await?;
    log_report(&report);
    Ok(())
}

async fn build_context(config: &ExporterConfig) -> Result<ExportContext> {
    let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let timeout = config.source.timeout;
    let s3 = S3Client::from_shared_config(&shared, S3Config::for_archive(&config.archive, timeout))
        .map_err(|e| ExportError::Config(format!("{}: {}", config.archive.bucket, e)))?;

    Ok(ExportContext {
        source: Box::new(GitHubAuditClient::new(&config.source)?),
        archive: Box::new(S3ArchiveStore::new(s3)),
        checkpoints: Box::new(DynamoCheckpointStore::from_shared_config(
            &shared,
            config.checkpoint.table.clone(),
            timeout,
        )),
        clock: Box::new(SystemClock),
        settings: ExportSettings::from_config(config),
    })
}

fn log_report(report: &CycleReport) {
    let archive = report.archive.as_deref().unwrap_or("-");
    match &report.commit {
        CommitOutcome::Committed(checkpoint) => info!(
            window = %report.window,
            records = report.records,
            archive,
            partition = %checkpoint.partition,
            "export cycle complete"
        ),
        CommitOutcome::Failed(reason) => warn!(
            window = %report.window,
            records = report.records,
            archive,
            reason = %reason,
            "export cycle complete without checkpoint"
        ),
    }
}
