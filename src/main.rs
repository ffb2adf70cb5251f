use anyhow::Result;
use byki_migrate::{
    cli::{init_logging, ConnectionArgs},
    migrate::{MigrationOptions, DEFAULT_BATCH_LIMIT},
    snapshot::{SnapshotWriter, DEFAULT_SNAPSHOT_DIR},
    throttle::Throttle,
    CollectionName, Orchestrator, WorkflowReport,
};
use clap::Parser;
use console::style;
use std::{path::PathBuf, process::ExitCode};

mod bar;

/// Move the global BYKI collections under users/{uid}/ and verify the copy.
#[derive(Parser, Debug)]
#[command(version, long_version = byki_migrate::build::CLAP_LONG_VERSION, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Writes per atomic batch, at most 500
    #[arg(long, env = "BYKI_BATCH_LIMIT", default_value_t = DEFAULT_BATCH_LIMIT)]
    batch_limit: usize,

    /// Pause between collections
    #[arg(long, env = "BYKI_DELAY", default_value = "100ms")]
    delay: humantime::Duration,

    /// Leave a collection alone if its destination already has documents
    #[arg(long)]
    guard: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = DEFAULT_SNAPSHOT_DIR)]
    snapshot_dir: PathBuf,

    #[arg(long)]
    no_snapshot: bool,

    /// Also write the report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Only these collections (repeatable)
    #[arg(long = "collection", value_enum)]
    collections: Vec<CollectionName>,
}

async fn run(args: &Cli) -> Result<WorkflowReport> {
    let options = MigrationOptions::new(args.batch_limit)?
        .with_guard(args.guard)
        .with_dry_run(args.dry_run);
    let connection = args.connection.connect()?;
    let collections = if args.collections.is_empty() {
        CollectionName::ALL.to_vec()
    } else {
        args.collections.clone()
    };

    let mut orchestrator = Orchestrator::new(connection.store, connection.identity)
        .with_collections(&collections)
        .with_options(options)
        .with_throttle(Throttle::fixed(*args.delay))
        .with_progress(Box::new(bar::BatchBar::new(None)));
    if !args.no_snapshot {
        orchestrator = orchestrator.with_snapshot(SnapshotWriter::create(&args.snapshot_dir)?);
    }

    Ok(orchestrator.run().await?)
}

fn print_summary(report: &WorkflowReport) {
    println!();
    println!("{}", style("MIGRATION SUMMARY").bold());
    println!("{}", report);
    println!();
    if report.overall_success {
        println!("{}", style("Migration completed successfully").green().bold());
        if !report.dry_run {
            println!("Next steps:");
            println!("  1. Test the application as the migrated user");
            println!("  2. Update the Firestore security rules");
            println!("  3. Clean up the global collections by hand once satisfied");
        }
    } else {
        println!("{}", style("Migration completed with errors").red().bold());
        if let Some(dir) = &report.snapshot_dir {
            println!("Exported data is kept in {}", dir.display());
        }
        println!(
            "To undo the copy, run: byki-rollback {}",
            report.owner_id
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Cli::parse();

    match run(&args).await {
        Ok(report) => {
            print_summary(&report);
            let mut ok = report.overall_success;
            if let Some(path) = &args.report {
                if let Err(e) = report.write_json(path) {
                    tracing::error!("{}", e);
                    ok = false;
                }
            }
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("Migration failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
