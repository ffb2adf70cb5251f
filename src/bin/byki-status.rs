use anyhow::Result;
use byki_migrate::{
    cli::{init_logging, ConnectionArgs},
    status::{check_migrations, collect_status},
    throttle::Throttle,
    CollectionName,
};
use clap::Parser;
use std::process::ExitCode;

/// Compare each global collection with its copy under users/{uid}/.
///
/// Read-only. With --check, re-runs the post-migration validation and exits
/// non-zero when any collection fails it.
#[derive(Parser, Debug)]
#[command(version, long_version = byki_migrate::build::CLAP_LONG_VERSION, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Owner to inspect; defaults to the account of --email
    #[arg(long)]
    owner: Option<String>,

    /// Pause between collections
    #[arg(long, default_value = "100ms")]
    delay: humantime::Duration,

    /// Validate counts and a sample document per collection
    #[arg(long)]
    check: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn print_report<T: serde::Serialize + std::fmt::Display>(report: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

async fn run(args: &Cli) -> Result<bool> {
    let connection = args.connection.connect()?;
    let owner = connection.owner(args.owner.as_deref()).await?;
    let throttle = Throttle::fixed(*args.delay);
    if args.check {
        let report =
            check_migrations(&connection.store, &owner, &CollectionName::ALL, throttle).await?;
        print_report(&report, args.json)?;
        return Ok(report.all_valid);
    }
    let report = collect_status(&connection.store, &owner, &CollectionName::ALL, throttle).await?;
    print_report(&report, args.json)?;
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Cli::parse();

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::error!("Some collections failed validation");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("Status check failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
