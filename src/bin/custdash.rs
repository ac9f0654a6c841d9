use std::time::Duration;

use clap::{Parser, Subcommand};
use custdash::{aggregate, AggregationResult, FilterSpec, JsonFileSource, SnapshotSource, SnapshotWatcher};

#[derive(Parser)]
#[command(name = "custdash", about = "Customer analytics aggregation CLI")]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a snapshot into dashboard KPIs
    Aggregate {
        /// Path to the snapshot JSON file
        #[arg(long)]
        input: String,
        /// Date window: all, YYYY-MM, or YYYY-MM-DD..YYYY-MM-DD
        #[arg(long, default_value = "all")]
        window: String,
        /// Restrict to a project id (repeatable)
        #[arg(long = "project")]
        projects: Vec<String>,
        /// Reference date for the default window (YYYY-MM-DD, default: today)
        #[arg(long)]
        reference: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show snapshot collection counts
    Status {
        /// Path to the snapshot JSON file
        #[arg(long)]
        input: String,
    },
    /// Re-aggregate and print whenever the snapshot file changes
    Watch {
        /// Path to the snapshot JSON file
        #[arg(long)]
        input: String,
        /// Date window: all, YYYY-MM, or YYYY-MM-DD..YYYY-MM-DD
        #[arg(long, default_value = "all")]
        window: String,
        /// Restrict to a project id (repeatable)
        #[arg(long = "project")]
        projects: Vec<String>,
        /// Poll interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
    },
}

fn parse_reference(reference: Option<&str>) -> anyhow::Result<chrono::DateTime<chrono::Utc>> {
    match reference {
        None => Ok(chrono::Utc::now()),
        Some(s) => {
            let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| anyhow::anyhow!("invalid reference date: {s}"))?;
            Ok(chrono::TimeZone::from_utc_datetime(
                &chrono::Utc,
                &date.and_hms_opt(0, 0, 0).unwrap(),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Aggregate {
            input,
            window,
            projects,
            reference,
            json,
        } => {
            let spec = FilterSpec::parse(&window, &projects)?;
            let reference = parse_reference(reference.as_deref())?;
            let snapshot = JsonFileSource::new(&input).fetch()?;
            let result = aggregate(&snapshot, &spec, reference);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Status { input } => {
            let snapshot = JsonFileSource::new(&input).fetch()?;
            println!("Snapshot Status");
            println!("  Customers:     {}", snapshot.customers.len());
            println!("  Samples:       {}", snapshot.metric_samples.len());
            println!("  Tickets:       {}", snapshot.support_tickets.len());
            println!("  Upgrades:      {}", snapshot.upgrades.len());
            println!("  Cancellations: {}", snapshot.cancellations.len());
            println!("  Projects:      {}", snapshot.projects.len());
        }
        Commands::Watch {
            input,
            window,
            projects,
            interval,
        } => {
            let spec = FilterSpec::parse(&window, &projects)?;
            let watcher = SnapshotWatcher::new(
                JsonFileSource::new(&input),
                Duration::from_secs(interval.max(1)),
            );
            let (mut rx, _handle) = watcher.subscribe()?;

            // Print the initial aggregate, then one per observed change.
            loop {
                let result = aggregate(&rx.borrow_and_update(), &spec, chrono::Utc::now());
                println!("{}", serde_json::to_string(&result)?);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_result(r: &AggregationResult) {
    println!("Aggregation ({})", r.window);

    println!("  Trends:");
    println!("    {:<10} {:>8} {:>8} {:>10} {:>8} {:>8} {:>10}",
        "bucket", "nps", "csat", "retention", "churn", "conv", "lost");
    for (i, label) in r.bucket_labels.iter().enumerate() {
        println!(
            "    {:<10} {:>8.1} {:>8.1} {:>10.1} {:>8.1} {:>8.1} {:>10.2}",
            label,
            r.nps[i],
            r.csat[i],
            r.retention_rate[i],
            r.churn_rate[i],
            r.conversion_rate[i],
            r.revenue_lost[i],
        );
    }

    println!("  Churn reasons:");
    for share in &r.churn_reasons {
        println!("    {:<10} {:>4} ({:.1}%)", share.reason.as_str(), share.count, share.pct);
    }

    println!("  Feature adoption:");
    for adoption in &r.adoption_by_feature {
        println!(
            "    {:<14} {:>4} ({:.1}%)",
            adoption.feature.as_str(),
            adoption.count,
            adoption.rate
        );
    }

    if r.issues_by_project.is_empty() {
        println!("  Issues by project: none");
    } else {
        println!("  Issues by project:");
        for issue in &r.issues_by_project {
            println!("    {} ({}): {}", issue.project_name, issue.project_id, issue.count);
        }
    }

    println!("  Tickets:");
    println!("    Resolved:   {}", r.resolution_status.resolved);
    println!("    Unresolved: {}", r.resolution_status.unresolved);

    println!("  Customers:");
    println!("    Free:    {}", r.total_free_customers);
    println!("    Premium: {}", r.total_premium_customers);
}
