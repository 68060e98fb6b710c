//! audit-cli: 提交网址进行响应式分析并跟踪结果的命令行工具
//!
//! Usage:
//!   audit-cli analyze <url>        Submit a URL and follow the job to completion
//!   audit-cli history [--remote]   Show local (or service-side) analysis history
//!   audit-cli health               Probe the analysis service

use anyhow::{bail, Context};
use responsive_audit::{AnalysisClient, Job, PollOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "analyze" => cmd_analyze(&args[2..]).await,
        "history" => cmd_history(&args[2..]).await,
        "health" => cmd_health().await,
        "version" | "--version" | "-V" => {
            println!("audit-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"audit-cli: responsive analysis client

USAGE:
    audit-cli <COMMAND> [OPTIONS]

COMMANDS:
    analyze <url>               Submit a URL and follow the analysis
    history [--remote]          Show local history, or the service's with --remote
    health                      Probe the analysis service
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    AUDIT_API_BASE_URL          Service root (default http://localhost:8000/api)
    AUDIT_HTTP_TIMEOUT_MS       Per-request timeout
    AUDIT_POLL_INTERVAL_MS      Polling interval
    AUDIT_POLL_MAX_ATTEMPTS     Polling attempt budget
    AUDIT_HISTORY_PATH          JSON file for local history
    RUST_LOG                    Log filter, e.g. responsive_audit=debug"#
    );
}

async fn cmd_analyze(args: &[String]) -> anyhow::Result<()> {
    let Some(raw_url) = args.first() else {
        bail!("analyze requires a URL");
    };
    let client = AnalysisClient::new().await.context("failed to build client")?;

    let mut updates = client.store().subscribe();
    let printer = tokio::spawn(async move {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let line = updates.borrow_and_update().current.as_ref().map(|job| {
                format!(
                    "[{}] {}% {}",
                    job.status, job.progress, job.status_message
                )
            });
            if line.is_some() && line != last {
                if let Some(l) = &line {
                    println!("{l}");
                }
                last = line;
            }
        }
    });

    let handle = client.analyze(raw_url).await?;
    println!("job {} submitted", handle.job_id());

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            client.cancel();
            println!("cancelled");
            return Ok(());
        }
    };
    printer.abort();

    match outcome {
        PollOutcome::Completed { job, .. } => print_report(&job),
        PollOutcome::Failed { job, .. } => {
            bail!(job.error.unwrap_or_else(|| "analysis failed".to_string()))
        }
        PollOutcome::Aborted { message, .. } => bail!(message),
        PollOutcome::Cancelled { .. } | PollOutcome::Superseded { .. } => {
            println!("analysis stopped before completion");
        }
    }
    Ok(())
}

fn print_report(job: &Job) {
    println!();
    println!("{}", job.url);
    println!(
        "  overall {:>3}   mobile {:>3}   tablet {:>3}   desktop {:>3}",
        job.score.overall, job.score.mobile, job.score.tablet, job.score.desktop
    );
    if !job.summary.is_empty() {
        println!("  {}", job.summary);
    }
    println!("  {} issue(s):", job.issues.len());
    for issue in &job.issues {
        println!(
            "    - [{:?}/{:?}] {} (severity {})",
            issue.issue_type, issue.device, issue.title, issue.severity
        );
    }
    println!("  {} recommendation(s):", job.recommendations.len());
    for rec in &job.recommendations {
        println!("    - [{:?}] {}", rec.priority, rec.title);
    }
}

async fn cmd_history(args: &[String]) -> anyhow::Result<()> {
    let client = AnalysisClient::new().await.context("failed to build client")?;
    if args.iter().any(|a| a == "--remote") {
        for snap in client.fetch_history(10).await? {
            println!(
                "{}  {:<10} {:>3}  {}",
                snap.id, snap.status, snap.score.overall, snap.url
            );
        }
        return Ok(());
    }

    let history = client.store().history();
    if history.is_empty() {
        println!("no local history");
    }
    for job in history.iter().rev() {
        println!(
            "{}  {:<10} {:>3}  {}",
            job.id, job.status, job.score.overall, job.url
        );
    }
    Ok(())
}

async fn cmd_health() -> anyhow::Result<()> {
    let client = AnalysisClient::new().await.context("failed to build client")?;
    let outcome = client.probe().await;
    if outcome.is_healthy() {
        println!("healthy: {:?}", outcome);
        Ok(())
    } else {
        bail!("unhealthy: {:?}", outcome)
    }
}
