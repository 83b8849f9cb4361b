use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use clap::Parser;
use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::{broadcast, mpsc};

use archivist::{
    cli::{Cli, Command, LogCommand, OutputFormat},
    export::{ExportFormat, SettingsExporter, StatisticsExporter, StatisticsFormat},
    ChangeKind, ChangeRecord, LogTail, MonitorSession,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let config = cli.load_config().context("Failed to load configuration")?;
    let session = MonitorSession::new(&config).context("Failed to create monitoring session")?;

    match cli.command() {
        Command::Watch => run_watch(&cli, &session).await?,
        Command::Scan { files } => run_scan(&cli, &session, files).await?,
        Command::Summary { stdout } => run_summary(&session, stdout).await?,
        Command::Log { action } => run_log(&cli, &session, action, config.log.retain_days)?,
        Command::Export { dir, json, statistics } => {
            let dir = dir.unwrap_or_else(|| session.snapshot().primary);
            let path = if statistics {
                run_statistics_export(&session, &dir, json).await?
            } else {
                let format = if json { ExportFormat::Json } else { ExportFormat::Toml };
                SettingsExporter::new(format)
                    .export_to_dir(&session.snapshot(), &dir)
                    .context("Failed to export settings")?
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

async fn run_statistics_export(session: &MonitorSession, dir: &Path, json: bool) -> Result<PathBuf> {
    session.quick_scan().await.context("Scan failed")?;
    let report = session.generate_summary().await?;
    let format = if json { StatisticsFormat::Json } else { StatisticsFormat::Text };
    let path = StatisticsExporter::new(format)
        .export_to_dir(&report, dir)
        .context("Failed to export statistics")?;
    Ok(path)
}

async fn run_watch(cli: &Cli, session: &MonitorSession) -> Result<()> {
    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let baseline = session.quick_scan().await.context("Initial scan failed")?;
    let mut events = session.subscribe();
    session.start().await.context("Failed to start monitoring")?;

    if cli.output == OutputFormat::Text {
        let snapshot = session.snapshot();
        for folder in &snapshot.folders {
            println!("Watching: {}", folder.display());
        }
        println!("Tracking {} files ({})", baseline.total, snapshot.extensions.join(", "));
        println!("Press Ctrl+C to quit");
        println!("---");
    }

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            msg = events.recv() => match msg {
                Ok(record) => match cli.output {
                    OutputFormat::Json => println!("{}", serde_json::to_string(&record)?),
                    OutputFormat::Text => print_text_record(&record, cli),
                    OutputFormat::Compact => print_compact_record(&record),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Output fell behind, {} records not shown", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.stop().await.context("Failed to stop monitoring")?;
    let report = session.write_summary().await.context("Failed to write summary")?;
    if cli.output == OutputFormat::Text {
        println!("---");
        println!("Summary written to {} ({} tracked files)", session.summary_path().display(), report.total);
    }
    Ok(())
}

async fn run_scan(cli: &Cli, session: &MonitorSession, files: bool) -> Result<()> {
    session.quick_scan().await.context("Scan failed")?;
    if files {
        return print_tracked_files(cli, session).await;
    }
    let report = session.generate_summary().await?;

    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Compact => {
            let parts: Vec<String> = report
                .breakdown
                .iter()
                .map(|share| format!("{}={}", share.extension, share.count))
                .collect();
            println!("{} {}", report.total, parts.join(" "));
        }
        OutputFormat::Text => {
            for folder in &report.folders {
                let star = if folder.primary { " *" } else { "" };
                println!("{:>8}  {}{}", folder.count, folder.path.display(), star);
            }
            println!("---");
            for share in &report.breakdown {
                println!("{:>8}  {} ({}%)", share.count, share.extension, share.percent);
            }
            println!("{:>8}  total", report.total);
        }
    }
    Ok(())
}

async fn print_tracked_files(cli: &Cli, session: &MonitorSession) -> Result<()> {
    let listing = session.list_tracked_files().await.context("Failed to list files")?;

    match cli.output {
        OutputFormat::Json => {
            let value: BTreeMap<String, &Vec<PathBuf>> = listing
                .iter()
                .map(|(folder, files)| (folder.display().to_string(), files))
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Compact => {
            for (folder, files) in &listing {
                for file in files {
                    println!("{}", folder.join(file).display());
                }
            }
        }
        OutputFormat::Text => {
            for (folder, files) in &listing {
                println!("{} ({} files)", folder.display(), files.len());
                for file in files {
                    println!("  {}", file.display());
                }
            }
        }
    }
    Ok(())
}

async fn run_summary(session: &MonitorSession, stdout: bool) -> Result<()> {
    session.quick_scan().await.context("Scan failed")?;

    if stdout {
        let report = session.generate_summary().await?;
        print!("{}", report.render());
    } else {
        session.write_summary().await.context("Failed to write summary")?;
        println!("{}", session.summary_path().display());
    }
    Ok(())
}

fn run_log(cli: &Cli, session: &MonitorSession, action: LogCommand, retain_days: u32) -> Result<()> {
    let changelog = session.changelog();
    let today = Local::now().date_naive();

    match action {
        LogCommand::Tail { date, lines } => {
            let date = date.unwrap_or(today);
            let tail = changelog.tail(date, lines).context("Failed to read change log")?;
            print_tail(cli, &tail, &format!("No log for {}", date))?;
        }
        LogCommand::Recent { count } => {
            let recent = changelog
                .recent_events(today, count)
                .context("Failed to read change log")?;
            print_tail(cli, &recent, "No events today")?;
        }
        LogCommand::Prune { keep_days } => {
            let removed = session.prune_logs(keep_days.unwrap_or(retain_days))?;
            println!("Removed {} log files", removed);
        }
        LogCommand::Note { message } => {
            session.log_message(message.trim())?;
        }
        LogCommand::Dates => {
            let dates = changelog.list_dates().context("Failed to list change logs")?;
            if cli.output == OutputFormat::Json {
                println!("{}", serde_json::to_string(&dates)?);
            } else {
                for date in dates {
                    println!("{}", date);
                }
            }
        }
    }
    Ok(())
}

fn print_tail(cli: &Cli, tail: &LogTail, missing: &str) -> Result<()> {
    match (cli.output, tail) {
        (OutputFormat::Json, _) => println!("{}", serde_json::to_string(tail.lines())?),
        (_, LogTail::Missing) => println!("{}", missing),
        (_, LogTail::Lines(lines)) => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn print_text_record(record: &ChangeRecord, cli: &Cli) {
    let time_str = record.timestamp.format("%H:%M:%S");
    let event_type = match record.kind {
        ChangeKind::Created => "CREATED",
        ChangeKind::Modified => "MODIFIED",
        ChangeKind::Removed => "REMOVED",
        ChangeKind::Renamed => "RENAMED",
    };

    if cli.no_color {
        println!("[{}] {} {}", time_str, event_type, record.path.display());
    } else {
        let color = match record.kind {
            ChangeKind::Created => "\x1b[32m",  // Green
            ChangeKind::Modified => "\x1b[33m", // Yellow
            ChangeKind::Removed => "\x1b[31m",  // Red
            ChangeKind::Renamed => "\x1b[34m",  // Blue
        };
        println!("[{}] {}{}\x1b[0m {}", time_str, color, event_type, record.path.display());
    }
}

fn print_compact_record(record: &ChangeRecord) {
    let event_type = match record.kind {
        ChangeKind::Created => "C",
        ChangeKind::Modified => "M",
        ChangeKind::Removed => "D",
        ChangeKind::Renamed => "V",
    };

    println!("{} {}", event_type, record.relative_path.display());
}
