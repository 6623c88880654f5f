use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use meterlog_rs::config::Config;
use meterlog_rs::logging::{init_logger_with_default, log_info};
use meterlog_rs::registry::{self, Registry};
use meterlog_rs::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "meterlog")]
#[command(about = "Buffering data logger for utility meters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the logger until interrupted
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Drive all loops cooperatively on one thread
        #[arg(long)]
        single_thread: bool,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Validate a configuration and print the resulting plan
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the built-in example configuration
    DumpConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            single_thread,
            duration_secs,
        } => {
            let config = Config::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            init_logger_with_default(config.log_level.as_deref().unwrap_or("info"));

            let runtime = if single_thread {
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
            } else {
                tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
            }
            .context("building tokio runtime")?;
            runtime.block_on(run(config, duration_secs))
        }
        Commands::Check { config } => {
            init_logger_with_default("warn");
            let config = Config::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let registry = Registry::from_config(&config).context("building runtime objects")?;

            println!(
                "Configuration OK: {} meters, {} channels",
                registry.groups().len(),
                registry.senders().len()
            );
            for group in registry.groups() {
                println!(
                    "  meter {}: read every {}s, {} channels",
                    group.name(),
                    group.interval_secs(),
                    group.channels().len()
                );
            }
            for sender in registry.senders() {
                let channel = sender.transmitter.channel();
                println!(
                    "  channel {} ({}) -> {}, send every {}s",
                    channel.name(),
                    channel.uuid(),
                    sender.transmitter.backend(),
                    sender.send_interval_secs
                );
            }
            Ok(())
        }
        Commands::DumpConfig => {
            println!("{}", Config::example().to_json_pretty()?);
            Ok(())
        }
    }
}

async fn run(config: Config, duration_secs: Option<u64>) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config).context("building runtime objects")?;
    let channels = registry.channel_handles();
    log_info(&format!(
        "Starting {} meters, {} channels",
        registry.groups().len(),
        registry.senders().len()
    ));

    let scheduler = Scheduler::start(registry);
    match duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            log_info("Interrupted, shutting down");
        }
    }
    scheduler.shutdown().await;

    let stats = registry::export_stats_json(&channels).context("exporting statistics")?;
    println!("{stats}");
    Ok(())
}
