//! CLI for powertrace: sample GPU power and summarize energy use.

mod commands;

use clap::{Parser, Subcommand};
use env_logger::Env;

#[derive(Parser)]
#[command(name = "powertrace")]
#[command(about = "powertrace: sample GPU power and summarize energy use")]
#[command(version = powertrace_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a telemetry log: JSON report, CSV export, plots, optional archive
    Analyze {
        /// Telemetry log to read (JSON lines, one object per sample)
        #[arg(long)]
        src: String,

        /// Keep only this GPU's records (no-op for logs without gpu_index)
        #[arg(long)]
        gpu_index: Option<u32>,

        /// Output directory (default: plots/ next to the log)
        #[arg(long)]
        out_dir: Option<String>,

        /// Bundle all outputs into an archive (gzip-compressed tar, not zip)
        #[arg(long)]
        zip: bool,

        /// Archive file name; the file is always .tar.gz (default: <log stem>-telemetry-plots.tar.gz)
        #[arg(long)]
        zip_name: Option<String>,

        /// Plot x-axis: elapsed seconds (default) or wall-clock time
        #[arg(long, default_value = "elapsed", value_parser = ["elapsed", "time"])]
        x_axis: String,
    },

    /// Sample GPU/CPU power into a JSON-lines log until Ctrl+C
    Monitor {
        /// GPU index to sample
        #[arg(long, default_value = "0")]
        gpu: u32,

        /// Sample interval (e.g. "500ms", "5s", "1m")
        #[arg(long, default_value = "5s")]
        interval: String,

        /// Log file to append to
        #[arg(long, default_value = "logs/power_log.jsonl")]
        log_path: String,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            src,
            gpu_index,
            out_dir,
            zip,
            zip_name,
            x_axis,
        } => commands::analyze::run(commands::analyze::AnalyzeCommandConfig {
            src: &src,
            gpu_index,
            out_dir: out_dir.as_deref(),
            zip,
            zip_name: zip_name.as_deref(),
            x_axis: &x_axis,
        }),
        Commands::Monitor {
            gpu,
            interval,
            log_path,
        } => commands::monitor::run(gpu, &interval, &log_path),
    }
}
