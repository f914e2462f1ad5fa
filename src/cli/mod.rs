pub mod console;
pub mod shutdown;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use console::run_console;
use tracing::level_filters::LevelFilter;

use crate::{
    config::{TrackerConfig, DEFAULT_ENDPOINT},
    utils::{
        dir::create_application_default_path, logging::enable_logging,
        runtime::single_thread_runtime,
    },
};

#[derive(Parser)]
#[command(name = "taskbeat", version, long_about = None)]
#[command(
    about = "Stopwatch that records your daily work time to a graph service",
    long_about = None
)]
struct Args {
    #[arg(long, env = "TASKBEAT_USERNAME", help = "Graph service account")]
    username: String,
    #[arg(long, env = "TASKBEAT_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(
        long = "graph",
        env = "TASKBEAT_GRAPH",
        help = "Graph the daily totals are written to"
    )]
    graph_name: String,
    #[arg(long, env = "TASKBEAT_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    #[arg(
        long,
        help = "Application directory. By default uses $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    log_console: bool,
    #[arg(long = "log-filter")]
    log: Option<LevelFilter>,
}

impl Args {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::new(&self.username, &self.password, &self.graph_name)
            .with_endpoint(&self.endpoint)
    }
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    let config = args.tracker_config();
    config.validate()?;

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(&app_dir.join("logs"), args.log, args.log_console)?;

    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(run_console(config));
    // Reading stdin occupies a blocking thread that never finishes on its own.
    runtime.shutdown_background();
    result
}
