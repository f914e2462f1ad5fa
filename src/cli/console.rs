use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{Duration, Local};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::TrackerConfig, sync::Stopwatch};

use super::shutdown::detect_shutdown;

const HELP: &str = "Commands: <enter>/toggle, start, stop, status, help, quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Toggle,
    Start,
    Stop,
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "t" | "toggle" => Ok(Self::Toggle),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "s" | "status" => Ok(Self::Status),
            "h" | "help" | "?" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(anyhow!("Unknown command {other:?}. {HELP}")),
        }
    }
}

/// Drives a stopwatch from line commands on stdin until quit, end of input or Ctrl-C.
pub async fn run_console(config: TrackerConfig) -> Result<()> {
    let mut stopwatch = Stopwatch::new(&config, Local)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(detect_shutdown(shutdown.clone()));

    let elapsed = stopwatch.initialize().await?;
    println!("{}: {}", stopwatch.graph_name(), format_elapsed(elapsed));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match line.parse::<ConsoleCommand>() {
            Ok(ConsoleCommand::Quit) => break,
            Ok(command) => execute(&mut stopwatch, command).await,
            Err(e) => println!("{e}"),
        }
    }

    shutdown.cancel();
    let splits = stopwatch.shutdown().await;
    info!("Exiting, recorded {} split(s) on the way out", splits.len());
    Ok(())
}

async fn execute(stopwatch: &mut Stopwatch<Local>, command: ConsoleCommand) {
    let result = match command {
        ConsoleCommand::Toggle => stopwatch.toggle().await.map(|_| ()),
        ConsoleCommand::Start => stopwatch.start(),
        ConsoleCommand::Stop => stopwatch.stop().await.map(|_| ()),
        ConsoleCommand::Help => {
            println!("{HELP}");
            return;
        }
        ConsoleCommand::Status | ConsoleCommand::Quit => Ok(()),
    };

    if let Err(e) = result {
        warn!("Rejected {command:?}: {e}");
        println!("{e}");
    }

    let syncing = stopwatch.subscribe_sync().borrow().in_progress();
    println!(
        "{} {}{}",
        format_elapsed(stopwatch.elapsed()),
        stopwatch.run_state(),
        if syncing { " (syncing)" } else { "" }
    );
}

/// `HH:MM:SS`, hours are not wrapped.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        seconds % 3600 / 60,
        seconds % 60
    )
}
