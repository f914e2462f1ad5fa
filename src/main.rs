use anyhow::Result;
use taskbeat::cli::run_cli;
use tracing::error;

fn main() -> Result<()> {
    run_cli().inspect_err(|e| {
        error!("Error running taskbeat {e:?}");
    })?;
    Ok(())
}
