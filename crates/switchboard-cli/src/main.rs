use anyhow::Result;

mod cli;
mod commands;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    cli::cli().await
}
