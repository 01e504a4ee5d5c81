use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use console::style;
use switchboard::Controller;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use super::load_settings;

pub async fn handle_session(config: Option<&Path>, index: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config, index)?;
    let controller = Controller::from_settings(&settings)?;
    eprintln!(
        "{}",
        style("Enter one question per line. A blank line or 'exit' ends the session.").dim()
    );
    let stdin = BufReader::new(tokio::io::stdin());
    run_session(&controller, stdin, &mut std::io::stdout()).await
}

pub fn ends_session(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.eq_ignore_ascii_case("exit")
}

/// Answer each line of `input` until it ends or a line ends the session.
/// Each query is independent: nothing carries over between lines.
pub async fn run_session<R, W>(controller: &Controller, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut answered = 0usize;
    while let Some(line) = lines.next_line().await? {
        if ends_session(&line) {
            break;
        }
        debug!(query = %line.trim(), "session query");
        answered += 1;
        let result = controller.orchestrate(&line).await;
        writeln!(out, "{}", result.final_answer)?;
        out.flush()?;
    }
    info!(answered, "session ended");
    Ok(())
}
