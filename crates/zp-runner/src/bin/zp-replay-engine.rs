//! Replays a recorded transcript as if it were a live engine.
//!
//! Prints the prompt, then answers each line read from stdin with the next
//! recorded block. Exits when the transcript or stdin runs out. Used to
//! exercise the subprocess runner without a real interpreter.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use zp_compare::Transcript;

#[derive(Parser, Debug)]
#[command(name = "zp-replay-engine", about = "Serve a recorded transcript over stdin/stdout")]
struct Args {
    /// Transcript JSON file to replay
    transcript: PathBuf,

    /// Opening text printed before the first prompt
    #[arg(long, default_value = "")]
    banner: String,

    /// Delay before each response, in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Exit without answering after this many commands
    #[arg(long)]
    crash_after: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let text = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("failed to read {}", args.transcript.display()))?;
    let transcript: Transcript = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", args.transcript.display()))?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    write!(stdout, "{}\n>", args.banner)?;
    stdout.flush()?;

    let mut blocks = transcript.blocks.iter();
    for (answered, line) in stdin.lock().lines().enumerate() {
        let Ok(_command) = line else {
            break;
        };
        if args.crash_after.is_some_and(|limit| answered >= limit) {
            break;
        }
        let Some(block) = blocks.next() else {
            break;
        };
        if args.delay_ms > 0 {
            thread::sleep(Duration::from_millis(args.delay_ms));
        }

        let text = block.text();
        let prompted = text.trim_end().lines().last().is_some_and(|l| l.trim() == ">");
        if prompted {
            write!(stdout, "\n{text}")?;
        } else {
            write!(stdout, "\n{text}\n>")?;
        }
        stdout.flush()?;
    }
    Ok(())
}
