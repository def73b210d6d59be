//! `carabiner decode`: decode message lines offline.

use std::io::{self, BufRead};

use anyhow::{bail, Context, Result};
use clap::Args;

use carabiner_protocol::Message;

use super::{render_json, render_text};

/// Arguments for `carabiner decode`.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Lines to decode. Reads stdin, one message per line, when omitted.
    pub lines: Vec<String>,

    /// Print `type key=value ...` instead of JSON.
    #[arg(long)]
    pub text: bool,
}

impl DecodeArgs {
    pub fn run(self) -> Result<()> {
        let lines = if self.lines.is_empty() {
            read_stdin()?
        } else {
            self.lines
        };

        let mut malformed = 0usize;
        for (index, line) in lines.iter().enumerate() {
            match Message::decode(line) {
                Ok(message) if self.text => println!("{}", render_text(&message)),
                Ok(message) => println!("{}", render_json(&message)?),
                Err(err) => {
                    malformed += 1;
                    eprintln!("line {}: {err}", index + 1);
                }
            }
        }

        if malformed > 0 {
            bail!("{malformed} of {} line(s) could not be decoded", lines.len());
        }
        Ok(())
    }
}

fn read_stdin() -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}
