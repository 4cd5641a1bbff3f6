// SPDX-License-Identifier: GPL-3.0-only

//! The person at the terminal

use std::io::{self, BufRead, Write};

use rpassword::prompt_password;

/// Source of typed confirmations and secrets.
pub trait Operator {
    /// Print `prompt` and read one visible line, without the trailing newline.
    fn read_line(&self, prompt: &str) -> io::Result<String>;

    /// Print `prompt` and read one line with echo disabled.
    fn read_secret(&self, prompt: &str) -> io::Result<String>;
}

/// Reads from the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalOperator;

impl Operator for TerminalOperator {
    fn read_line(&self, prompt: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "standard input closed",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_secret(&self, prompt: &str) -> io::Result<String> {
        prompt_password(prompt)
    }
}
