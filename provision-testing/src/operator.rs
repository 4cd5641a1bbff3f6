// SPDX-License-Identifier: GPL-3.0-only

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use provision_sys::Operator;

/// Replays canned answers; running out of answers reads as end of input.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    lines: Mutex<VecDeque<String>>,
    secrets: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An operator who types the confirmation token and nothing else.
    pub fn confirming() -> Self {
        Self::new().line("YES")
    }

    pub fn line(self, answer: &str) -> Self {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push_back(answer.to_string());
        }
        self
    }

    pub fn secret(self, answer: &str) -> Self {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.push_back(answer.to_string());
        }
        self
    }

    /// Every prompt shown so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    fn next(&self, queue: &Mutex<VecDeque<String>>, prompt: &str) -> io::Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        queue
            .lock()
            .map_err(|_| io::Error::other("operator state poisoned"))?
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer left"))
    }
}

impl Operator for ScriptedOperator {
    fn read_line(&self, prompt: &str) -> io::Result<String> {
        self.next(&self.lines, prompt)
    }

    fn read_secret(&self, prompt: &str) -> io::Result<String> {
        self.next(&self.secrets, prompt)
    }
}
