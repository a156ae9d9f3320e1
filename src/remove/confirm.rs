use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::error::AppError;

/// Invalid answers tolerated before giving up.
pub const MAX_INVALID_ANSWERS: usize = 3;

/// Source of operator answers for the confirmation prompt.
pub trait Confirm: Send {
    /// Show `prompt` and read one line. `Ok(None)` means end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Invalid,
}

fn parse_answer(line: &str) -> Answer {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "" | "n" | "no" => Answer::No,
        _ => Answer::Invalid,
    }
}

/// Ask for a yes/no confirmation, defaulting to No.
///
/// Empty input and end of input decline. Unrecognised answers re-prompt up
/// to `MAX_INVALID_ANSWERS` times, then fail with an internal error.
pub fn confirm<C: Confirm + ?Sized>(source: &mut C, summary: &str) -> Result<bool, AppError> {
    let mut prompt = format!("{}\nProceed? [y/N]: ", summary);
    for _ in 0..MAX_INVALID_ANSWERS {
        let line = source.read_line(&prompt)?.unwrap_or_default();
        match parse_answer(&line) {
            Answer::Yes => return Ok(true),
            Answer::No => return Ok(false),
            Answer::Invalid => {
                debug!(answer = %line.trim(), "unrecognised confirmation answer");
                prompt = "Please answer 'y' or 'n' [y/N]: ".to_string();
            }
        }
    }
    Err(AppError::internal(format!(
        "no valid response after {} attempts",
        MAX_INVALID_ANSWERS
    ))
    .with_suggestion("Answer 'y' or 'n', or pass --force to skip confirmation"))
}

/// Reads answers from the terminal; prompts go to stderr.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, AppError> {
        let mut stderr = io::stderr();
        let io_error = |err: io::Error| {
            AppError::internal("failed to read confirmation").with_cause(err)
        };
        write!(stderr, "{}", prompt).map_err(io_error)?;
        stderr.flush().map_err(io_error)?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).map_err(io_error)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Replays pre-supplied answers; runs out as end of input.
#[cfg(test)]
pub struct ScriptedConfirm {
    answers: std::collections::VecDeque<String>,
    pub prompts: Vec<String>,
}

#[cfg(test)]
impl ScriptedConfirm {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Confirm for ScriptedConfirm {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, AppError> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front())
    }
}
