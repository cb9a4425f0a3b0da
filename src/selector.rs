//! Interactive task menu.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    ExtractFaces,
    Training,
    Filter,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::ExtractFaces, Task::Training, Task::Filter];

    pub fn name(self) -> &'static str {
        match self {
            Task::ExtractFaces => "Extract Faces",
            Task::Training => "Training",
            Task::Filter => "Filter",
        }
    }

    pub fn needs_detector(self) -> bool {
        matches!(self, Task::ExtractFaces | Task::Filter)
    }

    pub fn needs_recognizer(self) -> bool {
        matches!(self, Task::Training | Task::Filter)
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line).context("reading answer")? == 0 {
        bail!("no answer given (end of input)");
    }
    Ok(line.trim().to_string())
}

/// Show the menu until a valid choice is entered. Accepts the number or the
/// task name, case-insensitively.
pub fn choose_task<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> Result<Task> {
    loop {
        writeln!(out, "Please choose program to run!")?;
        for (i, task) in Task::ALL.iter().enumerate() {
            writeln!(out, "  {}) {}", i + 1, task.name())?;
        }
        write!(out, "> ")?;
        out.flush()?;

        let answer = read_answer(input)?;
        let picked = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| Task::ALL.get(i).copied())
            .or_else(|| {
                Task::ALL
                    .into_iter()
                    .find(|t| t.name().eq_ignore_ascii_case(&answer))
            });
        match picked {
            Some(task) => return Ok(task),
            None => writeln!(out, "Unknown choice: {:?}", answer)?,
        }
    }
}

/// Ask a free-text path question; repeats on empty input.
pub fn prompt_path<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> Result<PathBuf> {
    loop {
        write!(out, "{} ", question)?;
        out.flush()?;
        let answer = read_answer(input)?;
        if !answer.is_empty() {
            return Ok(PathBuf::from(answer));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_choose_by_number_and_name() -> Result<()> {
        let mut out = Vec::new();
        assert_eq!(choose_task(&mut Cursor::new("2\n"), &mut out)?, Task::Training);
        assert_eq!(choose_task(&mut Cursor::new("filter\n"), &mut out)?, Task::Filter);
        assert!(String::from_utf8_lossy(&out).contains("1) Extract Faces"));
        Ok(())
    }

    #[test]
    fn test_choose_retries_on_bad_input() -> Result<()> {
        let mut out = Vec::new();
        let task = choose_task(&mut Cursor::new("0\nfoo\n1\n"), &mut out)?;
        assert_eq!(task, Task::ExtractFaces);
        assert_eq!(String::from_utf8_lossy(&out).matches("Unknown choice").count(), 2);
        Ok(())
    }

    #[test]
    fn test_choose_fails_on_eof() {
        let mut out = Vec::new();
        assert!(choose_task(&mut Cursor::new(""), &mut out).is_err());
    }

    #[test]
    fn test_prompt_path() -> Result<()> {
        let mut out = Vec::new();
        let p = prompt_path(&mut Cursor::new("\n  /photos/in \n"), &mut out, "source?")?;
        assert_eq!(p, PathBuf::from("/photos/in"));
        Ok(())
    }
}
