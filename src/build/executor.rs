//! Concurrent shell command execution.
//!
//! A [`MultiCommand`] drains one shared queue with a fixed number of workers,
//! the calling thread being one of them. A failing command never stops the
//! rest of the queue; it only suppresses the final command and turns the
//! overall result into a failure.

use super::feedback::FeedbackAnalyzer;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::debug;

const PROGRESS_WIDTH: usize = 40;

/// Combined stdout/stderr of a finished shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub output: String,
}

/// Run `cmd` through the platform shell, interleaving stderr into stdout the
/// way the shell itself would.
pub fn run_and_capture(cmd: &str) -> CommandOutput {
    debug!(command = cmd, "running");
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(format!("({cmd}) 2>&1"));
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(format!("exec 2>&1\n{cmd}"));
        c
    };
    command.stdin(Stdio::null());

    match command.output() {
        Ok(out) => CommandOutput {
            success: out.status.success(),
            code: out.status.code(),
            output: String::from_utf8_lossy(&out.stdout).into_owned(),
        },
        Err(e) => CommandOutput {
            success: false,
            code: None,
            output: format!("failed to start shell for `{cmd}`: {e}\n"),
        },
    }
}

/// Available parallelism minus one for the initiating thread, at least 1.
pub fn worker_count() -> usize {
    thread::available_parallelism()
        .map_or(1, |n| n.get())
        .saturating_sub(1)
        .max(1)
}

struct Queue {
    pending: VecDeque<String>,
    done: u64,
}

pub struct MultiCommand {
    queue: Mutex<Queue>,
    output: Mutex<()>,
    failed: AtomicBool,
    final_command: Option<String>,
    label: String,
    workers: usize,
    progress: ProgressBar,
}

impl MultiCommand {
    pub fn new(
        commands: Vec<String>,
        final_command: Option<String>,
        label: impl Into<String>,
        workers: usize,
    ) -> Self {
        let label = label.into();
        let total = commands.len() as u64 + u64::from(final_command.is_some());
        let style = ProgressStyle::with_template(&format!(
            "{{bar:{PROGRESS_WIDTH}.green/white}} {{percent:>3}}% {{msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▒");
        let progress = ProgressBar::new(total)
            .with_style(style)
            .with_message(label.clone());

        Self {
            queue: Mutex::new(Queue {
                pending: commands.into(),
                done: 0,
            }),
            output: Mutex::new(()),
            failed: AtomicBool::new(false),
            final_command,
            label,
            workers: workers.max(1),
            progress,
        }
    }

    /// Run every queued command, then the final command if nothing failed.
    /// Returns true when all of them succeeded.
    pub fn run(self) -> bool {
        self.progress.tick();
        thread::scope(|scope| {
            for _ in 1..self.workers {
                scope.spawn(|| self.work());
            }
            self.work();
        });

        if !self.failed.load(Ordering::SeqCst)
            && let Some(cmd) = &self.final_command
        {
            let result = run_and_capture(cmd);
            self.complete(cmd, &result);
        }

        let failed = self.failed.load(Ordering::SeqCst);
        debug!(label = %self.label, completed = self.lock_queue().done, failed, "batch finished");
        self.progress.finish_and_clear();
        let bar = "█".repeat(PROGRESS_WIDTH);
        if failed {
            println!("{} {} - {}", bar.red(), "failed".red().bold(), self.label);
        } else {
            println!("{} {} - {}", bar.green(), "done".green().bold(), self.label);
        }
        !failed
    }

    fn work(&self) {
        loop {
            let Some(cmd) = self.lock_queue().pending.pop_front() else {
                break;
            };
            let result = run_and_capture(&cmd);
            self.complete(&cmd, &result);
        }
    }

    fn complete(&self, cmd: &str, result: &CommandOutput) {
        if !result.success {
            self.failed.fetch_or(true, Ordering::SeqCst);
        }
        let mut queue = self.lock_queue();
        queue.done += 1;

        let _out = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        self.progress.suspend(|| {
            print!("{}", result.output);
            if !result.success {
                let code = result
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                println!("{} `{}` exited with {}", "x".red(), cmd, code);
                if let Some(hint) = FeedbackAnalyzer::analyze(&result.output) {
                    println!("{} {}", "hint:".cyan().bold(), hint);
                }
            }
        });
        self.progress.inc(1);
        drop(queue);
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run `commands` one at a time.
pub fn run_commands(commands: Vec<String>, label: &str) -> bool {
    MultiCommand::new(commands, None, label, 1).run()
}

pub fn run_commands_parallel(commands: Vec<String>, label: &str) -> bool {
    MultiCommand::new(commands, None, label, worker_count()).run()
}

/// Compile in parallel, then link once every compile succeeded.
pub fn build_using(compile: Vec<String>, link: Option<String>, label: &str) -> bool {
    MultiCommand::new(compile, link, label, worker_count()).run()
}
