//! Textual task-list parser.
//!
//! A model file is free-form text; only lines beginning with a decimal digit
//! carry tasks. A task line is
//!
//! ```text
//! <task_no> <pid> <ttype> <mem> <type-specific tail>
//! ```
//!
//! with the tail depending on the task type:
//!
//! ```text
//! start/fork_end/join   -> <next0>
//! end                   (nothing)
//! fork                  -> <next0> [<_> <_> -> <next1>]
//! calc                  <weight> -> <next0>
//! com                   <weight> -- <dest> [-> <next0> | <_> <_> -> <next0>]
//! ```
//!
//! A fork without a second branch encodes an empty fork (`next1 = 0`); a com
//! with `dest = 0` is a broadcast and carries no routing pair. Task numbers
//! index a table bounded by the highest number seen; the lowest number is the
//! head task.

use std::io::BufRead;

use crate::error::{PpmError, Result};

// ── Task table ─────────────────────────────────────────────────────

/// Task type codes as they appear in the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Start,
    End,
    Fork,
    Join,
    Calc,
    Com,
    ForkEnd,
}

impl TaskType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Start),
            1 => Some(Self::End),
            2 => Some(Self::Fork),
            3 => Some(Self::Join),
            4 => Some(Self::Calc),
            5 => Some(Self::Com),
            10 => Some(Self::ForkEnd),
            _ => None,
        }
    }
}

/// One parsed task. `next[0]` is the common successor (absent for `end`),
/// `next[1]` is the second fork branch (0 = empty fork).
#[derive(Debug, Clone)]
pub struct ParsedTask {
    pub pid: i32,
    pub ttype: TaskType,
    pub mem: u64,
    /// Weight of calc/com tasks; 0.0 otherwise.
    pub weight: f64,
    /// Destination of com tasks; 0 = broadcast.
    pub dest: u64,
    pub next: [usize; 2],
    /// Source line number, kept for diagnostics.
    pub line: usize,
}

/// The parsed model: a table of tasks indexed by task number.
#[derive(Debug)]
pub struct TaskTable {
    tasks: Vec<Option<ParsedTask>>,
    head: usize,
}

impl TaskTable {
    /// Task number of the head (start) task.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Size of the task table (highest task number + 1).
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task by number. A hole in the table (a task number that was
    /// never declared but is referenced) is a structural error.
    pub fn task(&self, no: usize) -> Result<&ParsedTask> {
        self.tasks
            .get(no)
            .and_then(|t| t.as_ref())
            .ok_or_else(|| PpmError::structural(format!("reference to undeclared task {}", no)))
    }
}

// ── Parsing ────────────────────────────────────────────────────────

fn parse_err(line: usize, reason: impl Into<String>) -> PpmError {
    PpmError::Parse {
        line,
        reason: reason.into(),
    }
}

fn expect_arrow(tok: Option<&&str>, line: usize) -> Result<()> {
    match tok {
        Some(&"->") => Ok(()),
        _ => Err(parse_err(line, "expected '->'")),
    }
}

fn next_num<T: std::str::FromStr>(
    tok: Option<&&str>,
    line: usize,
    what: &str,
) -> Result<T> {
    tok.ok_or_else(|| parse_err(line, format!("missing {}", what)))?
        .parse::<T>()
        .map_err(|_| parse_err(line, format!("invalid {}", what)))
}

/// Parse a model file into a task table.
///
/// Two scans over the input: the first determines the task-number range
/// (lowest number = head, highest bounds the table), the second fills the
/// table. Lines not led by a decimal digit are ignored.
pub fn parse_model<R: BufRead>(src: R) -> Result<TaskTable> {
    let mut lines = Vec::new();
    for line in src.lines() {
        lines.push(line?);
    }

    // Scan 1: task-number bounds.
    let mut tno_min = usize::MAX;
    let mut tno_max = 0usize;
    for line in &lines {
        if !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let tno: usize = line
            .split_whitespace()
            .next()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        tno_min = tno_min.min(tno);
        tno_max = tno_max.max(tno);
    }
    if tno_min > tno_max {
        return Err(parse_err(0, "no task lines found"));
    }

    let table_len = tno_max + 1;
    let mut tasks: Vec<Option<ParsedTask>> = vec![None; table_len];

    // Scan 2: fill the table.
    for (lno0, line) in lines.iter().enumerate() {
        let lno = lno0 + 1;
        if !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let toks: Vec<&str> = line.split_whitespace().collect();
        let mut it = toks.iter();

        let tno: usize = next_num(it.next(), lno, "task number")?;
        let pid: i32 = next_num(it.next(), lno, "process id")?;
        let tcode: u32 = next_num(it.next(), lno, "task type")?;
        let mem: u64 = next_num(it.next(), lno, "memory requirement")?;

        let ttype = TaskType::from_code(tcode)
            .ok_or_else(|| parse_err(lno, format!("impossible task type {}", tcode)))?;

        let mut task = ParsedTask {
            pid,
            ttype,
            mem,
            weight: 0.0,
            dest: 0,
            next: [0, 0],
            line: lno,
        };

        match ttype {
            TaskType::Start | TaskType::ForkEnd | TaskType::Join => {
                expect_arrow(it.next(), lno)?;
                task.next[0] = next_num(it.next(), lno, "next task")?;
            }

            TaskType::End => {}

            TaskType::Fork => {
                expect_arrow(it.next(), lno)?;
                task.next[0] = next_num(it.next(), lno, "next task")?;
                // Optional second branch: <_> <_> -> <next1>. Absent means
                // an empty fork.
                if it.next().is_some() {
                    let _ = it.next();
                    expect_arrow(it.next(), lno)?;
                    task.next[1] = next_num(it.next(), lno, "second branch")?;
                }
            }

            TaskType::Calc => {
                task.weight = next_num::<f64>(it.next(), lno, "weight")?;
                expect_arrow(it.next(), lno)?;
                task.next[0] = next_num(it.next(), lno, "next task")?;
            }

            TaskType::Com => {
                task.weight = next_num::<f64>(it.next(), lno, "weight")?;
                match it.next() {
                    Some(&"--") => {}
                    _ => return Err(parse_err(lno, "expected '--'")),
                }
                task.dest = next_num(it.next(), lno, "destination")?;
                if task.dest != 0 {
                    // Routed com carries a routing pair before the arrow.
                    let _ = it.next();
                    let _ = it.next();
                }
                expect_arrow(it.next(), lno)?;
                task.next[0] = next_num(it.next(), lno, "next task")?;
            }
        }

        if tno >= table_len {
            return Err(parse_err(lno, format!("task number {} out of range", tno)));
        }
        if task.next[0] >= table_len || task.next[1] >= table_len {
            return Err(parse_err(lno, "next link out of range"));
        }

        tasks[tno] = Some(task);
    }

    Ok(TaskTable {
        tasks,
        head: tno_min,
    })
}

// ── Tests ──────────────────────────────────────────────────────────
