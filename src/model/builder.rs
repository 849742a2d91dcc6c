//! Building the PPM IR from a parsed task table.
//!
//! The builder walks the task table from the start task. Contiguous
//! calc/com tasks of one process collapse into one raw segment; forks
//! become inosculation vertices whose branches must terminate at the same
//! join; fork-end tasks are transparent; join and end terminate the
//! current stem. Input inconsistencies are structural errors.

use crate::error::{PpmError, Result};
use crate::parser::{TaskTable, TaskType};
use crate::segment::{RawSegment, RawSegmentStore, SegmentRef, Task, TaskKind};

use super::{Model, ParentSlot, VertexId};

/// Builder configuration: optional caps on task weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub cap_calc: Option<f64>,
    pub cap_com: Option<f64>,
}

struct GraphBuilder<'a> {
    table: &'a TaskTable,
    opts: BuildOptions,
    raw: &'a mut RawSegmentStore,
    model: Model,
    /// Current task number.
    cursor: usize,
}

/// Build the IR from a parsed task table. The created raw segments are
/// registered with `raw`; the model head is fully evaluated on return.
pub fn build_model(
    table: &TaskTable,
    opts: BuildOptions,
    raw: &mut RawSegmentStore,
) -> Result<Model> {
    let head_task = table.task(table.head())?;
    if head_task.ttype != TaskType::Start {
        return Err(PpmError::structural(format!(
            "head task {} is not a start task",
            table.head()
        )));
    }
    if head_task.next[0] == 0 {
        return Err(PpmError::structural("start task has no successor"));
    }

    let mut builder = GraphBuilder {
        table,
        opts,
        raw,
        model: Model::new(),
        cursor: head_task.next[0],
    };

    let Some(head) = builder.build_stem(ParentSlot::Head)? else {
        return Err(PpmError::structural("model contains no tasks"));
    };
    let mut model = builder.model;
    model.eval_recursive(head, true);

    tracing::debug!(
        vertices = model.vertex_count_total(),
        segments = model.vertex_counts()[0],
        "PPM tree built"
    );
    Ok(model)
}

impl GraphBuilder<'_> {
    /// Build the stem starting at the current task into `slot`. Returns the
    /// first vertex of the stem, or `None` when the stem is empty (the
    /// cursor sits on a join or end task).
    fn build_stem(&mut self, slot: ParentSlot) -> Result<Option<VertexId>> {
        let task = self.table.task(self.cursor)?;
        match task.ttype {
            TaskType::Fork => self.create_inosculation(slot).map(Some),
            TaskType::Calc | TaskType::Com => self.create_segment(slot).map(Some),

            TaskType::ForkEnd => {
                // Transparent.
                self.cursor = task.next[0];
                self.build_stem(slot)
            }

            TaskType::Join | TaskType::End => Ok(None),

            TaskType::Start => Err(PpmError::structural(format!(
                "unexpected start task {} inside the graph",
                self.cursor
            ))),
        }
    }

    /// Collapse the contiguous calc/com run at the cursor into one segment
    /// vertex, then continue the stem behind it.
    fn create_segment(&mut self, slot: ParentSlot) -> Result<VertexId> {
        let pid = self.table.task(self.cursor)?.pid;
        let mut seg = RawSegment::new();

        loop {
            let task = self.table.task(self.cursor)?;
            let kind = match task.ttype {
                TaskType::Calc => TaskKind::Calc,
                TaskType::Com => TaskKind::Com,
                _ => break,
            };
            if task.pid != pid {
                return Err(PpmError::structural(format!(
                    "task {} has pid {} but its segment started with pid {}",
                    self.cursor, task.pid, pid
                )));
            }

            let cap = match kind {
                TaskKind::Calc => self.opts.cap_calc,
                TaskKind::Com => self.opts.cap_com,
            };
            let weight = cap.map_or(task.weight, |c| task.weight.min(c));
            seg.put(Task { kind, weight })?;

            self.cursor = task.next[0];
        }
        seg.eval();

        let sid = self.raw.insert(seg);
        let cont = self.model.add_container(SegmentRef::Raw(sid), pid);
        let v = self.model.create_segment_vertex(cont, slot);

        self.build_stem(ParentSlot::Np(v))?;
        Ok(v)
    }

    /// Build an inosculation vertex from the fork at the cursor. Both
    /// branches must terminate at the same join; the stem continues behind
    /// that join. An empty fork (no second branch) is transparent.
    fn create_inosculation(&mut self, slot: ParentSlot) -> Result<VertexId> {
        let fork = self.table.task(self.cursor)?.clone();
        let fork_no = self.cursor;

        if fork.next[1] == 0 {
            return self.skip_empty_fork(&fork, fork_no, slot);
        }

        let v = self.model.create_inosculation_vertex(slot);

        self.cursor = fork.next[0];
        let pp = self.build_stem(ParentSlot::Pp(v))?;
        if pp.is_none() {
            return Err(PpmError::structural(format!(
                "fork {}: parent branch is empty",
                fork_no
            )));
        }
        let parent_join = self.cursor;

        self.cursor = fork.next[1];
        let cp = self.build_stem(ParentSlot::Cp(v))?;
        if cp.is_none() {
            return Err(PpmError::structural(format!(
                "fork {}: child branch is empty",
                fork_no
            )));
        }

        if parent_join != self.cursor {
            return Err(PpmError::structural(format!(
                "fork {}: branches don't meet (parent join {}, child join {})",
                fork_no, parent_join, self.cursor
            )));
        }

        let join = self.table.task(parent_join)?;
        if join.ttype != TaskType::Join {
            return Err(PpmError::structural(format!(
                "fork {}: branches terminate at task {} which is not a join",
                fork_no, parent_join
            )));
        }
        self.cursor = join.next[0];
        self.build_stem(ParentSlot::Np(v))?;
        Ok(v)
    }

    /// An empty fork contributes nothing: its lone branch runs to the
    /// fork's join, which is then skipped, and the continuation extends
    /// the same stem.
    fn skip_empty_fork(
        &mut self,
        fork: &crate::parser::ParsedTask,
        fork_no: usize,
        slot: ParentSlot,
    ) -> Result<VertexId> {
        self.cursor = fork.next[0];
        let fork_end = self.table.task(self.cursor)?;
        if fork_end.ttype != TaskType::ForkEnd {
            return Err(PpmError::structural(format!(
                "empty fork {} is not followed by a fork_end",
                fork_no
            )));
        }
        if fork_end.pid != fork.pid {
            return Err(PpmError::structural(format!(
                "empty fork {}: fork_end pid {} differs from fork pid {}",
                fork_no, fork_end.pid, fork.pid
            )));
        }
        self.cursor = fork_end.next[0];

        let branch = self.build_stem(slot)?;

        // The branch stopped at the fork's join; skip it.
        let join = self.table.task(self.cursor)?;
        if join.ttype != TaskType::Join {
            return Err(PpmError::structural(format!(
                "empty fork {}: branch does not terminate at a join",
                fork_no
            )));
        }
        self.cursor = join.next[0];

        match branch {
            Some(b) => {
                // Continue the stem at the branch's tail.
                let mut tail = b;
                while let Some(n) = self.model.np(tail) {
                    tail = n;
                }
                self.build_stem(ParentSlot::Np(tail))?;
                Ok(b)
            }
            None => self
                .build_stem(slot)?
                .ok_or_else(|| PpmError::structural(format!("empty fork {} leads nowhere", fork_no))),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
