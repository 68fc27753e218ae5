//! Snapshot undo history for the in-memory host.
//!
//! The state is captured before the first mutation of a step and pushed
//! when the step is committed, so everything between two commits undoes as
//! one action, no matter how many host calls it took.

/// Undo/redo stacks of whole-state snapshots.
#[derive(Debug, Clone)]
pub struct UndoHistory<S> {
    undo_stack: Vec<S>,
    redo_stack: Vec<S>,
    /// Maximum undo depth.
    max_depth: usize,
    /// State captured at the start of the open step.
    pending: Option<S>,
}

impl<S: Clone> UndoHistory<S> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth,
            pending: None,
        }
    }

    /// Record that `current` is about to change. Only the first call of a
    /// step takes a snapshot.
    pub fn touch(&mut self, current: &S) {
        if self.pending.is_none() {
            self.pending = Some(current.clone());
        }
    }

    /// Close the open step. Returns false when nothing changed since the
    /// last commit.
    pub fn commit(&mut self) -> bool {
        let Some(before) = self.pending.take() else {
            return false;
        };
        self.undo_stack.push(before);
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        true
    }

    /// Step back. An open step is committed first. Returns the state to
    /// restore.
    pub fn undo(&mut self, current: &S) -> Option<S> {
        self.commit();
        let before = self.undo_stack.pop()?;
        self.redo_stack.push(current.clone());
        Some(before)
    }

    /// Re-apply the last undone step. Returns the state to restore.
    pub fn redo(&mut self, current: &S) -> Option<S> {
        let after = self.redo_stack.pop()?;
        self.undo_stack.push(current.clone());
        Some(after)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.pending.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Committed steps.
    pub fn depth(&self) -> usize {
        self.undo_stack.len()
    }
}
