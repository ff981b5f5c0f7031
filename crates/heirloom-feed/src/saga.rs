use tracing::{debug, info};

/// Ordered record of completed steps of a multi-call write, each paired with
/// the action that undoes it.
///
/// Steps run against independent backend calls with no shared transaction.
/// On failure the caller drains [`Saga::unwind`] and runs the compensations,
/// newest first; on success [`Saga::commit`] discards them.
#[derive(Debug)]
pub struct Saga<C> {
    name: &'static str,
    completed: Vec<(&'static str, C)>,
}

impl<C> Saga<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            completed: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Record that `step` succeeded and how to undo it.
    pub fn record(&mut self, step: &'static str, compensation: C) {
        debug!("saga {}: step '{}' done", self.name, step);
        self.completed.push((step, compensation));
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Compensations in reverse completion order.
    pub fn unwind(self) -> impl Iterator<Item = (&'static str, C)> {
        info!(
            "saga {}: rolling back {} step(s)",
            self.name,
            self.completed.len()
        );
        self.completed.into_iter().rev()
    }

    pub fn commit(self) {
        debug!("saga {}: committed {} step(s)", self.name, self.completed.len());
    }
}
