//! Queue of out-of-band directives awaiting the next pass.

use chrono::{DateTime, Utc};
use lockstep_types::{CommandKind, InboundDirective, PendingCommand};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
pub struct CommandChannel {
    queue: Mutex<VecDeque<PendingCommand>>,
}

impl CommandChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: PendingCommand) {
        debug!(kind = %command.kind, "command queued");
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(command);
    }

    /// Validates a wire directive and queues it.
    pub fn push_directive(
        &self,
        directive: InboundDirective,
        received_at: DateTime<Utc>,
    ) -> lockstep_types::Result<CommandKind> {
        let command = PendingCommand::from_directive(directive, received_at)?;
        let kind = command.kind;
        self.push(command);
        Ok(kind)
    }

    /// Removes and returns every queued command, oldest first.
    pub fn drain(&self) -> Vec<PendingCommand> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Puts commands back ahead of anything queued since they were drained.
    pub fn requeue_front(&self, commands: Vec<PendingCommand>) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        for command in commands.into_iter().rev() {
            queue.push_front(command);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
