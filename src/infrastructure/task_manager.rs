use tokio::task::JoinHandle;

/// Background tasks belonging to one STOMP session (the heart-beat writer).
/// Aborted together when the session ends. The socket bridge tasks are not
/// tracked here; they stop on their own once the transport closes.
pub struct TaskManager {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Track a task spawned elsewhere
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.retain(|(_, h)| !h.is_finished());
        self.handles.push((name, handle));
    }

    /// Abort all tasks without waiting
    pub fn abort_all(&mut self) {
        for (name, handle) in self.handles.drain(..) {
            if !handle.is_finished() {
                tracing::debug!("Aborting {} task", name);
                handle.abort();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort_all();
    }
}
