//! Single-flight admission gate (§5): when the model server cannot process
//! requests in parallel, the Forward subtask's upstream call is serialized
//! through a fair, cancellation-safe FIFO.
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct AdmissionGate {
    allow_parallel_requests: bool,
    semaphore: Semaphore,
}

impl AdmissionGate {
    pub fn new(allow_parallel_requests: bool) -> Self {
        Self {
            allow_parallel_requests,
            semaphore: Semaphore::new(1),
        }
    }

    /// Acquire the single permit, or return immediately if parallel requests
    /// are allowed. Dropping the returned guard (including via task
    /// cancellation while awaiting this call) always releases the permit --
    /// `tokio::sync::Semaphore::acquire` is itself cancel-safe, satisfying
    /// the §8 invariant that a cancelled Forward still frees the gate.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        if !self.allow_parallel_requests {
            Some(
                self.semaphore
                    .acquire()
                    .await
                    .expect("admission gate semaphore is never closed"),
            )
        } else {
            None
        }
    }
}
