use std::sync::Arc;

use tracing::debug;

use crate::error::{BackendError, ResourceKind};
use crate::native::{NativeDevice, QueryHandle, QueryKind};
use crate::stats::BackendStats;

/// An event query checked out of a [`QueryPool`].
///
/// Not `Clone`: the holder is the only owner until the query is handed back with
/// [`QueryPool::free`].
#[derive(Debug, PartialEq, Eq)]
pub struct PooledQuery(QueryHandle);

impl PooledQuery {
    pub fn handle(&self) -> QueryHandle {
        self.0
    }
}

/// Freelist of event queries used for CPU/GPU synchronization.
#[derive(Debug)]
pub struct QueryPool {
    free: Vec<QueryHandle>,
    stats: Arc<BackendStats>,
}

impl QueryPool {
    pub fn new(stats: Arc<BackendStats>) -> Self {
        Self {
            free: Vec::new(),
            stats,
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn allocate<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
    ) -> Result<PooledQuery, BackendError> {
        if let Some(handle) = self.free.pop() {
            self.stats.inc_queries_reused();
            return Ok(PooledQuery(handle));
        }

        let handle = device
            .create_query(QueryKind::Event)
            .map_err(|err| BackendError::creation(ResourceKind::Query, err))?;
        self.stats.inc_queries_created();
        debug!(query = handle.raw(), "created event query");
        Ok(PooledQuery(handle))
    }

    /// Return `query` to the pool. The native object stays alive for the next `allocate`.
    pub fn free(&mut self, query: PooledQuery) {
        self.free.push(query.0);
    }

    /// Destroy every pooled native query. Queries still checked out are the holder's to free.
    pub fn release_all<Dev: NativeDevice>(&mut self, device: &mut Dev) {
        for handle in self.free.drain(..) {
            device.release_query(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::{NativeCall, RecordingDevice};
    use crate::native::{BehaviorFlags, NativeError};

    fn pool() -> QueryPool {
        QueryPool::new(Arc::new(BackendStats::new()))
    }

    fn device() -> RecordingDevice {
        RecordingDevice::new(false, BehaviorFlags::HARDWARE_VERTEX_PROCESSING)
    }

    #[test]
    fn freed_query_is_reused_without_native_creation() {
        let mut pool = pool();
        let mut device = device();

        let q = pool.allocate(&mut device).unwrap();
        let handle = q.handle();
        pool.free(q);
        let again = pool.allocate(&mut device).unwrap();
        assert_eq!(again.handle(), handle);
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::CreateQuery(..))),
            1
        );

        let snap = pool.stats.snapshot();
        assert_eq!((snap.queries_created, snap.queries_reused), (1, 1));
    }

    #[test]
    fn outstanding_queries_are_distinct() {
        let mut pool = pool();
        let mut device = device();
        let a = pool.allocate(&mut device).unwrap();
        let b = pool.allocate(&mut device).unwrap();
        assert_ne!(a.handle(), b.handle());
        pool.free(a);
        pool.free(b);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn release_all_destroys_pooled_queries() {
        let mut pool = pool();
        let mut device = device();
        let a = pool.allocate(&mut device).unwrap();
        let b = pool.allocate(&mut device).unwrap();
        pool.free(a);
        pool.free(b);

        pool.release_all(&mut device);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn creation_failure_is_reported() {
        let mut pool = pool();
        let mut device = device();
        device.creation_failures.push_back(NativeError::OutOfMemory);
        assert!(matches!(
            pool.allocate(&mut device),
            Err(BackendError::ResourceCreationFailure {
                kind: ResourceKind::Query,
                ..
            })
        ));
        assert_eq!(pool.free_count(), 0);
    }
}
