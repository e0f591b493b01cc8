//! Durable backing for per-run memory contexts.

use agentry_types::error::RepositoryError;
use agentry_types::memory::MemoryContext;
use uuid::Uuid;

pub trait MemoryRepository: Send + Sync {
    fn load_memory(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<MemoryContext>, RepositoryError>> + Send;

    /// Upsert the memory context of a run.
    fn save_memory(
        &self,
        run_id: &Uuid,
        context: &MemoryContext,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
