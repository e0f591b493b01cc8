//! Per-run KPI storage.

use agentry_types::error::RepositoryError;
use agentry_types::evaluation::KpiSnapshot;
use uuid::Uuid;

pub trait KpiRepository: Send + Sync {
    fn record_kpis(
        &self,
        snapshot: &KpiSnapshot,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Snapshots of an agent's runs, newest first.
    fn list_kpis(
        &self,
        agent_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<KpiSnapshot>, RepositoryError>> + Send;
}
