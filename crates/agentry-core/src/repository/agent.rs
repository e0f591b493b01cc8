//! Agent definition repository trait.

use agentry_types::agent::AgentDefinition;
use agentry_types::error::RepositoryError;
use uuid::Uuid;

pub trait AgentRepository: Send + Sync {
    /// Upsert an agent definition by ID.
    fn save_agent(
        &self,
        agent: &AgentDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_agent(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AgentDefinition>, RepositoryError>> + Send;

    /// List agents, optionally restricted to one tenant, ordered by name.
    fn list_agents(
        &self,
        tenant_id: Option<&Uuid>,
    ) -> impl std::future::Future<Output = Result<Vec<AgentDefinition>, RepositoryError>> + Send;
}
