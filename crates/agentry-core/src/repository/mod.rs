//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (agentry-infra) implements. The core crate never depends on any
//! specific storage technology. `InMemoryStore` is the bundled
//! single-process implementation.

pub mod agent;
pub mod approval;
pub mod in_memory;
pub mod kpi;
pub mod memory;
pub mod run;
pub mod user;

pub use agent::AgentRepository;
pub use approval::ApprovalRepository;
pub use in_memory::InMemoryStore;
pub use kpi::KpiRepository;
pub use memory::MemoryRepository;
pub use run::RunRepository;
pub use user::UserRepository;

/// Everything the engine persists, bundled for a single store handle.
///
/// Blanket-implemented for any type that implements every repository.
pub trait EngineStore:
    AgentRepository
    + RunRepository
    + ApprovalRepository
    + MemoryRepository
    + UserRepository
    + KpiRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> EngineStore for T where
    T: AgentRepository
        + RunRepository
        + ApprovalRepository
        + MemoryRepository
        + UserRepository
        + KpiRepository
        + Send
        + Sync
        + 'static
{
}
