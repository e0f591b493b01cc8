pub mod hooks;
pub mod kpi;

pub use hooks::EvaluationHooks;
pub use kpi::aggregate_kpis;
