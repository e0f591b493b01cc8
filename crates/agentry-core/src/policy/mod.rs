pub mod enforcer;
pub mod pii;

pub use enforcer::PolicyEnforcer;
