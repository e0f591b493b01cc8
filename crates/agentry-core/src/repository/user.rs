//! User lookup for approver resolution.

use agentry_types::error::RepositoryError;
use agentry_types::user::User;
use uuid::Uuid;

pub trait UserRepository: Send + Sync {
    fn save_user(
        &self,
        user: &User,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_user(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// First admin or owner of a tenant, by name.
    fn find_tenant_approver(
        &self,
        tenant_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;
}
