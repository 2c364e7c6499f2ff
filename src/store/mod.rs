use async_trait::async_trait;
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub hashed_password: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_token: Option<String>,
    pub is_active: bool,
    pub role: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: Option<String>,
    pub oauth_provider: Option<String>,
    pub oauth_token: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column already holds this value; the payload names the column.
    #[error("duplicate value for unique field {0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact, case-sensitive email match.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    /// Returns `false` when no user had that id.
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CompanyStore: Send + Sync {
    async fn list_companies(&self) -> Result<Vec<Company>, StoreError>;
    /// Fails with [`StoreError::Conflict`] when the name is taken.
    async fn create_company(&self, company: NewCompany) -> Result<Company, StoreError>;
}
