use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use super::{Company, CompanyStore, NewCompany, NewUser, StoreError, User, UserStore};

const USER_COLUMNS: &str =
    "id, email, hashed_password, oauth_provider, oauth_token, is_active, role, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        info!("migrations applied");
        Ok(())
    }
}

/// Maps a unique-constraint violation onto [`StoreError::Conflict`].
fn conflict_on(field: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(field),
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, hashed_password, oauth_provider, oauth_token, is_active, role)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.oauth_provider)
        .bind(&user.oauth_token)
        .bind(&user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on("email"))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl CompanyStore for PgStore {
    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        let companies = sqlx::query_as::<_, Company>(
            r#"
            SELECT id, name, address, created_at
            FROM companies
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(companies)
    }

    async fn create_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (name, address)
            VALUES ($1, $2)
            RETURNING id, name, address, created_at
            "#,
        )
        .bind(&company.name)
        .bind(&company.address)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on("name"))
    }
}
