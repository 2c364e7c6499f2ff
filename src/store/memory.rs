use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{Company, CompanyStore, NewCompany, NewUser, StoreError, User, UserStore};

/// Process-local store used by tests and `DATABASE_URL=memory://`.
/// Enforces the same unique columns as the SQL schema.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    companies: BTreeMap<i64, Company>,
    next_user_id: i64,
    next_company_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.inner.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.inner.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email"));
        }
        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            email: user.email,
            hashed_password: user.hashed_password,
            oauth_provider: user.oauth_provider,
            oauth_token: user.oauth_token,
            is_active: true,
            role: user.role,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.users.remove(&id).is_some())
    }
}

#[async_trait]
impl CompanyStore for MemoryStore {
    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        Ok(self.inner.read().await.companies.values().cloned().collect())
    }

    async fn create_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        let mut tables = self.inner.write().await;
        if tables.companies.values().any(|c| c.name == company.name) {
            return Err(StoreError::Conflict("name"));
        }
        tables.next_company_id += 1;
        let created = Company {
            id: tables.next_company_id,
            name: company.name,
            address: company.address,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.companies.insert(created.id, created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            hashed_password: None,
            oauth_provider: Some("google".into()),
            oauth_token: None,
            role: "user".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@b.com")).await.expect("first insert");
        let err = store.create_user(new_user("a@b.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict("email")));
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let store = MemoryStore::new();
        store.create_user(new_user("Case@b.com")).await.unwrap();
        assert!(store.find_user_by_email("case@b.com").await.unwrap().is_none());
        assert!(store.find_user_by_email("Case@b.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ids_are_stable_after_delete() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@b.com")).await.unwrap();
        assert!(store.delete_user(a.id).await.unwrap());
        assert!(!store.delete_user(a.id).await.unwrap());
        let b = store.create_user(new_user("a@b.com")).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn company_names_are_unique() {
        let store = MemoryStore::new();
        let new = NewCompany {
            name: "Acme".into(),
            address: None,
        };
        store.create_company(new.clone()).await.unwrap();
        let err = store.create_company(new).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict("name")));
        assert_eq!(store.list_companies().await.unwrap().len(), 1);
    }
}
