use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::store::Company;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompanyCreateRequest {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompanyResponse {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Company> for CompanyResponse {
    fn from(c: Company) -> Self {
        Self {
            id: c.id,
            name: c.name,
            address: c.address,
            created_at: c.created_at,
        }
    }
}
