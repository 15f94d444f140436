//! Admin DTOs

use chrono::{DateTime, Utc};
use portico_db::DbApiClient;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Registered API client
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiClientDto {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbApiClient> for ApiClientDto {
    fn from(client: DbApiClient) -> Self {
        Self {
            id: client.id,
            name: client.name,
            api_key: client.api_key,
            is_active: client.is_active,
            created_at: client.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateClientRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,
    /// Generated when omitted
    #[serde(default)]
    #[validate(length(min = 8, max = 255, message = "API key must be 8-255 characters"))]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateClientRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SetRoleRequest {
    /// `user` or `admin`
    #[validate(length(min = 1, message = "Role is required"))]
    pub role: String,
}
