/// Client (contact) management
///
/// Every query is scoped by the owning accountant.
use crate::{
    db::models::{Client, ClientStatus, CLIENT_COLUMNS},
    error::{ChaseError, ChaseResult},
    validation::normalize_phone,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Create client request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
}

/// Update client request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub status: Option<ClientStatus>,
}

/// Client manager
#[derive(Clone)]
pub struct ClientManager {
    db: PgPool,
}

fn map_unique_phone(e: sqlx::Error) -> ChaseError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ChaseError::Conflict("A client with this phone number already exists".to_string())
        }
        other => ChaseError::Database(other),
    }
}

impl ClientManager {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a client
    pub async fn create(&self, accountant_id: Uuid, req: CreateClientRequest) -> ChaseResult<Client> {
        req.validate()?;
        let phone = normalize_phone(&req.phone)?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO client (id, accountant_id, name, phone, email, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {}",
            CLIENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(accountant_id)
        .bind(req.name.trim())
        .bind(&phone)
        .bind(req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()))
        .bind(ClientStatus::Active.as_str())
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_phone)?;

        Client::from_row(&row)
    }

    /// List clients, optionally filtered by status
    pub async fn list(&self, accountant_id: Uuid, status: Option<ClientStatus>) -> ChaseResult<Vec<Client>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM client
             WHERE accountant_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY name",
            CLIENT_COLUMNS
        ))
        .bind(accountant_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Client::from_row).collect()
    }

    /// Get one client
    pub async fn get(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<Client> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM client WHERE id = $1 AND accountant_id = $2",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .bind(accountant_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ChaseError::NotFound("Client not found".to_string()))?;

        Client::from_row(&row)
    }

    /// Fetch several clients, failing if any is missing or owned by someone else
    pub async fn get_many(&self, accountant_id: Uuid, ids: &[Uuid]) -> ChaseResult<Vec<Client>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM client WHERE accountant_id = $1 AND id = ANY($2)",
            CLIENT_COLUMNS
        ))
        .bind(accountant_id)
        .bind(ids)
        .fetch_all(&self.db)
        .await?;

        let clients = rows.iter().map(Client::from_row).collect::<ChaseResult<Vec<_>>>()?;

        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();
        if clients.len() != unique.len() {
            return Err(ChaseError::Validation(
                "One or more selected clients do not exist".to_string(),
            ));
        }

        Ok(clients)
    }

    /// Update a client
    pub async fn update(&self, accountant_id: Uuid, id: Uuid, req: UpdateClientRequest) -> ChaseResult<Client> {
        req.validate()?;
        let current = self.get(accountant_id, id).await?;

        let phone = match req.phone.as_deref() {
            Some(p) => normalize_phone(p)?,
            None => current.phone,
        };
        let email = match req.email {
            Some(e) if e.trim().is_empty() => None,
            Some(e) => Some(e.trim().to_string()),
            None => current.email,
        };

        let row = sqlx::query(&format!(
            "UPDATE client SET name = $3, phone = $4, email = $5, status = $6, updated_at = $7
             WHERE id = $1 AND accountant_id = $2
             RETURNING {}",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .bind(accountant_id)
        .bind(req.name.map(|n| n.trim().to_string()).unwrap_or(current.name))
        .bind(&phone)
        .bind(&email)
        .bind(req.status.unwrap_or(current.status).as_str())
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_phone)?;

        Client::from_row(&row)
    }

    /// Delete a client and its history
    pub async fn delete(&self, accountant_id: Uuid, id: Uuid) -> ChaseResult<()> {
        let result = sqlx::query("DELETE FROM client WHERE id = $1 AND accountant_id = $2")
            .bind(id)
            .bind(accountant_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChaseError::NotFound("Client not found".to_string()));
        }

        Ok(())
    }

    /// Find a client of this accountant by phone (used for inbound routing)
    pub async fn find_by_phone(&self, accountant_id: Uuid, phone: &str) -> ChaseResult<Option<Client>> {
        let phone = normalize_phone(phone)?;
        let row = sqlx::query(&format!(
            "SELECT {} FROM client WHERE accountant_id = $1 AND phone = $2",
            CLIENT_COLUMNS
        ))
        .bind(accountant_id)
        .bind(&phone)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Client::from_row).transpose()
    }

    /// Find the client with this phone across all accountants, if exactly one exists
    ///
    /// Inbound messages to the shared sender number carry no accountant, so
    /// routing only succeeds when the phone is unambiguous.
    pub async fn find_unique_by_phone(&self, phone: &str) -> ChaseResult<Option<Client>> {
        let phone = normalize_phone(phone)?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM client WHERE phone = $1 LIMIT 2",
            CLIENT_COLUMNS
        ))
        .bind(&phone)
        .fetch_all(&self.db)
        .await?;

        if rows.len() == 1 {
            Client::from_row(&rows[0]).map(Some)
        } else {
            if rows.len() > 1 {
                tracing::warn!("Inbound phone {} matches several accountants; ignoring", phone);
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let req = CreateClientRequest {
            name: "".into(),
            phone: "+447700900123".into(),
            email: None,
        };
        assert!(req.validate().is_err());

        let req = CreateClientRequest {
            name: "Priya Patel".into(),
            phone: "+447700900123".into(),
            email: Some("priya@example.com".into()),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_request_status_parses() {
        let req: UpdateClientRequest = serde_json::from_str(r#"{"status":"inactive"}"#).unwrap();
        assert_eq!(req.status, Some(ClientStatus::Inactive));
    }
}
