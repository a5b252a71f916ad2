/// Accountant manager implementation using runtime queries
/// This version uses sqlx runtime query building instead of compile-time macros
/// to avoid needing DATABASE_URL during compilation

use crate::{
    account::{IssuedSession, RegisterRequest, UpdateSettingsRequest, ValidatedSession},
    config::ServerConfig,
    db::models::{Accountant, ACCOUNTANT_COLUMNS},
    error::{ChaseError, ChaseResult},
    validation::normalize_phone,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Accountant id
    pub sub: Uuid,
    /// Session id
    pub sid: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Hash a password with Argon2id
pub fn hash_password(password: &str) -> ChaseResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ChaseError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored Argon2 hash
pub fn verify_password(password: &str, hash: &str) -> ChaseResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ChaseError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Sign an access token
pub fn issue_access_token(
    secret: &str,
    accountant_id: Uuid,
    session_id: Uuid,
    expires_at: DateTime<Utc>,
) -> ChaseResult<String> {
    let claims = AccessClaims {
        sub: accountant_id,
        sid: session_id,
        iat: Utc::now().timestamp(),
        exp: expires_at.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ChaseError::Jwt(e.to_string()))
}

/// Verify an access token signature and expiry
pub fn decode_access_token(secret: &str, token: &str) -> ChaseResult<AccessClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 30;

    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ChaseError::Authentication("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ChaseError::Authentication("Invalid token signature".to_string())
            }
            _ => ChaseError::Authentication(format!("Invalid token: {}", e)),
        })
}

/// Generate an opaque refresh token
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Refresh tokens are stored as SHA-256 digests
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Accountant manager service
pub struct AccountantManager {
    db: PgPool,
    config: Arc<ServerConfig>,
}

impl AccountantManager {
    /// Create a new accountant manager
    pub fn new(db: PgPool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Register a new accountant and open a session
    pub async fn register(&self, req: RegisterRequest) -> ChaseResult<(Accountant, IssuedSession)> {
        req.validate()?;

        let email = req.email.trim().to_lowercase();
        if self.email_exists(&email).await? {
            return Err(ChaseError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(&req.password)?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO accountant (id, email, practice_name, password_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {}",
            ACCOUNTANT_COLUMNS
        ))
        .bind(id)
        .bind(&email)
        .bind(req.practice_name.trim())
        .bind(&password_hash)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        let accountant = Accountant::from_row(&row)?;
        let session = self.create_session(accountant.id).await?;

        tracing::info!(accountant_id = %accountant.id, "Registered accountant {}", accountant.email);

        Ok((accountant, session))
    }

    /// Authenticate and create a session
    pub async fn login(&self, email: &str, password: &str) -> ChaseResult<(Accountant, IssuedSession)> {
        let email = email.trim().to_lowercase();

        // Unknown email and wrong password are indistinguishable to the caller
        let accountant = match self.get_by_email(&email).await? {
            Some(a) => a,
            None => return Err(ChaseError::Authentication("Invalid credentials".to_string())),
        };

        if !verify_password(password, &accountant.password_hash)? {
            tracing::warn!(accountant_id = %accountant.id, "Failed login attempt");
            return Err(ChaseError::Authentication("Invalid credentials".to_string()));
        }

        let session = self.create_session(accountant.id).await?;
        Ok((accountant, session))
    }

    /// Create a session with a fresh access/refresh token pair
    pub async fn create_session(&self, accountant_id: Uuid) -> ChaseResult<IssuedSession> {
        let auth = &self.config.authentication;
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let access_expires = now + Duration::seconds(auth.access_token_ttl);
        let refresh_expires = now + Duration::days(auth.refresh_token_ttl_days);

        sqlx::query(
            "INSERT INTO session (id, accountant_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(accountant_id)
        .bind(now)
        .bind(refresh_expires)
        .execute(&self.db)
        .await?;

        let refresh_token = self
            .store_refresh_token(session_id, accountant_id, now, refresh_expires)
            .await?;
        let access_token =
            issue_access_token(&auth.jwt_secret, accountant_id, session_id, access_expires)?;

        Ok(IssuedSession {
            session_id,
            access_token,
            refresh_token,
            expires_at: access_expires,
        })
    }

    async fn store_refresh_token(
        &self,
        session_id: Uuid,
        accountant_id: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> ChaseResult<String> {
        let token = generate_refresh_token();

        sqlx::query(
            "INSERT INTO refresh_token (id, session_id, accountant_id, token_hash, created_at, expires_at, used)
             VALUES ($1, $2, $3, $4, $5, $6, FALSE)",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(accountant_id)
        .bind(hash_refresh_token(&token))
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    /// Validate access token and return session info
    pub async fn validate_access_token(&self, token: &str) -> ChaseResult<ValidatedSession> {
        let claims = decode_access_token(&self.config.authentication.jwt_secret, token)?;

        // Session must still exist (logout deletes it)
        let expires_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT expires_at FROM session WHERE id = $1 AND accountant_id = $2")
                .bind(claims.sid)
                .bind(claims.sub)
                .fetch_optional(&self.db)
                .await?;

        match expires_at {
            Some(expires_at) if expires_at > Utc::now() => Ok(ValidatedSession {
                accountant_id: claims.sub,
                session_id: claims.sid,
            }),
            _ => Err(ChaseError::Authentication("Invalid or expired session".to_string())),
        }
    }

    /// Rotate a refresh token into a new access/refresh pair on the same session
    pub async fn refresh_session(&self, refresh_token: &str) -> ChaseResult<(Accountant, IssuedSession)> {
        let auth = &self.config.authentication;
        let now = Utc::now();

        // Claim the token; a second use finds used = TRUE and matches nothing
        let row = sqlx::query(
            "UPDATE refresh_token SET used = TRUE, used_at = $2
             WHERE token_hash = $1 AND used = FALSE AND expires_at > $2
             RETURNING session_id, accountant_id",
        )
        .bind(hash_refresh_token(refresh_token))
        .bind(now)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ChaseError::Authentication("Invalid refresh token".to_string()))?;

        let session_id: Uuid = row.try_get("session_id")?;
        let accountant_id: Uuid = row.try_get("accountant_id")?;

        let refresh_expires = now + Duration::days(auth.refresh_token_ttl_days);
        let updated = sqlx::query("UPDATE session SET expires_at = $2 WHERE id = $1")
            .bind(session_id)
            .bind(refresh_expires)
            .execute(&self.db)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(ChaseError::Authentication("Session has been revoked".to_string()));
        }

        let new_refresh = self
            .store_refresh_token(session_id, accountant_id, now, refresh_expires)
            .await?;
        let access_expires = now + Duration::seconds(auth.access_token_ttl);
        let access_token =
            issue_access_token(&auth.jwt_secret, accountant_id, session_id, access_expires)?;

        let accountant = self.get_accountant(accountant_id).await?;

        Ok((
            accountant,
            IssuedSession {
                session_id,
                access_token,
                refresh_token: new_refresh,
                expires_at: access_expires,
            },
        ))
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: Uuid) -> ChaseResult<()> {
        sqlx::query("DELETE FROM session WHERE id = $1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Remove expired sessions and spent refresh tokens
    pub async fn cleanup_expired_sessions(&self) -> ChaseResult<(u64, u64)> {
        let now = Utc::now();

        let tokens = sqlx::query("DELETE FROM refresh_token WHERE expires_at < $1 OR used = TRUE")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        let sessions = sqlx::query("DELETE FROM session WHERE expires_at < $1")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        Ok((sessions, tokens))
    }

    /// Get accountant by id
    pub async fn get_accountant(&self, id: Uuid) -> ChaseResult<Accountant> {
        let row = sqlx::query(&format!("SELECT {} FROM accountant WHERE id = $1", ACCOUNTANT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ChaseError::NotFound("Accountant not found".to_string()))?;

        Accountant::from_row(&row)
    }

    /// Get accountant by login email
    pub async fn get_by_email(&self, email: &str) -> ChaseResult<Option<Accountant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accountant WHERE email = $1",
            ACCOUNTANT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Accountant::from_row).transpose()
    }

    /// Resolve the accountant who owns a WhatsApp number
    pub async fn find_by_twilio_number(&self, number: &str) -> ChaseResult<Option<Accountant>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accountant WHERE twilio_number = $1",
            ACCOUNTANT_COLUMNS
        ))
        .bind(number)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Accountant::from_row).transpose()
    }

    async fn email_exists(&self, email: &str) -> ChaseResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accountant WHERE email = $1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Apply a partial settings update
    pub async fn update_settings(&self, id: Uuid, req: UpdateSettingsRequest) -> ChaseResult<Accountant> {
        req.validate()?;

        let current = self.get_accountant(id).await?;

        let twilio_number = match req.twilio_number.as_deref() {
            Some("") => None,
            Some(number) => Some(normalize_phone(number)?),
            None => current.twilio_number.clone(),
        };

        let row = sqlx::query(&format!(
            "UPDATE accountant SET
                practice_name = $2,
                assistant_name = $3,
                assistant_tone = $4,
                auto_reply_enabled = $5,
                notify_email_on_receipt = $6,
                notify_email_on_stuck = $7,
                twilio_number = $8,
                updated_at = $9
             WHERE id = $1
             RETURNING {}",
            ACCOUNTANT_COLUMNS
        ))
        .bind(id)
        .bind(req.practice_name.unwrap_or(current.practice_name))
        .bind(req.assistant_name.unwrap_or(current.assistant_name))
        .bind(req.assistant_tone.unwrap_or(current.assistant_tone).as_str())
        .bind(req.auto_reply_enabled.unwrap_or(current.auto_reply_enabled))
        .bind(req.notify_email_on_receipt.unwrap_or(current.notify_email_on_receipt))
        .bind(req.notify_email_on_stuck.unwrap_or(current.notify_email_on_stuck))
        .bind(&twilio_number)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ChaseError::Conflict("WhatsApp number is already in use".to_string())
            }
            other => ChaseError::Database(other),
        })?;

        Accountant::from_row(&row)
    }

    /// Change password after verifying the current one; other sessions are revoked
    pub async fn change_password(
        &self,
        id: Uuid,
        current_session: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> ChaseResult<()> {
        let accountant = self.get_accountant(id).await?;

        if !verify_password(current_password, &accountant.password_hash)? {
            return Err(ChaseError::Authentication("Current password is incorrect".to_string()));
        }

        let password_hash = hash_password(new_password)?;

        sqlx::query("UPDATE accountant SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(&password_hash)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        sqlx::query("DELETE FROM session WHERE accountant_id = $1 AND id <> $2")
            .bind(id)
            .bind(current_session)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Store Google Drive OAuth tokens
    ///
    /// Google omits the refresh token on re-consent, so an absent one keeps the stored value.
    pub async fn set_drive_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> ChaseResult<()> {
        sqlx::query(
            "UPDATE accountant SET
                google_drive_access_token = $2,
                google_drive_refresh_token = COALESCE($3, google_drive_refresh_token),
                google_drive_token_expires_at = $4,
                updated_at = $5
             WHERE id = $1",
        )
        .bind(id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Remember the root Drive folder created for this accountant
    pub async fn set_drive_folder(&self, id: Uuid, folder_id: &str) -> ChaseResult<()> {
        sqlx::query("UPDATE accountant SET google_drive_folder_id = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(folder_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Forget Drive credentials (disconnect)
    pub async fn clear_drive(&self, id: Uuid) -> ChaseResult<()> {
        sqlx::query(
            "UPDATE accountant SET
                google_drive_access_token = NULL,
                google_drive_refresh_token = NULL,
                google_drive_token_expires_at = NULL,
                google_drive_folder_id = NULL,
                updated_at = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-definitely-long-enough";

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2hunter2", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[test]
    fn test_access_token_round_trip() {
        let accountant = Uuid::new_v4();
        let session = Uuid::new_v4();
        let token =
            issue_access_token(SECRET, accountant, session, Utc::now() + Duration::hours(1)).unwrap();

        let claims = decode_access_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, accountant);
        assert_eq!(claims.sid, session);
    }

    #[test]
    fn test_expired_access_token_rejected() {
        let token = issue_access_token(
            SECRET,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() - Duration::hours(2),
        )
        .unwrap();

        match decode_access_token(SECRET, &token) {
            Err(ChaseError::Authentication(msg)) => assert!(msg.contains("expired")),
            other => panic!("expected expiry error, got {:?}", other),
        }
    }

    #[test]
    fn test_access_token_wrong_secret_rejected() {
        let token = issue_access_token(
            SECRET,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + Duration::hours(1),
        )
        .unwrap();

        assert!(decode_access_token("another-secret-that-is-also-long-enough", &token).is_err());
    }

    #[test]
    fn test_refresh_tokens_are_unique_and_hashed() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);

        let digest = hash_refresh_token(&a);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_refresh_token(&a));
        assert_ne!(digest, hash_refresh_token(&b));
    }
}
