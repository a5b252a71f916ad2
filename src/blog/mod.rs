/// Marketing blog
///
/// Anyone may read published posts; only admin accountants may write.
use crate::{
    db::models::{BlogPost, BLOG_POST_COLUMNS},
    error::{ChaseError, ChaseResult},
    validation::{is_valid_slug, slugify},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Create or replace a post
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BlogPostRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    /// Derived from the title when omitted
    pub slug: Option<String>,
    #[validate(length(max = 500))]
    pub excerpt: Option<String>,
    #[validate(length(min = 1, message = "Body is required"))]
    pub body: String,
    #[serde(default)]
    pub published: bool,
}

impl BlogPostRequest {
    /// Validate and return the slug to store
    pub fn resolved_slug(&self) -> ChaseResult<String> {
        self.validate()?;

        let slug = match self.slug.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => slugify(&self.title),
        };

        if !is_valid_slug(&slug) {
            return Err(ChaseError::Validation(
                "Slug must be lowercase letters, digits and single hyphens".to_string(),
            ));
        }

        Ok(slug)
    }
}

fn map_unique_slug(e: sqlx::Error) -> ChaseError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ChaseError::Conflict("A post with this slug already exists".to_string())
        }
        other => ChaseError::Database(other),
    }
}

/// Blog manager
#[derive(Clone)]
pub struct BlogManager {
    db: PgPool,
}

impl BlogManager {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Published posts, newest first
    pub async fn list_published(&self) -> ChaseResult<Vec<BlogPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blog_post WHERE published ORDER BY published_at DESC",
            BLOG_POST_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(BlogPost::from_row).collect()
    }

    /// A published post by slug
    pub async fn get_published(&self, slug: &str) -> ChaseResult<BlogPost> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM blog_post WHERE slug = $1 AND published",
            BLOG_POST_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ChaseError::NotFound("Post not found".to_string()))?;

        BlogPost::from_row(&row)
    }

    /// Every post including drafts
    pub async fn list_all(&self) -> ChaseResult<Vec<BlogPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blog_post ORDER BY created_at DESC",
            BLOG_POST_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(BlogPost::from_row).collect()
    }

    pub async fn create(&self, author_id: Uuid, req: BlogPostRequest) -> ChaseResult<BlogPost> {
        let slug = req.resolved_slug()?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO blog_post (id, slug, title, excerpt, body, published, published_at,
                author_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
             RETURNING {}",
            BLOG_POST_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&slug)
        .bind(req.title.trim())
        .bind(&req.excerpt)
        .bind(&req.body)
        .bind(req.published)
        .bind(req.published.then_some(now))
        .bind(author_id)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_slug)?;

        BlogPost::from_row(&row)
    }

    /// Replace a post; first publication stamps `published_at`
    pub async fn update(&self, id: Uuid, req: BlogPostRequest) -> ChaseResult<BlogPost> {
        let slug = req.resolved_slug()?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "UPDATE blog_post SET slug = $2, title = $3, excerpt = $4, body = $5, published = $6,
                published_at = CASE WHEN $6 THEN COALESCE(published_at, $7) ELSE NULL END,
                updated_at = $7
             WHERE id = $1
             RETURNING {}",
            BLOG_POST_COLUMNS
        ))
        .bind(id)
        .bind(&slug)
        .bind(req.title.trim())
        .bind(&req.excerpt)
        .bind(&req.body)
        .bind(req.published)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique_slug)?
        .ok_or_else(|| ChaseError::NotFound("Post not found".to_string()))?;

        BlogPost::from_row(&row)
    }

    pub async fn delete(&self, id: Uuid) -> ChaseResult<()> {
        let result = sqlx::query("DELETE FROM blog_post WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChaseError::NotFound("Post not found".to_string()));
        }

        Ok(())
    }
}
