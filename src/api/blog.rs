/// Public blog and its admin endpoints
use crate::{
    auth::AdminAuthContext,
    blog::BlogPostRequest,
    context::AppContext,
    db::models::BlogPost,
    error::ChaseResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

/// Build blog routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/blog", get(list_published))
        .route("/api/blog/:slug", get(get_published))
        .route("/api/admin/blog", get(list_all).post(create_post))
        .route("/api/admin/blog/:id", put(update_post).delete(delete_post))
}

async fn list_published(State(ctx): State<AppContext>) -> ChaseResult<Json<Vec<BlogPost>>> {
    Ok(Json(ctx.blog.list_published().await?))
}

async fn get_published(State(ctx): State<AppContext>, Path(slug): Path<String>) -> ChaseResult<Json<BlogPost>> {
    Ok(Json(ctx.blog.get_published(&slug).await?))
}

async fn list_all(State(ctx): State<AppContext>, _admin: AdminAuthContext) -> ChaseResult<Json<Vec<BlogPost>>> {
    Ok(Json(ctx.blog.list_all().await?))
}

async fn create_post(
    State(ctx): State<AppContext>,
    admin: AdminAuthContext,
    Json(req): Json<BlogPostRequest>,
) -> ChaseResult<(StatusCode, Json<BlogPost>)> {
    let post = ctx.blog.create(admin.accountant.id, req).await?;
    tracing::info!(post_id = %post.id, slug = %post.slug, "Blog post created");
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<BlogPostRequest>,
) -> ChaseResult<Json<BlogPost>> {
    Ok(Json(ctx.blog.update(id, req).await?))
}

async fn delete_post(
    State(ctx): State<AppContext>,
    _admin: AdminAuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<StatusCode> {
    ctx.blog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
