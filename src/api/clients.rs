/// Client CRUD plus the per-client conversation and documents
use crate::{
    auth::AuthContext,
    chase,
    clients::{CreateClientRequest, UpdateClientRequest},
    context::AppContext,
    db::models::{Client, ClientStatus, Document, Message},
    error::ChaseResult,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

/// Build client routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/clients", get(list_clients).post(create_client))
        .route(
            "/api/clients/:id",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route("/api/clients/:id/messages", get(list_messages).post(send_message))
        .route("/api/clients/:id/documents", get(list_documents))
}

#[derive(Debug, Deserialize)]
struct ListClientsQuery {
    status: Option<ClientStatus>,
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    body: String,
}

async fn list_clients(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<ListClientsQuery>,
) -> ChaseResult<Json<Vec<Client>>> {
    Ok(Json(ctx.clients.list(auth.accountant_id, query.status).await?))
}

async fn create_client(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreateClientRequest>,
) -> ChaseResult<(StatusCode, Json<Client>)> {
    let client = ctx.clients.create(auth.accountant_id, req).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn get_client(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<Client>> {
    Ok(Json(ctx.clients.get(auth.accountant_id, id).await?))
}

async fn update_client(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> ChaseResult<Json<Client>> {
    Ok(Json(ctx.clients.update(auth.accountant_id, id, req).await?))
}

async fn delete_client(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<StatusCode> {
    ctx.clients.delete(auth.accountant_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<Vec<Message>>> {
    // Ownership check before reading the conversation
    ctx.clients.get(auth.accountant_id, id).await?;
    Ok(Json(ctx.messages.list_for_client(auth.accountant_id, id).await?))
}

async fn send_message(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ChaseResult<(StatusCode, Json<Message>)> {
    let client = ctx.clients.get(auth.accountant_id, id).await?;
    let accountant = ctx.accounts.get_accountant(auth.accountant_id).await?;

    let message = chase::send_manual(&ctx, &accountant, &client, &req.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_documents(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ChaseResult<Json<Vec<Document>>> {
    ctx.clients.get(auth.accountant_id, id).await?;
    Ok(Json(ctx.documents.list_for_client(auth.accountant_id, id).await?))
}
