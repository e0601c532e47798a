/// Admin endpoints: privileged account creation, lifecycle and listing
///
/// Every handler reloads the calling admin's own account so that a deleted or
/// deactivated admin loses these powers before their access token expires.
use crate::{
    account::{ListUsersQuery, ManagedUserResponse, SignupRequest, UserListResponse},
    admin::{AdminOnly, Role},
    api::middleware::{ValidatedJson, ValidatedQuery},
    auth::Authorized,
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

type Admin = Authorized<AdminOnly>;

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/create-admin", post(create_admin))
        .route("/create-editor", post(create_editor))
        .route("/admin-activates-account/:id", post(activate_account))
        .route("/admin-deactivates-account/:id", post(deactivate_account))
        .route("/restore-deleted-user/:id", post(restore_user))
        .route("/delete/:id", delete(delete_user))
        .route("/users", get(list_users))
}

async fn ensure_admin_usable(ctx: &AppContext, admin: &Admin) -> AppResult<()> {
    ctx.account_manager.load_usable(&admin.id).await?;
    Ok(())
}

async fn create_privileged(
    ctx: AppContext,
    admin: Admin,
    role: Role,
    req: SignupRequest,
) -> AppResult<(StatusCode, Json<ManagedUserResponse>)> {
    ensure_admin_usable(&ctx, &admin).await?;
    let created = ctx
        .account_manager
        .create_privileged(&admin.id, role, req)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn create_admin(
    State(ctx): State<AppContext>,
    admin: Admin,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<ManagedUserResponse>)> {
    create_privileged(ctx, admin, Role::Admin, req).await
}

async fn create_editor(
    State(ctx): State<AppContext>,
    admin: Admin,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<ManagedUserResponse>)> {
    create_privileged(ctx, admin, Role::Editor, req).await
}

async fn activate_account(
    State(ctx): State<AppContext>,
    admin: Admin,
    Path(id): Path<String>,
) -> AppResult<Json<ManagedUserResponse>> {
    ensure_admin_usable(&ctx, &admin).await?;
    Ok(Json(ctx.account_manager.admin_activate(&id).await?))
}

async fn deactivate_account(
    State(ctx): State<AppContext>,
    admin: Admin,
    Path(id): Path<String>,
) -> AppResult<Json<ManagedUserResponse>> {
    ensure_admin_usable(&ctx, &admin).await?;
    Ok(Json(
        ctx.account_manager.admin_deactivate(&admin.id, &id).await?,
    ))
}

async fn restore_user(
    State(ctx): State<AppContext>,
    admin: Admin,
    Path(id): Path<String>,
) -> AppResult<Json<ManagedUserResponse>> {
    ensure_admin_usable(&ctx, &admin).await?;
    Ok(Json(ctx.account_manager.admin_restore(&id).await?))
}

async fn delete_user(
    State(ctx): State<AppContext>,
    admin: Admin,
    Path(id): Path<String>,
) -> AppResult<Json<ManagedUserResponse>> {
    ensure_admin_usable(&ctx, &admin).await?;
    Ok(Json(ctx.account_manager.admin_delete(&admin.id, &id).await?))
}

async fn list_users(
    State(ctx): State<AppContext>,
    admin: Admin,
    ValidatedQuery(query): ValidatedQuery<ListUsersQuery>,
) -> AppResult<Json<UserListResponse>> {
    ensure_admin_usable(&ctx, &admin).await?;
    Ok(Json(ctx.account_manager.list_users(query).await?))
}
