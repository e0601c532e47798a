/// Account endpoints: registration, activation, signin, sessions, passwords, profile
use crate::{
    account::{
        AddPasswordRequest, CodeRequest, ForgotPasswordRequest, HasPasswordResponse,
        ResetPasswordRequest, SigninRequest, SignupRequest, UpdateAccountRequest,
        UpdatePasswordRequest, UserResponse,
    },
    admin::ClientOnly,
    api::middleware::{extract_bearer_token, ValidatedJson},
    auth::{AuthContext, Authorized, TokenPair},
    context::AppContext,
    db::Account,
    error::AppResult,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/create", post(create_account))
        .route("/activate", post(activate_account))
        .route("/signin", post(signin))
        .route("/forgot-password", post(forgot_password))
        .route("/token", post(refresh))
        .route("/logout", post(logout))
        .route("/oauth-google", post(oauth_google))
        .route("/update", patch(update_account))
        .route("/reset-password", patch(reset_password))
        .route("/update-password", patch(update_password))
        .route("/add-password", patch(add_password))
        .route("/profile", get(profile))
        .route("/has-password", get(has_password))
}

fn with_tokens(account: &Account, pair: TokenPair) -> UserResponse {
    UserResponse {
        access_token: Some(pair.access_token),
        refresh_token: Some(pair.refresh_token),
        ..UserResponse::from(account)
    }
}

async fn create_account(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    ctx.account_manager.create_account(req).await?;
    Ok((StatusCode::CREATED, Json(json!({}))))
}

async fn activate_account(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> AppResult<Json<Value>> {
    ctx.account_manager.activate(&req.code).await?;
    Ok(Json(json!({})))
}

async fn signin(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<SigninRequest>,
) -> AppResult<Json<UserResponse>> {
    let (account, pair) = ctx
        .account_manager
        .signin(&req.email, &req.password)
        .await?;
    Ok(Json(with_tokens(&account, pair)))
}

async fn oauth_google(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<CodeRequest>,
) -> AppResult<Json<UserResponse>> {
    let (account, pair) = ctx.account_manager.oauth_signin(&req.code).await?;
    Ok(Json(with_tokens(&account, pair)))
}

async fn forgot_password(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> AppResult<Json<Value>> {
    ctx.account_manager.forgot_password(&req.email).await?;
    Ok(Json(json!({})))
}

/// Refresh token travels as the bearer credential
async fn refresh(State(ctx): State<AppContext>, headers: HeaderMap) -> AppResult<Json<UserResponse>> {
    let presented = extract_bearer_token(&headers);
    let (account, pair) = ctx.sessions.refresh(presented.as_deref()).await?;
    Ok(Json(with_tokens(&account, pair)))
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Json<Value>> {
    ctx.sessions.logout(&auth.id).await?;
    Ok(Json(json!({})))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> AppResult<Json<Value>> {
    ctx.account_manager
        .reset_password(&req.code, &req.password)
        .await?;
    Ok(Json(json!({})))
}

async fn update_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<UpdatePasswordRequest>,
) -> AppResult<Json<Value>> {
    ctx.account_manager.update_password(&auth.id, req).await?;
    Ok(Json(json!({})))
}

async fn add_password(
    State(ctx): State<AppContext>,
    caller: Authorized<ClientOnly>,
    ValidatedJson(req): ValidatedJson<AddPasswordRequest>,
) -> AppResult<Json<Value>> {
    ctx.account_manager.add_password(&caller.id, req).await?;
    Ok(Json(json!({})))
}

async fn update_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<UpdateAccountRequest>,
) -> AppResult<Json<UserResponse>> {
    let account = ctx.account_manager.update_name(&auth.id, &req.name).await?;
    Ok(Json(UserResponse::from(&account)))
}

async fn profile(State(ctx): State<AppContext>, auth: AuthContext) -> AppResult<Json<UserResponse>> {
    let account = ctx.account_manager.load_usable(&auth.id).await?;
    Ok(Json(UserResponse::from(&account)))
}

async fn has_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> AppResult<Json<HasPasswordResponse>> {
    let has_password = ctx.account_manager.has_password(&auth.id).await?;
    Ok(Json(HasPasswordResponse { has_password }))
}
