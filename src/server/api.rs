//! HTTP routes of the sync server.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check (no auth required)
//! - `POST /auth/signup`, `POST /auth/login`: Issue a bearer token (no auth required)
//! - `POST /auth/logout`: Revoke the caller's token
//! - `GET /me`: Current user info
//! - `GET /collections/{collection}`: The caller's documents in a collection
//! - `PUT /collections/{collection}/{id}`: Insert or replace one of the caller's documents
//! - `DELETE /collections/{collection}/{id}`: Delete one of the caller's documents
//!
//! Errors are returned as `{"error": code, "message": text}`. Sign-in codes
//! are the ones [`IdentityError::code`] produces.

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use fueltrack_core::identity::MIN_PASSWORD_LEN;
use fueltrack_core::{Collection, IdentityError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use super::storage::ServerStorageError;
use super::users::{User, UserStoreError};
use super::AppState;

// ============================================================================
// Errors
// ============================================================================

/// An error response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn unauthorized(error: &'static str, message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, message)
    }

    fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "permission_denied", message)
    }

    fn invalid_document(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_document", message)
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", message);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal server error",
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.error, self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: &self.message,
            }),
        )
            .into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        let status = match e {
            IdentityError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            IdentityError::UnauthorizedDomain
            | IdentityError::ProviderDisabled
            | IdentityError::AccountDisabled => StatusCode::FORBIDDEN,
            IdentityError::EmailInUse => StatusCode::CONFLICT,
            IdentityError::WeakPassword => StatusCode::BAD_REQUEST,
            IdentityError::Network(_) => StatusCode::BAD_GATEWAY,
            IdentityError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.code(), e.to_string())
    }
}

impl From<UserStoreError> for ApiError {
    fn from(e: UserStoreError) -> Self {
        match e {
            UserStoreError::EmailInUse => IdentityError::EmailInUse.into(),
            UserStoreError::InvalidCredentials => IdentityError::InvalidCredentials.into(),
            UserStoreError::Disabled => IdentityError::AccountDisabled.into(),
            UserStoreError::Database(e) => ApiError::internal(e),
        }
    }
}

impl From<ServerStorageError> for ApiError {
    fn from(e: ServerStorageError) -> Self {
        ApiError::internal(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::internal(e)
    }
}

fn parse_collection(name: &str) -> Result<Collection, ApiError> {
    name.parse()
        .map_err(|msg: String| ApiError::new(StatusCode::NOT_FOUND, "unknown_collection", msg))
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(token) => token.to_string(),
            None => {
                return ApiError::unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
                .into_response();
            }
        },
        None => {
            return ApiError::unauthorized("missing_auth", "Authorization header required")
                .into_response();
        }
    };

    match state.sessions.resolve(&token).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(AuthUser { user, token });
            next.run(request).await
        }
        Ok(None) => ApiError::unauthorized("invalid_token", "Invalid or expired token")
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsRequest {
    email: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Token response for sign-up and login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    uid: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

impl AuthResponse {
    fn new(token: String, user: User) -> Self {
        Self {
            token,
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if !state.signup_enabled {
        return Err(IdentityError::ProviderDisabled.into());
    }
    if !state.domain_allowed(&req.email) {
        return Err(IdentityError::UnauthorizedDomain.into());
    }
    if !req.email.contains('@') {
        return Err(IdentityError::InvalidCredentials.into());
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(IdentityError::WeakPassword.into());
    }

    let user = state
        .users
        .create(&req.email, &req.password, req.display_name.as_deref())
        .await?;
    let token = state.sessions.create(&user.uid).await?;

    Ok((StatusCode::CREATED, Json(AuthResponse::new(token, user))))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if !state.domain_allowed(&req.email) {
        return Err(IdentityError::UnauthorizedDomain.into());
    }

    let user = state.users.verify(&req.email, &req.password).await?;
    let token = state.sessions.create(&user.uid).await?;
    tracing::info!("User {} logged in", user.email);

    Ok(Json(AuthResponse::new(token, user)))
}

async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    state.sessions.revoke(&auth.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    uid: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

/// Get current user info (auth required)
async fn me(Extension(auth): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        uid: auth.user.uid,
        email: auth.user.email,
        display_name: auth.user.display_name,
    })
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "ownerId")]
    owner_id: Option<String>,
}

async fn list_documents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let collection = parse_collection(&collection)?;
    if let Some(owner) = &query.owner_id {
        if owner != &auth.user.uid {
            return Err(ApiError::permission_denied(
                "Cannot read another user's documents",
            ));
        }
    }

    let documents = state.documents.list(collection, &auth.user.uid).await?;
    Ok(Json(documents))
}

async fn put_document(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
    Json(document): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;

    let Some(fields) = document.as_object() else {
        return Err(ApiError::invalid_document("Document must be a JSON object"));
    };
    match fields.get("id") {
        None => {}
        Some(Value::String(doc_id)) if doc_id == &id => {}
        Some(_) => {
            return Err(ApiError::invalid_document(format!(
                "Document id does not match '{}'",
                id
            )));
        }
    }
    let Some(owner) = fields.get("ownerId").and_then(Value::as_str) else {
        return Err(ApiError::invalid_document("Document is missing ownerId"));
    };
    if owner != auth.user.uid {
        return Err(ApiError::permission_denied(
            "Cannot write a document owned by another user",
        ));
    }

    if let Some(existing) = state.documents.owner_of(collection, &id).await? {
        if existing != auth.user.uid {
            return Err(ApiError::permission_denied(
                "Cannot overwrite another user's document",
            ));
        }
    }

    state
        .documents
        .upsert(collection, &id, &auth.user.uid, &document)
        .await?;
    tracing::debug!("Stored {}/{} for {}", collection, id, auth.user.uid);

    Ok(StatusCode::NO_CONTENT)
}

async fn delete_document(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;

    match state.documents.owner_of(collection, &id).await? {
        None => {}
        Some(owner) if owner == auth.user.uid => {
            state.documents.delete(collection, &id).await?;
            tracing::debug!("Deleted {}/{} for {}", collection, id, auth.user.uid);
        }
        Some(_) => {
            return Err(ApiError::permission_denied(
                "Cannot delete another user's document",
            ));
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Router
// ============================================================================

/// Builds the server router.
pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(logout))
        .route("/me", get(me))
        .route("/collections/{collection}", get(list_documents))
        .route(
            "/collections/{collection}/{id}",
            put(put_document).delete(delete_document),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{init_server_db, ServerConfig};
    use axum::body::Body;
    use axum::http::Method;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn setup_with(config: ServerConfig) -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_server_db(&temp_dir.path().join("server.db"))
            .await
            .unwrap();
        (router(AppState::new(pool, &config)), temp_dir)
    }

    async fn setup() -> (Router, TempDir) {
        setup_with(ServerConfig::default()).await
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn signup_user(app: &Router, email: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": email, "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["token"].as_str().unwrap().to_string(),
            body["uid"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let (app, _dir) = setup().await;

        let (status, body) = send(&app, Method::GET, "/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_auth");

        let (status, body) = send(&app, Method::GET, "/me", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_signup_login_me_logout() {
        let (app, _dir) = setup().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "rider@example.com", "password": "secret123", "displayName": "Rider"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["displayName"], "Rider");
        let uid = body["uid"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "rider@example.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = send(&app, Method::GET, "/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uid"], uid.as_str());
        assert_eq!(body["email"], "rider@example.com");

        let (status, _) = send(&app, Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, "/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_identity_error_codes() {
        let (app, _dir) = setup().await;
        signup_user(&app, "rider@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "rider@example.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "email_in_use");

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "new@example.com", "password": "123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "weak_password");

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "rider@example.com", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_credentials");
    }

    #[tokio::test]
    async fn test_signup_disabled_and_domain_restriction() {
        let (app, _dir) = setup_with(ServerConfig {
            signup_enabled: false,
            ..ServerConfig::default()
        })
        .await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": "a@example.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "signup_disabled");

        let (app, _dir) = setup_with(ServerConfig {
            allowed_domains: Some(vec!["fleet.org".to_string()]),
            ..ServerConfig::default()
        })
        .await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "a@example.com", "password": "secret123"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "unauthorized_domain");
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let (app, _dir) = setup().await;
        let (token, uid) = signup_user(&app, "rider@example.com").await;
        let doc = json!({"id": "v1", "name": "Activa", "ownerId": uid});

        let (status, _) = send(
            &app,
            Method::PUT,
            "/collections/vehicles/v1",
            Some(&token),
            Some(doc.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let uri = format!("/collections/vehicles?ownerId={}", uid);
        let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([doc]));

        let (status, _) = send(
            &app,
            Method::DELETE,
            "/collections/vehicles/v1",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(body, json!([]));

        // Deleting a missing document succeeds
        let (status, _) = send(
            &app,
            Method::DELETE,
            "/collections/vehicles/v1",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let (app, _dir) = setup().await;
        let (alice_token, alice) = signup_user(&app, "alice@example.com").await;
        let (bob_token, bob) = signup_user(&app, "bob@example.com").await;

        let doc = json!({"id": "e1", "ownerId": alice, "liters": 4.0});
        send(
            &app,
            Method::PUT,
            "/collections/entries/e1",
            Some(&alice_token),
            Some(doc),
        )
        .await;

        // Bob sees nothing and cannot read Alice's partition
        let uri = format!("/collections/entries?ownerId={}", bob);
        let (_, body) = send(&app, Method::GET, &uri, Some(&bob_token), None).await;
        assert_eq!(body, json!([]));
        let uri = format!("/collections/entries?ownerId={}", alice);
        let (status, body) = send(&app, Method::GET, &uri, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "permission_denied");

        // Writing as someone else is rejected
        let (status, _) = send(
            &app,
            Method::PUT,
            "/collections/entries/e2",
            Some(&bob_token),
            Some(json!({"id": "e2", "ownerId": alice})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // So is overwriting or deleting another user's document
        let (status, _) = send(
            &app,
            Method::PUT,
            "/collections/entries/e1",
            Some(&bob_token),
            Some(json!({"id": "e1", "ownerId": bob})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(
            &app,
            Method::DELETE,
            "/collections/entries/e1",
            Some(&bob_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (app, _dir) = setup().await;
        let (token, uid) = signup_user(&app, "rider@example.com").await;

        let (status, body) = send(&app, Method::GET, "/collections/dishes", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_collection");

        let (status, body) = send(
            &app,
            Method::PUT,
            "/collections/vehicles/v1",
            Some(&token),
            Some(json!({"id": "other", "ownerId": uid})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_document");

        let (status, body) = send(
            &app,
            Method::PUT,
            "/collections/vehicles/v1",
            Some(&token),
            Some(json!({"id": "v1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_document");

        let (status, _) = send(
            &app,
            Method::PUT,
            "/collections/vehicles/v1",
            Some(&token),
            Some(json!([1, 2, 3])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_identity_error_maps_to_code() {
        let err = ApiError::from(IdentityError::AccountDisabled);
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.error, "account_disabled");
        assert_eq!(
            IdentityError::from_provider_code(err.error, &err.message),
            IdentityError::AccountDisabled
        );
    }
}
