use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use jsonwebtoken::encode;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::user::{UserService, UserServiceError};

pub mod api;

/// Represents the currently authenticated user, as carried by the JWT.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, email: String) -> Self {
        Self { id, email }
    }

    /// Returns a short label for greeting the user, the part of the email
    /// before the '@'. The token does not carry the display name.
    pub fn display_label(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// Authentication state shared by the login, sign-up, and reset routes.
#[derive(Clone)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub jwt_secret: String,
}

impl AuthState {
    /// Creates a new AuthState from the application config and database handle.
    pub fn new(db: Arc<DatabaseConnection>, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
        }
    }
}

/// Creates a router with the authentication pages and actions.
pub fn create_auth_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/login", axum::routing::post(login_handler))
        .route("/login", axum::routing::get(login_page_handler))
        .route("/signup", axum::routing::post(signup_handler))
        .route("/signup", axum::routing::get(signup_page_handler))
        .route(
            "/forgot-password",
            axum::routing::post(forgot_password_handler),
        )
        .route(
            "/forgot-password",
            axum::routing::get(forgot_password_page_handler),
        )
        .route("/logout", axum::routing::post(logout_handler))
        .with_state(state)
}

/// Authentication middleware that checks for valid JWT tokens and sets CurrentUser extension.
/// This middleware only populates the CurrentUser extension and does not perform redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get("auth_token") {
        if let Ok(claims) = decode_jwt(token_cookie.value(), &state.jwt_secret).await {
            if let Ok(user_id) = claims.sub.parse::<i32>() {
                let current_user = CurrentUser::new(user_id, claims.email);
                request.extensions_mut().insert(current_user);
            }
        }
    }

    next.run(request).await
}

/// Login redirect middleware that redirects unauthenticated users to the login page.
/// This middleware should be applied after auth_user_middleware to check for CurrentUser extension.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    // Check if user is authenticated by looking for CurrentUser extension
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    // If no valid authentication and accessing a protected route, redirect to login
    if !is_authenticated {
        return Redirect::to("/login").into_response();
    }

    next.run(request).await
}

/// Represents the login request payload.
#[derive(serde::Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Represents the sign-up request payload.
#[derive(serde::Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

/// Represents the password reset request payload.
#[derive(serde::Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize,    // Expiry time of the token
    pub iat: usize,    // Issued at time of the token
    pub sub: String,   // ID of the authenticated user
    pub email: String, // Email of the authenticated user
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents an error during JWT operations.
    #[error("JWT operation failed")]
    JwtError,
    /// Represents an unexpected failure in the user service. Credential and
    /// validation problems are rendered as fragments and never reach here.
    #[error("User service operation failed")]
    Service(#[from] UserServiceError),
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Builds an error-fragment response that HTMX swaps into the given target
/// instead of the form's usual target.
fn error_fragment_response(html: String, target: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("hx-retarget"),
        HeaderValue::from_static(target),
    );
    headers.insert(
        HeaderName::from_static("hx-reswap"),
        HeaderValue::from_static("outerHTML"),
    );

    let mut response = Html(html).into_response();
    response.headers_mut().extend(headers);
    response
}

/// Handles the login request.
/// Checks the submitted email and password against the stored credentials.
/// If a user is already logged in, returns a success message.
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
    Form(payload): Form<LoginRequest>,
) -> Result<(CookieJar, Response), AuthError> {
    // Check if user is already logged in
    if let Some(Extension(user)) = current_user {
        return handle_already_logged_in_user(jar, &user).await;
    }

    handle_login_attempt(state, jar, payload).await
}

/// Handles the case when a user is already logged in.
/// Returns a success response with the current user's information.
#[tracing::instrument(skip(jar))]
async fn handle_already_logged_in_user(
    jar: CookieJar,
    user: &CurrentUser,
) -> Result<(CookieJar, Response), AuthError> {
    let html = LoginSuccessTemplate {
        name: user.display_label(),
    }
    .render()
    .map_err(AuthError::from)?;

    Ok((jar, Html(html).into_response()))
}

/// Handles a login attempt when the user is not logged in.
/// Validates credentials and either sets the session cookie or returns an error fragment.
#[tracing::instrument(skip(state, jar, payload))]
async fn handle_login_attempt(
    state: Arc<AuthState>,
    jar: CookieJar,
    payload: LoginRequest,
) -> Result<(CookieJar, Response), AuthError> {
    let service = UserService::new(&state.db);
    match service.authenticate(&payload.email, &payload.password).await {
        Ok(user) => {
            // Generate JWT token
            let jwt_token = encode_jwt(user.id(), user.email(), &state.jwt_secret)
                .await
                .map_err(|_| AuthError::JwtError)?;

            // Create cookie with JWT token
            let cookie = axum_extra::extract::cookie::Cookie::build(("auth_token", jwt_token))
                .http_only(true)
                .secure(false) // Set to true in production with HTTPS
                .same_site(axum_extra::extract::cookie::SameSite::Lax)
                .max_age(time::Duration::hours(24))
                .path("/")
                .build();

            let updated_jar = jar.add(cookie);

            let html = LoginSuccessTemplate {
                name: user.display_label(),
            }
            .render()
            .map_err(AuthError::from)?;

            Ok((updated_jar, Html(html).into_response()))
        }
        Err(UserServiceError::InvalidCredentials) => {
            let error_message = LoginErrorMessageTemplate
                .render()
                .map_err(AuthError::from)?;

            Ok((jar, error_fragment_response(error_message, "#login-message")))
        }
        Err(err) => Err(AuthError::Service(err)),
    }
}

/// Handles the sign-up request.
/// Creates the account and asks the user to log in; no session is issued here.
#[tracing::instrument(skip(state, payload))]
pub async fn signup_handler(
    State(state): State<Arc<AuthState>>,
    Form(payload): Form<SignupRequest>,
) -> Result<Response, AuthError> {
    let service = UserService::new(&state.db);
    match service.create_user(&payload.email, &payload.password).await {
        Ok(user) => {
            let html = SignupSuccessTemplate {
                email: user.email(),
            }
            .render()
            .map_err(AuthError::from)?;

            Ok(Html(html).into_response())
        }
        Err(
            err @ (UserServiceError::EmailTaken(_)
            | UserServiceError::InvalidEmail(_)
            | UserServiceError::WeakPassword),
        ) => {
            let error_message = SignupErrorMessageTemplate {
                message: &err.to_string(),
            }
            .render()
            .map_err(AuthError::from)?;

            Ok(error_fragment_response(error_message, "#signup-message"))
        }
        Err(err) => Err(AuthError::Service(err)),
    }
}

/// Handles the password reset request.
/// Issues a reset token and logs it for out-of-band delivery; there is no
/// mail integration.
#[tracing::instrument(skip(state, payload))]
pub async fn forgot_password_handler(
    State(state): State<Arc<AuthState>>,
    Form(payload): Form<ForgotPasswordRequest>,
) -> Result<Response, AuthError> {
    let service = UserService::new(&state.db);
    match service.create_password_reset(&payload.email).await {
        Ok(reset) => {
            tracing::info!(
                email = %payload.email,
                token = %reset.token(),
                expires_at = %reset.expires_at(),
                "password reset token issued, deliver to the user out of band"
            );

            let html = ResetSentTemplate {
                email: &payload.email,
            }
            .render()
            .map_err(AuthError::from)?;

            Ok(Html(html).into_response())
        }
        Err(UserServiceError::UnknownEmail(_)) => {
            let error_message = ResetErrorMessageTemplate
                .render()
                .map_err(AuthError::from)?;

            Ok(error_fragment_response(
                error_message,
                "#forgot-password-message",
            ))
        }
        Err(err) => Err(AuthError::Service(err)),
    }
}

/// Handles logout by clearing the session cookie and returning to the login page.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Redirect) {
    let cookie = axum_extra::extract::cookie::Cookie::build(("auth_token", ""))
        .path("/")
        .build();

    (jar.remove(cookie), Redirect::to("/login"))
}

pub async fn encode_jwt(user_id: i32, email: &str, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        sub: user_id.to_string(),
        email: email.to_string(),
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub async fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[derive(Template)]
#[template(path = "login/login_success.html")]
pub struct LoginSuccessTemplate<'a> {
    pub name: &'a str,
}

#[derive(Template)]
#[template(path = "login/login_error_message.html")]
pub struct LoginErrorMessageTemplate;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate;

#[derive(Template)]
#[template(path = "signup/signup_success.html")]
pub struct SignupSuccessTemplate<'a> {
    pub email: &'a str,
}

#[derive(Template)]
#[template(path = "signup/signup_error_message.html")]
pub struct SignupErrorMessageTemplate<'a> {
    pub message: &'a str,
}

#[derive(Template)]
#[template(path = "forgot_password.html")]
pub struct ForgotPasswordTemplate;

#[derive(Template)]
#[template(path = "forgot_password/reset_sent.html")]
pub struct ResetSentTemplate<'a> {
    pub email: &'a str,
}

#[derive(Template)]
#[template(path = "forgot_password/reset_error_message.html")]
pub struct ResetErrorMessageTemplate;

/// Handles GET requests to display the login page.
#[tracing::instrument]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Html<String>, AuthError> {
    let username = current_user.map(|Extension(user)| user.display_label().to_string());

    let template = LoginTemplate { username };
    template.render().map(Html).map_err(AuthError::from)
}

/// Handles GET requests to display the sign-up page.
#[tracing::instrument]
pub async fn signup_page_handler() -> Result<Html<String>, AuthError> {
    SignupTemplate.render().map(Html).map_err(AuthError::from)
}

/// Handles GET requests to display the forgot-password page.
#[tracing::instrument]
pub async fn forgot_password_page_handler() -> Result<Html<String>, AuthError> {
    ForgotPasswordTemplate
        .render()
        .map(Html)
        .map_err(AuthError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn can_roundtrip_jwt_claims() {
        let jwt = encode_jwt(42, "ana@example.com", "test_secret").await.unwrap();
        let claims = decode_jwt(&jwt, "test_secret").await.unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "ana@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn can_reject_jwt_signed_with_other_secret() {
        let jwt = encode_jwt(42, "ana@example.com", "test_secret").await.unwrap();

        assert!(decode_jwt(&jwt, "other_secret").await.is_err());
    }

    #[test]
    fn can_fall_back_to_email_prefix_for_current_user() {
        let user = CurrentUser::new(1, "ana@example.com".to_string());

        assert_eq!(user.display_label(), "ana");
    }

    #[tokio::test]
    async fn auth_middlewares_work_together() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use axum::middleware::from_fn_with_state;
        use tower::ServiceExt;

        let config = Config {
            db_url: "".to_string(),
            port: 8080,
            jwt_secret: "test_secret".to_string(),
            media_dir: "media".to_string(),
            undo_window_secs: 5,
        };

        let db = Arc::new(
            sea_orm::Database::connect("sqlite::memory:")
                .await
                .unwrap(),
        );
        let auth_state = Arc::new(AuthState::new(db, &config));

        // Create a test app with both middlewares in the correct order
        // Note: Layers are applied in reverse order (bottom to top)
        let app = axum::Router::new()
            .route(
                "/protected",
                axum::routing::get(|| async { "Protected content" }),
            )
            .layer(axum::middleware::from_fn(login_redirect_middleware))
            .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware));

        // Test 1: Unauthenticated request should redirect to login
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers().get("location").unwrap();
        assert_eq!(location, "/login");

        // Test 2: Authenticated request should allow access
        let jwt_token = encode_jwt(1, "ana@example.com", &config.jwt_secret)
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/protected")
                    .header("cookie", format!("auth_token={}", jwt_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, "Protected content");
    }
}
