use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use tracing::{instrument, warn};

use super::{
    dto::{LoginForm, OAuthCallback, RefreshRequest, RegisterRequest, TokenResponse, UserResponse},
    oauth::{generate_state, Provider},
    services::{self, is_valid_email, Registration, DEFAULT_ROLE},
};
use crate::{
    error::{AppError, AppResult},
    middleware::rate_limit::rate_limit,
    state::AppState,
};

const OAUTH_STATE_COOKIE: &str = "oauth_state";

pub fn auth_routes(state: &AppState) -> Router<AppState> {
    let rate_limited = Router::new()
        .route("/users/login/email-password", post(login))
        .route_layer(from_fn_with_state(state.limiter.clone(), rate_limit));

    Router::new()
        .route("/users/register/email-password", post(register))
        .route("/users/token/refresh", post(refresh))
        .merge(rate_limited)
}

pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/login/google",
            get(|state: State<AppState>, jar: CookieJar| {
                oauth_login(Provider::Google, state, jar)
            }),
        )
        .route(
            "/users/google/callback",
            get(
                |state: State<AppState>, jar: CookieJar, query: Query<OAuthCallback>| {
                    oauth_callback(Provider::Google, state, jar, query)
                },
            ),
        )
        .route(
            "/users/login/facebook",
            get(|state: State<AppState>, jar: CookieJar| {
                oauth_login(Provider::Facebook, state, jar)
            }),
        )
        .route(
            "/users/facebook/callback",
            get(
                |state: State<AppState>, jar: CookieJar, query: Query<OAuthCallback>| {
                    oauth_callback(Provider::Facebook, state, jar, query)
                },
            ),
        )
}

#[utoipa::path(
    post,
    path = "/users/register/email-password",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User created, or the existing user for this email", body = UserResponse),
        (status = 409, description = "Email registered concurrently"),
        (status = 422, description = "Invalid email or empty password"),
    )
)]
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> AppResult<Json<UserResponse>> {
    if !is_valid_email(&payload.email) {
        warn!("invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }

    let user = services::register_or_fetch(
        state.users.as_ref(),
        Registration {
            email: &payload.email,
            password: Some(&payload.password),
            oauth_provider: Some("email-password"),
            oauth_token: None,
            role: payload.role.as_deref().unwrap_or(DEFAULT_ROLE),
        },
    )
    .await?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/users/login/email-password",
    tag = "users",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    security(()),
    responses(
        (status = 200, description = "Token pair", body = TokenResponse),
        (status = 400, description = "Incorrect email or password"),
        (status = 429, description = "Too many login attempts"),
    )
)]
#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Form(form), _): WithRejection<Form<LoginForm>, AppError>,
) -> AppResult<Json<TokenResponse>> {
    let pair = services::login(state.users.as_ref(), &state.jwt, &form.username, &form.password).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/users/token/refresh",
    tag = "users",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid or expired refresh token"),
        (status = 404, description = "Token subject no longer exists"),
    )
)]
#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RefreshRequest>, AppError>,
) -> AppResult<Json<TokenResponse>> {
    let pair = services::refresh(state.users.as_ref(), &state.jwt, &payload.refresh_token).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    get,
    path = "/users/login/{provider}",
    tag = "users",
    params(("provider" = String, Path, description = "`google` or `facebook`")),
    security(()),
    responses(
        (status = 303, description = "Redirect to the provider consent page"),
        (status = 404, description = "Provider not configured"),
    )
)]
#[instrument(skip(state, jar))]
pub async fn oauth_login(
    provider: Provider,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let client = state.oauth.get(provider)?;
    let csrf = generate_state();
    let url = client.authorization_url(&csrf);

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf))
        .path("/users")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(10))
        .build();

    Ok((jar.add(cookie), Redirect::to(&url)))
}

#[utoipa::path(
    get,
    path = "/users/{provider}/callback",
    tag = "users",
    params(
        ("provider" = String, Path, description = "`google` or `facebook`"),
        OAuthCallback,
    ),
    responses(
        (status = 200, description = "Token pair", body = TokenResponse),
        (status = 422, description = "Provider error, missing code or state mismatch"),
        (status = 502, description = "Provider request failed"),
    )
)]
#[instrument(skip(state, jar, query))]
pub async fn oauth_callback(
    provider: Provider,
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<OAuthCallback>,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let client = state.oauth.get(provider)?;

    if let Some(error) = query.error {
        warn!(%error, "provider returned an error");
        return Err(AppError::Validation(format!("OAuth authorization failed: {error}")));
    }

    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    match (expected.as_deref(), query.state.as_deref()) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => {
            warn!("oauth state mismatch");
            return Err(AppError::Validation("Invalid OAuth state".into()));
        }
    }

    let code = query
        .code
        .ok_or_else(|| AppError::Validation("Missing authorization code".into()))?;

    let identity = client.exchange_code(&code).await.map_err(AppError::Upstream)?;
    let email = identity
        .email
        .ok_or_else(|| AppError::Validation("OAuth provider did not return an email".into()))?;

    let user = services::register_or_fetch(
        state.users.as_ref(),
        Registration {
            email: &email,
            password: None,
            oauth_provider: Some(provider.as_str()),
            oauth_token: Some(&identity.access_token),
            role: DEFAULT_ROLE,
        },
    )
    .await?;

    let pair = services::token_response(&state.jwt, &user)?;
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/users"));
    Ok((jar, Json(pair)))
}
