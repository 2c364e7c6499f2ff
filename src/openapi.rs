use axum::{response::Html, routing::get, Json, Router};
use utoipa::{
    openapi::{
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
        Components,
    },
    Modify, OpenApi,
};

use crate::{
    auth::{self, dto},
    companies, users,
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::handlers::register,
        auth::handlers::login,
        auth::handlers::refresh,
        auth::handlers::oauth_login,
        auth::handlers::oauth_callback,
        users::handlers::list_users,
        users::handlers::get_user,
        users::handlers::delete_user,
        users::handlers::admin_dashboard,
        companies::handlers::list_companies,
        companies::handlers::create_company,
    ),
    components(schemas(
        dto::RegisterRequest,
        dto::LoginForm,
        dto::RefreshRequest,
        dto::UserResponse,
        dto::UserInfo,
        dto::TokenResponse,
        users::handlers::DashboardResponse,
        companies::dto::CompanyCreateRequest,
        companies::dto::CompanyResponse,
    )),
    modifiers(&SecurityAddon),
    security(("api_key" = [])),
    tags(
        (name = "users", description = "Registration, login, tokens and user records"),
        (name = "companies", description = "Company records"),
    ),
    info(title = "authgate", description = "Authentication gateway API")
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Components::new);
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-KEY"))),
        );
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

const SWAGGER_HTML: &str = r##"<!doctype html>
<html>
<head>
  <title>authgate - Swagger UI</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });</script>
</body>
</html>"##;

const REDOC_HTML: &str = r#"<!doctype html>
<html>
<head>
  <title>authgate - ReDoc</title>
</head>
<body>
  <redoc spec-url="/openapi.json"></redoc>
  <script src="https://cdn.jsdelivr.net/npm/redoc@2/bundles/redoc.standalone.js"></script>
</body>
</html>"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/docs", get(|| async { Html(SWAGGER_HTML) }))
        .route("/redoc", get(|| async { Html(REDOC_HTML) }))
}
