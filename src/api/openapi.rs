use super::handlers::{health, session, sign_out};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_swagger_ui::SwaggerUi;

pub const DOCS_PATH: &str = "/api-docs";
pub const DOCS_JSON_PATH: &str = "/api-docs/openapi.json";

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Routes that are both served and described in the `OpenAPI` document.
///
/// Register new endpoints with `.routes(routes!(...))`. Anything added outside
/// (`OPTIONS /health`, the Swagger UI, the static site fallback) stays undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(session::session))
        .routes(routes!(sign_out::sign_out));

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Gate liveness".to_string());

    let mut session_tag = Tag::new("session");
    session_tag.description = Some("Session introspection and sign-out".to_string());

    router.get_openapi_mut().tags = Some(vec![health_tag, session_tag]);

    router
}

/// Swagger UI mounted at [`DOCS_PATH`], serving `openapi` at [`DOCS_JSON_PATH`].
#[must_use]
pub fn swagger_ui(openapi: utoipa::openapi::OpenApi) -> SwaggerUi {
    SwaggerUi::new(DOCS_PATH).url(DOCS_JSON_PATH, openapi)
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Title, version and contact come from Cargo.toml rather than utoipa defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

// Cargo joins authors with `:`, older toolchains with `;`.
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split([':', ';']).next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, rest)) => (name.trim(), rest.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = Some(name).filter(|n| !n.is_empty()).map(str::to_string);
    contact.email = Some(email).filter(|e| !e.is_empty()).map(str::to_string);
    Some(contact)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}
