use crate::guard::{RouteGuard, route_guard};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::options,
};
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, services::ServeDir, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
mod openapi;

pub use handlers::SignOutConfig;
pub use openapi::{DOCS_JSON_PATH, DOCS_PATH, openapi};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the gate serves, wrapped in the route guard.
///
/// The guard runs for every request, the fallback included, so pages from
/// `site_dir` are gated exactly like the API routes.
pub fn app(guard: Arc<RouteGuard>, sign_out: SignOutConfig, site_dir: Option<PathBuf>) -> Router {
    let (router, openapi) = router().split_for_parts();

    let router = router
        .route("/health", options(handlers::health::health))
        .merge(openapi::swagger_ui(openapi));

    let router = match site_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found),
    };

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID_HEADER),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(Arc::new(sign_out)))
            .layer(middleware::from_fn_with_state(guard, route_guard)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(
    port: u16,
    guard: Arc<RouteGuard>,
    sign_out: SignOutConfig,
    site_dir: Option<PathBuf>,
) -> Result<()> {
    let app = app(guard, sign_out, site_dir);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::Policy;
    use crate::session::{Identity, LookupResult, SessionOracle};
    use anyhow::Result;
    use axum::http::{
        HeaderMap, Method,
        header::{COOKIE, LOCATION, SET_COOKIE},
    };
    use std::{future::Future, pin::Pin, time::Duration};
    use tower::ServiceExt;
    use uuid::Uuid;

    const COOKIE_NAME: &str = "sb-test-auth-token";

    // Session exists iff the session cookie is present.
    struct CookieOracle;

    impl SessionOracle for CookieOracle {
        fn lookup<'a>(
            &'a self,
            headers: &'a HeaderMap,
        ) -> Pin<Box<dyn Future<Output = LookupResult> + Send + 'a>> {
            Box::pin(async move {
                let token = crate::session::cookie::access_token(headers, COOKIE_NAME)?;
                Ok(token.map(|_| Identity {
                    user_id: Uuid::nil(),
                    email: None,
                }))
            })
        }
    }

    fn test_app(site_dir: Option<PathBuf>) -> Result<Router> {
        let guard = Arc::new(RouteGuard::new(
            Policy::canonical()?,
            Arc::new(CookieOracle),
            Duration::from_millis(100),
        ));
        let sign_out = SignOutConfig::new(COOKIE_NAME.to_string(), "/auth/sign-in".to_string());
        Ok(app(guard, sign_out, site_dir))
    }

    fn request(method: Method, uri: &str, signed_in: bool) -> Result<Request<Body>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if signed_in {
            builder = builder.header(COOKIE, format!("{COOKIE_NAME}=token"));
        }
        Ok(builder.body(Body::empty())?)
    }

    #[tokio::test]
    async fn health_is_public_and_tagged_with_request_id() -> Result<()> {
        let response = test_app(None)?
            .oneshot(request(Method::GET, "/health", false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        Ok(())
    }

    #[tokio::test]
    async fn options_health_is_served() -> Result<()> {
        let response = test_app(None)?
            .oneshot(request(Method::OPTIONS, "/health", false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn incoming_request_id_is_propagated() -> Result<()> {
        let req = Request::builder()
            .uri("/health")
            .header(REQUEST_ID_HEADER, "01J0000000000000000000TEST")
            .body(Body::empty())?;
        let response = test_app(None)?.oneshot(req).await?;
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER),
            Some(&HeaderValue::from_static("01J0000000000000000000TEST"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn unrouted_protected_path_is_still_guarded() -> Result<()> {
        let response = test_app(None)?
            .oneshot(request(Method::GET, "/dashboard/settings", false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION),
            Some(&HeaderValue::from_static("/auth/sign-in"))
        );

        let response = test_app(None)?
            .oneshot(request(Method::GET, "/dashboard/settings", true)?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn session_endpoint_sees_guard_identity() -> Result<()> {
        let anonymous = test_app(None)?
            .oneshot(request(Method::GET, "/api/session", false)?)
            .await?;
        assert_eq!(anonymous.status(), StatusCode::NO_CONTENT);

        let signed_in = test_app(None)?
            .oneshot(request(Method::GET, "/api/session", true)?)
            .await?;
        assert_eq!(signed_in.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_clears_cookie_for_signed_in_visitor() -> Result<()> {
        let response = test_app(None)?
            .oneshot(request(Method::POST, "/auth/sign-out", true)?)
            .await?;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(response.headers().contains_key(SET_COOKIE));
        Ok(())
    }

    #[tokio::test]
    async fn swagger_document_is_served() -> Result<()> {
        let response = test_app(None)?
            .oneshot(request(Method::GET, DOCS_JSON_PATH, false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let doc: serde_json::Value = serde_json::from_slice(&body)?;
        assert!(doc["paths"].get("/api/session").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn static_site_is_gated() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("fiszki-site-{}", Ulid::new()));
        std::fs::create_dir_all(dir.join("dashboard"))?;
        std::fs::write(dir.join("about.html"), "about page")?;
        std::fs::write(dir.join("dashboard").join("index.html"), "dashboard page")?;

        let response = test_app(Some(dir.clone()))?
            .oneshot(request(Method::GET, "/about.html", false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        let response = test_app(Some(dir.clone()))?
            .oneshot(request(Method::GET, "/dashboard/index.html", false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = test_app(Some(dir.clone()))?
            .oneshot(request(Method::GET, "/dashboard/index.html", true)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[tokio::test]
    async fn html_files_of_protected_pages_are_gated() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("fiszki-site-{}", Ulid::new()));
        std::fs::create_dir_all(dir.join("study"))?;
        std::fs::write(dir.join("dashboard.html"), "dashboard page")?;
        std::fs::write(dir.join("study").join("index.html"), "study page")?;
        std::fs::write(dir.join("about.html"), "about page")?;

        for uri in [
            "/dashboard",
            "/dashboard.html",
            "/study/index.html",
            "/study.html",
        ] {
            let response = test_app(Some(dir.clone()))?
                .oneshot(request(Method::GET, uri, false)?)
                .await?;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(
                response.headers().get(LOCATION),
                Some(&HeaderValue::from_static("/auth/sign-in")),
                "{uri}"
            );
        }

        let response = test_app(Some(dir.clone()))?
            .oneshot(request(Method::GET, "/dashboard.html", true)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(&body[..], b"dashboard page");

        let response = test_app(Some(dir.clone()))?
            .oneshot(request(Method::GET, "/about", false)?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
