use axum::{
    Json, Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{
            self, ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, ORIGIN,
        },
    },
    response::IntoResponse,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Permissive CORS, echoed on every response including errors.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_headers([
            ACCEPT,
            ACCEPT_ENCODING,
            AUTHORIZATION,
            CONTENT_TYPE,
            ORIGIN,
        ])
        .allow_methods(Any)
        .allow_origin(Any)
}

pub fn compression_layer() -> CompressionLayer {
    CompressionLayer::new().gzip(true).deflate(true)
}

/// JSON 404 for unmatched routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        Json(json!({
            "message": "not found",
        })),
    )
}

/// Wraps a router with the fallback and the layers every API shares.
pub fn with_common_layers(router: Router) -> Router {
    router
        .fallback(not_found)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http().on_request(
            |request: &Request<Body>, _: &tracing::Span| {
                tracing::info!(
                    "received request: {method} {uri}",
                    method = request.method(),
                    uri = request.uri()
                );
            },
        ))
        .layer(compression_layer())
}

/// Runs an Axum router in either local development mode or Lambda runtime mode.
///
/// In debug builds (`#[cfg(debug_assertions)]`), the router is served on
/// `127.0.0.1:3030` using a standard Axum server.
///
/// In release builds, the router is wrapped with the Lambda runtime adapter
/// and executed as a Lambda function.
///
/// # Errors
///
/// Returns an error if:
/// - The local server fails to bind to the port (debug mode)
/// - The Lambda runtime fails to start (release mode)
pub async fn run_app(
    app: Router,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    #[cfg(debug_assertions)]
    {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 3030));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            "Starting local development server on http://127.0.0.1:3030"
        );
        axum::serve(listener, app).await?;
    }

    #[cfg(not(debug_assertions))]
    {
        use lambda_http::tower;

        let app = tower::ServiceBuilder::new()
            .layer(axum_aws_lambda::LambdaLayer::default().trim_stage())
            .service(app);

        lambda_http::run(app).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unknown_route_is_json_404_with_cors() {
        let app = with_common_layers(
            Router::new().route("/api/health", get(|| async { "ok" })),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .header(ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
