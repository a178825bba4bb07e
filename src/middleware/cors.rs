//! CORS layer built from `CORS_ORIGINS`

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RANGE},
    HeaderValue, Method,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

/// Build the CORS layer. An empty origin list (the default) is permissive,
/// which suits a single-user service browsed from anywhere on the LAN; a
/// configured list is enforced verbatim.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [ACCEPT, AUTHORIZATION, CONTENT_TYPE, RANGE];

    if origins.is_empty() {
        debug!("CORS: no origins configured, allowing any");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    debug!(?origins, "CORS: restricting to configured origins");
    CorsLayer::new()
        .allow_origin(
            origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods(methods)
        .allow_headers(headers)
}
