use std::time::Duration;

use warp::cors::Builder;

/// CORS for browser clients of the chat API.
///
/// With no configured origins any origin is allowed.
pub fn cors(allowed_origins: &[String]) -> Builder {
    let builder = warp::cors()
        .allow_headers(vec!["Content-Type", "Accept", "Origin"])
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .max_age(Duration::from_secs(600));

    if allowed_origins.is_empty() {
        builder.allow_any_origin()
    } else {
        builder.allow_origins(allowed_origins.iter().map(String::as_str))
    }
}
