//! Thin HTTP message aliases shared by the router, plugins and server.
//!
//! The runtime is agnostic to wire parsing; requests and responses are the
//! `http` crate's message types with fully buffered bodies.

use bytes::Bytes;
use ::http::header::{CONTENT_TYPE, LOCATION};
use ::http::HeaderValue;

/// A buffered inbound request.
pub type Request = ::http::Request<Bytes>;

/// A buffered outbound response.
pub type Response = ::http::Response<Bytes>;

pub use ::http::{Method, StatusCode};

/// Builds a `text/html` response with the given status.
pub fn html(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = ::http::Response::new(Bytes::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=UTF-8"),
    );
    response
}

/// Builds an `application/json` response with the given status.
pub fn json(status: StatusCode, body: &serde_json::Value) -> Response {
    let mut response = ::http::Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Builds a `302 Found` redirect to `location`.
pub fn redirect(location: &str) -> Response {
    let mut response = ::http::Response::new(Bytes::new());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}

/// The default response for an unmatched route.
pub fn not_found() -> Response {
    html(StatusCode::NOT_FOUND, "404 Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_response() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"404 Not Found");
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=UTF-8"
        );
    }

    #[test]
    fn test_redirect_sets_location() {
        let response = redirect("/admin/plugins");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/admin/plugins");
    }
}
