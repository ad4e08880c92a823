//! Redirect handling helpers.

use reqwest::header::{HeaderMap, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION};
use reqwest::{Method, StatusCode};
use url::Url;

/// Resolve a Location header value against the URL that produced it.
pub fn resolve_location(current: &Url, location: &str) -> Result<Url, url::ParseError> {
    current.join(location.trim())
}

/// Method and body to use for the next hop.
///
/// 301, 302 and 303 continue as GET without a body (HEAD stays HEAD).
/// 307 and 308 keep both.
pub(crate) fn next_request(
    status: StatusCode,
    method: Method,
    body: Option<Vec<u8>>,
) -> (Method, Option<Vec<u8>>) {
    match status {
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => (method, body),
        _ if method == Method::HEAD => (Method::HEAD, None),
        _ => (Method::GET, None),
    }
}

/// Drop credentials that must not follow a redirect to a different origin.
pub(crate) fn strip_cross_origin_headers(headers: &mut HeaderMap, from: &Url, to: &Url) {
    if from.origin() != to.origin() {
        headers.remove(AUTHORIZATION);
        headers.remove(PROXY_AUTHORIZATION);
        headers.remove(COOKIE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_relative_locations() {
        let base = url("https://example.com/app/login.aspx?x=1");
        assert_eq!(
            resolve_location(&base, "/dashboard").unwrap().as_str(),
            "https://example.com/dashboard"
        );
        assert_eq!(
            resolve_location(&base, "home.aspx").unwrap().as_str(),
            "https://example.com/app/home.aspx"
        );
        assert_eq!(
            resolve_location(&base, "//other.example.net/x").unwrap().as_str(),
            "https://other.example.net/x"
        );
        assert_eq!(
            resolve_location(&base, " http://10.0.0.1/ ").unwrap().as_str(),
            "http://10.0.0.1/"
        );
    }

    #[test]
    fn test_see_other_becomes_get() {
        let (method, body) = next_request(StatusCode::SEE_OTHER, Method::POST, Some(b"a=1".to_vec()));
        assert_eq!(method, Method::GET);
        assert!(body.is_none());

        let (method, body) = next_request(StatusCode::FOUND, Method::POST, Some(b"a=1".to_vec()));
        assert_eq!(method, Method::GET);
        assert!(body.is_none());
    }

    #[test]
    fn test_temporary_redirect_keeps_method_and_body() {
        let (method, body) = next_request(
            StatusCode::TEMPORARY_REDIRECT,
            Method::POST,
            Some(b"a=1".to_vec()),
        );
        assert_eq!(method, Method::POST);
        assert_eq!(body.as_deref(), Some(&b"a=1"[..]));
    }

    #[test]
    fn test_cross_origin_strips_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert("x-custom", HeaderValue::from_static("1"));

        strip_cross_origin_headers(
            &mut headers,
            &url("https://a.example.com/"),
            &url("https://a.example.com/next"),
        );
        assert!(headers.contains_key(AUTHORIZATION));

        strip_cross_origin_headers(
            &mut headers,
            &url("https://a.example.com/"),
            &url("https://b.example.com/"),
        );
        assert!(!headers.contains_key(AUTHORIZATION));
        assert!(headers.contains_key("x-custom"));
    }
}
