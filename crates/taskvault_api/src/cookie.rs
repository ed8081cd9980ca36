//! Cookie header parsing and `Set-Cookie` rendering.

use http::header::COOKIE;
use http::HeaderMap;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "sid";

/// Returns the first value of cookie `name` across all `Cookie` headers.
pub fn read_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Renders an `HttpOnly; SameSite=Strict` cookie scoped to `/`.
///
/// `secure` adds the `Secure` attribute for production deployments.
pub fn restricted_cookie(name: &str, value: &str, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Strict");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
