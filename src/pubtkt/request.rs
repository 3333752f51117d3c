//! Reading tickets and client facts out of HTTP requests.

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap, Request},
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::net::SocketAddr;

use super::{
    error::{Error, Result},
    options::{AuthPubTktOptions, COOKIE_SOURCE},
};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

// Everything but ALPHA / DIGIT / '-' / '_' / '.' / '~' is escaped.
const QUERY_ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Request extension set by a TLS terminating acceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureConnection;

/// Escape a value for a query string or a cookie, space becomes `+`.
#[must_use]
pub fn query_escape(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ESCAPE_SET)
        .to_string()
        .replace("%20", "+")
}

/// Inverse of [`query_escape`].
///
/// # Errors
///
/// Returns [`Error::Malformed`] on a `%` not followed by two hex digits or
/// when the result is not UTF-8.
pub fn query_unescape(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    for (i, _) in value.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(Error::Malformed(format!("invalid escape at offset {i}")));
        }
    }

    percent_decode_str(&value.replace('+', " "))
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::Malformed("escaped value is not utf-8".to_string()))
}

/// Value of the named cookie, from every `Cookie` header of the request.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, val)| val.trim().trim_matches('"').to_string())
}

/// First non-empty ticket found walking the configured sources in order.
#[must_use]
pub fn find_raw_ticket(headers: &HeaderMap, options: &AuthPubTktOptions) -> Option<String> {
    options.sources.iter().find_map(|source| {
        let value = if source.eq_ignore_ascii_case(COOKIE_SOURCE) {
            cookie_value(headers, &options.cookie_name)
        } else {
            headers
                .get(source.as_str())
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        value.filter(|v| !v.trim().is_empty())
    })
}

/// Client address the ticket `cip` is compared with, port stripped.
///
/// The first `X-Forwarded-For` entry wins when `prefer_forwarded` is set and
/// the header is present; otherwise the connection peer address is used,
/// with IPv4-mapped IPv6 peers reported as IPv4. Empty when neither is known.
#[must_use]
pub fn observed_ip<B>(request: &Request<B>, prefer_forwarded: bool) -> String {
    if prefer_forwarded {
        let forwarded = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(forwarded) = forwarded {
            return strip_port(forwarded).to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string())
        .unwrap_or_default()
}

/// Host part of `host:port`, `[v6]:port`, or a bare address.
#[must_use]
pub fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split_once(']').map_or(addr, |(host, _)| host);
    }

    match addr.split_once(':') {
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}

/// True when the request reached us over TLS.
///
/// Only the [`SecureConnection`] extension counts; the request URI scheme is
/// client supplied and proves nothing about the transport.
#[must_use]
pub fn is_secure<B>(request: &Request<B>) -> bool {
    request.extensions().get::<SecureConnection>().is_some()
}

/// Absolute URL of the request, rebuilt from the `Host` header when the
/// request line only carries a path.
#[must_use]
pub fn original_url<B>(request: &Request<B>) -> String {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }

    let scheme = if is_secure(request) { "https" } else { "http" };
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    format!("{scheme}://{host}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_query_escape_matches_form_encoding() {
        assert_eq!(
            query_escape("http://localhost.com/"),
            "http%3A%2F%2Flocalhost.com%2F"
        );
        assert_eq!(query_escape("a b+c=d;e~f"), "a+b%2Bc%3Dd%3Be~f");
        assert_eq!(
            query_escape("uid=myuser;validuntil=1;tokens=token1,token2;sig=mysignature"),
            "uid%3Dmyuser%3Bvaliduntil%3D1%3Btokens%3Dtoken1%2Ctoken2%3Bsig%3Dmysignature"
        );
    }

    #[test]
    fn test_query_unescape() {
        assert_eq!(query_unescape("a+b%2Bc%3Dd").unwrap(), "a b+c=d");
        assert_eq!(
            query_unescape("uid=myuser;sig=abc").unwrap(),
            "uid=myuser;sig=abc"
        );
        assert!(query_unescape("bad%zzescape").is_err());
        assert!(query_unescape("truncated%4").is_err());
    }

    #[test]
    fn test_escape_then_unescape_base64() {
        let value = "NgJVDZTchnQ3CpQWRhLHExefvSPkFyLIaCyvnNy+XB/BHu+ah1ojR2ZBrALb0fIq==";
        assert_eq!(query_unescape(&query_escape(value)).unwrap(), value);
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; pubtkt=abc%3D; last=\"quoted\""),
        );
        headers.append(header::COOKIE, HeaderValue::from_static("second=2"));

        assert_eq!(cookie_value(&headers, "pubtkt").as_deref(), Some("abc%3D"));
        assert_eq!(cookie_value(&headers, "last").as_deref(), Some("quoted"));
        assert_eq!(cookie_value(&headers, "second").as_deref(), Some("2"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_find_raw_ticket_cascade() {
        let options = AuthPubTktOptions {
            sources: vec!["x-authpubtkt".to_string(), "cookie".to_string()],
            ..AuthPubTktOptions::default()
        };

        let mut headers = HeaderMap::new();
        assert_eq!(find_raw_ticket(&headers, &options), None);

        headers.insert(header::COOKIE, HeaderValue::from_static("pubtkt=fromcookie"));
        assert_eq!(
            find_raw_ticket(&headers, &options).as_deref(),
            Some("fromcookie")
        );

        headers.insert("x-authpubtkt", HeaderValue::from_static("fromheader"));
        assert_eq!(
            find_raw_ticket(&headers, &options).as_deref(),
            Some("fromheader")
        );
    }

    #[test]
    fn test_find_raw_ticket_skips_empty_values() {
        let options = AuthPubTktOptions {
            sources: vec!["x-authpubtkt".to_string(), "cookie".to_string()],
            ..AuthPubTktOptions::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-authpubtkt", HeaderValue::from_static(""));
        headers.insert(header::COOKIE, HeaderValue::from_static("pubtkt=value"));

        assert_eq!(find_raw_ticket(&headers, &options).as_deref(), Some("value"));
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("127.0.0.1:52332"), "127.0.0.1");
        assert_eq!(strip_port("127.0.0.1"), "127.0.0.1");
        assert_eq!(strip_port("fakeip:52332"), "fakeip");
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("::1"), "::1");
    }

    #[test]
    fn test_observed_ip_from_connection() {
        let mut req = request("/");
        assert_eq!(observed_ip(&req, false), "");

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 52332))));
        assert_eq!(observed_ip(&req, false), "127.0.0.1");
        assert_eq!(observed_ip(&req, true), "127.0.0.1");
    }

    #[test]
    fn test_observed_ip_unmaps_v4_peers() {
        let mut req = request("/");
        let mapped = std::net::Ipv4Addr::new(192, 168, 1, 7).to_ipv6_mapped();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((mapped, 8080))));
        assert_eq!(observed_ip(&req, false), "192.168.1.7");

        let mut req = request("/");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, 8080))));
        assert_eq!(observed_ip(&req, false), "::1");
    }

    #[test]
    fn test_observed_ip_prefers_forwarded() {
        let mut req = request("/");
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 443))));
        req.headers_mut().insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static("127.0.0.1:6060, 10.0.0.2"),
        );

        assert_eq!(observed_ip(&req, true), "127.0.0.1");
        assert_eq!(observed_ip(&req, false), "10.0.0.1");
    }

    #[test]
    fn test_is_secure() {
        assert!(!is_secure(&request("http://local.com/")));
        assert!(!is_secure(&request("https://local.com/")));

        let mut req = request("/");
        req.extensions_mut().insert(SecureConnection);
        assert!(is_secure(&req));
    }

    #[test]
    fn test_original_url() {
        assert_eq!(
            original_url(&request("http://localhost.com")),
            "http://localhost.com/"
        );

        let mut req = request("/app?x=1");
        req.headers_mut()
            .insert(header::HOST, HeaderValue::from_static("example.com:8080"));
        assert_eq!(original_url(&req), "http://example.com:8080/app?x=1");

        req.extensions_mut().insert(SecureConnection);
        assert_eq!(original_url(&req), "https://example.com:8080/app?x=1");
    }
}
