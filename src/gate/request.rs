//! Request view used by the gate
//!
//! Everything the decision engine needs from an HTTP request, computed once
//! before evaluation.

use super::GateError;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Request, Uri};
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Method, path, full URL and parameters of one request
#[derive(Debug, Clone, PartialEq)]
pub struct GateRequest {
    pub method: String,
    pub path: String,
    /// Absolute URL as the client requested it
    pub url: String,
    pub params: HashMap<String, String>,
}

impl GateRequest {
    /// Build from an absolute URL, e.g. `GET http://example.org/foo?token=x`
    pub fn new(method: &str, url: &str) -> Result<Self, GateError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| GateError::InvalidRequest(format!("{}: {}", url, e)))?;

        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(GateError::InvalidRequest(format!(
                "{}: URL must be absolute",
                url
            )));
        }

        Ok(Self {
            method: method.to_uppercase(),
            path: uri.path().to_string(),
            url: url.to_string(),
            params: parse_params(uri.query().unwrap_or("")),
        })
    }

    /// Build from an HTTP request and its collected body
    ///
    /// Query parameters are merged with urlencoded form parameters from the
    /// body, the body winning on conflicts.
    pub fn from_http<B>(request: &Request<B>, body: &[u8], default_scheme: &str) -> Self {
        let uri = request.uri();
        let headers = request.headers();

        let scheme = headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| default_scheme.to_string());

        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());

        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut params = parse_params(uri.query().unwrap_or(""));

        let is_form = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
            .unwrap_or(false);
        if is_form {
            if let Ok(body) = std::str::from_utf8(body) {
                params.extend(parse_params(body));
            }
        }

        Self {
            method: request.method().as_str().to_string(),
            path: uri.path().to_string(),
            url: format!("{}://{}{}", scheme, host, path_and_query),
            params,
        }
    }

    /// A request parameter; present-but-empty is `Some("")`
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Parse `application/x-www-form-urlencoded` pairs
///
/// Later duplicates win. `+` decodes to a space.
pub fn parse_params(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_new_from_absolute_url() {
        let request = GateRequest::new("get", "http://example.org/foo?token=abc&x=1").unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/foo");
        assert_eq!(request.url, "http://example.org/foo?token=abc&x=1");
        assert_eq!(request.param("token"), Some("abc"));
        assert_eq!(request.param("missing"), None);
    }

    #[test]
    fn test_new_rejects_relative_url() {
        assert!(GateRequest::new("GET", "/foo").is_err());
    }

    #[test]
    fn test_parse_params_decoding() {
        let params = parse_params("a=1&b=hello+world&c=%2Fpath%3Fq&empty=&flag&=orphan");
        assert_eq!(params.get("a").map(String::as_str), Some("1"));
        assert_eq!(params.get("b").map(String::as_str), Some("hello world"));
        assert_eq!(params.get("c").map(String::as_str), Some("/path?q"));
        assert_eq!(params.get("empty").map(String::as_str), Some(""));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert!(!params.contains_key(""));
    }

    #[test]
    fn test_from_http_rebuilds_url_from_host() {
        let request = Request::builder()
            .method("GET")
            .uri("/foo?bar=1")
            .header(HOST, "app.example.com:8080")
            .body(())
            .unwrap();

        let gate_request = GateRequest::from_http(&request, b"", "http");
        assert_eq!(gate_request.url, "http://app.example.com:8080/foo?bar=1");
        assert_eq!(gate_request.path, "/foo");
        assert_eq!(gate_request.param("bar"), Some("1"));
    }

    #[test]
    fn test_from_http_honours_forwarded_proto() {
        let mut request = Request::builder()
            .uri("/")
            .header(HOST, "app.example.com")
            .body(())
            .unwrap();
        request
            .headers_mut()
            .insert(FORWARDED_PROTO, HeaderValue::from_static("https, http"));

        let gate_request = GateRequest::from_http(&request, b"", "http");
        assert_eq!(gate_request.url, "https://app.example.com/");
    }

    #[test]
    fn test_from_http_merges_form_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/login?token=from-query&keep=1")
            .header(HOST, "example.org")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(())
            .unwrap();

        let gate_request = GateRequest::from_http(&request, b"token=from-body", "http");
        assert_eq!(gate_request.param("token"), Some("from-body"));
        assert_eq!(gate_request.param("keep"), Some("1"));
    }

    #[test]
    fn test_from_http_ignores_non_form_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api")
            .header(HOST, "example.org")
            .header(CONTENT_TYPE, "application/json")
            .body(())
            .unwrap();

        let gate_request = GateRequest::from_http(&request, b"token=nope", "http");
        assert_eq!(gate_request.param("token"), None);
    }
}
