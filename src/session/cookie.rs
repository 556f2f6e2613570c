//! Signed session cookie
//!
//! The cookie value is `{session_id}.{hex(hmac_sha256(session_id))}` so a
//! client cannot pick or forge another client's session id.

use hmac::{Hmac, Mac};
use hyper::header::{HeaderMap, COOKIE};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Session cookie codec
#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    secret: Vec<u8>,
    secure: bool,
}

impl SessionCookie {
    pub fn new(name: &str, secret: &str) -> Self {
        Self {
            name: name.to_string(),
            secret: secret.as_bytes().to_vec(),
            secure: false,
        }
    }

    /// Add the `Secure` attribute to issued cookies
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        #[allow(clippy::expect_used)]
        let mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any size");
        mac
    }

    /// Sign a session id into a cookie value
    pub fn sign(&self, session_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        format!(
            "{}.{}",
            session_id,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    /// Verify a cookie value and extract the session id
    ///
    /// Returns `None` if the value is malformed or was tampered with.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (session_id, signature_hex) = value.rsplit_once('.')?;
        let signature = hex::decode(signature_hex).ok()?;

        let mut mac = self.mac();
        mac.update(session_id.as_bytes());
        match mac.verify_slice(&signature) {
            Ok(()) => Some(session_id.to_string()),
            Err(_) => {
                tracing::warn!(
                    cookie_prefix = %value.chars().take(8).collect::<String>(),
                    "Session cookie signature mismatch"
                );
                None
            }
        }
    }

    /// Find this cookie in the request headers and return the verified session id
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .and_then(|(_, value)| self.verify(value))
    }

    /// `Set-Cookie` header value for a session
    pub fn set_cookie(&self, session_id: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.name,
            self.sign(session_id)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    const SECRET: &str = "test-secret-key-that-is-long-enough";

    #[test]
    fn test_sign_and_verify() {
        let cookie = SessionCookie::new("sid", SECRET);
        let signed = cookie.sign("abc123");
        assert_eq!(cookie.verify(&signed), Some("abc123".to_string()));
    }

    #[test]
    fn test_tampered_session_id() {
        let cookie = SessionCookie::new("sid", SECRET);
        let signed = cookie.sign("abc123");
        let tampered = signed.replacen("abc123", "abc124", 1);
        assert_eq!(cookie.verify(&tampered), None);
    }

    #[test]
    fn test_other_secret_rejected() {
        let signed = SessionCookie::new("sid", "other-secret-other-secret-other-secret").sign("abc");
        assert_eq!(SessionCookie::new("sid", SECRET).verify(&signed), None);
    }

    #[test]
    fn test_malformed_values() {
        let cookie = SessionCookie::new("sid", SECRET);
        assert_eq!(cookie.verify("no-dot"), None);
        assert_eq!(cookie.verify("abc.not-hex"), None);
        assert_eq!(cookie.verify(""), None);
    }

    #[test]
    fn test_session_id_from_headers() {
        let cookie = SessionCookie::new("sid", SECRET);
        let mut headers = HeaderMap::new();
        let value = format!("theme=dark; sid={}; other=1", cookie.sign("abc"));
        headers.insert(COOKIE, HeaderValue::from_str(&value).unwrap());

        assert_eq!(cookie.session_id(&headers), Some("abc".to_string()));
    }

    #[test]
    fn test_session_id_missing() {
        let cookie = SessionCookie::new("sid", SECRET);
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(cookie.session_id(&headers), None);
        assert_eq!(cookie.session_id(&HeaderMap::new()), None);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let plain = SessionCookie::new("sid", SECRET).set_cookie("abc");
        assert!(plain.starts_with("sid=abc."));
        assert!(plain.contains("HttpOnly"));
        assert!(plain.contains("SameSite=Lax"));
        assert!(!plain.contains("Secure"));

        let secure = SessionCookie::new("sid", SECRET).secure(true).set_cookie("abc");
        assert!(secure.ends_with("; Secure"));
    }
}
