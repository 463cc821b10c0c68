#![forbid(unsafe_code)]

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use reportr_os::SessionToken;

pub const SESSION_COOKIE_NAME: &str = "reportr_session";

/// Attributes of the transport session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCookie {
    pub secure: bool,
    pub max_age_secs: i64,
}

impl SessionCookie {
    pub fn new(secure: bool, max_age_secs: i64) -> Self {
        Self {
            secure,
            max_age_secs,
        }
    }

    pub fn issue(&self, token: &SessionToken) -> String {
        self.render(token.as_str(), self.max_age_secs)
    }

    pub fn expire(&self) -> String {
        self.render("", 0)
    }

    pub fn read(headers: &HeaderMap) -> Option<SessionToken> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
            .map(|(_, value)| SessionToken::from_cookie(value))
    }

    fn render(&self, value: &str, max_age: i64) -> String {
        let mut out = format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
        );
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn at_cookie_01_reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; reportr_session=abc123; lang=en"),
        );
        assert_eq!(
            SessionCookie::read(&headers).map(|t| t.as_str().to_string()),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn at_cookie_02_missing_or_empty_cookie_reads_none() {
        let mut headers = HeaderMap::new();
        assert!(SessionCookie::read(&headers).is_none());
        headers.insert(COOKIE, HeaderValue::from_static("reportr_session="));
        assert!(SessionCookie::read(&headers).is_none());
    }

    #[test]
    fn at_cookie_03_issue_and_expire_attributes() {
        let c = SessionCookie::new(true, 60);
        let issued = c.issue(&SessionToken::from_cookie("tok"));
        assert_eq!(
            issued,
            "reportr_session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=60; Secure"
        );
        let expired = SessionCookie::new(false, 60).expire();
        assert_eq!(
            expired,
            "reportr_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
    }
}
