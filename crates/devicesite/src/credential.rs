//! Anti-forgery credential attached to every recompute request.
//!
//! Read once at startup from the page cookies and then handed explicitly to
//! whoever builds requests.

use std::fmt;

use percent_encoding::percent_decode_str;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    header: String,
    token: String,
}

impl Credential {
    pub fn new(header: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            token: token.into(),
        }
    }

    /// Build from a `Cookie`-style string (`a=b; c=d`).
    ///
    /// A missing cookie gives an empty token; the header is still sent.
    pub fn from_cookies(cookies: &str, cookie_name: &str, header: impl Into<String>) -> Self {
        let token = read_cookie(cookies, cookie_name).unwrap_or_default();
        if token.is_empty() {
            log::warn!("cookie `{cookie_name}` not found, sending empty credential");
        }
        Self::new(header, token)
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("header", &self.header)
            .field("token", &"***")
            .finish()
    }
}

/// Percent-decoded value of the first cookie called `name`.
pub fn read_cookie(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(name)?.strip_prefix('='))
        .map(|raw| percent_decode_str(raw).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_named_cookie() {
        let cookies = "sessionid=abc; csrftoken=tok%2Bv1; theme=dark";

        assert_eq!(read_cookie(cookies, "csrftoken").as_deref(), Some("tok+v1"));
        assert_eq!(read_cookie(cookies, "theme").as_deref(), Some("dark"));
    }

    #[test]
    fn prefix_of_other_cookie_does_not_match() {
        let cookies = "csrftoken_old=stale;csrftoken=fresh";

        assert_eq!(read_cookie(cookies, "csrftoken").as_deref(), Some("fresh"));
        assert_eq!(read_cookie("", "csrftoken"), None);
    }

    #[test]
    fn missing_cookie_gives_empty_token() {
        let credential = Credential::from_cookies("a=b", "csrftoken", "X-CSRFToken");

        assert!(credential.is_empty());
        assert_eq!(credential.header(), "X-CSRFToken");
    }

    #[test]
    fn debug_hides_token() {
        let credential = Credential::new("X-CSRFToken", "secret");

        assert!(!format!("{credential:?}").contains("secret"));
    }
}
