//! Shared-secret check for the HTTP endpoint and the control socket.

/// Header carrying the shared secret. Matched case-insensitively.
pub const TOKEN_HEADER: &str = "X-MBBridge-Token";

/// Returns true when no token is configured, or when the provided
/// credential matches it exactly.
pub fn verify(configured: Option<&str>, provided: Option<&str>) -> bool {
    match configured {
        None | Some("") => true,
        Some(expected) => provided == Some(expected),
    }
}

/// Looks up the credential among `(name, value)` header pairs.
pub fn credential_from_headers<'a, I>(headers: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(TOKEN_HEADER))
        .map(|(_, value)| value)
}

/// Log-safe rendering of a credential.
pub fn redact(provided: Option<&str>) -> &'static str {
    match provided {
        None | Some("") => "none",
        Some(_) => "***",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_no_token_configured_accepts_anything() {
        assert!(verify(None, None));
        assert!(verify(Some(""), None));
        assert!(verify(None, Some("whatever")));
    }

    #[test]
    fn test_token_is_case_sensitive() {
        assert!(verify(Some("abc"), Some("abc")));
        assert!(!verify(Some("abc"), Some("ABC")));
        assert!(!verify(Some("abc"), Some(" abc")));
        assert!(!verify(Some("abc"), None));
    }

    #[test]
    fn test_header_name_lookup_ignores_case() {
        let headers = [("content-type", "application/json"), ("x-mbbridge-token", "abc")];
        assert_eq!(credential_from_headers(headers), Some("abc"));

        let headers = [("X-MBBRIDGE-TOKEN", "abc")];
        assert_eq!(credential_from_headers(headers), Some("abc"));

        let headers = [("x-other", "abc")];
        assert_eq!(credential_from_headers(headers), None);
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact(None), "none");
        assert_eq!(redact(Some("secret")), "***");
    }

    proptest! {
        #[test]
        fn verify_matches_definition(token in proptest::option::of(".{0,8}"), cred in proptest::option::of(".{0,8}")) {
            let expected = match token.as_deref() {
                None | Some("") => true,
                Some(t) => cred.as_deref() == Some(t),
            };
            prop_assert_eq!(verify(token.as_deref(), cred.as_deref()), expected);
        }

        #[test]
        fn matching_credential_always_verifies(token in ".{1,16}") {
            prop_assert!(verify(Some(&token), Some(&token)));
        }
    }
}
