//! Opaque prefixed identifiers.
//!
//! Every externally visible id carries a type prefix followed by a 32
//! character lowercase-hex body. The prefix makes ids self-describing in
//! logs and lets route handlers tell an id apart from a slug.

use uuid::Uuid;

pub const EVENT_TOKEN_PREFIX: &str = "event_";
pub const QUESTION_TOKEN_PREFIX: &str = "question_";
pub const SESSION_TOKEN_PREFIX: &str = "voter_";

const TOKEN_BODY_LEN: usize = 32;

/// Mint a fresh voter session identifier.
pub fn mint_session_token() -> String {
    format!("{SESSION_TOKEN_PREFIX}{}", Uuid::new_v4().simple())
}

/// Structural check applied to a presented session cookie before any store
/// lookup. A failure here is terminal (401), never retried.
pub fn is_well_formed_session_token(raw: &str) -> bool {
    match raw.strip_prefix(SESSION_TOKEN_PREFIX) {
        Some(body) => {
            body.len() == TOKEN_BODY_LEN
                && body.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_well_formed() {
        let token = mint_session_token();
        assert!(token.starts_with(SESSION_TOKEN_PREFIX));
        assert!(is_well_formed_session_token(&token));
    }

    #[test]
    fn minted_tokens_are_unique() {
        assert_ne!(mint_session_token(), mint_session_token());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(!is_well_formed_session_token(""));
        assert!(!is_well_formed_session_token("voter_"));
        assert!(!is_well_formed_session_token("voter_short"));
        assert!(!is_well_formed_session_token(
            "event_0123456789abcdef0123456789abcdef"
        ));
        // uppercase hex is not a token our minting ever produces
        assert!(!is_well_formed_session_token(
            "voter_0123456789ABCDEF0123456789ABCDEF"
        ));
        // correct length, invalid alphabet
        assert!(!is_well_formed_session_token(
            "voter_0123456789abcdef0123456789abcdeg"
        ));
    }
}
