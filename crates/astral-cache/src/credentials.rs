//! Bearer token generation.

use rand::Rng;

/// Number of random bytes behind a token.
pub const TOKEN_BYTES: usize = 30;

/// Length of a rendered token (two hex digits per byte).
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Generate a new bearer token.
///
/// The token is 30 bytes from the thread-local CSPRNG rendered as 60
/// lowercase hex characters.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_format() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(hex::decode(&token).is_ok());
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }
}
