//! Secure link token generation and exact-format parsing.

use std::{fmt, str::FromStr};

use rand::{RngCore, rngs::OsRng};
use thiserror::Error;

/// Number of random bytes encoded in a link token.
pub const LINK_TOKEN_BYTES: usize = 32;

const LINK_TOKEN_HEX_CHARS: usize = LINK_TOKEN_BYTES * 2;

/// A secure link capability token.
///
/// Always a 64-character lower-case hexadecimal string backed by 256 bits of
/// entropy. Parsing enforces the exact format, so a value of this type is
/// guaranteed well-formed and anything malformed is rejected before it can
/// reach a store lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkToken(String);

impl LinkToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LinkToken {
    type Err = LinkTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != LINK_TOKEN_HEX_CHARS {
            return Err(LinkTokenError::InvalidFormat);
        }

        if !value.bytes().all(is_lower_hex) {
            return Err(LinkTokenError::InvalidFormat);
        }

        Ok(Self(value.to_owned()))
    }
}

#[derive(Debug, Error)]
pub enum LinkTokenError {
    #[error("link token format is invalid")]
    InvalidFormat,
}

/// Generate a fresh link token from the OS random source.
#[must_use]
pub fn generate_link_token() -> LinkToken {
    let mut bytes = [0_u8; LINK_TOKEN_BYTES];

    OsRng.fill_bytes(&mut bytes);

    LinkToken(encode_token_hex(&bytes))
}

fn encode_token_hex(bytes: &[u8; LINK_TOKEN_BYTES]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut encoded = String::with_capacity(LINK_TOKEN_HEX_CHARS);

    for byte in bytes {
        encoded.push(HEX[(byte >> 4) as usize] as char);
        encoded.push(HEX[(byte & 0x0f) as usize] as char);
    }

    encoded
}

const fn is_lower_hex(value: u8) -> bool {
    matches!(value, b'0'..=b'9' | b'a'..=b'f')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_round_trips_through_parse() {
        let token = generate_link_token();
        let parsed: LinkToken = token.as_str().parse().expect("token should parse");

        assert_eq!(parsed, token);
        assert_eq!(token.as_str().len(), LINK_TOKEN_HEX_CHARS);
    }

    #[test]
    fn generated_tokens_are_unique() {
        let a = generate_link_token();
        let b = generate_link_token();

        assert_ne!(a, b, "two fresh tokens must not collide");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!("abc123".parse::<LinkToken>().is_err());
        assert!("a".repeat(63).parse::<LinkToken>().is_err());
        assert!("a".repeat(65).parse::<LinkToken>().is_err());
    }

    #[test]
    fn parse_rejects_non_hex_and_upper_case() {
        assert!("g".repeat(64).parse::<LinkToken>().is_err());
        assert!("A".repeat(64).parse::<LinkToken>().is_err());
    }

    #[test]
    fn parse_accepts_exact_lower_hex() {
        let value = "0123456789abcdef".repeat(4);
        let parsed: LinkToken = value.parse().expect("valid token should parse");

        assert_eq!(parsed.as_str(), value);
    }
}
