//! OAuth tokens handed out by the AuthServer.
//!
//! A token is `base64url(dataJSON) || "." || base64url(hmac)` where
//! `dataJSON` is `{sub, group, exp, iat}` and the MAC is HMAC-SHA256
//! under the AuthServer's secret. The client parses tokens but does not
//! verify the MAC; that is the KeyServer's concern.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::Error;

/// The claims carried by an OAuth token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    /// The enrolling user.
    pub sub: String,
    /// The access group the user enrols into.
    pub group: String,
    /// Expiry, in seconds since the epoch.
    pub exp: i64,
    /// Issued-at, in seconds since the epoch.
    pub iat: i64,
}

/// Create a token for `user` in `group`, valid for `valid_for`, under the
/// given token secret.
pub fn create_oauth_token(
    secret: &[u8],
    user: &str,
    group: &str,
    valid_for: Duration,
) -> Result<String, Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| Error::Auth(format!("clock before epoch: {err}")))?
        .as_secs() as i64;
    let data = TokenData {
        sub: user.to_string(),
        group: group.to_string(),
        exp: now + valid_for.as_secs() as i64,
        iat: now,
    };
    let payload =
        serde_json::to_vec(&data).map_err(|err| Error::Auth(format!("encode token: {err}")))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|err| Error::Crypto(format!("token secret: {err}")))?;
    mac.update(&payload);
    let tag = mac.finalize().into_bytes();

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(tag)
    ))
}

/// Parse a token into its claims and MAC. The MAC is returned, not
/// checked.
pub fn parse_oauth_token(token: &str) -> Result<(TokenData, Vec<u8>), Error> {
    let (payload_b64, mac_b64) = token
        .split_once('.')
        .ok_or_else(|| Error::Auth("a token consists of two parts separated by a '.'".into()))?;

    let payload = decode_b64url(payload_b64)
        .map_err(|err| Error::Auth(format!("token payload is not base64url: {err}")))?;
    let mac = decode_b64url(mac_b64)
        .map_err(|err| Error::Auth(format!("token MAC is not base64url: {err}")))?;

    let data: TokenData = serde_json::from_slice(&payload)
        .map_err(|err| Error::Auth(format!("token payload is not valid JSON: {err}")))?;

    Ok((data, mac))
}

// Tokens in the wild come both with and without base64 padding.
fn decode_b64url(part: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(part.trim_end_matches('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let token = create_oauth_token(
            b"super secret",
            "alice",
            "Research Assessor",
            Duration::from_secs(3600),
        )
        .unwrap();
        let after = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let (data, mac) = parse_oauth_token(&token).unwrap();
        assert_eq!(data.sub, "alice");
        assert_eq!(data.group, "Research Assessor");
        assert!(data.iat >= before && data.iat <= after);
        assert_eq!(data.exp, data.iat + 3600);
        assert_eq!(mac.len(), 32);
    }

    #[test]
    fn padded_tokens_parse_too() {
        let token = create_oauth_token(b"s", "bob", "g", Duration::from_secs(60)).unwrap();
        let (payload, mac) = token.split_once('.').unwrap();
        let padded = format!("{payload}==.{mac}=");
        // Sloppy padding must not break parsing.
        let (data, _) = parse_oauth_token(&padded).unwrap();
        assert_eq!(data.sub, "bob");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_oauth_token("no-dot-here").is_err());
        assert!(parse_oauth_token("a.b.c").is_err());
        assert!(parse_oauth_token("!!!.###").is_err());
    }

    #[test]
    fn mac_matches_payload() {
        let secret = b"shared secret";
        let token = create_oauth_token(secret, "carol", "g", Duration::from_secs(1)).unwrap();
        let (payload_b64, _) = token.split_once('.').unwrap();
        let payload = decode_b64url(payload_b64).unwrap();

        let (_, mac) = parse_oauth_token(&token).unwrap();
        let mut expected = Hmac::<Sha256>::new_from_slice(secret).unwrap();
        expected.update(&payload);
        assert_eq!(mac, expected.finalize().into_bytes().to_vec());
    }
}
