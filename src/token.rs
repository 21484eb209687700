//! Stateless signed session tokens: an access/refresh pair per login.
//!
//! Wire format is the JWT-compatible three-segment form
//! `base64url(header).base64url(claims).base64url(signature)` (no padding),
//! signed with HMAC-SHA256. Validity is decided purely from the signature
//! and the embedded expiry; nothing is stored server-side.
//!
//! ## Design Decisions
//! - No external JWT dependency: the three-segment format is assembled from
//!   the `hmac`/`sha2`/`base64` crates already used for signature work,
//!   keeping the wire format inspectable by standard JWT tooling.
//! - The current instant is always a caller-supplied parameter. The service
//!   never reads the clock, so expiry behavior is exact in tests.
//! - Refresh rotates the full pair; clients adopt the returned refresh
//!   token. Older refresh tokens age out on their own expiry (there is no
//!   server-side revocation list).
//! - Validation order is fixed: structure, then signature, then expiry,
//!   then type tag. No claim is trusted before the signature passes, and a
//!   token presented exactly at its expiry instant is already expired.

use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Fixed JOSE header for every token this service mints.
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Discriminates the two token roles in a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried inside a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id the token speaks for.
    pub sub: String,
    /// Token role; checked last during validation.
    pub token_type: TokenKind,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds. The token is invalid from this instant on.
    pub exp: i64,
    /// Unique id of this individual token.
    pub jti: String,
}

/// An access/refresh pair, minted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Why a presented token was rejected. The HTTP boundary collapses all of
/// these to one uniform 401; the distinction exists for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("wrong token type: expected {expected}, found {found}")]
    WrongType {
        expected: TokenKind,
        found: TokenKind,
    },
}

/// Mints and validates signed tokens. Immutable after construction; safe to
/// share behind an `Arc`.
pub struct TokenService {
    /// Keyed MAC prototype, cloned per operation.
    mac: HmacSha256,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenService {
    /// Build a service from the signing secret and the two lifetimes.
    pub fn new(secret: &str, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Result<Self> {
        if secret.trim().is_empty() {
            anyhow::bail!("token signing secret must not be empty");
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("signing key rejected: {e}"))?;
        Ok(Self {
            mac,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    /// Mint a fresh access/refresh pair for the given account id.
    pub fn issue(&self, account_id: &str, now: DateTime<Utc>) -> TokenPair {
        TokenPair {
            access: self.mint(account_id, TokenKind::Access, self.access_ttl_secs, now),
            refresh: self.mint(account_id, TokenKind::Refresh, self.refresh_ttl_secs, now),
        }
    }

    /// Validate a presented token and return its claims.
    ///
    /// Checks run in a fixed order so the caller sees the first failure:
    /// structure (`Malformed`), signature (`BadSignature`), expiry with
    /// `exp <= now` counting as expired (`Expired`), then the type tag
    /// (`WrongType`).
    pub fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
        expected: TokenKind,
    ) -> Result<Claims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header), Some(body), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| TokenError::Malformed)?;
        let claims_bytes = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::Malformed)?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims_bytes).map_err(|_| TokenError::Malformed)?;

        // Signature covers the first two segments exactly as presented.
        // No claim is trusted before this passes; verify_slice compares in
        // constant time.
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        mac.verify_slice(&signature_bytes)
            .map_err(|_| TokenError::BadSignature)?;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        if claims.token_type != expected {
            return Err(TokenError::WrongType {
                expected,
                found: claims.token_type,
            });
        }

        Ok(claims)
    }

    /// Exchange a valid refresh token for a brand-new pair bound to the
    /// same subject. Both tokens rotate.
    pub fn refresh(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, TokenError> {
        let claims = self.validate(refresh_token, now, TokenKind::Refresh)?;
        Ok(self.issue(&claims.sub, now))
    }

    fn mint(&self, account_id: &str, kind: TokenKind, ttl_secs: u64, now: DateTime<Utc>) -> String {
        let issued_at = now.timestamp();
        let claims = serde_json::json!({
            "sub": account_id,
            "token_type": kind.to_string(),
            "iat": issued_at,
            "exp": issued_at + ttl_secs as i64,
            "jti": Uuid::new_v4().to_string(),
        });

        let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER);
        let body = URL_SAFE_NO_PAD.encode(claims.to_string());

        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{header}.{body}.{signature}")
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ACCESS_TTL: u64 = 1800;
    const REFRESH_TTL: u64 = 14 * 24 * 3600;

    fn service() -> TokenService {
        TokenService::new("unit-test-secret", ACCESS_TTL, REFRESH_TTL).unwrap()
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn decode_claims(token: &str) -> Claims {
        let body = token.split('.').nth(1).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(body).unwrap()).unwrap()
    }

    #[test]
    fn issue_then_validate_round_trips() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));

        let access = svc.validate(&pair.access, at(1_001), TokenKind::Access).unwrap();
        assert_eq!(access.sub, "acct-1");
        assert_eq!(access.token_type, TokenKind::Access);
        assert_eq!(access.iat, 1_000);
        assert_eq!(access.exp, 1_000 + ACCESS_TTL as i64);

        let refresh = svc
            .validate(&pair.refresh, at(1_001), TokenKind::Refresh)
            .unwrap();
        assert_eq!(refresh.sub, "acct-1");
        assert_eq!(refresh.exp, 1_000 + REFRESH_TTL as i64);
    }

    #[test]
    fn validating_twice_yields_identical_claims() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let first = svc.validate(&pair.access, at(1_100), TokenKind::Access).unwrap();
        let second = svc.validate(&pair.access, at(1_200), TokenKind::Access).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn expiry_instant_is_inclusive() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let exp = 1_000 + ACCESS_TTL as i64;

        // One second shy of expiry still passes.
        assert!(svc.validate(&pair.access, at(exp - 1), TokenKind::Access).is_ok());
        // At exactly exp the token is dead.
        assert_eq!(
            svc.validate(&pair.access, at(exp), TokenKind::Access),
            Err(TokenError::Expired)
        );
        assert_eq!(
            svc.validate(&pair.access, at(exp + 1), TokenKind::Access),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampered_claims_fail_signature_check() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));

        let mut claims = decode_claims(&pair.access);
        claims.sub = "someone-else".into();
        let forged_body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

        let mut segments: Vec<&str> = pair.access.split('.').collect();
        segments[1] = &forged_body;
        let forged = segments.join(".");

        assert_eq!(
            svc.validate(&forged, at(1_001), TokenKind::Access),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn token_from_another_secret_fails_signature_check() {
        let svc = service();
        let other = TokenService::new("some-other-secret", ACCESS_TTL, REFRESH_TTL).unwrap();
        let pair = other.issue("acct-1", at(1_000));
        assert_eq!(
            svc.validate(&pair.access, at(1_001), TokenKind::Access),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn structural_garbage_is_malformed() {
        let svc = service();
        for garbage in [
            "",
            "not-a-token",
            "one.two",
            "a.b.c.d",
            "!!!.???.###",
            "Zm9v.Zm9v.Zm9v", // decodes, but claims are not JSON
        ] {
            assert_eq!(
                svc.validate(garbage, at(0), TokenKind::Access),
                Err(TokenError::Malformed),
                "expected Malformed for {garbage:?}"
            );
        }
    }

    #[test]
    fn missing_claim_fields_are_malformed_even_when_signed() {
        // A signed token whose claims lack required fields fails the
        // structural step before the signature is even considered.
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let sparse = URL_SAFE_NO_PAD.encode(r#"{"sub":"acct-1"}"#);
        let mut segments: Vec<&str> = pair.access.split('.').collect();
        segments[1] = &sparse;
        let token = segments.join(".");
        assert_eq!(
            svc.validate(&token, at(1_001), TokenKind::Access),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn bad_signature_reported_before_expiry() {
        let svc = service();
        let other = TokenService::new("some-other-secret", ACCESS_TTL, REFRESH_TTL).unwrap();
        let pair = other.issue("acct-1", at(1_000));
        // Long past expiry, but the signature verdict comes first.
        assert_eq!(
            svc.validate(&pair.access, at(10_000_000), TokenKind::Access),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn expiry_reported_before_wrong_type() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let past_access_expiry = at(1_000 + ACCESS_TTL as i64 + 10);
        // An expired access token presented where a refresh is expected:
        // expiry wins over the type mismatch.
        assert_eq!(
            svc.validate(&pair.access, past_access_expiry, TokenKind::Refresh),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn wrong_type_is_the_final_check() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        assert_eq!(
            svc.validate(&pair.refresh, at(1_001), TokenKind::Access),
            Err(TokenError::WrongType {
                expected: TokenKind::Access,
                found: TokenKind::Refresh,
            })
        );
        assert_eq!(
            svc.validate(&pair.access, at(1_001), TokenKind::Refresh),
            Err(TokenError::WrongType {
                expected: TokenKind::Refresh,
                found: TokenKind::Access,
            })
        );
    }

    #[test]
    fn refresh_rotates_both_tokens() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let rotated = svc.refresh(&pair.refresh, at(2_000)).unwrap();

        assert_ne!(rotated.access, pair.access);
        assert_ne!(rotated.refresh, pair.refresh);

        let claims = svc
            .validate(&rotated.access, at(2_001), TokenKind::Access)
            .unwrap();
        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.iat, 2_000);
    }

    #[test]
    fn refresh_rejects_an_access_token() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        assert_eq!(
            svc.refresh(&pair.access, at(1_001)),
            Err(TokenError::WrongType {
                expected: TokenKind::Refresh,
                found: TokenKind::Access,
            })
        );
    }

    #[test]
    fn refresh_rejects_an_expired_refresh_token() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let past = at(1_000 + REFRESH_TTL as i64);
        assert_eq!(svc.refresh(&pair.refresh, past), Err(TokenError::Expired));
    }

    #[test]
    fn every_token_carries_a_unique_jti() {
        let svc = service();
        let first = svc.issue("acct-1", at(1_000));
        let second = svc.issue("acct-1", at(1_000));

        let jtis = [
            decode_claims(&first.access).jti,
            decode_claims(&first.refresh).jti,
            decode_claims(&second.access).jti,
            decode_claims(&second.refresh).jti,
        ];
        for (i, a) in jtis.iter().enumerate() {
            for b in jtis.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenService::new("", 1800, 3600).is_err());
        assert!(TokenService::new("   ", 1800, 3600).is_err());
    }

    #[test]
    fn header_segment_is_standard_jose() {
        let svc = service();
        let pair = svc.issue("acct-1", at(1_000));
        let header = pair.access.split('.').next().unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(header).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed["alg"], "HS256");
        assert_eq!(parsed["typ"], "JWT");
    }
}
