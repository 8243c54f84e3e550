use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use uuid::Uuid;

use crate::models::auth::{Claims, TokenKind};
use crate::models::user::UserRole;

pub const ACCESS_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Revoked tokens are kept on the blacklist for this long after revocation,
/// so a token is still reported as revoked (not merely expired) for a while
/// after its own lifetime ends.
const BLACKLIST_RETENTION_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has been revoked")]
    Revoked,
    #[error("Invalid token signature")]
    InvalidSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Malformed token")]
    Malformed,
}

/// Issues, verifies and revokes the signed bearer tokens used by the API.
///
/// Revocation is process-local: revoked tokens live in an in-memory map from
/// raw token string to revocation time, pruned by [`TokenAuthority::sweep`].
/// Restarting the process empties the blacklist, which is acceptable when the
/// signing secret also rotates on restart (see [`crate::config::Config`]).
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    blacklist: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TokenAuthority {
    /// When no secret is configured a random 32-byte one is generated, which
    /// invalidates all outstanding tokens on restart.
    pub fn new(secret: Option<&str>) -> Self {
        let secret = match secret {
            Some(s) if !s.is_empty() => s.to_owned(),
            _ => {
                let mut buf = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut buf);
                tracing::warn!("JWT_SECRET not set, using a random per-process secret");
                hex::encode(buf)
            }
        };
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            blacklist: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue_access(&self, user_id: i64, role: UserRole) -> anyhow::Result<String> {
        self.issue(user_id, role, TokenKind::Access, ACCESS_TTL_SECS)
    }

    pub fn issue_refresh(&self, user_id: i64, role: UserRole) -> anyhow::Result<String> {
        self.issue(user_id, role, TokenKind::Refresh, REFRESH_TTL_SECS)
    }

    fn issue(
        &self,
        user_id: i64,
        role: UserRole,
        kind: TokenKind,
        ttl_secs: i64,
    ) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs,
            jti: Uuid::new_v4().to_string(),
            kind,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Checks the blacklist first, then the signature, then expiry, so a
    /// token that is both revoked and expired reports as revoked.
    pub fn verify(&self, raw: &str) -> Result<Claims, TokenError> {
        self.verify_at(raw, Utc::now())
    }

    fn verify_at(&self, raw: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        {
            let blacklist = self.blacklist.read().unwrap_or_else(|e| e.into_inner());
            if blacklist.contains_key(raw) {
                return Err(TokenError::Revoked);
            }
        }

        // Expiry is checked manually below to keep it ordered after the
        // signature check and independent of the system clock in tests.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(raw, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature
                | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }

    /// Adds the raw token to the blacklist, refreshing the revocation time
    /// if it is already present. The token need not be valid or even well
    /// formed.
    pub fn revoke(&self, raw: &str) {
        let mut blacklist = self.blacklist.write().unwrap_or_else(|e| e.into_inner());
        blacklist.insert(raw.to_owned(), Utc::now());
    }

    /// Drops blacklist entries revoked more than 24 hours ago. Returns the
    /// number of entries removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(BLACKLIST_RETENTION_HOURS);
        let mut blacklist = self.blacklist.write().unwrap_or_else(|e| e.into_inner());
        let before = blacklist.len();
        blacklist.retain(|_, revoked_at| *revoked_at >= cutoff);
        before - blacklist.len()
    }

    #[cfg(test)]
    fn revoke_at(&self, raw: &str, at: DateTime<Utc>) {
        let mut blacklist = self.blacklist.write().unwrap_or_else(|e| e.into_inner());
        blacklist.insert(raw.to_owned(), at);
    }

    #[cfg(test)]
    fn blacklist_len(&self) -> usize {
        self.blacklist.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(Some("test-secret-which-is-long-enough"))
    }

    #[test]
    fn issued_access_token_verifies_with_original_claims() {
        let auth = authority();
        let raw = auth.issue_access(42, UserRole::Staff).unwrap();
        let claims = auth.verify(&raw).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, UserRole::Staff);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.exp - claims.iat, ACCESS_TTL_SECS);
    }

    #[test]
    fn issued_refresh_token_carries_longer_ttl() {
        let auth = authority();
        let raw = auth.issue_refresh(7, UserRole::Customer).unwrap();
        let claims = auth.verify(&raw).unwrap();
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.exp - claims.iat, REFRESH_TTL_SECS);
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = authority();
        let raw = auth.issue_access(1, UserRole::Customer).unwrap();
        let later = Utc::now() + Duration::seconds(ACCESS_TTL_SECS + 1);
        assert_eq!(auth.verify_at(&raw, later), Err(TokenError::Expired));
        // Still valid just before the boundary.
        let just_before = Utc::now() + Duration::seconds(ACCESS_TTL_SECS - 5);
        assert!(auth.verify_at(&raw, just_before).is_ok());
    }

    #[test]
    fn revoked_token_is_rejected_even_when_expired() {
        let auth = authority();
        let raw = auth.issue_access(1, UserRole::Customer).unwrap();
        auth.revoke(&raw);
        assert_eq!(auth.verify(&raw), Err(TokenError::Revoked));
        // Revocation wins over expiry.
        let later = Utc::now() + Duration::seconds(ACCESS_TTL_SECS + 1);
        assert_eq!(auth.verify_at(&raw, later), Err(TokenError::Revoked));
    }

    #[test]
    fn tampered_token_fails_signature_check() {
        let auth = authority();
        let raw = auth.issue_access(1, UserRole::Customer).unwrap();
        // Flip one character of the payload segment.
        let mut bytes = raw.into_bytes();
        let dot = bytes.iter().position(|&b| b == b'.').unwrap();
        let i = dot + 1;
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert_eq!(auth.verify(&tampered), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn garbage_input_is_malformed() {
        let auth = authority();
        assert_eq!(auth.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(auth.verify(""), Err(TokenError::Malformed));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let auth = authority();
        let other = TokenAuthority::new(Some("a-completely-different-secret"));
        let raw = other.issue_access(1, UserRole::Admin).unwrap();
        assert_eq!(auth.verify(&raw), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn sweep_drops_only_entries_older_than_retention() {
        let auth = authority();
        let now = Utc::now();
        auth.revoke_at("fresh", now - Duration::hours(23));
        auth.revoke_at("boundary", now - Duration::hours(24));
        auth.revoke_at("stale", now - Duration::hours(24) - Duration::seconds(1));
        let removed = auth.sweep_at(now);
        assert_eq!(removed, 1);
        assert_eq!(auth.blacklist_len(), 2);
        assert_eq!(auth.verify_at("fresh", now), Err(TokenError::Revoked));
        assert_eq!(auth.verify_at("boundary", now), Err(TokenError::Revoked));
        // The swept entry now falls through to the malformed check.
        assert_eq!(auth.verify_at("stale", now), Err(TokenError::Malformed));
    }

    #[test]
    fn revoke_is_idempotent() {
        let auth = authority();
        auth.revoke("x");
        auth.revoke("x");
        assert_eq!(auth.blacklist_len(), 1);
    }

    #[test]
    fn re_revocation_refreshes_the_retention_clock() {
        let auth = authority();
        let now = Utc::now();
        auth.revoke_at("token", now - Duration::hours(23));
        // Revoking again restarts the 24-hour retention window.
        auth.revoke("token");
        assert_eq!(auth.sweep_at(now + Duration::hours(2)), 0);
        assert_eq!(
            auth.verify_at("token", now + Duration::hours(2)),
            Err(TokenError::Revoked)
        );
    }

    #[test]
    fn concurrent_verify_and_revoke_do_not_panic() {
        use std::sync::Arc;

        let auth = Arc::new(authority());
        let tokens: Vec<String> = (0..32)
            .map(|i| auth.issue_access(i, UserRole::Customer).unwrap())
            .collect();

        let mut handles = Vec::new();
        for chunk in tokens.chunks(8) {
            let auth = Arc::clone(&auth);
            let chunk = chunk.to_vec();
            handles.push(std::thread::spawn(move || {
                for raw in &chunk {
                    let _ = auth.verify(raw);
                    auth.revoke(raw);
                    assert_eq!(auth.verify(raw), Err(TokenError::Revoked));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(auth.blacklist_len(), 32);
        assert_eq!(auth.sweep(), 0);
    }

    #[test]
    fn full_lifecycle_revoke_then_sweep_falls_through_to_expired() {
        let auth = authority();
        let issued_at = Utc::now();
        let raw = auth.issue_access(42, UserRole::Staff).unwrap();

        let claims = auth.verify(&raw).unwrap();
        assert_eq!((claims.sub, claims.role), (42, UserRole::Staff));

        auth.revoke(&raw);
        assert_eq!(auth.verify(&raw), Err(TokenError::Revoked));

        // A day later the blacklist entry is swept and the token, long past
        // its own 15-minute lifetime, reports as expired instead.
        let later = issued_at + Duration::hours(24) + Duration::seconds(1);
        auth.revoke_at(&raw, issued_at);
        assert_eq!(auth.sweep_at(later), 1);
        assert_eq!(auth.verify_at(&raw, later), Err(TokenError::Expired));
    }

    #[test]
    fn random_secret_still_round_trips() {
        let auth = TokenAuthority::new(None);
        let raw = auth.issue_access(9, UserRole::Customer).unwrap();
        assert_eq!(auth.verify(&raw).unwrap().sub, 9);
    }
}
