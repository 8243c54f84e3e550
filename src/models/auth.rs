use serde::{Deserialize, Serialize};

use super::user::UserRole;

/// Access vs. refresh discriminator embedded in every credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims embedded in a signed bearer credential. Decoding rejects any
/// credential whose shape does not match these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id.
    pub sub: i64,
    pub role: UserRole,
    /// Unix seconds.
    pub iat: i64,
    pub exp: i64,
    /// Random per-credential id, kept for traceability only.
    pub jti: String,
    pub kind: TokenKind,
}
