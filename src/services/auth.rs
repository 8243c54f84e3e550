use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::models::user::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest, User, UserRole,
};

const RESET_CODE_TTL_MINUTES: i64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Either a finished login or a pending second factor.
pub enum LoginOutcome {
    Success(User),
    TwoFactorRequired { user_id: i64 },
}

pub struct AuthService;

impl AuthService {
    pub fn validate_name(name: &str) -> Result<(), AuthError> {
        let len = name.chars().count();
        if !(6..=20).contains(&len) {
            return Err(AuthError::Invalid(
                "Name must be between 6 and 20 characters".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_email(email: &str) -> Result<(), AuthError> {
        let Some((local, domain)) = email.split_once('@') else {
            return Err(AuthError::Invalid("Invalid email address".into()));
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
            return Err(AuthError::Invalid("Invalid email address".into()));
        }
        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<(), AuthError> {
        let len = password.chars().count();
        if !(8..=24).contains(&len) {
            return Err(AuthError::Invalid(
                "Password must be between 8 and 24 characters".into(),
            ));
        }
        let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_special = password.chars().any(|c| !c.is_ascii_alphanumeric());
        if !(has_upper && has_lower && has_digit && has_special) {
            return Err(AuthError::Invalid(
                "Password must contain uppercase, lowercase, digit and special characters".into(),
            ));
        }
        Ok(())
    }

    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AuthError::Internal(e.into()))
    }

    pub fn check_password(password: &str, hash: &str) -> Result<bool, AuthError> {
        bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(e.into()))
    }

    fn numeric_code() -> String {
        rand::thread_rng().gen_range(100_000..=999_999).to_string()
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: i64) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Creates an unverified account and returns it together with the email
    /// verification code.
    pub async fn register(db: &PgPool, req: &RegisterRequest) -> Result<(User, String), AuthError> {
        Self::validate_name(&req.name)?;
        Self::validate_email(&req.email)?;
        Self::validate_password(&req.password)?;

        if Self::find_by_email(db, &req.email).await?.is_some() {
            return Err(AuthError::Conflict("Email is already registered".into()));
        }

        let password_hash = Self::hash_password(&req.password)?;
        let verify_token = Self::numeric_code();
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, phone, email, password_hash, role, verify_token)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(&req.name)
        .bind(req.phone.as_deref().unwrap_or(""))
        .bind(&req.email)
        .bind(&password_hash)
        .bind(UserRole::Customer.to_string())
        .bind(&verify_token)
        .fetch_one(db)
        .await?;

        Ok((user, verify_token))
    }

    pub async fn login(db: &PgPool, req: &LoginRequest) -> Result<LoginOutcome, AuthError> {
        let user = Self::find_by_email(db, &req.email)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Invalid email or password".into()))?;

        if !Self::check_password(&req.password, &user.password_hash)? {
            return Err(AuthError::Unauthorized("Invalid email or password".into()));
        }
        if !user.is_verified {
            return Err(AuthError::Unauthorized("Email is not verified".into()));
        }
        if user.two_factor_enabled {
            return Ok(LoginOutcome::TwoFactorRequired { user_id: user.id });
        }
        Ok(LoginOutcome::Success(user))
    }

    pub async fn login_two_factor(
        db: &PgPool,
        user_id: i64,
        code: &str,
    ) -> Result<User, AuthError> {
        let user = Self::find_by_id(db, user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Invalid credentials".into()))?;
        if !user.two_factor_enabled || user.two_factor_secret.is_empty() {
            return Err(AuthError::Unauthorized("Two-factor is not enabled".into()));
        }
        if !Self::check_totp(&user, code)? {
            return Err(AuthError::Unauthorized("Invalid two-factor code".into()));
        }
        Ok(user)
    }

    pub async fn verify_email(db: &PgPool, email: &str, token: &str) -> Result<(), AuthError> {
        let user = Self::find_by_email(db, email)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".into()))?;
        if user.is_verified {
            return Ok(());
        }
        if user.verify_token.is_empty() || user.verify_token != token {
            return Err(AuthError::Invalid("Invalid verification code".into()));
        }
        sqlx::query(
            "UPDATE users SET is_verified = TRUE, verify_token = '', updated_at = NOW()
             WHERE id = $1",
        )
        .bind(user.id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Rotates the verification code for an unverified account.
    pub async fn resend_verification(
        db: &PgPool,
        email: &str,
    ) -> Result<(User, String), AuthError> {
        let user = Self::find_by_email(db, email)
            .await?
            .ok_or_else(|| AuthError::NotFound("Account not found".into()))?;
        if user.is_verified {
            return Err(AuthError::Invalid("Email is already verified".into()));
        }
        let token = Self::numeric_code();
        sqlx::query("UPDATE users SET verify_token = $1, updated_at = NOW() WHERE id = $2")
            .bind(&token)
            .bind(user.id)
            .execute(db)
            .await?;
        Ok((user, token))
    }

    /// Stores a short-lived reset code for the account. Returns None when no
    /// account matches so callers can answer uniformly.
    pub async fn forgot_password(
        db: &PgPool,
        email: &str,
    ) -> Result<Option<(User, String)>, AuthError> {
        let Some(user) = Self::find_by_email(db, email).await? else {
            return Ok(None);
        };
        let code = Self::numeric_code();
        let expires_at = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);
        sqlx::query(
            "INSERT INTO password_resets (email, code, reset_token, expires_at)
             VALUES ($1, $2, NULL, $3)
             ON CONFLICT (email)
             DO UPDATE SET code = $2, reset_token = NULL, expires_at = $3, created_at = NOW()",
        )
        .bind(email)
        .bind(&code)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(Some((user, code)))
    }

    /// Exchanges a valid reset code for a one-time reset token.
    pub async fn verify_reset_code(
        db: &PgPool,
        email: &str,
        code: &str,
    ) -> Result<String, AuthError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT code FROM password_resets WHERE email = $1 AND expires_at > NOW()",
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        match row {
            Some((stored,)) if stored == code => {}
            _ => return Err(AuthError::Invalid("Invalid or expired reset code".into())),
        }
        let token = Uuid::new_v4().to_string();
        sqlx::query("UPDATE password_resets SET reset_token = $1 WHERE email = $2")
            .bind(&token)
            .bind(email)
            .execute(db)
            .await?;
        Ok(token)
    }

    pub async fn reset_password(
        db: &PgPool,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        Self::validate_password(new_password)?;
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT email FROM password_resets WHERE reset_token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        let Some((email,)) = row else {
            return Err(AuthError::Invalid("Invalid or expired reset token".into()));
        };
        let hash = Self::hash_password(new_password)?;
        let mut tx = db.begin().await?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE email = $2")
            .bind(&hash)
            .bind(&email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn change_password(
        db: &PgPool,
        user: &User,
        req: &ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        if !Self::check_password(&req.old_password, &user.password_hash)? {
            return Err(AuthError::Unauthorized("Current password is incorrect".into()));
        }
        Self::validate_password(&req.new_password)?;
        let hash = Self::hash_password(&req.new_password)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&hash)
            .bind(user.id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Changing the email address drops verification and issues a new code,
    /// returned alongside the updated row so the caller can send it.
    pub async fn update_profile(
        db: &PgPool,
        user: &User,
        req: &UpdateProfileRequest,
    ) -> Result<(User, Option<String>), AuthError> {
        Self::validate_name(&req.name)?;
        Self::validate_email(&req.email)?;
        let email_changed = req.email != user.email;
        if email_changed && Self::find_by_email(db, &req.email).await?.is_some() {
            return Err(AuthError::Conflict("Email is already registered".into()));
        }
        let verify_code = email_changed.then(Self::numeric_code);
        let updated = sqlx::query_as::<_, User>(
            "UPDATE users SET name = $1, phone = $2, email = $3,
                 is_verified = CASE WHEN $4::text IS NULL THEN is_verified ELSE FALSE END,
                 verify_token = COALESCE($4, verify_token),
                 updated_at = NOW()
             WHERE id = $5
             RETURNING *",
        )
        .bind(&req.name)
        .bind(req.phone.as_deref().unwrap_or(""))
        .bind(&req.email)
        .bind(verify_code.as_deref())
        .bind(user.id)
        .fetch_one(db)
        .await?;
        Ok((updated, verify_code))
    }

    fn totp(secret_b32: &str, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
        let secret = Secret::Encoded(secret_b32.to_owned())
            .to_bytes()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Bad TOTP secret: {e:?}")))?;
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some(issuer.to_owned()),
            account.to_owned(),
        )
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("TOTP init failed: {e}")))
    }

    fn check_totp(user: &User, code: &str) -> Result<bool, AuthError> {
        // Issuer/account only affect the provisioning URL, not code checks.
        let totp = Self::totp(&user.two_factor_secret, "check", &user.email)?;
        totp.check_current(code)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Clock error: {e}")))
    }

    /// Generates and stores a fresh TOTP secret (not yet enabled) and returns
    /// the provisioning URL plus a base64 QR code for it.
    pub async fn totp_setup(
        db: &PgPool,
        user: &User,
        issuer: &str,
    ) -> Result<(String, String), AuthError> {
        let secret_b32 = Secret::generate_secret().to_encoded().to_string();
        sqlx::query(
            "UPDATE users SET two_factor_secret = $1, two_factor_enabled = FALSE,
             updated_at = NOW() WHERE id = $2",
        )
        .bind(&secret_b32)
        .bind(user.id)
        .execute(db)
        .await?;
        let totp = Self::totp(&secret_b32, issuer, &user.email)?;
        let qr = totp
            .get_qr_base64()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("QR generation failed: {e}")))?;
        Ok((totp.get_url(), qr))
    }

    pub async fn totp_enable(db: &PgPool, user: &User, code: &str) -> Result<(), AuthError> {
        if user.two_factor_secret.is_empty() {
            return Err(AuthError::Invalid("Two-factor setup has not been started".into()));
        }
        if !Self::check_totp(user, code)? {
            return Err(AuthError::Unauthorized("Invalid two-factor code".into()));
        }
        sqlx::query("UPDATE users SET two_factor_enabled = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn totp_disable(db: &PgPool, user: &User, code: &str) -> Result<(), AuthError> {
        if !user.two_factor_enabled {
            return Err(AuthError::Invalid("Two-factor is not enabled".into()));
        }
        if !Self::check_totp(user, code)? {
            return Err(AuthError::Unauthorized("Invalid two-factor code".into()));
        }
        sqlx::query(
            "UPDATE users SET two_factor_enabled = FALSE, two_factor_secret = '',
             updated_at = NOW() WHERE id = $1",
        )
        .bind(user.id)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_is_enforced() {
        assert!(AuthService::validate_name("short").is_err());
        assert!(AuthService::validate_name("validname").is_ok());
        assert!(AuthService::validate_name(&"x".repeat(21)).is_err());
        assert!(AuthService::validate_name(&"x".repeat(20)).is_ok());
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(AuthService::validate_email("user@example.com").is_ok());
        assert!(AuthService::validate_email("userexample.com").is_err());
        assert!(AuthService::validate_email("user@nodot").is_err());
        assert!(AuthService::validate_email("@example.com").is_err());
        assert!(AuthService::validate_email("a b@example.com").is_err());
    }

    #[test]
    fn password_complexity_is_enforced() {
        assert!(AuthService::validate_password("Abcdef1!").is_ok());
        assert!(AuthService::validate_password("abcdef1!").is_err()); // no upper
        assert!(AuthService::validate_password("ABCDEF1!").is_err()); // no lower
        assert!(AuthService::validate_password("Abcdefg!").is_err()); // no digit
        assert!(AuthService::validate_password("Abcdefg1").is_err()); // no special
        assert!(AuthService::validate_password("Ab1!").is_err()); // too short
        assert!(AuthService::validate_password(&format!("Ab1!{}", "x".repeat(24))).is_err());
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = AuthService::hash_password("Abcdef1!").unwrap();
        assert!(AuthService::check_password("Abcdef1!", &hash).unwrap());
        assert!(!AuthService::check_password("Abcdef2!", &hash).unwrap());
    }
}
