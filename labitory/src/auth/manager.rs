//! Authentication manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{ClientContext, LoginRequest, NewUser, RegisterRequest, TokenPair, User, UserId},
    tokens::{TokenService, TokenSettings},
};
use crate::audit::{AuditLog, NewSecurityEvent, SecurityEventType};
use crate::cache::CacheStore;
use crate::db::repository::{
    RepositoryError, SecurityEventRepository, TokenRepository, UserRepository,
};
use crate::security::{
    AccountLockout, BruteForceProtection, SecuritySettings, brute_force::LOGIN,
};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde_json::json;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

/// Reason stored on accounts locked by the login flow
pub const FAILED_LOGIN_LOCK_REASON: &str = "multiple_failed_login_attempts";

/// Secrets and tunables for [`AuthManager`]
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Server-side pepper appended to passwords before hashing
    pub pepper: String,
    /// JWT signing secret
    pub jwt_secret: String,
    pub security: SecuritySettings,
    pub tokens: TokenSettings,
}

/// Stores the authentication services read and write
#[derive(Clone)]
pub struct AuthStores {
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub events: Arc<dyn SecurityEventRepository>,
    pub cache: Arc<dyn CacheStore>,
}

/// Authentication manager
///
/// Owns the login flow: lockout checks, credential and second-factor
/// verification, failure recording and token issuance.
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    brute_force: BruteForceProtection,
    lockout: AccountLockout,
    tokens: TokenService,
    audit: AuditLog,
    pepper: String,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `stores` - User, token, event and cache stores
    /// * `config` - Pepper, JWT secret, lockout settings and token lifetimes
    ///
    /// # Returns
    ///
    /// * `AuthManager` - New authentication manager instance
    pub fn new(stores: AuthStores, config: AuthConfig) -> Self {
        let audit = AuditLog::new(stores.events);
        let brute_force = BruteForceProtection::new(stores.cache.clone(), config.security);
        let lockout = AccountLockout::new(stores.cache, stores.users.clone(), brute_force.clone());
        let tokens = TokenService::new(
            &config.jwt_secret,
            config.tokens,
            stores.users.clone(),
            stores.tokens,
            audit.clone(),
        );

        Self {
            users: stores.users,
            brute_force,
            lockout,
            tokens,
            audit,
            pepper: config.pepper,
        }
    }

    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }

    pub fn brute_force(&self) -> &BruteForceProtection {
        &self.brute_force
    }

    pub fn lockout(&self) -> &AccountLockout {
        &self.lockout
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Register a new user
    ///
    /// # Arguments
    ///
    /// * `request` - Registration request with username, password and email
    ///
    /// # Returns
    ///
    /// * `AuthResult<User>` - Created user or error
    ///
    /// # Errors
    ///
    /// * `AuthError::UsernameTaken` - Username already exists
    /// * `AuthError::EmailTaken` - Email already exists
    /// * `AuthError::InvalidUsername` - Username format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        validate_username(&request.username)?;
        validate_password(&request.password)?;

        if self.users.find_by_username(&request.username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let email = request.email.filter(|e| !e.trim().is_empty());
        if let Some(email) = &email
            && self.users.find_by_email(email).await?.is_some()
        {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash_password(&request.password)?;

        let user = self
            .users
            .create_user(&NewUser {
                username: request.username,
                email,
                password_hash,
                is_active: true,
                is_superuser: false,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(field) if field == "email" => AuthError::EmailTaken,
                RepositoryError::Conflict(_) => AuthError::UsernameTaken,
                other => other.into(),
            })?;

        log::info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Authenticate a login request
    ///
    /// Lockouts are checked before credentials, in order: client IP, submitted
    /// username, resolved account. Any of them rejects the attempt with the
    /// same `AccountLocked` client message. A wrong password, unknown user or
    /// wrong second factor is recorded against the IP and the submitted
    /// username and may lock the account. A successful login clears the
    /// counters.
    ///
    /// An identifier containing `@` is looked up by email first.
    ///
    /// # Errors
    ///
    /// * `AuthError::AccountLocked` - IP, username or account locked out
    /// * `AuthError::InvalidCredentials` - Unknown user or wrong password
    /// * `AuthError::UserInactive` - Correct password, disabled account
    /// * `AuthError::TwoFactorRequired` - 2FA enabled but no code given
    /// * `AuthError::InvalidTwoFactorCode` - Wrong 2FA code
    pub async fn authenticate(
        &self,
        request: &LoginRequest,
        client: &ClientContext,
    ) -> AuthResult<User> {
        let identifier = request.username.as_str();

        if self.brute_force.is_locked_out(&client.ip_address, LOGIN).await? {
            log::warn!("Login rejected: IP {} is locked out", client.ip_address);
            return Err(AuthError::locked("ip_lockout", None));
        }

        if self.brute_force.is_locked_out(identifier, LOGIN).await? {
            log::warn!("Login rejected: identifier {} is locked out", identifier);
            return Err(AuthError::locked("identifier_lockout", None));
        }

        let user = self.resolve_user(identifier).await?;

        if let Some(user) = &user
            && let Some(info) = self.lockout.is_user_locked(user).await?
        {
            log::warn!("Login rejected: account {} is locked", user.username);
            return Err(AuthError::locked(info.reason, Some(info.locked_until)));
        }

        let Some(user) = user else {
            self.record_login_failure(identifier, None, client).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let password_ok = match self.users.password_hash(user.id).await? {
            Some(hash) => self.verify_password(&request.password, &hash),
            None => false,
        };
        if !password_ok {
            self.record_login_failure(identifier, Some(&user), client).await?;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::UserInactive);
        }

        if let Some(secret) = self.users.totp_secret(user.id).await? {
            let Some(code) = request.totp_code.as_deref() else {
                return Err(AuthError::TwoFactorRequired);
            };
            if !verify_totp(&secret, code) {
                self.record_login_failure(identifier, Some(&user), client).await?;
                return Err(AuthError::InvalidTwoFactorCode);
            }
        }

        self.record_login_success(&user, identifier, client).await?;
        Ok(user)
    }

    /// Authenticate and issue a token pair
    pub async fn login(
        &self,
        request: &LoginRequest,
        client: &ClientContext,
    ) -> AuthResult<(User, TokenPair)> {
        let user = self.authenticate(request, client).await?;
        let tokens = self.tokens.generate_tokens(&user, Some(client)).await?;

        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventType::TokenCreated, "API token pair created")
                    .user(user.id)
                    .client(client)
                    .metadata(json!({
                        "access_jti": tokens.access_jti,
                        "refresh_jti": tokens.refresh_jti,
                    })),
            )
            .await;

        Ok((user, tokens))
    }

    /// Record a failed login
    ///
    /// Counts the failure against the client IP and the submitted identifier.
    /// Once the identifier reaches the threshold and names an existing
    /// account, that account is locked for the configured lockout duration.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Username or email exactly as submitted
    /// * `user` - Account the identifier resolved to, if any
    /// * `client` - Request origin
    pub async fn record_login_failure(
        &self,
        identifier: &str,
        user: Option<&User>,
        client: &ClientContext,
    ) -> AuthResult<()> {
        let mut event = NewSecurityEvent::new(SecurityEventType::FailedLogin, "Failed login attempt")
            .client(client)
            .metadata(json!({ "username": identifier }));
        if let Some(user) = user {
            event = event.user(user.id);
        }
        self.audit.record(event).await;

        let settings = self.brute_force.settings();
        if !settings.track_failed_attempts {
            return Ok(());
        }

        self.brute_force
            .record_failed_attempt(&client.ip_address, LOGIN)
            .await?;
        self.brute_force.record_failed_attempt(identifier, LOGIN).await?;

        let Some(user) = user else {
            return Ok(());
        };

        if let Err(e) = self.users.record_failed_login(user.id).await {
            log::warn!("Could not update failure counter for {}: {}", user.username, e);
        }

        let attempts = self
            .brute_force
            .get_failed_attempt_count(identifier, LOGIN)
            .await?;
        if attempts >= settings.max_failed_attempts {
            let minutes = settings.lockout_minutes();
            if self
                .lockout
                .lock_user_account(user, FAILED_LOGIN_LOCK_REASON, minutes)
                .await?
            {
                self.audit
                    .record(
                        NewSecurityEvent::new(
                            SecurityEventType::AccountLocked,
                            format!("Account locked after {attempts} failed login attempts"),
                        )
                        .user(user.id)
                        .client(client)
                        .metadata(json!({
                            "reason": FAILED_LOGIN_LOCK_REASON,
                            "duration_minutes": minutes,
                        })),
                    )
                    .await;
            }
        }

        Ok(())
    }

    async fn record_login_success(
        &self,
        user: &User,
        identifier: &str,
        client: &ClientContext,
    ) -> AuthResult<()> {
        let mut identifiers = vec![client.ip_address.as_str(), identifier, user.username.as_str()];
        if let Some(email) = &user.email {
            identifiers.push(email);
        }
        identifiers.sort_unstable();
        identifiers.dedup();

        for id in identifiers {
            self.brute_force.clear_failed_attempts(id, LOGIN).await?;
        }

        if let Err(e) = self.users.reset_failed_logins(user.id).await {
            log::warn!("Could not reset failure counter for {}: {}", user.username, e);
        }
        self.users.update_last_login(user.id).await?;

        self.audit
            .record(
                NewSecurityEvent::new(SecurityEventType::LoginAttempt, "Successful login")
                    .user(user.id)
                    .client(client),
            )
            .await;

        log::info!("User {} logged in from {}", user.username, client.ip_address);
        Ok(())
    }

    async fn resolve_user(&self, identifier: &str) -> AuthResult<Option<User>> {
        if identifier.contains('@')
            && let Some(user) = self.users.find_by_email(identifier).await?
        {
            return Ok(Some(user));
        }
        Ok(self.users.find_by_username(identifier).await?)
    }

    /// Enable (`Some`) or disable (`None`) TOTP for a user
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidTwoFactorCode` - Secret is not valid base32 or too short
    pub async fn set_two_factor_secret(&self, user_id: UserId, secret: Option<&str>) -> AuthResult<()> {
        if let Some(secret) = secret {
            build_totp(secret).ok_or(AuthError::InvalidTwoFactorCode)?;
        }

        self.users.set_totp_secret(user_id, secret).await?;

        let (event_type, description) = match secret {
            Some(_) => (SecurityEventType::TwoFactorEnabled, "Two-factor authentication enabled"),
            None => (SecurityEventType::TwoFactorDisabled, "Two-factor authentication disabled"),
        };
        self.audit
            .record(NewSecurityEvent::new(event_type, description).user(user_id))
            .await;
        Ok(())
    }

    /// Hash password with Argon2id + pepper
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(Argon2::default()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let peppered = format!("{}{}", password, self.pepper);
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            log::error!("Stored password hash is not in PHC format");
            return false;
        };

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

fn build_totp(secret: &str) -> Option<TOTP> {
    let bytes = Secret::Encoded(secret.to_string()).to_bytes().ok()?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes).ok()
}

fn verify_totp(secret: &str, code: &str) -> bool {
    let Some(totp) = build_totp(secret) else {
        log::error!("Stored TOTP secret is invalid");
        return false;
    };
    totp.check_current(code).unwrap_or(false)
}

/// Validate username format
fn validate_username(username: &str) -> AuthResult<()> {
    let len = username.chars().count();
    if !(3..=150).contains(&len) {
        return Err(AuthError::InvalidUsername(
            "Username must be 3-150 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
    {
        return Err(AuthError::InvalidUsername(
            "Username can only contain letters, numbers and @/./+/-/_".to_string(),
        ));
    }

    Ok(())
}

/// Validate password strength
fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

    if !has_digit || !has_uppercase || !has_lowercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one number, one uppercase and one lowercase letter"
                .to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_validation() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.lice+lab@uni-x_1").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username("alice!").is_err());
    }

    #[test]
    fn test_password_validation() {
        assert!(validate_password("Passw0rd").is_ok());
        assert!(validate_password("Pa55").is_err());
        assert!(validate_password("password1").is_err());
        assert!(validate_password("PASSWORD1").is_err());
        assert!(validate_password("Password").is_err());
    }

    #[test]
    fn test_totp_secret_validation() {
        assert!(build_totp("JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP").is_some());
        assert!(build_totp("not base32!").is_none());
        assert!(!verify_totp("not base32!", "123456"));
    }
}
