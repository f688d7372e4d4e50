use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;
use crate::err::Error;
use crate::models::{AuthSession, NewUser, User};
use crate::store::{Store, StoreError};
use crate::validation::Registration;

lazy_static! {
    // Verified against when the identity is unknown, so both failure paths do
    // the same amount of work.
    static ref DECOY_HASH: Option<String> = hash_password("decoy-Passw0rd").ok();
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCheck {
    Inactive,
    Active(AuthSession),
}

/// Plaintext remember credential handed to the client. Only its hash is stored.
#[derive(Debug, Clone)]
pub struct RememberToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(_) => false,
    }
}

/// 32 random bytes, hex encoded.
fn random_token() -> String {
    let bytes: [u8; 32] = thread_rng().gen();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn new_session_id() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(&ssid_bytes);
    hex::encode(hasher.finalize())
}

pub async fn register_user(store: &dyn Store, registration: Registration) -> Result<i64, Error> {
    let user = NewUser {
        password_hash: hash_password(&registration.password)?,
        fullname: registration.fullname,
        email: registration.email,
        role: registration.role,
    };
    let (email, role) = (user.email.clone(), user.role);

    match store.insert_user(user).await {
        Ok(id) => {
            log::info!("Registered {} as {}", email, role);
            Ok(id)
        }
        Err(StoreError::UniqueViolation) => {
            Err(Error::conflict("This email address is already registered."))
        }
        Err(err) => Err(err.into()),
    }
}

/// Issues, validates and expires login sessions and their anti-forgery
/// tokens, and manages the long-lived remember credential.
#[derive(Debug, Clone)]
pub struct SessionAuthority {
    timeout: Duration,
    remember_ttl: Duration,
}

impl SessionAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            timeout: Duration::seconds(config.session_timeout_secs),
            remember_ttl: Duration::days(config.remember_days),
        }
    }

    pub fn remember_ttl(&self) -> Duration {
        self.remember_ttl
    }

    /// Verifies the credential and opens a fresh session. A session the client
    /// already holds (`previous_ssid`) is destroyed, never reused.
    pub async fn authenticate(
        &self,
        store: &dyn Store,
        email: &str,
        password: &str,
        previous_ssid: Option<&str>,
    ) -> Result<AuthSession, Error> {
        let user = match store.find_user_by_email(email).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            Some(_) => {
                log::warn!("Failed login attempt for {}", email);
                return Err(Error::invalid_credentials());
            }
            None => {
                if let Some(decoy) = DECOY_HASH.as_deref() {
                    verify_password(password, decoy);
                }
                log::warn!("Login attempt for unknown identity {}", email);
                return Err(Error::invalid_credentials());
            }
        };

        if let Some(previous) = previous_ssid.filter(|s| !s.is_empty()) {
            store.delete_login_session(previous).await?;
        }
        self.start_session(store, &user, Utc::now()).await
    }

    async fn start_session(
        &self,
        store: &dyn Store,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<AuthSession, Error> {
        let session = AuthSession {
            ssid: new_session_id(),
            user_id: user.id,
            email: user.email.clone(),
            fullname: user.fullname.clone(),
            role: user.role,
            csrf_token: random_token(),
            login_at: now,
        };
        let purged = store.purge_expired_login_sessions(now - self.timeout).await?;
        if purged > 0 {
            log::debug!("Purged {} expired login sessions", purged);
        }
        store.insert_login_session(&session).await?;
        log::info!("{} logged in as {}", user.email, user.role);
        Ok(session)
    }

    pub async fn check_session(
        &self,
        store: &dyn Store,
        ssid: Option<&str>,
    ) -> Result<SessionCheck, Error> {
        self.check_session_at(store, ssid, Utc::now()).await
    }

    /// A session is valid while `now - login_at < timeout`. Past that the row
    /// is deleted and the caller is treated as logged out.
    pub async fn check_session_at(
        &self,
        store: &dyn Store,
        ssid: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SessionCheck, Error> {
        let ssid = match ssid {
            Some(ssid) if !ssid.is_empty() => ssid,
            _ => return Ok(SessionCheck::Inactive),
        };
        let session = match store.find_login_session(ssid).await? {
            Some(session) => session,
            None => return Ok(SessionCheck::Inactive),
        };

        if now - session.login_at < self.timeout {
            Ok(SessionCheck::Active(session))
        } else {
            store.delete_login_session(ssid).await?;
            log::debug!("Session of {} expired", session.email);
            Ok(SessionCheck::Inactive)
        }
    }

    pub fn verify_csrf(session: &AuthSession, candidate: Option<&str>) -> Result<(), Error> {
        match candidate {
            Some(token)
                if !token.is_empty()
                    && bool::from(token.as_bytes().ct_eq(session.csrf_token.as_bytes())) =>
            {
                Ok(())
            }
            _ => Err(Error::csrf_mismatch()),
        }
    }

    pub async fn remember_me(
        &self,
        store: &dyn Store,
        user_id: i64,
    ) -> Result<RememberToken, Error> {
        self.remember_me_at(store, user_id, Utc::now()).await
    }

    async fn remember_me_at(
        &self,
        store: &dyn Store,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<RememberToken, Error> {
        let token = random_token();
        let expires_at = now + self.remember_ttl;
        store
            .set_remember_token(user_id, Some((&hash_token(&token), expires_at)))
            .await?;
        Ok(RememberToken { token, expires_at })
    }

    pub async fn resume(
        &self,
        store: &dyn Store,
        token: &str,
    ) -> Result<(AuthSession, RememberToken), Error> {
        self.resume_at(store, token, Utc::now()).await
    }

    /// Re-establishes a session from a remember credential and rotates it.
    pub async fn resume_at(
        &self,
        store: &dyn Store,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(AuthSession, RememberToken), Error> {
        let rejected = || Error::Authentication {
            message: "Remembered login is invalid or has expired.".to_string(),
        };
        if token.is_empty() {
            return Err(rejected());
        }

        let user = match store.find_user_by_remember_token(&hash_token(token)).await? {
            Some(user) => user,
            None => return Err(rejected()),
        };
        match user.token_expires {
            Some(expires) if expires > now => {}
            _ => {
                store.set_remember_token(user.id, None).await?;
                return Err(rejected());
            }
        }

        let session = self.start_session(store, &user, now).await?;
        let renewed = self.remember_me_at(store, user.id, now).await?;
        Ok((session, renewed))
    }

    pub async fn logout(&self, store: &dyn Store, session: &AuthSession) -> Result<(), Error> {
        store.delete_login_session(&session.ssid).await?;
        store.set_remember_token(session.user_id, None).await?;
        log::info!("{} logged out", session.email);
        Ok(())
    }
}
