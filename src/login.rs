#![cfg(feature = "web")]

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::{AppState, run_blocking};
use crate::error::{Error, Result};
use crate::saving::StoreError;

/// User data structure representing a registered application user
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Email address, unique across users
    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Admin role flag
    #[serde(default)]
    pub is_admin: bool,

    /// Deactivated users can neither log in nor use an existing session
    #[serde(default = "default_active")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// A user as shown to clients, without the password hash
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            username: user.username.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Credential data for login and registration
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Username for login/registration
    pub username: String,

    /// Email address (optional for login, required for registration)
    #[serde(default)]
    pub email: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// Response to a successful login or registration
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// The authenticated caller, placed in request extensions by [`require_auth`]
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub is_admin: bool,
    /// Bearer token the request was authenticated with
    pub token: String,
}

/// Registered users, mirrored to a JSON file when one is configured
pub struct UserStore {
    path: Option<PathBuf>,
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    /// Open the users file, creating it (and its directory) as `{}` if missing
    ///
    /// # Arguments
    /// * `path` - Location of the users JSON file
    ///
    /// # Returns
    /// * `Result<UserStore, StoreError>` - The loaded store or an I/O / parse error
    pub fn open(path: impl Into<PathBuf>) -> std::result::Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir)?;
        }
        if !path.exists() {
            fs::write(&path, b"{}")?;
        }
        let users = load_users(&path)?;
        log::info!("loaded {} user(s) from {}", users.len(), path.display());
        Ok(UserStore {
            path: Some(path),
            users: RwLock::new(users),
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        UserStore {
            path: None,
            users: RwLock::new(HashMap::new()),
        }
    }

    fn save(&self, users: &HashMap<String, User>) -> Result<()> {
        if let Some(path) = &self.path {
            save_users(path, users)?;
        }
        Ok(())
    }

    /// Apply `change` to a copy of the users, persist the copy, then swap it in
    ///
    /// Memory only changes once the file write succeeded.
    fn commit<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut HashMap<String, User>) -> Result<T>,
    {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = users.clone();
        let out = change(&mut next)?;
        self.save(&next)?;
        *users = next;
        Ok(out)
    }

    fn check_available(users: &HashMap<String, User>, username: &str, email: &str) -> Result<()> {
        if users.contains_key(username) {
            return Err(Error::Validation("Username already exists".to_string()));
        }
        if users.values().any(|user| user.email.eq_ignore_ascii_case(email)) {
            return Err(Error::Validation(
                "Email address is already registered".to_string(),
            ));
        }
        Ok(())
    }

    /// Register a new user
    ///
    /// Creates a new user account with the provided username, email, and password.
    /// The password is hashed before storage, without holding the user lock.
    /// Hashing is CPU-heavy; async callers should run this on a blocking thread.
    ///
    /// # Errors
    /// * `Error::Validation` if a field is empty or the username/email is taken
    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User> {
        if username.trim().is_empty() || password.is_empty() || email.trim().is_empty() {
            return Err(Error::Validation(
                "Username, email and password cannot be empty".to_string(),
            ));
        }

        {
            let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
            Self::check_available(&users, username, email)?;
        }

        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            is_admin,
            is_active: true,
            created_at: Utc::now(),
        };
        // Checked again: another registration may have won while we were hashing.
        self.commit(|users| {
            Self::check_available(users, username, email)?;
            users.insert(username.to_string(), user.clone());
            Ok(())
        })?;
        log::info!("registered user '{}' (admin: {})", username, is_admin);
        Ok(user)
    }

    /// Check a username/password pair; `Ok(None)` means the credentials are wrong
    pub fn verify(&self, username: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.get(username) else {
            return Ok(None);
        };
        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn get(&self, username: &str) -> Option<User> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        users.get(username).cloned()
    }

    /// All users, newest first
    pub fn list(&self) -> Vec<User> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<User> = users.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn set_active(&self, username: &str, active: bool) -> Result<User> {
        self.commit(|users| {
            let user = users
                .get_mut(username)
                .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
            user.is_active = active;
            Ok(user.clone())
        })
    }

    /// Delete a user; returns whether it existed
    pub fn remove(&self, username: &str) -> Result<bool> {
        if self.get(username).is_none() {
            return Ok(false);
        }
        self.commit(|users| Ok(users.remove(username).is_some()))
    }
}

fn load_users(path: &Path) -> std::result::Result<HashMap<String, User>, StoreError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn save_users(path: &Path, users: &HashMap<String, User>) -> std::result::Result<(), StoreError> {
    let json = serde_json::to_string_pretty(users)?;
    fs::write(path, json)?;
    Ok(())
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| Error::Persistence("Password hashing failed".to_string()))
}

/// Verify a password against a stored hash
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| Error::Persistence("Invalid password hash format".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub user_id: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Active sessions keyed by bearer token
///
/// Owned by the application state: a session starts at login and ends at logout
/// or expiry.
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session for `username` and return its token
    pub fn create(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        let session = Session {
            user_id: username.to_string(),
            expires_at: now + self.ttl,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// The username behind a live session, if any
    pub fn validate(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.user_id.clone())
    }

    pub fn revoke(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id).is_some()
    }

    /// End every session of `username`; returns how many were dropped
    pub fn revoke_user(&self, username: &str) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != username);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Authentication middleware
///
/// Resolves the `Authorization: Bearer <token>` header to a live session and an
/// active user, then stores the caller's [`Identity`] in the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(|| {
        Error::Authorization("No token, authorization denied".to_string())
    })?;
    let token = bearer.token().to_string();

    let username = state
        .sessions
        .validate(&token)
        .ok_or_else(|| Error::Authorization("Token is not valid".to_string()))?;
    let user = state
        .users
        .get(&username)
        .ok_or_else(|| Error::Authorization("User not found".to_string()))?;
    if !user.is_active {
        return Err(Error::Forbidden("Account is deactivated".to_string()));
    }

    request.extensions_mut().insert(Identity {
        username: user.username,
        is_admin: user.is_admin,
        token,
    });
    Ok(next.run(request).await)
}

/// Admin gate; must run inside [`require_auth`]
pub async fn require_admin(
    Extension(identity): Extension<Identity>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if !identity.is_admin {
        return Err(Error::Forbidden(
            "Access denied. Admin privileges required.".to_string(),
        ));
    }
    Ok(next.run(request).await)
}

pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<UserCredentials>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let is_admin = state
        .config
        .admin_users
        .iter()
        .any(|name| name == &credentials.username);
    let worker = state.clone();
    let user = run_blocking(move || {
        worker.users.register(
            &credentials.username,
            &credentials.email,
            &credentials.password,
            is_admin,
        )
    })
    .await?;
    let token = state.sessions.create(&user.username);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: PublicUser::from(&user),
        }),
    ))
}

pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<UserCredentials>,
) -> Result<Json<AuthResponse>> {
    let worker = state.clone();
    let user = run_blocking(move || {
        worker
            .users
            .verify(&credentials.username, &credentials.password)
    })
    .await?
    .ok_or_else(|| Error::Authorization("Invalid username or password".to_string()))?;
    if !user.is_active {
        return Err(Error::Forbidden("Account is deactivated".to_string()));
    }
    let token = state.sessions.create(&user.username);
    log::info!("user '{}' logged in", user.username);
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<serde_json::Value> {
    state.sessions.revoke(&identity.token);
    log::info!("user '{}' logged out", identity.username);
    Json(serde_json::json!({ "message": "Logged out" }))
}

pub async fn handle_me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<PublicUser>> {
    let user = state
        .users
        .get(&identity.username)
        .ok_or_else(|| Error::NotFound("User not found".to_string()))?;
    Ok(Json(PublicUser::from(&user)))
}
