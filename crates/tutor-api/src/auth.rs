//! Password hashing, bearer tokens and the [`CurrentPrincipal`] extractor.
//!
//! Passwords are stored as argon2 PHC strings. A bearer token is 32 random
//! bytes, hex-encoded; only its SHA-256 digest is persisted.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use tutor_core::{principal::Principal, store::IdentityStore};

use crate::{AppState, error::ApiError};

const PASSWORD_ALPHABET: &[u8] =
  b"abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const GENERATED_PASSWORD_LEN: usize = 12;

// ─── Passwords ───────────────────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
    .is_ok()
}

/// A fresh password for resets, drawn from an alphabet without look-alike
/// characters.
pub fn generate_password() -> String {
  (0..GENERATED_PASSWORD_LEN)
    .map(|_| {
      let i = OsRng.next_u32() as usize % PASSWORD_ALPHABET.len();
      PASSWORD_ALPHABET[i] as char
    })
    .collect()
}

/// Reject passwords too short to be worth hashing.
pub fn check_password_policy(password: &str) -> Result<(), ApiError> {
  if password.chars().count() < 8 {
    return Err(ApiError::BadRequest(
      "password must be at least 8 characters".to_owned(),
    ));
  }
  Ok(())
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

pub fn token_digest(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

fn new_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// The raw token from an `Authorization: Bearer …` header.
pub fn bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(ApiError::Unauthorized)
}

/// Check a login and password, and that the principal may sign in.
pub async fn authenticate(
  state: &AppState,
  login: &str,
  password: &str,
) -> Result<Principal, ApiError> {
  let store = state.registry.store();
  let Some(stored) = store.find_credentials(login).await? else {
    tracing::info!(%login, "login rejected: unknown login");
    return Err(ApiError::Unauthorized);
  };
  if !verify_password(password, &stored.password_hash) {
    tracing::info!(%login, "login rejected: wrong password");
    return Err(ApiError::Unauthorized);
  }
  if !store.is_enabled(stored.principal).await? {
    tracing::info!(%login, "login rejected: principal disabled");
    return Err(ApiError::Disabled);
  }
  Ok(stored.principal)
}

/// Mint a token for `principal`; returns the secret and its expiry.
pub async fn issue_token(
  state: &AppState,
  principal: &Principal,
) -> Result<(String, DateTime<Utc>), ApiError> {
  let expires_at = state
    .config
    .token_ttl()
    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
    .ok_or_else(|| {
      ApiError::Internal(format!(
        "token_ttl_hours {} is out of range",
        state.config.token_ttl_hours
      ))
    })?;
  let token = new_token();
  state
    .registry
    .store()
    .insert_token(principal.principal_id, token_digest(&token), expires_at)
    .await?;
  Ok((token, expires_at))
}

pub async fn revoke_token(state: &AppState, token: &str) -> Result<bool, ApiError> {
  Ok(state.registry.store().revoke_token(token_digest(token)).await?)
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The authenticated caller. Rejects with 401 when the token is missing,
/// unknown, expired, or belongs to a principal that can no longer sign in.
#[derive(Debug, Clone, Copy)]
pub struct CurrentPrincipal(pub Principal);

impl FromRequestParts<AppState> for CurrentPrincipal {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState,
  ) -> Result<Self, Self::Rejection> {
    let token = bearer(&parts.headers)?;
    let store = state.registry.store();
    let principal = store
      .principal_for_token(token_digest(token), Utc::now())
      .await?
      .ok_or(ApiError::Unauthorized)?;
    if !store.is_enabled(principal).await? {
      return Err(ApiError::Unauthorized);
    }
    Ok(Self(principal))
  }
}
