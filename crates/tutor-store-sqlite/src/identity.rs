//! [`IdentityStore`] impl: principals, password hashes and bearer tokens.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use tutor_core::{
  lifecycle::can_authenticate,
  principal::{NewCredentials, Principal, Role},
  store::{IdentityStore, StoredCredentials},
};

use crate::{
  encode::{RawPrincipal, decode_status, encode_dt, encode_uuid},
  store::{SqliteStore, insert_principal, login_taken},
  Error, Result,
};

impl IdentityStore for SqliteStore {
  type Error = Error;

  async fn insert_admin(&self, credentials: NewCredentials) -> Result<Principal> {
    let principal = Principal::new(Uuid::new_v4(), Role::Admin);
    let id_str = encode_uuid(principal.principal_id);
    let now = encode_dt(Utc::now());
    let login = credentials.login.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if login_taken(&tx, &credentials.login)? {
          return Ok(false);
        }
        insert_principal(&tx, &id_str, &credentials, Role::Admin, &now)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(tutor_core::Error::LoginTaken(login).into());
    }
    Ok(principal)
  }

  async fn find_credentials(&self, login: &str) -> Result<Option<StoredCredentials>> {
    let login = login.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT principal_id, role, centre_id, student_id, password_hash
               FROM principals WHERE login = ?1",
              rusqlite::params![login],
              |row| {
                Ok(RawPrincipal {
                  principal_id:  row.get(0)?,
                  role:          row.get(1)?,
                  centre_id:     row.get(2)?,
                  student_id:    row.get(3)?,
                  password_hash: row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|raw| {
        let (principal, password_hash) = raw.into_principal()?;
        Ok(StoredCredentials { principal, password_hash })
      })
      .transpose()
  }

  async fn is_enabled(&self, principal: Principal) -> Result<bool> {
    match principal.role {
      Role::Admin => Ok(true),
      Role::Centre(id) => {
        let id = encode_uuid(id);
        let active = self
          .conn
          .call(move |conn| {
            Ok(
              conn
                .query_row(
                  "SELECT active FROM centres WHERE centre_id = ?1",
                  rusqlite::params![id],
                  |row| row.get::<_, bool>(0),
                )
                .optional()?,
            )
          })
          .await?;
        Ok(active.unwrap_or(false))
      }
      Role::Student(id) => {
        let id = encode_uuid(id);
        let row = self
          .conn
          .call(move |conn| {
            Ok(
              conn
                .query_row(
                  "SELECT s.status, c.active
                   FROM students s JOIN centres c ON c.centre_id = s.centre_id
                   WHERE s.student_id = ?1",
                  rusqlite::params![id],
                  |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
                )
                .optional()?,
            )
          })
          .await?;
        let Some((status, centre_active)) = row else {
          return Ok(false);
        };
        Ok(centre_active && can_authenticate(decode_status(&status)?))
      }
    }
  }

  async fn insert_token(
    &self,
    principal_id: Uuid,
    token_digest: String,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str = encode_uuid(principal_id);
    let now = encode_dt(Utc::now());
    let expires = encode_dt(expires_at);
    self
      .conn
      .call(move |conn| {
        // Opportunistically sweep this principal's expired tokens.
        conn.execute(
          "DELETE FROM tokens WHERE principal_id = ?1 AND expires_at <= ?2",
          rusqlite::params![id_str, now],
        )?;
        conn.execute(
          "INSERT INTO tokens (token_digest, principal_id, created_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![token_digest, id_str, now, expires],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn principal_for_token(
    &self,
    token_digest: String,
    now: DateTime<Utc>,
  ) -> Result<Option<Principal>> {
    let now = encode_dt(now);
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT p.principal_id, p.role, p.centre_id, p.student_id, p.password_hash
               FROM tokens t JOIN principals p ON p.principal_id = t.principal_id
               WHERE t.token_digest = ?1 AND t.expires_at > ?2",
              rusqlite::params![token_digest, now],
              |row| {
                Ok(RawPrincipal {
                  principal_id:  row.get(0)?,
                  role:          row.get(1)?,
                  centre_id:     row.get(2)?,
                  student_id:    row.get(3)?,
                  password_hash: row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|raw| Ok(raw.into_principal()?.0))
      .transpose()
  }

  async fn revoke_token(&self, token_digest: String) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM tokens WHERE token_digest = ?1",
          rusqlite::params![token_digest],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }
}
