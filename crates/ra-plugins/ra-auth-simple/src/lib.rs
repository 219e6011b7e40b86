//! # ra-auth-simple
//!
//! Argon2-based implementation of `AuthProvider`. Accounts are `users`
//! documents (email + password hash) in the document store; the signed-in
//! identity is process-local state, mirroring the client-side session of
//! the managed auth SDK this replaces. Curator operations never read it —
//! handlers resolve the identity once and pass it along.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use ra_core::error::{AppError, Result};
use ra_core::models::UserIdentity;
use ra_core::records::USERS;
use ra_core::traits::{AuthProvider, DocumentStore};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};

const BAD_CREDENTIALS: &str = "メールアドレスまたはパスワードが正しくありません";
const EMAIL_TAKEN: &str = "このメールアドレスは既に登録されています";

pub struct SimpleAuthProvider {
    docs: Arc<dyn DocumentStore>,
    session: RwLock<Option<UserIdentity>>,
}

impl SimpleAuthProvider {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self {
            docs,
            session: RwLock::new(None),
        }
    }

    async fn find_user(&self, email: &str) -> Result<Option<(String, Value)>> {
        let docs = self.docs.query_by_field(USERS, "email", &json!(email)).await?;
        Ok(docs.into_iter().next().map(|d| (d.id, d.fields)))
    }

    fn set_session(&self, identity: &UserIdentity) {
        match self.session.write() {
            Ok(mut session) => *session = Some(identity.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(identity.clone()),
        }
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity> {
        let (uid, fields) = self
            .find_user(email)
            .await?
            .ok_or_else(|| AppError::Auth(BAD_CREDENTIALS.into()))?;

        let stored = fields
            .get("passwordHash")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Persistence(format!("user {uid} has no password hash")))?;
        let parsed = PasswordHash::new(stored)
            .map_err(|e| AppError::Persistence(format!("user {uid} hash unreadable: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AppError::Auth(BAD_CREDENTIALS.into()))?;

        let identity = UserIdentity {
            uid,
            email: email.to_string(),
        };
        self.set_session(&identity);
        log::info!("user {} signed in", identity.uid);
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserIdentity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Auth(BAD_CREDENTIALS.into()));
        }
        if self.find_user(email).await?.is_some() {
            return Err(AppError::Auth(EMAIL_TAKEN.into()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("hashing password: {e}")))?
            .to_string();

        let uid = self
            .docs
            .insert(USERS, json!({ "email": email, "passwordHash": hash }))
            .await?;

        let identity = UserIdentity {
            uid,
            email: email.to_string(),
        };
        self.set_session(&identity);
        log::info!("user {} signed up", identity.uid);
        Ok(identity)
    }

    async fn sign_out(&self) {
        match self.session.write() {
            Ok(mut session) => *session = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn current_user(&self) -> Option<UserIdentity> {
        match self.session.read() {
            Ok(session) => session.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_db_sqlite::SqliteDocumentStore;

    async fn provider() -> SimpleAuthProvider {
        let docs = SqliteDocumentStore::new("sqlite::memory:").await.unwrap();
        SimpleAuthProvider::new(Arc::new(docs))
    }

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = provider().await;
        let created = auth.sign_up("a@example.com", "ひみつ123").await.unwrap();
        assert_eq!(auth.current_user(), Some(created.clone()));

        auth.sign_out().await;
        assert_eq!(auth.current_user(), None);

        let signed_in = auth.sign_in("a@example.com", "ひみつ123").await.unwrap();
        assert_eq!(signed_in.uid, created.uid);
        assert_eq!(auth.current_user(), Some(signed_in));
    }

    #[tokio::test]
    async fn wrong_password_is_an_auth_error() {
        let auth = provider().await;
        auth.sign_up("a@example.com", "正しい").await.unwrap();
        auth.sign_out().await;

        let err = auth.sign_in("a@example.com", "まちがい").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        assert_eq!(auth.current_user(), None);
    }

    #[tokio::test]
    async fn unknown_email_is_an_auth_error() {
        let auth = provider().await;
        let err = auth.sign_in("ghost@example.com", "x").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_refused() {
        let auth = provider().await;
        auth.sign_up("a@example.com", "one").await.unwrap();
        let err = auth.sign_up("a@example.com", "two").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
