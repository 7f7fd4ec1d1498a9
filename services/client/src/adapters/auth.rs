//! services/client/src/adapters/auth.rs
//!
//! This module contains the auth adapter, the concrete implementation of the
//! `AuthService` port over the backend's `/auth/v1` endpoints.
//!
//! The adapter keeps the current session in memory, shares its access token
//! with the other adapters through `BackendHttp`, and broadcasts every session
//! change as an `AuthEvent`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use campus_swap_core::domain::{AuthEvent, AuthSession};
use campus_swap_core::ports::{AuthEventStream, AuthService, PortError, PortResult};

use super::http::BackendHttp;

/// Sessions are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

//=========================================================================================
// Wire Records
//=========================================================================================

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

/// Becomes the new profile's `nome_completo` on the backend.
#[derive(Serialize)]
struct SignUpMetadata<'a> {
    nome_completo: &'a str,
}

#[derive(Deserialize)]
struct UserRecord {
    id: Uuid,
    email: Option<String>,
}

/// A token response. Sign-up returns one only when no email confirmation is
/// required; otherwise every token field is absent.
#[derive(Deserialize)]
struct TokenRecord {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<UserRecord>,
}

impl TokenRecord {
    fn to_domain(self) -> Option<AuthSession> {
        let access_token = self.access_token?;
        let user = self.user?;
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => DateTime::<Utc>::from_timestamp(at, 0),
            (None, Some(secs)) => Some(Utc::now() + Duration::seconds(secs)),
            (None, None) => None,
        };
        Some(AuthSession {
            user_id: user.id,
            email: user.email,
            access_token,
            refresh_token: self.refresh_token,
            expires_at,
        })
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct AuthAdapter {
    http: BackendHttp,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthAdapter {
    pub fn new(http: BackendHttp) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http,
            session: RwLock::new(None),
            events,
        }
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: &(impl Serialize + Sync),
    ) -> PortResult<AuthSession> {
        let request = self
            .http
            .request(Method::POST, "/auth/v1/token")
            .await
            .query(&[("grant_type", grant_type)])
            .json(body);
        let record: TokenRecord = self.http.send_json(request).await?;
        record
            .to_domain()
            .ok_or_else(|| PortError::Unexpected("token response without a session".to_string()))
    }

    async fn store(&self, session: Option<AuthSession>, event: AuthEvent) {
        self.http
            .set_access_token(session.as_ref().map(|s| s.access_token.clone()))
            .await;
        *self.session.write().await = session;
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<AuthSession> {
        debug!("Refreshing access token");
        let session = self
            .token_request("refresh_token", &RefreshGrant { refresh_token })
            .await?;
        self.store(Some(session.clone()), AuthEvent::TokenRefreshed(session.clone()))
            .await;
        Ok(session)
    }
}

fn needs_refresh(session: &AuthSession, now: DateTime<Utc>) -> bool {
    session
        .expires_at
        .is_some_and(|at| at - Duration::seconds(REFRESH_MARGIN_SECS) <= now)
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for AuthAdapter {
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let session = self
            .token_request("password", &PasswordGrant { email, password })
            .await?;
        info!("Signed in as {}", session.user_id);
        self.store(Some(session.clone()), AuthEvent::SignedIn(session.clone()))
            .await;
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> PortResult<Option<AuthSession>> {
        let body = SignUpBody {
            email,
            password,
            data: SignUpMetadata {
                nome_completo: display_name,
            },
        };
        let request = self
            .http
            .request(Method::POST, "/auth/v1/signup")
            .await
            .json(&body);
        let record: TokenRecord = self.http.send_json(request).await?;

        let session = record.to_domain();
        match &session {
            Some(session) => {
                info!("Signed up and signed in as {}", session.user_id);
                self.store(Some(session.clone()), AuthEvent::SignedIn(session.clone()))
                    .await;
            }
            None => info!("Signed up {}; confirmation pending", email),
        }
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        if self.session.read().await.is_some() {
            let request = self.http.request(Method::POST, "/auth/v1/logout").await;
            self.http.send(request).await?;
        }
        self.store(None, AuthEvent::SignedOut).await;
        info!("Signed out");
        Ok(())
    }

    /// The stored session, refreshed first when it is about to expire. A failed
    /// refresh ends the session.
    async fn current_session(&self) -> PortResult<Option<AuthSession>> {
        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !needs_refresh(&session, Utc::now()) {
            return Ok(Some(session));
        }
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Ok(Some(session));
        };
        match self.refresh(refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Token refresh failed, signing out: {:?}", e);
                self.store(None, AuthEvent::SignedOut).await;
                Ok(None)
            }
        }
    }

    fn auth_events(&self) -> AuthEventStream {
        let rx = self.events.subscribe();
        Box::pin(stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Auth event listener lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn session(expires_at: Option<DateTime<Utc>>) -> AuthSession {
        AuthSession {
            user_id: Uuid::new_v4(),
            email: None,
            access_token: "jwt".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
        }
    }

    #[test]
    fn token_record_decodes_password_grant() {
        let json = r#"{
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1740830400,
            "refresh_token": "r1",
            "user": {"id": "7f9c24e8-3b12-4fef-91e0-c2a1f4b2d3e5", "email": "ana@ufrn.edu.br"}
        }"#;
        let session = serde_json::from_str::<TokenRecord>(json)
            .unwrap()
            .to_domain()
            .unwrap();

        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.email.as_deref(), Some("ana@ufrn.edu.br"));
        assert_eq!(session.expires_at.map(|t| t.timestamp()), Some(1740830400));
    }

    #[test]
    fn unconfirmed_sign_up_has_no_session() {
        let json = r#"{"id": "7f9c24e8-3b12-4fef-91e0-c2a1f4b2d3e5", "email": "ana@ufrn.edu.br"}"#;
        assert!(serde_json::from_str::<TokenRecord>(json)
            .unwrap()
            .to_domain()
            .is_none());
    }

    #[test]
    fn refresh_is_due_within_the_margin() {
        let now = Utc::now();
        assert!(needs_refresh(&session(Some(now + Duration::seconds(30))), now));
        assert!(!needs_refresh(&session(Some(now + Duration::hours(1))), now));
        assert!(!needs_refresh(&session(None), now));
    }

    #[tokio::test]
    async fn sign_out_without_session_only_broadcasts() {
        let http = BackendHttp::new("http://localhost:54321", "anon").unwrap();
        let auth = AuthAdapter::new(http.clone());
        let mut events = auth.auth_events();

        auth.sign_out().await.unwrap();

        assert_eq!(events.next().await, Some(AuthEvent::SignedOut));
        assert_eq!(auth.current_session().await.unwrap(), None);
        assert_eq!(http.bearer().await, "anon");
    }
}
