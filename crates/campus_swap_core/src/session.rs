//! crates/campus_swap_core/src/session.rs
//!
//! The session/identity provider. A `SessionContext` is built once at startup
//! and passed to whatever needs the current user.
//!
//! Two background tasks run per context:
//! - the auth listener, which folds backend auth events into `SessionState`;
//! - the profile worker, which receives user ids over an `mpsc` queue and
//!   looks up their profile rows.
//!
//! The listener never fetches anything itself. It only enqueues, so the
//! profile lookup always runs after the session change that caused it has been
//! published.

use std::sync::Arc;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::{AuthSession, Profile};
use crate::ports::{AuthEventStream, PortError, Toast};
use crate::state::AppState;

const ALREADY_REGISTERED_MESSAGE: &str =
    "Este email já está cadastrado. Faça login ou use outro email.";
const WEAK_PASSWORD_MESSAGE: &str = "A senha deve ter no mínimo 6 caracteres.";

//=========================================================================================
// State and Errors
//=========================================================================================

/// What the rest of the application knows about the signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session: Option<AuthSession>,
    pub profile: Option<Profile>,
    /// True until the initial session check has resolved.
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
        }
    }
}

impl SessionState {
    pub fn user_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.user_id)
    }
}

/// An auth operation failed. `user_message` is what was shown to the user;
/// the backend error is kept as the source.
#[derive(Debug, thiserror::Error)]
#[error("{user_message}")]
pub struct AuthFailure {
    pub user_message: String,
    #[source]
    pub source: PortError,
}

const SIGN_IN_FALLBACK: &str = "Verifique suas credenciais e tente novamente.";
const SIGN_UP_FALLBACK: &str = "Ocorreu um erro ao criar sua conta.";
const SIGN_OUT_MESSAGE: &str = "Ocorreu um erro ao sair da conta.";

/// Maps the backend auth errors users can act on onto localized messages.
/// Returns `None` for anything else; each operation picks its own wording then.
pub fn translate_auth_error(err: &PortError) -> Option<&'static str> {
    let message = err.message();
    if message.contains("already registered") {
        Some(ALREADY_REGISTERED_MESSAGE)
    } else if message.contains("Password") {
        Some(WEAK_PASSWORD_MESSAGE)
    } else {
        None
    }
}

//=========================================================================================
// SessionContext
//=========================================================================================

pub struct SessionContext {
    app: Arc<AppState>,
    state: Arc<watch::Sender<SessionState>>,
    profile_tx: mpsc::UnboundedSender<Uuid>,
    cancel: CancellationToken,
}

impl SessionContext {
    /// Attaches to the auth event stream, asks the backend for the current
    /// session once, and starts the profile worker. Both session sources go
    /// through the same update routine.
    pub async fn start(app: Arc<AppState>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        let state = Arc::new(state_tx);
        let cancel = CancellationToken::new();
        let (profile_tx, profile_rx) = mpsc::unbounded_channel();

        tokio::spawn(profile_worker(
            app.clone(),
            state.clone(),
            profile_rx,
            cancel.clone(),
        ));

        // Subscribe before the one-shot lookup so no event can slip between them.
        let events = app.auth.auth_events();
        tokio::spawn(auth_listener(
            events,
            state.clone(),
            profile_tx.clone(),
            cancel.clone(),
        ));

        match app.auth.current_session().await {
            Ok(session) => apply_session(&state, &profile_tx, session),
            Err(e) => error!("Failed to read the current session: {:?}", e),
        }
        state.send_modify(|s| s.loading = false);

        Self {
            app,
            state,
            profile_tx,
            cancel,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.state.borrow().user_id()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile.clone()
    }

    pub fn app(&self) -> &Arc<AppState> {
        &self.app
    }

    /// On success the new session is already published when this returns.
    /// Unknown backend errors are shown with the backend's own message.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthFailure> {
        match self.app.auth.sign_in(email, password).await {
            Ok(session) => {
                info!("Signed in as {}", email);
                apply_session(&self.state, &self.profile_tx, Some(session));
                self.app
                    .notifier
                    .notify(Toast::success("Bem-vindo!", "Login realizado com sucesso."));
                Ok(())
            }
            Err(e) => {
                error!("Sign-in failed: {:?}", e);
                let user_message = match translate_auth_error(&e) {
                    Some(known) => known.to_string(),
                    None if e.message().trim().is_empty() => SIGN_IN_FALLBACK.to_string(),
                    None => e.message().to_string(),
                };
                Err(self.fail("Erro no login", user_message, e))
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(), AuthFailure> {
        match self.app.auth.sign_up(email, password, display_name).await {
            Ok(session) => {
                info!("Created account for {}", email);
                if let Some(session) = session {
                    apply_session(&self.state, &self.profile_tx, Some(session));
                }
                self.app.notifier.notify(Toast::success(
                    "Conta criada!",
                    "Sua conta foi criada com sucesso. Você já pode fazer login.",
                ));
                Ok(())
            }
            Err(e) => {
                error!("Sign-up failed: {:?}", e);
                let user_message = translate_auth_error(&e).unwrap_or(SIGN_UP_FALLBACK);
                Err(self.fail("Erro no cadastro", user_message.to_string(), e))
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), AuthFailure> {
        match self.app.auth.sign_out().await {
            Ok(()) => {
                apply_session(&self.state, &self.profile_tx, None);
                self.app
                    .notifier
                    .notify(Toast::success("Até logo!", "Você saiu da sua conta."));
                Ok(())
            }
            Err(e) => {
                error!("Sign-out failed: {:?}", e);
                Err(self.fail("Erro ao sair", SIGN_OUT_MESSAGE.to_string(), e))
            }
        }
    }

    /// Stops the background tasks. The last published state stays readable.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn fail(&self, title: &str, user_message: String, source: PortError) -> AuthFailure {
        self.app
            .notifier
            .notify(Toast::destructive(title, user_message.clone()));
        AuthFailure {
            user_message,
            source,
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

//=========================================================================================
// Background Tasks
//=========================================================================================

/// Publishes a session change and, when a user is present whose profile is not
/// loaded yet, queues a profile lookup. Re-applying the current session is a
/// no-op, so the auth operations and the listener can both report one change.
fn apply_session(
    state: &watch::Sender<SessionState>,
    profile_tx: &mpsc::UnboundedSender<Uuid>,
    session: Option<AuthSession>,
) {
    let user_id = session.as_ref().map(|s| s.user_id);
    let mut needs_profile = false;
    state.send_if_modified(|s| {
        if s.session == session {
            return false;
        }
        s.session = session;
        let loaded_for_user = s.profile.as_ref().map(|p| p.id) == user_id;
        if !loaded_for_user {
            s.profile = None;
        }
        needs_profile = user_id.is_some() && !loaded_for_user;
        true
    });

    if let Some(user_id) = user_id.filter(|_| needs_profile) {
        if profile_tx.send(user_id).is_err() {
            debug!("Profile worker has stopped; skipping lookup for {}", user_id);
        }
    }
}

async fn auth_listener(
    mut events: AuthEventStream,
    state: Arc<watch::Sender<SessionState>>,
    profile_tx: mpsc::UnboundedSender<Uuid>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            debug!("Auth event stream closed.");
            break;
        };
        debug!("Auth event: {:?}", event);
        apply_session(&state, &profile_tx, event.session().cloned());
    }
}

async fn profile_worker(
    app: Arc<AppState>,
    state: Arc<watch::Sender<SessionState>>,
    mut requests: mpsc::UnboundedReceiver<Uuid>,
    cancel: CancellationToken,
) {
    loop {
        let user_id = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(user_id) => user_id,
                None => break,
            },
        };

        match app.db.get_profile(user_id).await {
            Ok(profile) => state.send_modify(|s| {
                // The user may have signed out or switched while we waited.
                if s.user_id() == Some(user_id) {
                    s.profile = Some(profile);
                } else {
                    debug!("Discarding stale profile for {}", user_id);
                }
            }),
            Err(e) => error!("Failed to fetch profile for {}: {:?}", user_id, e),
        }
    }
}
