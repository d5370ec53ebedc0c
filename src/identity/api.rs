use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

/// Session and user context attached to every report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub payer: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub personas: BTreeSet<String>,
}

/// Supplies the context to tag reports with. Read at report time, never cached by the
/// engine.
pub trait SessionContextProvider: Send + Sync {
    fn current_context(&self) -> SessionContext;
}

#[derive(Debug, Default)]
struct UserState {
    user_id: Option<String>,
    username: Option<String>,
    email: Option<String>,
    payer: bool,
    personas: BTreeSet<String>,
}

/// In-memory user identity store for one SDK instance.
#[derive(Debug)]
pub struct UserIdentity {
    session_id: String,
    state: RwLock<UserState>,
}

impl UserIdentity {
    pub fn new() -> Self {
        Self::with_session_id(generate_session_id())
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: RwLock::new(UserState::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_user_identifier(&self, user_id: impl Into<String>) {
        self.update(|state| state.user_id = Some(user_id.into()));
    }

    pub fn clear_user_identifier(&self) {
        self.update(|state| state.user_id = None);
    }

    pub fn set_username(&self, username: impl Into<String>) {
        self.update(|state| state.username = Some(username.into()));
    }

    pub fn clear_username(&self) {
        self.update(|state| state.username = None);
    }

    pub fn set_user_email(&self, email: impl Into<String>) {
        self.update(|state| state.email = Some(email.into()));
    }

    pub fn clear_user_email(&self) {
        self.update(|state| state.email = None);
    }

    /// Marks the current user as paying; used for cohorting.
    pub fn set_user_as_payer(&self) {
        self.update(|state| state.payer = true);
    }

    pub fn clear_user_as_payer(&self) {
        self.update(|state| state.payer = false);
    }

    pub fn set_user_persona(&self, persona: impl Into<String>) {
        let persona = persona.into();
        if persona.trim().is_empty() {
            return;
        }
        self.update(|state| {
            state.personas.insert(persona);
        });
    }

    pub fn clear_user_persona(&self, persona: &str) {
        self.update(|state| {
            state.personas.remove(persona);
        });
    }

    fn update(&self, f: impl FnOnce(&mut UserState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl Default for UserIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContextProvider for UserIdentity {
    fn current_context(&self) -> SessionContext {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        SessionContext {
            session_id: self.session_id.clone(),
            user_id: state.user_id.clone(),
            username: state.username.clone(),
            email: state.email.clone(),
            payer: state.payer,
            personas: state.personas.clone(),
        }
    }
}

fn generate_session_id() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(32)
        .collect()
}
