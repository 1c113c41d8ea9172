//! Local view of the current session.
//!
//! The cache is only trusted between an explicit login/refresh/check response
//! and the next `401`. Every change goes through [`SessionCache::apply`].

use kiz_session::auth::{AuthUser, SessionTokens};

/// Who the client believes it is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(AuthUser),
}

/// Something the client observed from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn {
        user: AuthUser,
        tokens: SessionTokens,
    },
    /// A refresh returned a new pair. Also used to restore saved tokens.
    Refreshed(SessionTokens),
    /// Any endpoint answered `401`
    Unauthorized,
    LoggedOut,
    /// Result of `/auth/check`; `None` when the server said anonymous
    Checked(Option<AuthUser>),
}

#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    state: SessionState,
    tokens: Option<SessionTokens>,
    needs_recheck: bool,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single mutation entry point
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LoggedIn { user, tokens } => {
                self.state = SessionState::Authenticated(user);
                self.tokens = Some(tokens);
                self.needs_recheck = false;
            }
            SessionEvent::Refreshed(tokens) => {
                self.tokens = Some(tokens);
                // A new pair says nothing about who we are if we did not know already
                if self.state == SessionState::Anonymous {
                    self.needs_recheck = true;
                }
            }
            SessionEvent::Unauthorized => {
                // The refresh token may still be good, so the pair is kept
                self.state = SessionState::Anonymous;
                self.needs_recheck = true;
            }
            SessionEvent::LoggedOut => {
                self.state = SessionState::Anonymous;
                self.tokens = None;
                self.needs_recheck = false;
            }
            SessionEvent::Checked(Some(user)) => {
                self.state = SessionState::Authenticated(user);
                self.needs_recheck = false;
            }
            SessionEvent::Checked(None) => {
                self.state = SessionState::Anonymous;
                self.needs_recheck = false;
            }
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Cached user, only while the cache is authoritative
    pub fn user(&self) -> Option<&AuthUser> {
        match (&self.state, self.needs_recheck) {
            (SessionState::Authenticated(user), false) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.tokens.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh_token.as_str())
    }

    /// Set after a `401` until `/auth/check` answers again
    pub fn needs_recheck(&self) -> bool {
        self.needs_recheck
    }
}
