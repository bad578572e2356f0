//! Per-connection authentication state.

use common::RedactedToken;

pub(crate) struct ConnectionState {
    authenticated: bool,
    expected_token: RedactedToken,
}

impl ConnectionState {
    pub(crate) fn new(token: RedactedToken) -> Self {
        Self {
            authenticated: false,
            expected_token: token,
        }
    }

    /// Validate token and mark as authenticated if correct.
    pub(crate) fn validate_token(&mut self, token: &str) -> bool {
        if !self.expected_token.is_empty() && self.expected_token.matches(token) {
            self.authenticated = true;
        }
        self.authenticated
    }
}
