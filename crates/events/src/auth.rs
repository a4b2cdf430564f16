//! Write authorization seam.
//!
//! The hub never decides on its own who may write. It asks a
//! [`WriteAuthorizer`] supplied by the surrounding session layer.

use std::collections::HashSet;

use opswatch_core::channel::Channel;

/// Who is attempting a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Writes originating inside the process (monitoring, event log).
    System,
    /// A caller that presented a bearer token.
    Token(String),
    /// A caller that presented nothing.
    Anonymous,
}

impl Principal {
    /// Build from an optional bearer token.
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => Principal::Token(t.to_string()),
            None => Principal::Anonymous,
        }
    }
}

/// Decides whether a principal may write a channel.
pub trait WriteAuthorizer: Send + Sync {
    fn authorize(&self, principal: &Principal, channel: &Channel) -> bool;
}

/// Every caller may write every channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl WriteAuthorizer for AllowAll {
    fn authorize(&self, _principal: &Principal, _channel: &Channel) -> bool {
        true
    }
}

/// Accepts callers holding one of a fixed set of tokens.
#[derive(Debug, Clone)]
pub struct TokenAuthorizer {
    tokens: HashSet<String>,
}

impl TokenAuthorizer {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl WriteAuthorizer for TokenAuthorizer {
    fn authorize(&self, principal: &Principal, _channel: &Channel) -> bool {
        match principal {
            Principal::System => true,
            Principal::Token(token) => self.tokens.contains(token),
            Principal::Anonymous => false,
        }
    }
}
