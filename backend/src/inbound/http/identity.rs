//! Caller identity asserted by the upstream gateway.
//!
//! Authentication happens before requests reach this service. The gateway
//! forwards the caller's id, display name, and role in headers; handlers
//! take a [`Caller`] and never read headers themselves.

use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures_util::future::{Ready, ready};

use crate::domain::{Actor, Error};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_NAME_HEADER: &str = "X-User-Name";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

/// What the caller may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Submitter,
    Reviewer,
}

impl Role {
    fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitter" => Some(Self::Submitter),
            "reviewer" => Some(Self::Reviewer),
            _ => None,
        }
    }
}

/// Authenticated caller of an HTTP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub actor: Actor,
    pub role: Role,
}

impl Caller {
    /// Require the reviewer role.
    pub fn require_reviewer(&self) -> Result<&Actor, Error> {
        match self.role {
            Role::Reviewer => Ok(&self.actor),
            Role::Submitter => Err(Error::forbidden("reviewers only")),
        }
    }

    /// Require the submitter role.
    pub fn require_submitter(&self) -> Result<&Actor, Error> {
        match self.role {
            Role::Submitter => Ok(&self.actor),
            Role::Reviewer => Err(Error::forbidden("submitters only")),
        }
    }

    fn from_headers(req: &HttpRequest) -> Result<Self, Error> {
        let id = header(req, USER_ID_HEADER).ok_or_else(|| Error::unauthorized("login required"))?;
        let role = header(req, USER_ROLE_HEADER)
            .and_then(Role::from_header)
            .ok_or_else(|| Error::unauthorized("caller role missing or unknown"))?;
        let name = header(req, USER_NAME_HEADER).unwrap_or(id);
        Ok(Self {
            actor: Actor::new(id, name),
            role,
        })
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl FromRequest for Caller {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req))
    }
}
