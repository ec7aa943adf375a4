//! Authentication token derivation.
//!
//! The endpoint authenticates a connect request with a hex-encoded HMAC-MD5
//! digest over the subject fields. Different endpoint versions disagree on
//! the order in which the fields enter the digest, and newer versions append
//! a timestamp, so both are configuration rather than constants.

use hmac::{Hmac, Mac};
use md5::Md5;
use std::fmt::Write as _;

type HmacMd5 = Hmac<Md5>;

/// Order in which the subject fields enter the token digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldOrder {
    /// Project identifier first, then user identifier.
    #[default]
    ProjectThenUser,
    /// User identifier first, then project identifier.
    UserThenProject,
}

impl std::fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldOrder::ProjectThenUser => write!(f, "project-user"),
            FieldOrder::UserThenProject => write!(f, "user-project"),
        }
    }
}

/// Compute the connect token for the given subject fields.
///
/// Pure and deterministic: identical inputs always produce the identical
/// token. The timestamp enters the digest only when present. An unsuitable
/// secret is a caller bug, not a runtime error: HMAC accepts keys of any
/// length, so this function cannot fail.
#[must_use]
pub fn compute_token(
    secret: &str,
    project: &str,
    user: &str,
    timestamp: Option<&str>,
    order: FieldOrder,
) -> String {
    let mut mac = HmacMd5::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");

    match order {
        FieldOrder::ProjectThenUser => {
            mac.update(project.as_bytes());
            mac.update(user.as_bytes());
        }
        FieldOrder::UserThenProject => {
            mac.update(user.as_bytes());
            mac.update(project.as_bytes());
        }
    }

    if let Some(ts) = timestamp {
        mac.update(ts.as_bytes());
    }

    let digest = mac.finalize().into_bytes();
    let mut token = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(token, "{byte:02x}");
    }
    token
}
