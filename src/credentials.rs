//! Credentials and the ordered, provider-scoped credential pool.

use crate::error::{EaselError, FailureKind, Result};
use serde::Deserialize;
use std::fmt;
use std::future::Future;

/// An opaque secret authorizing calls to one provider.
///
/// `Debug` never prints the secret, so errors and traces stay safe to log.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wraps a secret token.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret for use in an outbound request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Credential {
    fn from(secret: &str) -> Self {
        Self(secret.to_string())
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() >= 8 {
            write!(f, "Credential(****{})", &self.0[self.0.len() - 4..])
        } else {
            write!(f, "Credential(****)")
        }
    }
}

/// An ordered list of credentials for one provider, primary first.
///
/// The iteration cursor lives in each `try_each` call, never in the pool
/// itself, so concurrent requests always start from the primary credential
/// and cannot fail each other over into exhaustion.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// Creates a pool from an ordered list of credentials.
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    /// Creates a pool holding a single credential.
    pub fn single(credential: impl Into<Credential>) -> Self {
        Self {
            credentials: vec![credential.into()],
        }
    }

    /// Returns true if the pool holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Returns the number of credentials in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Runs `op` against each credential in priority order.
    ///
    /// Rotates to the next credential only when the failure classifies as
    /// quota/rate-limit class; any other kind stops immediately, since no
    /// credential will fix a rejected or malformed request. Exhausting the
    /// pool yields an aggregate error carrying the last failure's kind.
    pub async fn try_each<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.credentials.is_empty() {
            return Err(EaselError::Config("credential pool is empty".into()));
        }

        let mut last: Option<EaselError> = None;
        for (index, credential) in self.credentials.iter().enumerate() {
            match op(credential.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.rotates_credential() => {
                    tracing::warn!(
                        credential_index = index,
                        error = %err,
                        "credential exhausted, rotating to next"
                    );
                    last = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let kind = last.as_ref().map(EaselError::kind).unwrap_or(FailureKind::Unknown);
        let detail = match last {
            Some(err) => format!(
                "{} credential(s) tried; last error: {err}",
                self.credentials.len()
            ),
            None => format!("{} credential(s) tried", self.credentials.len()),
        };
        Err(EaselError::Exhausted { kind, detail })
    }
}
