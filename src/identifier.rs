//! Receipt code generation.
//!
//! Codes are 8 symbols drawn uniformly from an alphabet without visually
//! ambiguous characters (`0/O`, `1/l/I`). Uniqueness is checked against
//! storage without locking; a collision just draws again, up to a fixed
//! number of attempts.

use std::fmt;
use std::future::Future;

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::utils::retry::{bounded_attempts, Attempt};

/// Symbols a receipt code may contain.
pub const ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// Length of every receipt code.
pub const CODE_LENGTH: usize = 8;

/// Attempts made by issuance before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// No unused code was found within the attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Could not generate a unique receipt identifier after {attempts} attempts")]
pub struct ExhaustedError {
    pub attempts: u32,
}

/// A short, human-typeable receipt code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptCode(String);

impl ReceiptCode {
    /// Validate user-supplied input.
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        if trimmed.chars().count() != CODE_LENGTH {
            return Err(format!(
                "receipt identifier must be {CODE_LENGTH} characters, got {}",
                trimmed.chars().count()
            ));
        }
        if let Some(bad) = trimmed.chars().find(|c| !ALPHABET.contains(*c)) {
            return Err(format!("receipt identifier contains invalid character {bad:?}"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ReceiptCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ReceiptCode> for String {
    fn from(code: ReceiptCode) -> Self {
        code.0
    }
}

/// Draw a code from the thread-local CSPRNG.
pub fn generate() -> ReceiptCode {
    generate_with(&mut rand::rng())
}

/// Draw a code from `rng`.
///
/// `random_range` samples without modulo bias, so every symbol is equally
/// likely regardless of alphabet size.
pub fn generate_with<R: Rng + CryptoRng + ?Sized>(rng: &mut R) -> ReceiptCode {
    let symbols = ALPHABET.as_bytes();
    let code = (0..CODE_LENGTH)
        .map(|_| char::from(symbols[rng.random_range(0..symbols.len())]))
        .collect();
    ReceiptCode(code)
}

/// Generate a code for which `exists` reports false.
///
/// Checks at most `max_attempts` candidates and fails with
/// [`ExhaustedError`] if every one is taken. Errors from `exists` propagate
/// unchanged.
pub async fn generate_unique<E, F, Fut>(max_attempts: u32, mut exists: F) -> Result<ReceiptCode, E>
where
    E: From<ExhaustedError>,
    F: FnMut(ReceiptCode) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let found = bounded_attempts::<_, E, _, _>(max_attempts, |attempt| {
        let candidate = generate();
        let check = exists(candidate.clone());
        async move {
            if check.await? {
                debug!(attempt, code = %candidate, "Receipt identifier collision");
                Ok(Attempt::Retry)
            } else {
                Ok(Attempt::Done(candidate))
            }
        }
    })
    .await?;

    found.ok_or_else(|| {
        warn!(attempts = max_attempts, "Receipt identifier space exhausted");
        E::from(ExhaustedError {
            attempts: max_attempts,
        })
    })
}
