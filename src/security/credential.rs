//! The admin credential: PBKDF2 reference hash, salt and cost.
//!
//! The password itself is never stored. At login the attempted password is
//! run through PBKDF2-HMAC with the configured salt and iteration count and
//! the hex result is compared to the reference in constant time.

use hmac::Hmac;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

use super::error::DerivationError;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Length of the derived key in bytes (256 bits).
pub const DERIVED_KEY_LEN: usize = 32;

/// Length of freshly generated salts in bytes.
pub const SALT_LEN: usize = 32;

/// PRF used inside PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!("unsupported hash algorithm: {other}")),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => f.write_str("sha256"),
            HashAlgorithm::Sha512 => f.write_str("sha512"),
        }
    }
}

/// Immutable credential configuration, loaded once at startup.
#[derive(Clone)]
pub struct Credentials {
    reference_hash: String,
    salt: Vec<u8>,
    iterations: u32,
    algorithm: HashAlgorithm,
}

// Keep the reference hash out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("salt_len", &self.salt.len())
            .field("iterations", &self.iterations)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Build credentials from the hex strings found in the config file.
    pub fn from_hex(
        reference_hash: &str,
        salt_hex: &str,
        iterations: u32,
        algorithm: HashAlgorithm,
    ) -> anyhow::Result<Self> {
        let reference_hash = reference_hash.trim().to_ascii_lowercase();
        if reference_hash.is_empty() {
            anyhow::bail!("No password hash configured. Run `ddrive hash` to generate one.");
        }
        let decoded = hex::decode(&reference_hash)
            .map_err(|e| anyhow::anyhow!("Password hash is not valid hex: {}", e))?;
        if decoded.len() != DERIVED_KEY_LEN {
            anyhow::bail!(
                "Password hash has unexpected length {} (expected {} bytes)",
                decoded.len(),
                DERIVED_KEY_LEN
            );
        }

        let salt_hex = salt_hex.trim();
        if salt_hex.is_empty() {
            anyhow::bail!("No salt configured. Run `ddrive hash` to generate one.");
        }
        let salt =
            hex::decode(salt_hex).map_err(|e| anyhow::anyhow!("Salt is not valid hex: {}", e))?;

        if iterations == 0 {
            anyhow::bail!("Iteration count must be greater than zero");
        }

        Ok(Self {
            reference_hash,
            salt,
            iterations,
            algorithm,
        })
    }

    /// Derive fresh credentials for `password` with a random salt.
    ///
    /// Used by `ddrive hash` to provision the config file.
    pub fn generate(
        password: &str,
        iterations: u32,
        algorithm: HashAlgorithm,
    ) -> Result<Self, DerivationError> {
        let salt = generate_salt();
        let reference_hash = derive_hex(password.as_bytes(), &salt, iterations, algorithm)?;
        Ok(Self {
            reference_hash,
            salt,
            iterations,
            algorithm,
        })
    }

    pub fn reference_hash(&self) -> &str {
        &self.reference_hash
    }

    pub fn salt_hex(&self) -> String {
        hex::encode(&self.salt)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Derive the candidate hash and compare it to the reference.
    ///
    /// CPU-bound for the whole iteration count; call it off the async
    /// executor.
    pub fn matches(&self, password: &str) -> Result<bool, DerivationError> {
        let candidate = derive_hex(
            password.as_bytes(),
            &self.salt,
            self.iterations,
            self.algorithm,
        )?;
        Ok(constant_time_eq(
            candidate.as_bytes(),
            self.reference_hash.as_bytes(),
        ))
    }
}

/// Checks a candidate password against a stored reference.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordVerifier: Send + Sync {
    /// CPU-bound; call it off the async executor.
    fn matches(&self, password: &str) -> Result<bool, DerivationError>;
}

impl PasswordVerifier for Credentials {
    fn matches(&self, password: &str) -> Result<bool, DerivationError> {
        Credentials::matches(self, password)
    }
}

/// PBKDF2 over `password` and `salt`, hex-encoded.
pub fn derive_hex(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    algorithm: HashAlgorithm,
) -> Result<String, DerivationError> {
    let mut key = [0u8; DERIVED_KEY_LEN];
    let result = match algorithm {
        HashAlgorithm::Sha256 => {
            pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, iterations, &mut key)
        }
        HashAlgorithm::Sha512 => {
            pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, iterations, &mut key)
        }
    };
    result.map_err(|_| DerivationError::InvalidLength(key.len()))?;
    Ok(hex::encode(key))
}

/// Equality check whose running time does not depend on where the inputs
/// first differ. Lengths are compared up front; for hex digests of a fixed
/// algorithm the length is public anyway.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Random salt from the OS CSPRNG.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::rng().fill(salt.as_mut_slice());
    salt
}
