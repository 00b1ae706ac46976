//! Authentication primitives for the Strata platform.
//!
//! - **Passwords**: Argon2id hashing and verification
//! - **JWT**: Ed25519-signed tokens for session auth
//! - **Device keys**: Ed25519 keypair generation for sender identity

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid password")]
    InvalidPassword,
    #[error("password hashing failed: {0}")]
    HashError(String),
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("invalid device key")]
    InvalidKey,
}

// ── Password Hashing (Argon2id) ─────────────────────────────────────

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    use argon2::{
        password_hash::{rand_core::OsRng as PhcOsRng, SaltString},
        Argon2, PasswordHasher,
    };

    let salt = SaltString::generate(&mut PhcOsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::HashError(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};

    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::HashError(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// ── JWT (Ed25519-signed) ────────────────────────────────────────────

/// Claims embedded in a JWT token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — user ID (`usr_...`) or sender ID (`snd_...`).
    pub sub: String,
    /// Issuer — always "strata-control".
    pub iss: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued-at time (Unix timestamp).
    pub iat: i64,
    /// Role: "admin", "operator", "viewer", or "sender".
    pub role: String,
    /// Owner user ID (for sender tokens, the user who owns this sender).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// JWT signing/verification context.
pub struct JwtContext {
    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
}

impl JwtContext {
    /// Create a JWT context from an Ed25519 private key (32 bytes, base64-encoded).
    pub fn from_ed25519_seed(seed_b64: &str) -> Result<Self, AuthError> {
        let seed_bytes = BASE64.decode(seed_b64).map_err(|_| AuthError::InvalidKey)?;
        if seed_bytes.len() != 32 {
            return Err(AuthError::InvalidKey);
        }

        let signing_key = SigningKey::from_bytes(
            seed_bytes
                .as_slice()
                .try_into()
                .map_err(|_| AuthError::InvalidKey)?,
        );
        let verifying_key = signing_key.verifying_key();

        // jsonwebtoken expects PKCS8v2 DER encoding for Ed25519.
        // PKCS8v2 wraps the 32-byte seed as:
        //   SEQUENCE {
        //     INTEGER 0  (version)
        //     SEQUENCE { OID 1.3.101.112 }  (Ed25519 algorithm)
        //     OCTET STRING { OCTET STRING { <32 seed bytes> } }
        //     [1] { BIT STRING { <32 public key bytes> } }  (optional)
        //   }
        let pkcs8_prefix: &[u8] = &[
            0x30, 0x2e, // SEQUENCE, 46 bytes
            0x02, 0x01, 0x00, // INTEGER 0 (version)
            0x30, 0x05, // SEQUENCE, 5 bytes
            0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
            0x04, 0x22, // OCTET STRING, 34 bytes
            0x04, 0x20, // OCTET STRING, 32 bytes (the seed)
        ];
        let mut pkcs8_der = Vec::with_capacity(48);
        pkcs8_der.extend_from_slice(pkcs8_prefix);
        pkcs8_der.extend_from_slice(&seed_bytes);

        let encoding_key = jsonwebtoken::EncodingKey::from_ed_der(&pkcs8_der);

        // For the public key, jsonwebtoken expects raw 32-byte Ed25519 public key
        let decoding_key = jsonwebtoken::DecodingKey::from_ed_der(verifying_key.as_bytes());

        Ok(Self {
            encoding_key,
            decoding_key,
        })
    }

    /// Generate a new random Ed25519 seed and create a JWT context.
    /// Returns `(context, seed_b64)` — store the seed securely.
    pub fn generate() -> (Self, String) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let seed_b64 = BASE64.encode(signing_key.to_bytes());
        let ctx =
            Self::from_ed25519_seed(&seed_b64).expect("freshly generated key should be valid");
        (ctx, seed_b64)
    }

    /// Create and sign a JWT token.
    pub fn create_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::EdDSA);
        let token = jsonwebtoken::encode(&header, claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate and decode a JWT token.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::EdDSA);
        validation.set_issuer(&["strata-control"]);
        validation.validate_exp = true;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}

// ── Device Keys ─────────────────────────────────────────────────────

/// Generate a new Ed25519 keypair for a sender device.
/// Returns `(private_key_b64, public_key_b64)`.
pub fn generate_device_keypair() -> (String, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key: VerifyingKey = signing_key.verifying_key();

    let private_b64 = BASE64.encode(signing_key.to_bytes());
    let public_b64 = BASE64.encode(verifying_key.to_bytes());

    (private_b64, public_b64)
}
