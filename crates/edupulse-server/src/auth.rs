//! Credentials and tokens
//!
//! * Passwords: Argon2id PHC strings.
//! * Access tokens: HS256 JWTs carrying user id and role.
//! * Refresh tokens: 32 random bytes, hex encoded. Only their SHA-256 hash
//!   is stored server-side.

use crate::error::ApiError;
use crate::models::{Claims, Role};
use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!("salt encoding: {}", e))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Argon2 is deliberately slow, so request handlers hash on the blocking pool
pub async fn hash_password_blocking(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

pub async fn verify_password_blocking(password: &str, stored_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await?)
}

/// Stable pseudonym for an email address in logs and audit rows
pub fn email_fingerprint(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("email:{}", &hex::encode(digest)[..16])
}

pub fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Returns the token and its expiry (unix seconds)
    pub fn issue_access_token(&self, user_id: &str, role: Role) -> Result<(String, i64)> {
        let iat = now();
        let exp = iat + self.access_ttl.as_secs() as i64;
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, exp))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ApiError::Unauthorized("Token expired".to_string()),
                _ => ApiError::Unauthorized("Invalid or expired token".to_string()),
            })
    }

    pub fn refresh_expiry(&self) -> i64 {
        now() + self.refresh_ttl.as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            "test-secret",
            Duration::from_secs(900),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_password_hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[tokio::test]
    async fn test_blocking_hash_verifies() {
        let hash = hash_password_blocking("correct horse battery").await.unwrap();
        assert!(verify_password_blocking("correct horse battery", &hash).await.unwrap());
        assert!(!verify_password_blocking("wrong password", &hash).await.unwrap());
        assert!(!verify_password_blocking("anything", "not-a-phc-string").await.unwrap());
    }

    #[test]
    fn test_email_fingerprint_hides_address() {
        let print = email_fingerprint("Ada@Example.com");
        assert!(!print.contains("ada"));
        assert!(!print.contains("example"));
        assert_eq!(print.len(), "email:".len() + 16);
        assert_eq!(print, email_fingerprint(" ada@example.com "));
        assert_ne!(print, email_fingerprint("bob@example.com"));
    }

    #[test]
    fn test_access_token_round_trip() {
        let svc = service();
        let (token, exp) = svc.issue_access_token("user-42", Role::Teacher).unwrap();
        let claims = svc.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let other = TokenService::new("other", Duration::from_secs(60), Duration::from_secs(60));
        let (token, _) = other.issue_access_token("user-1", Role::Admin).unwrap();
        assert!(matches!(
            service().verify_access_token(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        let claims = Claims {
            sub: "user-1".to_string(),
            role: Role::Student,
            iat: now() - 7200,
            exp: now() - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        match svc.verify_access_token(&token) {
            Err(ApiError::Unauthorized(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("expected expiry error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(service().verify_access_token("not.a.jwt").is_err());
    }

    #[test]
    fn test_refresh_tokens() {
        let a = generate_refresh_token();
        let b = generate_refresh_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_refresh_token(&a), hash_refresh_token(&a));
        assert_ne!(hash_refresh_token(&a), a);
    }
}
