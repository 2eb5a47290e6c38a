use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User's email
    pub email: Option<String>,
    /// Role, either "customer" or "admin"
    pub role: String,
    /// Issued at time
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Extractor that additionally requires the `admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Generate a JWT token for a user
pub fn generate_token(
    secret: &str,
    user_id: Uuid,
    email: Option<String>,
    role: &str,
    expiration_secs: usize,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        email,
        role: role.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::Internal(format!("Token creation failed: {}", e)))
}

/// Validate a JWT token and extract the claims
pub fn validate_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ServiceError::Unauthorized("Token expired".to_string())
        }
        _ => ServiceError::Unauthorized("Invalid token".to_string()),
    })
}

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = validate_token(&state.config.jwt_secret, token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-unit-test-secret-unit-test-secret-unit-test-secret";

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = generate_token(
            SECRET,
            user_id,
            Some("user@example.com".to_string()),
            "customer",
            3600,
        )
        .expect("generate");

        let claims = validate_token(SECRET, &token).expect("validate");
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(SECRET, Uuid::new_v4(), None, "admin", 3600).expect("generate");
        assert!(validate_token("another-secret-another-secret-another-secret", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: None,
            role: "customer".to_string(),
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode");

        let err = validate_token(SECRET, &token).expect_err("should reject");
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
