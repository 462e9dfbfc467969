use chrono::{Utc, Duration};
use jsonwebtoken::{encode, Header, decode, Validation, TokenData, Algorithm};
use uuid::Uuid;

use crate::entities::token::Claims;
use crate::repositories::token::TokenServiceRepository;
use crate::settings::{AppConfig, JwtKeys};
use crate::errors::AuthError;

const JWT_ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Clone)]
pub struct JwtService {
    keys: JwtKeys,
    access_expiration: Duration,
}

impl JwtService {
    pub fn new(config: &AppConfig) -> Self {
        JwtService {
            keys: JwtKeys::from(config),
            access_expiration: Duration::minutes(config.jwt_expiration_minutes),
        }
    }

    pub fn create_jwt(&self, user_id: &Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = (now + self.access_expiration).timestamp() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            exp,
            iat: now.timestamp() as usize,
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.keys.encoding).map_err(|e| {
            tracing::warn!("Failed to create JWT: {}", e);
            AuthError::TokenCreation
        })
    }

    pub fn decode_jwt(&self, token: &str) -> Result<TokenData<Claims>, AuthError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<Claims>(token, &self.keys.decoding, &validation)
            .map_err(AuthError::from)
    }
}

impl TokenServiceRepository for JwtService {
    fn create_jwt(&self, user_id: &Uuid) -> Result<String, AuthError> {
        self.create_jwt(user_id)
    }

    fn decode_jwt(&self, token: &str) -> Result<TokenData<Claims>, AuthError> {
        self.decode_jwt(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::test_config;

    #[test]
    fn issued_tokens_decode_to_the_same_user() {
        let service = JwtService::new(&test_config());
        let user_id = Uuid::new_v4();

        let token = service.create_jwt(&user_id).unwrap();
        let decoded = service.decode_jwt(&token).unwrap();

        assert_eq!(decoded.claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let service = JwtService::new(&test_config());
        let mut other_config = test_config();
        other_config.jwt_secret = "another_secret_that_is_long_enough_for_hs512_0987".into();
        let other = JwtService::new(&other_config);

        let token = other.create_jwt(&Uuid::new_v4()).unwrap();
        assert!(matches!(service.decode_jwt(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut config = test_config();
        config.jwt_expiration_minutes = -5;
        let service = JwtService::new(&config);

        let token = service.create_jwt(&Uuid::new_v4()).unwrap();
        assert!(matches!(service.decode_jwt(&token), Err(AuthError::TokenExpired)));
    }
}
