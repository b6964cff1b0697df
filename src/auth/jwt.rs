use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, models::User};

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
        })
    }

    pub fn generate_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user.id,
            org: user.organization_id,
            username: user.username.clone(),
            role: user.role.clone(),
            super_admin: user.is_super_admin,
            permissions: user.service_permissions.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub org: Uuid,
    pub username: String,
    pub role: String,
    #[serde(default)]
    pub super_admin: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::now;

    fn config(audience: &str) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/servicecrm".into(),
            database_max_pool_size: 1,
            server_host: "127.0.0.1".into(),
            server_port: 0,
            jwt_secret: "unit-secret".into(),
            jwt_issuer: "servicecrm".into(),
            jwt_audience: audience.into(),
            jwt_expiry_minutes: 5,
            refresh_token_expiry_days: 1,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            notification_webhook_url: None,
            notification_max_attempts: 1,
            sla_sweep_interval_seconds: 60,
            worker_poll_interval_seconds: 1,
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            username: "dispatcher".into(),
            password_hash: String::new(),
            role: "manager".into(),
            is_super_admin: false,
            is_active: true,
            service_permissions: vec!["dispatch_update".into()],
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn claims_carry_organization_and_permissions() {
        let service = JwtService::from_config(&config("crm")).unwrap();
        let user = user();
        let token = service.generate_token(&user).unwrap();
        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.org, user.organization_id);
        assert_eq!(claims.role, "manager");
        assert_eq!(claims.permissions, vec!["dispatch_update".to_string()]);
        assert!(!claims.super_admin);
    }

    #[test]
    fn rejects_token_for_another_audience() {
        let issuer = JwtService::from_config(&config("crm")).unwrap();
        let verifier = JwtService::from_config(&config("elsewhere")).unwrap();
        let token = issuer.generate_token(&user()).unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }
}
