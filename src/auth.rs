use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use uuid::Uuid;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "spa_admin";
pub const LOGIN_PATH: &str = "/admin/login";
pub const SESSION_MAX_AGE_DAYS: i64 = 30;

/// The single admin account. The password is only kept as an argon2 hash.
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password_hash: String,
}

impl AdminCredentials {
    pub fn new(username: &str, password: &str) -> Result<Self, password_hash::Error> {
        Ok(Self {
            username: username.to_string(),
            password_hash: hash_password(password)?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Both fields are always checked so a failure says nothing about which one was wrong.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let password_ok = verify_password(password, &self.password_hash);
        let username_ok = username == self.username;
        username_ok && password_ok
    }
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn session_cookie(req: &HttpRequest, session_id: &str) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, session_id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(SESSION_MAX_AGE_DAYS));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_session_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn session_id(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Lets the request through only with a live admin session; everyone else is
/// sent to the login page. The session's [`crate::models::AdminUser`] is put
/// into request extensions for handlers.
pub async fn admin_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    let admin = match (
        req.app_data::<web::Data<AppState>>(),
        session_id(req.request()),
    ) {
        (Some(state), Some(session)) => state.session(&session).await,
        _ => None,
    };

    let Some(admin) = admin else {
        let response = HttpResponse::SeeOther()
            .insert_header((header::LOCATION, LOGIN_PATH))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish();
        return Ok(req.into_response(response));
    };

    req.extensions_mut().insert(admin);
    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_need_both_fields_to_match() {
        let credentials = AdminCredentials::new("admin", "s3cret-pass").unwrap();
        assert!(credentials.verify("admin", "s3cret-pass"));
        assert!(!credentials.verify("admin", "s3cret-pas"));
        assert!(!credentials.verify("Admin", "s3cret-pass"));
        assert!(!credentials.verify("", ""));
    }

    #[test]
    fn password_is_not_kept_in_clear() {
        let credentials = AdminCredentials::new("admin", "s3cret-pass").unwrap();
        assert!(!credentials.password_hash.contains("s3cret-pass"));
        assert!(credentials.password_hash.starts_with("$argon2"));
    }
}
