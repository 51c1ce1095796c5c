use crate::config::Config;
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{self, FromRequest};
use rocket::serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the private cookie holding the logged-in member's username
pub const COOKIE_NAME: &str = "cariboushots_member";

pub type Members = Arc<dyn MemberStore>;

/// A logged-in club member
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub username: String,
}

/// Lookup of the members allowed to log in
pub trait MemberStore: Send + Sync {
    /// Return the member matching these credentials, if any
    fn verify(&self, username: &str, password: &str) -> Option<Member>;
}

/// A single member account, as set in the config file
pub struct SingleMember {
    username: String,
    password_hash: String,
}

impl SingleMember {
    pub fn new(username: &str, password_hash: &str) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.MEMBER_USERNAME, &config.MEMBER_PASSWORD_HASH)
    }
}

impl MemberStore for SingleMember {
    fn verify(&self, username: &str, password: &str) -> Option<Member> {
        if username != self.username {
            return None;
        }
        let hash = match PasswordHash::new(&self.password_hash) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("the configured password hash is invalid : {e}");
                return None;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .ok()
            .map(|_| Member { username: username.to_string() })
    }
}

/// Request guard matching only requests from a logged-in member. Forwards with
/// `Unauthorized` otherwise, so that a lower-ranked route can redirect to the login page.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for Member {
    type Error = ();

    async fn from_request(request: &'r rocket::Request<'_>) -> request::Outcome<Self, Self::Error> {
        match request.cookies().get_private(COOKIE_NAME) {
            Some(cookie) if !cookie.value().is_empty() => {
                request::Outcome::Success(Member { username: cookie.value().to_string() })
            }
            _ => request::Outcome::Forward(Status::Unauthorized),
        }
    }
}

/// Remember the given member in the client's session
pub fn start_session(cookies: &CookieJar<'_>, member: &Member) {
    let cookie = Cookie::build((COOKIE_NAME, member.username.clone()))
        .http_only(true)
        .same_site(SameSite::Lax);
    cookies.add_private(cookie);
    info!(username = %member.username, "member logged in");
}

/// Forget the member in the client's session
pub fn end_session(cookies: &CookieJar<'_>) {
    if let Some(cookie) = cookies.get_private(COOKIE_NAME) {
        info!(username = cookie.value(), "member logged out");
    }
    cookies.remove_private(COOKIE_NAME);
}

/// Return the page to go to after logging in : the requested one if it is a local path,
/// the home page otherwise
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path.to_string(),
        _ => "/".to_string(),
    }
}
