//! Staff accounts: password digests, login checks and sign-up.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{AppError, Result};
use crate::store::{Change, Store};
use crate::tables::{Role, User};

const SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
/// Salt used to burn one derivation when the username is unknown.
const DUMMY_SALT: [u8; SALT_LEN] = *b"bakery-ops-dummy";

/// Login rejected. Deliberately carries no detail.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid username or password")]
pub struct AuthFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    Created,
    DuplicateUsername,
}

/// A user row without its password digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffMember {
    pub username: String,
    pub name: String,
    pub role: Role,
    pub hourly_wage: u64,
}

impl From<User> for StaffMember {
    fn from(user: User) -> Self {
        StaffMember {
            username: user.username,
            name: user.name,
            role: user.role,
            hourly_wage: user.hourly_wage,
        }
    }
}

#[cfg(test)]
thread_local! {
    static DERIVATIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    #[cfg(test)]
    DERIVATIONS.with(|count| count.set(count.get() + 1));
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

/// Encodes the digest of `password` under `salt`. Same inputs, same output.
pub fn hash_with_salt(password: &str, salt: &[u8], iterations: u32) -> String {
    let iterations = iterations.max(1);
    let key = derive_key(password, salt, iterations);
    format!(
        "{SCHEME}${iterations}${}${}",
        B64.encode(salt),
        B64.encode(key.as_slice())
    )
}

/// Digest of `password` under a fresh random salt.
pub fn hash(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    hash_with_salt(password, &salt, iterations)
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Checks `password` against a stored digest. Unparsable digests never match.
pub fn matches_digest(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    if let [SCHEME, iterations, salt, key] = parts.as_slice() {
        let (Ok(iterations), Ok(salt), Ok(expected)) = (
            iterations.parse::<u32>(),
            B64.decode(salt),
            B64.decode(key),
        ) else {
            return false;
        };
        let actual = derive_key(password, salt.as_slice(), iterations.max(1));
        return constant_time_eq(actual.as_slice(), expected.as_slice());
    }
    // Accounts created before salted digests store a bare SHA-256 hex digest.
    if stored.len() == 64 {
        if let Ok(expected) = hex::decode(stored) {
            let actual = Sha256::digest(password.as_bytes());
            return constant_time_eq(actual.as_slice(), expected.as_slice());
        }
    }
    false
}

/// Looks the user up by exact username and checks the password. Every
/// rejection is the same [`AuthFailure`].
pub fn verify(
    store: &Store,
    username: &str,
    password: &str,
) -> Result<std::result::Result<StaffMember, AuthFailure>> {
    let users = store.read::<User>()?;
    let Some(user) = users.into_iter().find(|user| user.username == username) else {
        let _ = derive_key(password, &DUMMY_SALT, store.config().pbkdf2_iterations.max(1));
        return Ok(Err(AuthFailure));
    };
    let matched = matches_digest(password, user.password_hash.as_str());
    if password.is_empty() || !matched {
        return Ok(Err(AuthFailure));
    }
    Ok(Ok(user.into()))
}

/// Signs up a new staff member with the default role.
pub fn register(
    store: &Store,
    username: &str,
    password: &str,
    name: &str,
    hourly_wage: u64,
) -> Result<Registration> {
    register_as(store, username, password, name, hourly_wage, Role::Staff)
}

pub fn register_as(
    store: &Store,
    username: &str,
    password: &str,
    name: &str,
    hourly_wage: u64,
    role: Role,
) -> Result<Registration> {
    let username = username.trim();
    let name = name.trim();
    if username.is_empty() {
        return Err(AppError::invalid("username is required"));
    }
    if password.is_empty() {
        return Err(AppError::invalid("password is required"));
    }
    if name.is_empty() {
        return Err(AppError::invalid("name is required"));
    }

    let password_hash = hash(password, store.config().pbkdf2_iterations);
    let outcome = store.transact::<User, _, _>(|users| {
        if users.iter().any(|user| user.username == username) {
            return Change::Keep(Registration::DuplicateUsername);
        }
        users.push(User {
            username: username.to_string(),
            password_hash,
            name: name.to_string(),
            role,
            hourly_wage,
        });
        Change::Commit(Registration::Created)
    })?;
    if outcome == Registration::Created {
        info!(username, role = %role, "registered staff member");
    }
    Ok(outcome)
}

/// Every account, without digests, sorted by display name.
pub fn list_staff(store: &Store) -> Result<Vec<StaffMember>> {
    let mut staff: Vec<StaffMember> = store
        .read::<User>()?
        .into_iter()
        .map(StaffMember::from)
        .collect();
    staff.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.username.cmp(&b.username)));
    Ok(staff)
}
