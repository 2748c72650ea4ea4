#![doc = include_str!("../README.md")]

pub mod error;
pub mod identity;
pub mod middleware;
pub mod pkce;
pub mod profiles;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use error::Error;
pub use identity::{AuthorizationRequest, IdentityClient, IdentityConfig, IdentityProvider};
pub use pkce::{CODE_CHALLENGE_METHOD, generate_code_challenge, generate_code_verifier};
pub use profiles::{DEFAULT_PROFILES_TABLE, ProfileStore, RestProfileStore};
pub use types::{
    Credentials, Profile, ProfileUpdate, Session, SignUpOutcome, User, UserId,
};
