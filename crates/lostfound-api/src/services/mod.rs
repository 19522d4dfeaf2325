//! Services the handlers depend on beyond the stores.

pub mod identity;
pub mod maintenance;

pub use identity::{
    identity_from_key, DisabledIdentity, FirebaseIdentity, IdentityProvider, IdentityUser,
};
