//! Authentication: identity-provider bridge, bearer session extractor and auth routes

pub mod handlers;
mod identity;
mod session;

pub use identity::{
    IdentityError, IdentityErrorKind, IdentityProvider, IdentityResult, IdentitySession,
    IdentityToolkitClient, IdentityUser, IdpCredential, validate_credentials,
};
pub use session::AuthSession;
