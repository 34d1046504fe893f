mod helpers;
mod middleware;
mod provider;
mod token;

pub use middleware::{AuthError, RequireAdmin, RequireIdentity};
pub use provider::{
    IdentityProvider, IdentitySessions, IdentityWatch, TokenIdentityProvider, identity_channel,
};
pub use token::{IssuedToken, TokenGenerator, parse_token};
