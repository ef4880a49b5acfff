//! OAuth glue: oauth2-crate client types, identity-provider endpoints, and
//! the lazy token resolver with per-account single-flight.

pub(crate) mod client;
pub mod endpoints;
pub mod resolver;

pub use endpoints::GoogleOauthEndpoints;
pub use resolver::TokenResolver;
