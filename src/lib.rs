pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod publish;
pub mod scheduler;
pub mod server;
pub mod sync;

pub use error::{IsRetryable, OauthError, SignpostError};
pub use oauth::TokenResolver;
pub use publish::PublishPipeline;
pub use sync::SyncEngine;
