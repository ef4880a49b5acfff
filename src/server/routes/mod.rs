pub mod accounts;
pub mod oauth;
pub mod publish;
pub mod sync;
