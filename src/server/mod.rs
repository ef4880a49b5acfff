pub mod guards;
pub mod router;
pub mod routes;

pub use router::{AppState, signpost_router};
