//! JSON-lines protocol: one `{id, method, params}` request per stdin line,
//! one `{id, ok, result | error}` response per stdout line.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
