pub mod error;
pub mod http;
pub mod lifecycle;
pub mod limit;
pub mod router;
pub mod server;
pub mod state;
pub mod tools;
pub mod watcher;

pub use error::ToolError;
pub use http::run_http;
pub use lifecycle::{ServeOptions, serve};
pub use limit::RateLimiter;
pub use router::{Request, Response, Router, RpcError};
pub use server::{ServerError, handle_line, run_stdio};
pub use state::AppState;
pub use tools::ToolHandler;
pub use watcher::{Watcher, spawn_watcher};
