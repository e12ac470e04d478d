pub mod auth;
pub mod builder;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod openapi;
pub mod query;
pub mod resolver;
pub mod response;
pub mod sigv4;
pub mod transport;

pub use auth::Authenticator;
pub use config::{McpAccessPolicy, RequestConfig};
pub use error::{ErrorKind, QurlError, Result};
pub use executor::{Executor, with_deadline};
pub use openapi::{OpenApiViewer, SpecProvider};
pub use response::ExecutionResult;
pub use transport::{RoutingTransport, Transport, TransportResponse};
