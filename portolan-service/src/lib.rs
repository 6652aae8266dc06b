pub mod asyncapi;
pub mod discovery;
pub mod filter;
pub mod procurement;
pub mod swagger;
pub mod transform;

pub use asyncapi::AsyncapiService;
pub use discovery::Discovery;
pub use swagger::SwaggerService;

use portolan_core::PortolanError;
use std::future::Future;
use std::time::Duration;

/// Run an outbound operation under a deadline; elapsing maps to `Internal`.
pub(crate) async fn with_timeout<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, PortolanError>>,
) -> Result<T, PortolanError> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| PortolanError::Internal("deadline exceeded".to_string()))?
}
