pub mod credentials;
pub mod http_client;
pub mod prompts;
pub mod providers;
pub mod retry;

pub use credentials::*;
pub use providers::{
    build_providers, CategoryProvider, FailureKind, ProviderFailure, ProviderId, ProviderResult,
};
pub use retry::RetryPolicy;
