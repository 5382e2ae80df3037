//! Tower layers composed by [`crate::HttpClientBuilder`].
//!
//! - [`UserAgentLayer`] sets `User-Agent` unless the request already has one
//! - [`CredentialLayer`] attaches the registry `Authorization` header

mod credential;
mod user_agent;

pub use credential::{CredentialLayer, CredentialService};
pub use user_agent::{UserAgentLayer, UserAgentService};
