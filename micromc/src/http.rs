//! HTTP client construction. There is intentionally no process-wide client: each
//! operation entry point builds one and passes it down explicitly to the components
//! that request with it, so configuration stays confined to that operation.

use reqwest::{Client, ClientBuilder};


/// The user agent sent with every HTTP request of the launcher.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Get a client builder preconfigured for the launcher, to be customized further if
/// needed before building.
pub fn builder() -> ClientBuilder {
    Client::builder().user_agent(USER_AGENT)
}

/// Build a client with the launcher's default configuration. The client is cheap to
/// clone and meant to be shared by reference across one resolve operation.
pub fn new_client() -> reqwest::Result<Client> {
    builder().build()
}
