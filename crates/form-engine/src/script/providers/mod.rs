//! Built-in host-function providers.

#[cfg(feature = "http")]
mod http;
mod secrets;
mod text;

#[cfg(feature = "http")]
pub use http::HttpProvider;
pub use secrets::SecretsProvider;
pub use text::TextProvider;
