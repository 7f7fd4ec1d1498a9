pub mod auth;
pub mod http;
pub mod notifier;
pub mod realtime;
pub mod rest;
pub mod storage;

pub use auth::AuthAdapter;
pub use http::BackendHttp;
pub use notifier::TracingNotifier;
pub use realtime::RealtimeAdapter;
pub use rest::RestAdapter;
pub use storage::StorageAdapter;
