//! Authenticated access to the catalog API.
//!
//! - [`AuthGateway`] - bearer-token calls with single-flight refresh
//! - [`TokenStore`] - where the current credential lives
//! - [`HttpTransport`] - the wire underneath (reqwest in production)

mod dto;
pub mod gateway;
pub mod token;
pub mod transport;

pub use gateway::{AuthGateway, REFRESH_PATH, SessionStatus};
pub use token::{Credential, MemoryTokenStore, TokenStore};
pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, ReqwestTransport};
