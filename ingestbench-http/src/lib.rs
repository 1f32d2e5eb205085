#![forbid(unsafe_code)]

mod client;
mod error;
mod types;
mod util;

pub use client::{HttpClient, NDJSON_CONTENT_TYPE};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use types::{HttpRequest, HttpResponse};
pub use util::join_url;
