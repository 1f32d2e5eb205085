#![forbid(unsafe_code)]

mod error;
mod ndjson;
mod records;
mod value;

pub use error::{Error, Result};
pub use ndjson::{decode_ndjson, encode_ndjson};
pub use records::{DataRecord, LogRecord, LogType, MetricRecord, epoch_millis};
pub use value::{Payload, Value};
