pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("http error: {0}")]
    Http(#[from] ingestbench_http::Error),

    #[error("payload error: {0}")]
    Payload(#[from] ingestbench_value::Error),

    #[error("ingest rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("sdk error: {0}")]
    Sdk(String),

    #[error("api key is empty (set TEST_API_KEY)")]
    MissingApiKey,

    #[error("`users` must be a positive integer")]
    InvalidUsers,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("a run needs a duration, an iteration budget, or ramp stages")]
    UnboundedRun,

    #[error("pacing range is inverted: min {min:?} > max {max:?}")]
    InvalidPacing {
        min: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("scenario `{0}` has no pattern with a positive weight")]
    NoPatterns(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("{which} {metric} must be a finite positive number, got {value}")]
    InvalidBaseline {
        which: &'static str,
        metric: &'static str,
        value: f64,
    },

    #[error("invalid results document `{path}`: {source}")]
    ResultsParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode results document: {0}")]
    ResultsEncode(#[source] serde_json::Error),

    #[error("invalid output path: `{0}`")]
    InvalidOutputPath(String),
}
