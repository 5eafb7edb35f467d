use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse URL: {0}")]
    UrlParsing(#[from] url::ParseError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Slack {method} responded with error: {code}")]
    SlackApi { method: String, code: String },

    #[error("Field '{field}' has unparseable value '{value}'")]
    Coercion { field: String, value: String },

    #[error("The day value '{date}' is not a valid YYYY-MM-DD date")]
    InvalidDate { date: String },

    #[error("The report window must cover at least one day")]
    EmptyWindow,

    #[error("The path '{path}' has no usable file name")]
    BadFilePath { path: String },

    #[error("Chart rendering failed: {0}")]
    Chart(String),
}
