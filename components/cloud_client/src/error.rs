use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("no token available for scope {scope}: {reason}")]
    Unavailable { scope: String, reason: String },

    #[error("failed to run token helper {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("token helper returned an unreadable response: {0}")]
    Malformed(String),
}
