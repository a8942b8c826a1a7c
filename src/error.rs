use thiserror::Error;

/// A failed GET against the device backend.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned a body that is not a JSON object: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A failed POST against the actuator endpoint.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("{source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response body: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("preference store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unknown theme value {0:?}")]
    InvalidTheme(String),
}

/// Failure while assembling the dashboard from its configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Prefs(#[from] PrefsError),
}
