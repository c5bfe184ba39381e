use thiserror::Error;

/// Errors from setting up the page runtime.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("no global `window` exists (appear cannot run in a worker)")]
    NoWindow,

    #[error("the window has no document")]
    NoDocument,

    #[error("no element with id `{0}` to use as the root")]
    RootNotFound(String),
}
