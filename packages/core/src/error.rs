use thiserror::Error;

/// A result type for tracker registration.
pub type Result<T, E = TrackError> = std::result::Result<T, E>;

/// Errors returned synchronously from registering a tracker.
///
/// Once a registration succeeds nothing is ever propagated back to the caller: callback failures and
/// timeouts are logged and recorded on the [`crate::TrackerHandle`] instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// The host could not compile the selector.
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    /// The root cannot be observed, either because the host does not know the node or because it is a
    /// leaf (text, comment) that can never have children appended.
    #[error("invalid observation root: {0}")]
    InvalidRoot(String),

    /// The mutation source refused the subscription.
    #[error("failed to subscribe to mutations: {0}")]
    Subscribe(String),

    /// The runtime was torn down (or never initialised) before the registration.
    #[error("the tracker runtime has been shut down")]
    RuntimeShutdown,
}

/// Errors produced while parsing a selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The selector, or one entry of a selector list, is blank.
    #[error("selector `{0}` is empty")]
    Empty(String),

    /// A character that cannot start or continue a selector component.
    #[error("unexpected character `{found}` at offset {offset} in `{selector}`")]
    UnexpectedChar {
        selector: String,
        found: char,
        offset: usize,
    },

    /// A `#`, `.`, or attribute selector with no name after it.
    #[error("expected a name at offset {offset} in `{selector}`")]
    ExpectedName { selector: String, offset: usize },

    /// A combinator with nothing on one of its sides.
    #[error("dangling combinator in `{0}`")]
    DanglingCombinator(String),

    /// An attribute selector missing its closing bracket or quote.
    #[error("unclosed attribute selector in `{0}`")]
    UnclosedAttribute(String),

    /// Valid CSS that this matcher does not implement (pseudo-classes, sibling combinators, ...).
    #[error("unsupported selector syntax `{syntax}` in `{selector}`")]
    Unsupported { selector: String, syntax: String },

    /// The host's own selector engine refused the input.
    #[error("`{selector}` is not a valid selector: {reason}")]
    Rejected { selector: String, reason: String },
}

/// The failure of a single callback invocation.
///
/// These never leave the runtime; they are only logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("callback returned an error: {0}")]
    Failed(String),

    #[error("callback panicked: {0}")]
    Panicked(String),
}
