use tracing::Level;

/// Configuration for the page-level tracker runtime.
///
/// # Example
///
/// ```rust, ignore
/// appear_web::init(WebConfig::new().root_id("content").log_level(tracing::Level::DEBUG))?;
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebConfig {
    pub(crate) root_id: Option<String>,
    pub(crate) log_level: Option<Level>,
}

impl WebConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the element with this id, instead of the whole document, for registrations that do
    /// not name a root.
    pub fn root_id(mut self, id: impl Into<String>) -> Self {
        self.root_id = Some(id.into());
        self
    }

    /// Install a console logger at this level during `init`.
    ///
    /// When unset nothing is installed, so an application that sets up its own subscriber keeps it.
    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }
}
