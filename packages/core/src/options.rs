use std::time::Duration;

/// Whether a tracker stops after its first match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Invoke the callback at most once, then terminate the tracker and everything it owns.
    #[default]
    Once,

    /// Keep watching after each invocation. Each matched node is reported once.
    Repeatedly,
}

/// Configuration for a single registration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use appear_core::{Mode, TrackOptions};
///
/// let options = TrackOptions::<u32>::new("ytd-comments#comments")
///     .timeout(Duration::from_secs(10))
///     .mode(Mode::Repeatedly);
/// assert_eq!(options.selector(), "ytd-comments#comments");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TrackOptions<N> {
    pub(crate) selector: String,
    pub(crate) root: Option<N>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) mode: Mode,
    pub(crate) scan_existing: bool,
}

impl<N> TrackOptions<N> {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            root: None,
            timeout: None,
            mode: Mode::Once,
            scan_existing: false,
        }
    }

    /// Watch this node (or shadow root) instead of the host's document.
    pub fn root(mut self, root: N) -> Self {
        self.root = Some(root);
        self
    }

    /// Terminate the tracker if it is still active after `timeout`. A zero duration disables the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Same as [`TrackOptions::timeout`], in milliseconds.
    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `.mode(Mode::Repeatedly)`.
    pub fn repeatedly(self) -> Self {
        self.mode(Mode::Repeatedly)
    }

    /// Also report content that already matches under the root at registration time.
    ///
    /// Off by default: without it only shadow trees present at registration are scanned eagerly, and
    /// content directly under the root has to be inserted after registration to be reported.
    pub fn scan_existing(mut self, scan: bool) -> Self {
        self.scan_existing = scan;
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_mode(&self) -> Mode {
        self.mode
    }
}
