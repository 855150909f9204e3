use std::path::PathBuf;

use testpeer_http::content::Baseline;

/// Process-wide state shared by every request.
#[derive(Clone, Debug)]
pub struct ServerContext {
    /// Reported as the modification time of all served content.
    pub baseline: Baseline,
    /// Log a full dump of every incoming request.
    pub verbose: bool,
    /// Directory that `/getContent/` and `/cacheTests/` serve from.
    pub content_root: PathBuf,
    /// The template rendered for unmatched paths.
    pub template: PathBuf,
}

impl ServerContext {
    /// A context whose baseline is the current time.
    pub fn new(verbose: bool, content_root: impl Into<PathBuf>, template: impl Into<PathBuf>) -> Self {
        Self {
            baseline: Baseline::now(),
            verbose,
            content_root: content_root.into(),
            template: template.into(),
        }
    }
}
