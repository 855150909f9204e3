use std::{path::PathBuf, sync::Arc};

use clap::Args;
use testpeer_server::{CliArgs, HttpServer};

/// Start the test server.
#[derive(Args, Debug)]
pub struct ServeCommand {
    #[clap(flatten)]
    pub server: CliArgs,

    /// Directory in which the log files are created
    #[clap(long = "log-dir", default_value = ".")]
    pub log_dir: PathBuf,
}

impl ServeCommand {
    /// Serves requests until the process is stopped.
    pub async fn run(self) -> anyhow::Result<()> {
        let (listen_addr, context) = self.server.into_context();
        tracing::info!(
            "Content baseline is {}; serving files from {}",
            context.baseline.http_date(),
            context.content_root.display()
        );
        let server = Arc::new(HttpServer::new(listen_addr, context));
        server.serve().await
    }
}
