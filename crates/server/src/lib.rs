//! The testpeer HTTP server.

mod context;
mod handlers;
mod instrument;
mod server;

use std::{
    net::{Ipv4Addr, SocketAddr, ToSocketAddrs},
    path::PathBuf,
};

use anyhow::Context;
use clap::Args;

pub use context::ServerContext;
pub use instrument::MatchedRoute;
pub use server::HttpServer;

/// Default listen address: every interface, port 8089.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8089";

#[derive(Args, Debug)]
pub struct CliArgs {
    /// IP address and port to listen on
    #[clap(long = "listen", default_value = DEFAULT_LISTEN_ADDR, value_parser = parse_listen_addr)]
    pub address: SocketAddr,

    /// Log a full dump of every incoming request
    #[clap(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Directory served by /getContent/ and /cacheTests/
    #[clap(long = "content-dir", default_value = ".")]
    pub content_dir: PathBuf,

    /// Template rendered for the root and any unmatched path
    #[clap(long = "template", default_value = "main.html")]
    pub template: PathBuf,
}

impl CliArgs {
    /// Builds the shared request context; the content baseline is taken now.
    pub fn into_context(self) -> (SocketAddr, ServerContext) {
        let context = ServerContext::new(self.verbose, self.content_dir, self.template);
        (self.address, context)
    }
}

fn parse_listen_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    // Prefer 127.0.0.1 over e.g. [::1]
    if let Some(addr) = addrs
        .iter()
        .find(|addr| addr.is_ipv4() && addr.ip() == Ipv4Addr::LOCALHOST)
    {
        return Ok(*addr);
    }
    // Otherwise, take the first addr (OS preference)
    addrs.into_iter().next().context("couldn't resolve address")
}
