// # Resolver Configuration
//
// Generates the resolver configuration from the management ports of the
// applied network status. The file is only rewritten when the server set
// changes, so downstream resolvers are not restarted needlessly.
//
// ## Output
//
// ```text
// # Generated by nim
// # Do not edit
// # From eth0
// nameserver 192.168.1.1
// # From eth1
// # nameserver 192.168.1.1
// nameserver 10.0.0.1
// options rotate
// options attempts:5
// ```
//
// Search and domain options are never written; they interfere with the
// retry behavior of the resolver.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::types::DeviceNetworkStatus;

/// Render the resolver configuration for `status`.
///
/// Returns the text and the number of distinct servers written.
pub fn generate_resolv_conf(status: &DeviceNetworkStatus) -> (String, usize) {
    let mut out = String::from("# Generated by nim\n# Do not edit\n");
    let mut written: Vec<IpAddr> = Vec::new();

    for port in status.mgmt_ports() {
        let _ = writeln!(out, "# From {}", port.if_name);
        for server in &port.dns_servers {
            if written.contains(server) {
                let _ = writeln!(out, "# nameserver {}", server);
            } else {
                let _ = writeln!(out, "nameserver {}", server);
                written.push(*server);
            }
        }
    }

    out.push_str("options rotate\n");
    out.push_str("options attempts:5\n");
    (out, written.len())
}

/// What an update did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvUpdate {
    /// Server set unchanged, nothing written
    Unchanged,
    /// File rewritten with this many distinct servers
    Written(usize),
    /// Write failed; the previous file is left in place
    Failed,
}

/// Owns the resolver file and the last server set written to it
#[derive(Debug)]
pub struct ResolvConfWriter {
    path: PathBuf,
    last_servers: Option<Vec<IpAddr>>,
}

impl ResolvConfWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_servers: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Servers of the last successful write
    pub fn last_servers(&self) -> Option<&[IpAddr]> {
        self.last_servers.as_deref()
    }

    /// Rewrite the file if the management DNS servers changed
    pub async fn update(&mut self, status: &DeviceNetworkStatus) -> ResolvUpdate {
        let servers = status.mgmt_dns_servers();
        if self.last_servers.as_ref() == Some(&servers) {
            debug!("resolv.conf: no change: {} servers", servers.len());
            return ResolvUpdate::Unchanged;
        }

        let (content, count) = generate_resolv_conf(status);
        match self.write_atomic(&content).await {
            Ok(()) => {
                info!("resolv.conf: wrote {} servers to {}", count, self.path.display());
                self.last_servers = Some(servers);
                ResolvUpdate::Written(count)
            }
            Err(e) => {
                error!("resolv.conf: failed to write {}: {}", self.path.display(), e);
                ResolvUpdate::Failed
            }
        }
    }

    async fn write_atomic(&self, content: &str) -> std::io::Result<()> {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        {
            let mut f = fs::File::create(&temp).await?;
            f.write_all(content.as_bytes()).await?;
            f.sync_all().await?;
        }
        fs::rename(&temp, &self.path).await
    }
}
