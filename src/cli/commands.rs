//! CLI commands for the coordinator and for peers
//!
//! Implements all command handlers for the CLI interface.

use crate::config::CoordinatorConfig;
use crate::core::FileInfo;
use crate::crypto::file_digest;
use crate::network::message::NewFileRequest;
use crate::network::{Client, Message, MessageKind, Server};
use crate::storage::MemoryFileStore;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Run the coordinator until Ctrl+C
pub async fn cmd_serve(config: CoordinatorConfig) -> CliResult<()> {
    let server = Server::bind(&config, Box::new(MemoryFileStore::new())).await?;

    println!("🌐 Coordinator listening on {}", server.local_addr()?);
    println!("   Max hosts: {}", config.max_hosts);
    if let Some(msg) = &config.broadcast_message {
        println!("   Broadcast message: {}", msg);
    }
    match config.idle_timeout() {
        Some(t) => println!("   Idle timeout: {}s", t.as_secs()),
        None => println!("   Idle timeout: none"),
    }

    let coordinator = server.coordinator();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        if let Ok(status) = coordinator.status().await {
            println!(
                "\n📴 Shutting down ({} hosts, {} files, {} open transactions)",
                status.hosts, status.files, status.transactions
            );
        }
        std::process::exit(0);
    });

    server.run().await?;
    Ok(())
}

/// List hosts connected to a coordinator
pub async fn cmd_hosts(server: &str, name: &str) -> CliResult<()> {
    let (mut client, _) = Client::connect(server, name).await?;

    let response = client
        .request(&Message::hosts_list_request(), MessageKind::HostsListResponse)
        .await?;
    if let Message::HostsListResponse(r) = response {
        if !r.approved {
            println!(
                "❌ Request rejected: {}",
                r.reject_reason.unwrap_or_default()
            );
        } else {
            println!("📋 Connected hosts ({}):", r.hosts_list.len());
            for host in r.hosts_list {
                let marker = if &host.address == client.local_address() {
                    " (you)"
                } else {
                    ""
                };
                println!("   {} - {}{}", host.address, host.name, marker);
            }
        }
    }

    client.close("done").await?;
    Ok(())
}

/// List files advertised on a coordinator
pub async fn cmd_files(server: &str, name: &str) -> CliResult<()> {
    let (mut client, _) = Client::connect(server, name).await?;

    let response = client
        .request(&Message::files_list_request(), MessageKind::FilesListResponse)
        .await?;
    if let Message::FilesListResponse(r) = response {
        if r.files_list.is_empty() {
            println!("📭 No files shared yet.");
        } else {
            println!("📁 Shared files ({}):", r.files_list.len());
            for file in r.files_list {
                println!(
                    "   [{}] {} ({} bytes) {}",
                    file.id,
                    file.name,
                    file.size,
                    short_hash(&file.hash)
                );
            }
        }
    }

    client.close("done").await?;
    Ok(())
}

/// First 16 characters of an advertised digest. Peers may send any string.
fn short_hash(hash: &str) -> String {
    hash.chars().take(16).collect()
}

/// Describe a local file for advertising
fn describe(path: &Path) -> CliResult<FileInfo> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("not a file name: {:?}", path))?
        .to_string();
    let size = std::fs::metadata(path)?.len();
    let hash = file_digest(path)?;
    Ok(FileInfo::new(name, size, hash))
}

/// Advertise local files and stay online, printing rendezvous requests
pub async fn cmd_share(server: &str, name: &str, paths: &[PathBuf]) -> CliResult<()> {
    let files = paths
        .iter()
        .map(|p| describe(p))
        .collect::<CliResult<Vec<FileInfo>>>()?;
    let count = files.len();

    let (mut client, response) = Client::connect(server, name).await?;
    println!("🔗 Connected to {} as {}", server, name);
    if let Some(msg) = response.broadcast_message {
        println!("   📢 {}", msg);
    }

    client
        .send(&Message::NewFileRequest(NewFileRequest {
            file_info_list: files,
        }))
        .await?;
    for _ in 0..count {
        let response = client.receive_kind(MessageKind::NewFileResponse).await?;
        if let Message::NewFileResponse(r) = response {
            if r.approved {
                println!("   ✅ Shared {}", r.file_name);
            } else {
                println!(
                    "   ❌ {} rejected: {}",
                    r.file_name,
                    r.reject_reason.unwrap_or_default()
                );
            }
        }
    }

    println!("⏳ Waiting for requests (Ctrl+C to stop)...");
    loop {
        match client.receive().await? {
            Message::FileTransactionStartRequest(req) => {
                println!(
                    "📤 {} requested, deliver to {}",
                    req.file_name, req.establish_address
                );
            }
            Message::NewHostConnected(n) => {
                println!("👋 {} joined from {}", n.host_name, n.host_address);
            }
            Message::ConnectionLost(lost) => {
                println!("👋 {}", lost.reason);
            }
            other => log::debug!("Ignoring {}", other.type_name()),
        }
    }
}

/// Print the digest of a local file
pub fn cmd_hash(path: &Path) -> CliResult<()> {
    let info = describe(path)?;
    println!("🔑 {}", info.hash);
    println!("   File: {}", info.name);
    println!("   Size: {} bytes", info.size);
    Ok(())
}
