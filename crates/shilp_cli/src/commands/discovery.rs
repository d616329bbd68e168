//! Discovery command implementations.

use super::{emit, emit_generic, CommandResult, Format};
use clap::{Subcommand, ValueEnum};
use shilp_client::DiscoveryClient;
use shilp_protocol::{GenericResponse, ReplicaType, SyncStatus};

/// Role of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Reads only
    Read,
    /// Writes only
    Write,
    /// Reads and writes
    Single,
}

impl From<Role> for ReplicaType {
    fn from(role: Role) -> Self {
        match role {
            Role::Read => ReplicaType::ReadReplica,
            Role::Write => ReplicaType::WriteReplica,
            Role::Single => ReplicaType::SingleNode,
        }
    }
}

/// Reported sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Status {
    /// Accepting traffic
    Ready,
    /// Replaying the oplog
    Syncing,
}

/// Discovery subcommands.
#[derive(Debug, Subcommand)]
pub enum DiscoveryCommand {
    /// Show registry and proxy statistics
    Stats,

    /// Register a Shilp node
    Register {
        /// Node address
        address: String,
        /// Node ID
        id: String,
        /// Node role
        #[arg(long, value_enum, default_value_t = Role::Single)]
        role: Role,
    },

    /// Unregister a Shilp node
    Unregister {
        /// Node address
        address: String,
        /// Node ID
        id: String,
        /// Node role
        #[arg(long, value_enum, default_value_t = Role::Single)]
        role: Role,
    },

    /// Report a node's sync status
    SyncStatus {
        /// Node address
        address: String,
        /// New status
        #[arg(value_enum)]
        status: Status,
    },

    /// Register a text-embedding-inference service
    TeiRegister {
        /// Service address
        address: String,
        /// Service ID
        id: String,
    },

    /// Unregister a text-embedding-inference service
    TeiUnregister {
        /// Service address
        address: String,
        /// Service ID
        id: String,
    },
}

/// Runs a discovery subcommand.
pub async fn run(
    client: &DiscoveryClient,
    account_id: &str,
    command: DiscoveryCommand,
    format: Format,
) -> CommandResult {
    match command {
        DiscoveryCommand::Stats => {
            let stats = client.get_shilp_stats(account_id).await?;
            emit(format, &stats, |s| {
                let registry = &s.registry;
                println!("Registry ({}/{} available)", registry.available_count, registry.total_count);
                println!("================");
                println!("write: {} {}", registry.write_replica.id, registry.write_replica.address);
                for node in &registry.read_replicas {
                    let flags = match (node.is_healthy, node.is_syncing) {
                        (_, true) => "syncing",
                        (true, false) => "healthy",
                        (false, false) => "unhealthy",
                    };
                    println!("read:  {} {} ({flags})", node.id, node.address);
                }
                println!("proxies: {} -> {}", s.proxy.active_proxies, s.proxy.targets.join(", "));
            })
        }
        DiscoveryCommand::Register { address, id, role } => {
            let responses = client
                .register_shilp_service(account_id, &address, &id, role.into())
                .await?;
            emit_all(format, &responses)
        }
        DiscoveryCommand::Unregister { address, id, role } => {
            let responses = client
                .unregister_shilp_service(account_id, &address, &id, role.into())
                .await?;
            emit_all(format, &responses)
        }
        DiscoveryCommand::SyncStatus { address, status } => {
            let status = match status {
                Status::Ready => SyncStatus::Ready,
                Status::Syncing => SyncStatus::Syncing,
            };
            emit_generic(
                format,
                &client.update_shilp_sync_status(account_id, &address, status).await?,
            )
        }
        DiscoveryCommand::TeiRegister { address, id } => emit_generic(
            format,
            &client.register_tei_service(account_id, &address, &id).await?,
        ),
        DiscoveryCommand::TeiUnregister { address, id } => emit_generic(
            format,
            &client.unregister_tei_service(account_id, &address, &id).await?,
        ),
    }
}

fn emit_all(format: Format, responses: &[GenericResponse]) -> CommandResult {
    for response in responses {
        emit_generic(format, response)?;
    }
    Ok(())
}
