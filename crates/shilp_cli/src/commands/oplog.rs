//! Oplog and replica command implementations.

use super::{emit, emit_generic, CommandResult, Format};
use clap::Subcommand;
use shilp_client::{
    MemoryOplogApplier, ReplicaConfig, ReplicaSync, RetryConfig, ShilpClient,
};
use shilp_protocol::{GetOplogResponse, Lsn};
use std::time::Duration;
use tracing::{info, warn};

/// Oplog subcommands.
#[derive(Debug, Subcommand)]
pub enum OplogCommand {
    /// Fetch entries after an LSN
    Fetch {
        /// Collection (all collections if omitted)
        #[arg(short, long, default_value = "")]
        collection: String,

        /// Return entries strictly after this LSN
        #[arg(short, long, default_value = "0")]
        after: Lsn,

        /// Maximum number of entries
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show oplog status for a collection
    Status {
        /// Collection name
        collection: String,
    },

    /// Register a replica
    Register {
        /// Replica ID
        replica_id: String,
    },

    /// Unregister a replica
    Unregister {
        /// Replica ID
        replica_id: String,
    },

    /// Report a replica's applied LSN
    Heartbeat {
        /// Collection name
        collection: String,
        /// Replica ID
        replica_id: String,
        /// Applied LSN
        lsn: Lsn,
    },

    /// Follow a collection's oplog as a replica until interrupted
    Follow {
        /// Collection name
        collection: String,

        /// Replica ID (a random one is generated if omitted)
        #[arg(long)]
        replica_id: Option<String>,

        /// Resume after this LSN
        #[arg(long, default_value = "0")]
        from: Lsn,

        /// Entries per fetch
        #[arg(long, default_value = "100")]
        batch_size: u32,

        /// Seconds between sync cycles
        #[arg(long, default_value = "5")]
        interval_secs: u64,
    },
}

/// Runs an oplog subcommand.
pub async fn run(client: &ShilpClient, command: OplogCommand, format: Format) -> CommandResult {
    let oplog = client.oplog();
    match command {
        OplogCommand::Fetch {
            collection,
            after,
            limit,
        } => {
            let batch = oplog.get_oplog_entries(&collection, after, limit).await?;
            emit(format, &batch, print_entries)
        }
        OplogCommand::Status { collection } => {
            let status = oplog.get_oplog_status(&collection).await?;
            emit(format, &status, |s| {
                println!("Oplog status for {collection}");
                println!("================");
                println!("last_lsn:      {}", s.last_lsn);
                println!("retention_lsn: {}", s.retention_lsn);
                println!("replicas:      {}", s.replica_count);
            })
        }
        OplogCommand::Register { replica_id } => {
            emit_generic(format, &oplog.register_replica(&replica_id).await?)
        }
        OplogCommand::Unregister { replica_id } => {
            emit_generic(format, &oplog.unregister_replica(&replica_id).await?)
        }
        OplogCommand::Heartbeat {
            collection,
            replica_id,
            lsn,
        } => emit_generic(
            format,
            &oplog.update_replica_lsn(&collection, &replica_id, lsn).await?,
        ),
        OplogCommand::Follow {
            collection,
            replica_id,
            from,
            batch_size,
            interval_secs,
        } => {
            let replica_id = replica_id.unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));
            let config = ReplicaConfig::new(replica_id, collection)
                .with_batch_size(batch_size)
                .with_retry(RetryConfig::default());
            let replica = ReplicaSync::new(
                client.clone(),
                config,
                MemoryOplogApplier::resume_from(from),
            );
            follow(&replica, Duration::from_secs(interval_secs), format).await
        }
    }
}

async fn follow(
    replica: &ReplicaSync<MemoryOplogApplier>,
    interval: Duration,
    format: Format,
) -> CommandResult {
    replica.start().await?;
    info!(replica_id = %replica.config().replica_id, "following oplog, Ctrl-C to stop");

    loop {
        if let Err(e) = replica.sync_with_retry().await {
            warn!(error = %e, "sync cycle failed");
        }
        // Batches applied before a failure are printed too.
        for entry in replica.applier().take_applied_entries() {
            match format {
                Format::Json => println!("{}", serde_json::to_string(&entry)?),
                Format::Text => println!(
                    "[{:>8}] {:18} {} {}",
                    entry.lsn, entry.op_type, entry.collection, entry.doc_id
                ),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    replica.stop().await?;
    let stats = replica.stats();
    eprintln!(
        "stopped at lsn {} after {} cycles ({} entries)",
        stats.applied_lsn, stats.cycles_completed, stats.entries_applied
    );
    Ok(())
}

fn print_entries(batch: &GetOplogResponse) {
    println!(
        "Oplog entries ({} returned, head at {})",
        batch.entries.len(),
        batch.last_lsn
    );
    println!("================");
    for entry in &batch.entries {
        print!("[{:>8}] {:18} {}", entry.lsn, entry.op_type, entry.collection);
        if !entry.doc_id.is_empty() {
            print!(" doc={}", entry.doc_id);
        }
        if let Some(name) = &entry.new_name {
            print!(" -> {name}");
        }
        if !entry.timestamp.is_empty() {
            print!(" at {}", entry.timestamp);
        }
        println!();
    }
    if batch.has_more() {
        println!("(more entries after {})", batch.high_water_lsn().unwrap_or_default());
    }
}
