//! Collection and record command implementations.

use super::{emit, emit_generic, parse_object, CommandResult, Format};
use clap::Subcommand;
use shilp_client::ShilpClient;
use shilp_protocol::{AddCollectionRequest, InsertRecordRequest, ListCollectionsResponse};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Collection management subcommands.
#[derive(Debug, Subcommand)]
pub enum CollectionsCommand {
    /// List collections
    List,

    /// Create a collection
    Create {
        /// Collection name
        name: String,

        /// Store vectors only, without the reference documents
        #[arg(long)]
        no_reference_storage: bool,

        /// Enable metadata storage
        #[arg(long)]
        metadata: bool,
    },

    /// Drop a collection
    Drop {
        /// Collection name
        name: String,
    },

    /// Flush a collection to disk
    Flush {
        /// Collection name
        name: String,
    },

    /// Load a collection into memory
    Load {
        /// Collection name
        name: String,
    },

    /// Unload a collection from memory
    Unload {
        /// Collection name
        name: String,
    },

    /// Rename a collection
    Rename {
        /// Current name
        old_name: String,
        /// New name
        new_name: String,
    },

    /// Rebuild a collection's index
    Reindex {
        /// Collection name
        name: String,
    },

    /// Remove expired records
    ExpiryCleanup {
        /// Collection name
        name: String,
    },

    /// Export a collection to a file
    Export {
        /// Collection name
        name: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import a previously exported collection
    Import {
        /// Export file
        file: PathBuf,
    },

    /// Insert one record
    Insert {
        /// Collection name
        collection: String,

        /// Record as a JSON object
        record: String,

        /// Record ID (generated by the server if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Fields to embed (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Expiry as a Unix timestamp
        #[arg(long)]
        expiry: Option<i64>,
    },

    /// Delete one record
    DeleteRecord {
        /// Collection name
        collection: String,
        /// Record ID
        id: String,
    },
}

/// Runs a collections subcommand.
pub async fn run(client: &ShilpClient, command: CollectionsCommand, format: Format) -> CommandResult {
    let collections = client.collections();
    match command {
        CollectionsCommand::List => {
            let listing = collections.list().await?;
            emit(format, &listing, print_listing)
        }
        CollectionsCommand::Create {
            name,
            no_reference_storage,
            metadata,
        } => {
            let mut request = AddCollectionRequest::new(name);
            if no_reference_storage {
                request = request.without_reference_storage();
            }
            if metadata {
                request = request.with_metadata_storage();
            }
            emit_generic(format, &collections.add(&request).await?)
        }
        CollectionsCommand::Drop { name } => emit_generic(format, &collections.drop(&name).await?),
        CollectionsCommand::Flush { name } => emit_generic(format, &collections.flush(&name).await?),
        CollectionsCommand::Load { name } => emit_generic(format, &collections.load(&name).await?),
        CollectionsCommand::Unload { name } => {
            emit_generic(format, &collections.unload(&name).await?)
        }
        CollectionsCommand::Rename { old_name, new_name } => {
            emit_generic(format, &collections.rename(&old_name, &new_name).await?)
        }
        CollectionsCommand::Reindex { name } => {
            emit_generic(format, &collections.reindex(&name).await?)
        }
        CollectionsCommand::ExpiryCleanup { name } => {
            emit_generic(format, &collections.expiry_cleanup(&name).await?)
        }
        CollectionsCommand::Export { name, output } => {
            let mut file = tokio::fs::File::create(&output).await?;
            let bytes = collections.export(&name).await?.copy_to(&mut file).await?;
            file.flush().await?;
            eprintln!("wrote {bytes} bytes to {}", output.display());
            Ok(())
        }
        CollectionsCommand::Import { file } => {
            emit_generic(format, &collections.import(&file).await?)
        }
        CollectionsCommand::Insert {
            collection,
            record,
            id,
            fields,
            expiry,
        } => {
            let mut request = InsertRecordRequest::new(collection, parse_object(&record)?);
            if let Some(id) = id {
                request = request.with_id(id);
            }
            if !fields.is_empty() {
                request = request.with_fields(fields);
            }
            if let Some(expiry) = expiry {
                request = request.with_expiry(expiry);
            }
            let response = collections.insert_record(&request).await?;
            emit(format, &response, |r| match &r.record {
                Some(record) => println!("inserted {}", record.id),
                None => println!("{}", r.message),
            })
        }
        CollectionsCommand::DeleteRecord { collection, id } => {
            emit_generic(format, &collections.delete_record(&collection, &id).await?)
        }
    }
}

fn print_listing(listing: &ListCollectionsResponse) {
    println!("Collections ({} total)", listing.data.len());
    println!("================");
    for collection in &listing.data {
        let state = if collection.is_loaded { "loaded" } else { "unloaded" };
        println!(
            "{:24} {:9} fields={}",
            collection.name,
            state,
            collection.fields.join(",")
        );
    }
}
