//! Search, ingestion and storage command implementations.

use super::{emit, emit_generic, parse_object, CommandResult, Format};
use clap::{Subcommand, ValueEnum};
use futures::StreamExt;
use shilp_client::{sse_data, ShilpClient};
use shilp_protocol::{
    FileReaderOptions, IngestRequest, IngestSourceType, SearchRequest, SearchResponse,
};
use std::path::PathBuf;

/// Data source selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    /// Uploaded files
    File,
    /// MongoDB
    Mongodb,
}

impl From<Source> for IngestSourceType {
    fn from(source: Source) -> Self {
        match source {
            Source::File => IngestSourceType::File,
            Source::Mongodb => IngestSourceType::MongoDb,
        }
    }
}

/// Data subcommands.
#[derive(Debug, Subcommand)]
pub enum DataCommand {
    /// Search a collection
    Search {
        /// Collection name
        collection: String,

        /// Query text
        query: String,

        /// Fields to search (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Maximum number of hits
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Preview rows of a stored file or MongoDB collection
    Read {
        /// File path, or `database/collection` for MongoDB
        path: String,

        /// Source type
        #[arg(long, value_enum, default_value_t = Source::File)]
        source: Source,

        /// Rows to return
        #[arg(long)]
        rows: Option<i64>,

        /// Rows to skip
        #[arg(long)]
        skip: Option<i64>,

        /// MongoDB filter as a JSON object
        #[arg(long)]
        filter: Option<String>,
    },

    /// Upload a file for ingestion
    Upload {
        /// Local file
        file: PathBuf,
    },

    /// Ingest an uploaded file into a collection
    Ingest {
        /// Target collection
        collection: String,

        /// Uploaded file path
        file_path: String,

        /// Fields to embed (repeatable)
        #[arg(long = "field", required = true)]
        fields: Vec<String>,

        /// Field holding the record ID
        #[arg(long)]
        id_field: Option<String>,
    },

    /// Follow ingestion statistics for a collection
    IngestStats {
        /// Collection name
        collection: String,
    },

    /// List stored files, or MongoDB databases and collections
    Storage {
        /// Directory or database to list
        path: Option<String>,

        /// Source type
        #[arg(long, value_enum)]
        source: Option<Source>,
    },

    /// List supported ingestion sources
    Sources,

    /// List embedding providers and models
    Models,
}

/// Runs a data subcommand.
pub async fn run(client: &ShilpClient, command: DataCommand, format: Format) -> CommandResult {
    let data = client.data();
    match command {
        DataCommand::Search {
            collection,
            query,
            fields,
            limit,
        } => {
            let mut request = SearchRequest::new(collection, query);
            if !fields.is_empty() {
                request = request.with_fields(fields);
            }
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            let results = data.search(&request).await?;
            emit(format, &results, print_hits)
        }
        DataCommand::Read {
            path,
            source,
            rows,
            skip,
            filter,
        } => {
            let mut options = FileReaderOptions {
                source: Some(source.into()),
                ..Default::default()
            };
            if let Some(rows) = rows {
                options = options.with_limit(rows);
            }
            if let Some(skip) = skip {
                options = options.with_skip(skip);
            }
            if let Some(filter) = filter {
                options = options.with_mongo_filter(parse_object(&filter)?);
            }
            let rows = data.read_document(&path, &options).await?;
            emit(format, &rows, |r| {
                for row in &r.data {
                    println!("{}", serde_json::Value::Object(row.clone()));
                }
            })
        }
        DataCommand::Upload { file } => emit_generic(format, &data.upload_file(&file).await?),
        DataCommand::Ingest {
            collection,
            file_path,
            fields,
            id_field,
        } => {
            let mut request = IngestRequest::from_file(collection, file_path, fields);
            request.id_field = id_field;
            let response = data.ingest(&request).await?;
            emit(format, &response, |r| {
                println!("{}", r.message);
                for detail in r.details.iter().flatten() {
                    println!("  {detail}");
                }
            })
        }
        DataCommand::IngestStats { collection } => {
            let mut stream = data.stream_ingest_stats(&collection).await?;
            while let Some(line) = stream.next().await {
                let line = line?;
                match format {
                    Format::Json => {
                        if let Some(payload) = sse_data(&line) {
                            println!("{payload}");
                        }
                    }
                    Format::Text => println!("{line}"),
                }
            }
            Ok(())
        }
        DataCommand::Storage { path, source } => {
            let listing = data
                .list_storage(path.as_deref(), source.map(Into::into))
                .await?;
            emit(format, &listing, |l| {
                for item in &l.data.items {
                    let suffix = if item.is_dir { "/" } else { "" };
                    println!("{}{suffix}", item.name);
                }
            })
        }
        DataCommand::Sources => {
            let sources = data.list_ingest_sources().await?;
            emit(format, &sources, |s| {
                for source in s.data.iter().flatten() {
                    println!("{source}");
                }
            })
        }
        DataCommand::Models => {
            let models = data.list_embedding_models().await?;
            emit(format, &models, |m| {
                for provider in &m.data {
                    let marker = if provider.is_default { " (default)" } else { "" };
                    println!("{}{marker}", provider.name);
                    for model in &provider.models {
                        let marker = if model.is_default { " (default)" } else { "" };
                        println!("  {}{marker}", model.name);
                    }
                }
            })
        }
    }
}

fn print_hits(results: &SearchResponse) {
    println!("Results ({} hits)", results.data.len());
    println!("================");
    for hit in &results.data {
        let id = hit.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        let dist = hit.get("dist").and_then(|v| v.as_f64()).unwrap_or_default();
        println!("{id:24} dist={dist:.4}");
    }
}
