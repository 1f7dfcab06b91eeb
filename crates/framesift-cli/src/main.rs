//! framesift: video keyframe retrieval from the command line.

use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::EnvFilter;

use framesift_core::FramesiftConfig;
use framesift_ingest::{IngestSources, Ingester};
use framesift_retrieval::RetrievalEngine;
use framesift_store::{CollectionConfig, SqliteDetectionStore, SqliteVectorIndex};

mod cli;

use cli::Command;

fn resolve_data_dir() -> PathBuf {
    std::env::var("FRAMESIFT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn open_engine(data_dir: &Path) -> anyhow::Result<RetrievalEngine> {
    let config = FramesiftConfig::from_env(data_dir)?;
    let encoder = framesift_infer::create_encoder(&config.data_paths.models, config.embedding_dim);
    RetrievalEngine::open(&config, encoder)
        .map_err(|e| anyhow::anyhow!("Failed to open stores: {}", e))
}

fn run_ingest(data_dir: &Path) -> anyhow::Result<()> {
    let config = FramesiftConfig::from_env(data_dir)?;
    let vectors = SqliteVectorIndex::open(
        &config.data_paths.vectordb,
        CollectionConfig {
            name: config.keyframe_collection.clone(),
            vector_field: config.vector_field.clone(),
            dimension: config.embedding_dim,
            metric: config.metric,
            nlist: config.nlist,
        },
    )?;
    let detections = SqliteDetectionStore::open(&config.data_paths.vectordb)?;

    let report =
        Ingester::new(&vectors, &detections).run(&IngestSources::from_paths(&config.data_paths))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };

    match command {
        Command::Help => {
            println!("{}", cli::USAGE);
        }
        Command::Ingest { data_dir } => {
            let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
            info!("Data directory: {}", data_dir.display());
            run_ingest(&data_dir)?;
        }
        Command::Search { query, limit } => {
            let data_dir = resolve_data_dir();
            let limit = match limit {
                Some(limit) => limit,
                None => FramesiftConfig::from_env(&data_dir)?.search_limit,
            };
            let engine = open_engine(&data_dir)?;
            let hits = engine.similarity_search(&query, limit)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            engine.shutdown();
        }
        Command::Objects {
            conditions,
            projection,
        } => {
            let engine = open_engine(&resolve_data_dir())?;
            let docs = engine.object_search(&conditions, projection.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&docs)?);
            engine.shutdown();
        }
        Command::Stats => {
            let engine = open_engine(&resolve_data_dir())?;
            println!("{}", serde_json::to_string_pretty(&engine.stats()?)?);
            engine.shutdown();
        }
    }

    Ok(())
}
