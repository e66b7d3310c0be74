//! `vchainindex run`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vchainindex_core::checkpoint::CheckpointStore;
use vchainindex_core::handler::{HandlerRegistry, LoggingHandler, TransactionHandler};
use vchainindex_core::indexer::IndexerConfig;
use vchainindex_core::CancellationToken;
use vchainindex_rpc::IndexerBuilder;
use vchainindex_storage::{InMemoryStorage, SqliteStorage};

pub struct RunOptions {
    pub url: String,
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub id: Option<String>,
    pub from: Option<String>,
    pub retry: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_ms: u64,
}

pub async fn run(options: RunOptions) -> Result<()> {
    let config = load_config(&options)?;

    match &options.db {
        Some(path) => {
            let storage = SqliteStorage::open(&path.to_string_lossy())
                .await
                .with_context(|| format!("opening database {}", path.display()))?;
            index(Arc::new(storage), config, &options).await
        }
        None => {
            tracing::warn!("no --db given, checkpoints will not survive a restart");
            index(Arc::new(InMemoryStorage::new()), config, &options).await
        }
    }
}

/// Merge the optional config file with command-line overrides.
fn load_config(options: &RunOptions) -> Result<IndexerConfig> {
    let base = match &options.config {
        Some(path) => read_config(path)?,
        None => IndexerConfig::default(),
    };

    let mut builder = IndexerBuilder::from_config(base);
    if let Some(id) = &options.id {
        builder = builder.id(id.as_str());
    }
    if let Some(from) = &options.from {
        builder = builder.from_block(from.as_str());
    }
    if let Some(retry) = options.retry {
        builder = builder.retry(retry);
    }
    if let Some(ms) = options.poll_interval_ms {
        builder = builder.poll_interval_ms(ms);
    }

    let config = builder.build_config();
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<IndexerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

async fn index<T>(storage: Arc<T>, config: IndexerConfig, options: &RunOptions) -> Result<()>
where
    T: CheckpointStore + TransactionHandler + 'static,
{
    let handlers = HandlerRegistry::new()
        .with(storage.clone() as Arc<dyn TransactionHandler>)
        .with(Arc::new(LoggingHandler));

    let mut engine = IndexerBuilder::from_config(config)
        .url(options.url.as_str())
        .request_timeout(Duration::from_millis(options.timeout_ms))
        .build(storage as Arc<dyn CheckpointStore>, handlers)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current step");
            on_signal.cancel();
        }
    });

    engine
        .run(cancel)
        .await
        .with_context(|| format!("indexer '{}' failed", engine.config().id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RunOptions {
        RunOptions {
            url: "ws://127.0.0.1:18110".into(),
            db: None,
            config: None,
            id: None,
            from: None,
            retry: None,
            poll_interval_ms: None,
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn flags_override_defaults() {
        let opts = RunOptions {
            id: Some("payments".into()),
            from: Some("abcd".into()),
            retry: Some(3),
            ..options()
        };
        let config = load_config(&opts).unwrap();
        assert_eq!(config.id, "payments");
        assert_eq!(config.from_block.as_ref().map(|h| h.as_str()), Some("abcd"));
        assert_eq!(config.retry, 3);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn config_file_is_merged_with_flags() {
        let path = std::env::temp_dir().join(format!("vchainindex-cfg-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "id": "from-file", "retry": 7, "poll_interval_ms": 50 }"#).unwrap();

        let opts = RunOptions {
            config: Some(path.clone()),
            retry: Some(1),
            ..options()
        };
        let config = load_config(&opts).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.id, "from-file");
        assert_eq!(config.retry, 1);
        assert_eq!(config.poll_interval_ms, 50);
    }

    #[test]
    fn blank_id_is_rejected() {
        let opts = RunOptions {
            id: Some("   ".into()),
            ..options()
        };
        assert!(load_config(&opts).is_err());
    }
}
