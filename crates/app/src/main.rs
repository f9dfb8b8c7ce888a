mod config;
mod error;
mod handlers;
mod router;
mod state;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use config::{Cli, EmbedderBackend, RerankerBackend, StoreBackend};
use legal_rag_core::{
    ChatModel, Embedder, EmbeddingReranker, HashingEmbedder, LocalIndex, LopdfExtractor,
    OpenAiChat, PipelineComponents, QdrantStore, RagPipeline, Reranker, VectorIndex,
    VoyageConfig, VoyageEmbedder, VoyageReranker,
};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = ?cli.store,
        embedder = ?cli.embedder,
        reranker = ?cli.reranker,
        "legal-rag-server boot"
    );

    let pipeline = build_pipeline(&cli).await?;
    let state = AppState::new(pipeline);

    if let Some(ttl) = state.pipeline.options().idle_ttl {
        info!(ttl_secs = ttl.as_secs(), "idle conversation eviction enabled");
        spawn_eviction_sweep(state.clone(), cli.sweep_interval());
    }

    let app = router::router(state, &cli.cors_origins, cli.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(address = %cli.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn build_pipeline(cli: &Cli) -> anyhow::Result<RagPipeline> {
    let index: Arc<dyn VectorIndex> = match cli.store {
        StoreBackend::Local => {
            let store = LocalIndex::fresh(&cli.store_path)
                .await
                .with_context(|| format!("failed to reset {}", cli.store_path.display()))?;
            info!(path = %cli.store_path.display(), "local store reset");
            Arc::new(store)
        }
        StoreBackend::Qdrant => {
            let store = QdrantStore::new(cli.qdrant_url.as_str());
            let dropped = store
                .reset_prefixed(&cli.collection_prefix)
                .await
                .with_context(|| format!("failed to reset qdrant at {}", cli.qdrant_url))?;
            info!(url = %cli.qdrant_url, dropped, "qdrant collections reset");
            Arc::new(store)
        }
    };

    let mut voyage = VoyageConfig::new(cli.voyage_api_key.clone());
    voyage.base_url = cli.voyage_base_url.clone();
    voyage.timeout = cli.provider_timeout();
    voyage.retry = cli.retry_policy();

    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbedderBackend::Voyage => Arc::new(
            VoyageEmbedder::new(&voyage, cli.embedding_model.clone(), cli.dimension)
                .context("failed to configure voyage embedder")?,
        ),
        EmbedderBackend::Hashing => Arc::new(HashingEmbedder {
            dimensions: cli.dimension,
        }),
    };

    let reranker: Arc<dyn Reranker> = match cli.reranker {
        RerankerBackend::Voyage => Arc::new(
            VoyageReranker::new(&voyage, cli.rerank_model.clone())
                .context("failed to configure voyage reranker")?,
        ),
        RerankerBackend::Embedding => Arc::new(EmbeddingReranker::new(Arc::clone(&embedder))),
    };

    let chat: Arc<dyn ChatModel> = Arc::new(
        OpenAiChat::new(
            &cli.chat_base_url,
            cli.chat_api_key.clone(),
            cli.chat_model.clone(),
            cli.provider_timeout(),
            cli.retry_policy(),
        )
        .context("failed to configure chat model")?,
    );

    RagPipeline::new(
        PipelineComponents {
            index,
            embedder,
            reranker,
            chat,
            extractor: Arc::new(LopdfExtractor),
        },
        cli.pipeline_options(),
        cli.generation_options(),
    )
    .context("invalid pipeline configuration")
}

fn spawn_eviction_sweep(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.pipeline.evict_expired().await {
                Ok(evicted) if !evicted.is_empty() => {
                    info!(count = evicted.len(), "evicted idle conversations")
                }
                Ok(_) => {}
                Err(error) => warn!(%error, "eviction sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
