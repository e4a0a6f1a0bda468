use anyhow::Context;
use docchat::{
    api, config,
    files::FileStorage,
    logging,
    pipeline::DocumentService,
    provider::{GeminiClient, RetryPolicy},
    store::{self, ConversationStore, DocumentRepository},
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let files = FileStorage::new(config.upload_dir.clone());
    files
        .ensure_root()
        .await
        .context("Failed to prepare upload directory")?;
    let provider =
        Arc::new(GeminiClient::from_config(config).context("Failed to build Gemini client")?);

    let (documents, conversations) = match &config.data_dir {
        Some(dir) => {
            let store = Arc::new(
                store::JsonFileStore::open(dir.clone())
                    .await
                    .context("Failed to open record store")?,
            );
            let documents: Arc<dyn DocumentRepository> = store.clone();
            let conversations: Arc<dyn ConversationStore> = store;
            (documents, conversations)
        }
        None => {
            tracing::warn!("DATA_DIR not set; documents and conversations are kept in memory");
            let store = Arc::new(store::MemoryStore::new());
            let documents: Arc<dyn DocumentRepository> = store.clone();
            let conversations: Arc<dyn ConversationStore> = store;
            (documents, conversations)
        }
    };

    let service = DocumentService::new(
        documents,
        conversations,
        files,
        provider,
        RetryPolicy::from_config(config),
    )
    .with_history_turns(config.prompt_history_turns);
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server terminated")?;
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 5000..=5099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 5000-5099",
    ))
}
