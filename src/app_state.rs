use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    media::MediaStore,
    page_cache::PageCache,
    render::{HtmlRenderer, Renderer},
    storage::Storage,
};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub cache: Arc<PageCache>,
    pub media: Arc<MediaStore>,
    pub renderer: Arc<dyn Renderer>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let storage = Storage::connect(&config.database.url).await?;
        storage.init().await?;

        let cache = PageCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_secs),
        );
        let media = MediaStore::new(&config.media.root);

        Ok(Self {
            storage: Arc::new(storage),
            cache: Arc::new(cache),
            media: Arc::new(media),
            renderer: Arc::new(HtmlRenderer),
            config,
        })
    }
}
