use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use tg_core::model::TGFile;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumKey {
    pub chat_id: i64,
    pub album_id: i64,
}

/// 相册消息在网络上逐条到达; 这里按 (会话, 相册) 聚合,
/// 攒够上限立即提交, 否则等静默期由清理循环冲刷。
pub struct AlbumBuffer {
    cache: RwLock<HashMap<AlbumKey, AlbumCache>>,
    max_items: usize,
}

struct AlbumCache {
    files: BTreeMap<i64, TGFile>,
    last_update: Instant,
}

#[derive(Debug)]
pub enum AlbumAction {
    NotAlbum(TGFile),
    Cached,
    Flush(Vec<TGFile>),
}

impl AlbumBuffer {
    pub fn new(max_items: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_items: max_items.max(2),
        }
    }

    pub async fn add(&self, file: TGFile) -> AlbumAction {
        let album_id = match file.grouped_id {
            Some(id) if id != 0 => id,
            _ => return AlbumAction::NotAlbum(file),
        };

        let key = AlbumKey {
            chat_id: file.chat_id,
            album_id,
        };
        let mut cache = self.cache.write().await;

        let entry = cache.entry(key.clone()).or_insert_with(|| AlbumCache {
            files: BTreeMap::new(),
            last_update: Instant::now(),
        });

        entry.files.insert(file.message_id, file);
        entry.last_update = Instant::now();

        if entry.files.len() >= self.max_items {
            let files = entry.files.values().cloned().collect();
            cache.remove(&key);
            debug!("相册 {:?} 达到上限, 立即提交", key);
            AlbumAction::Flush(files)
        } else {
            AlbumAction::Cached
        }
    }

    pub async fn expired_keys(&self, delay: Duration) -> Vec<AlbumKey> {
        let cache = self.cache.read().await;
        cache
            .iter()
            .filter(|(_, entry)| entry.last_update.elapsed() >= delay)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub async fn flush(&self, key: &AlbumKey) -> Option<Vec<TGFile>> {
        let mut cache = self.cache.write().await;
        cache
            .remove(key)
            .map(|entry| entry.files.values().cloned().collect())
    }

    pub async fn drain_all(&self) -> Vec<(AlbumKey, Vec<TGFile>)> {
        let mut cache = self.cache.write().await;
        cache
            .drain()
            .map(|(key, entry)| (key, entry.files.values().cloned().collect()))
            .collect()
    }
}
