//! Persistence and storage interfaces.
//!
//! The pipeline writes imported cards through [`CardRepository`] and asset
//! bytes through [`AssetStorage`], and reads both back on export. Storage
//! layout is up to the implementation. [`MemoryRepository`] and
//! [`MemoryStorage`] back the CLI and the tests.

use std::collections::BTreeMap;

use cardsmith_card::{AssetDescriptor, CardRecord};
use cardsmith_common::hash;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{Error, Result};

/// A persisted card.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCard {
    pub id: String,
    pub record: CardRecord,
    pub main_asset_id: Option<String>,
}

/// A persisted asset blob's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub id: String,
    pub storage_url: String,
    pub mimetype: String,
    pub size: u64,
    pub content_hash: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Input to [`CardRepository::create_asset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub storage_url: String,
    pub mimetype: String,
    pub size: u64,
    pub content_hash: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Link between a card and one of its asset descriptors.
///
/// `asset_id` is `None` for descriptors that were kept without bytes
/// (remote or unresolved references).
#[derive(Debug, Clone, PartialEq)]
pub struct CardAssetLink {
    pub card_id: String,
    pub asset_id: Option<String>,
    pub descriptor: AssetDescriptor,
}

/// A link joined with its asset metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CardAssetWithDetails {
    pub descriptor: AssetDescriptor,
    pub asset: Option<StoredAsset>,
}

/// Card and asset persistence.
pub trait CardRepository: Send + Sync {
    /// Store a new card and return its id.
    fn create_card(&self, record: &CardRecord) -> Result<String>;
    fn get_card(&self, id: &str) -> Result<Option<StoredCard>>;
    fn update_card(&self, id: &str, record: &CardRecord) -> Result<()>;
    fn create_asset(&self, asset: NewAsset) -> Result<StoredAsset>;
    fn create_card_asset_link(&self, link: CardAssetLink) -> Result<()>;
    fn set_main_asset(&self, card_id: &str, asset_id: &str) -> Result<()>;
    /// Links for a card in creation order.
    fn list_assets_for_card(&self, card_id: &str) -> Result<Vec<CardAssetWithDetails>>;
}

/// Blob storage addressed by URL.
pub trait AssetStorage: Send + Sync {
    /// Store bytes and return their URL.
    fn put(&self, data: &[u8], ext: &str) -> Result<String>;
    fn get(&self, url: &str) -> Result<Vec<u8>>;
    fn exists(&self, url: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
struct MemoryState {
    cards: BTreeMap<String, StoredCard>,
    assets: BTreeMap<String, StoredAsset>,
    links: Vec<CardAssetLink>,
}

/// In-memory repository. Writes are serialized by an internal lock.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every stored card, sorted.
    pub fn card_ids(&self) -> Vec<String> {
        self.state.lock().cards.keys().cloned().collect()
    }
}

impl CardRepository for MemoryRepository {
    fn create_card(&self, record: &CardRecord) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.state.lock().cards.insert(
            id.clone(),
            StoredCard {
                id: id.clone(),
                record: record.clone(),
                main_asset_id: None,
            },
        );
        Ok(id)
    }

    fn get_card(&self, id: &str) -> Result<Option<StoredCard>> {
        Ok(self.state.lock().cards.get(id).cloned())
    }

    fn update_card(&self, id: &str, record: &CardRecord) -> Result<()> {
        let mut state = self.state.lock();
        let card = state
            .cards
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("card {id}")))?;
        card.record = record.clone();
        Ok(())
    }

    fn create_asset(&self, asset: NewAsset) -> Result<StoredAsset> {
        let stored = StoredAsset {
            id: Uuid::new_v4().to_string(),
            storage_url: asset.storage_url,
            mimetype: asset.mimetype,
            size: asset.size,
            content_hash: asset.content_hash,
            width: asset.width,
            height: asset.height,
        };
        self.state
            .lock()
            .assets
            .insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn create_card_asset_link(&self, link: CardAssetLink) -> Result<()> {
        let mut state = self.state.lock();
        if !state.cards.contains_key(&link.card_id) {
            return Err(Error::NotFound(format!("card {}", link.card_id)));
        }
        if let Some(asset_id) = &link.asset_id {
            if !state.assets.contains_key(asset_id) {
                return Err(Error::NotFound(format!("asset {asset_id}")));
            }
        }
        state.links.push(link);
        Ok(())
    }

    fn set_main_asset(&self, card_id: &str, asset_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let card = state
            .cards
            .get_mut(card_id)
            .ok_or_else(|| Error::NotFound(format!("card {card_id}")))?;
        card.main_asset_id = Some(asset_id.to_owned());
        Ok(())
    }

    fn list_assets_for_card(&self, card_id: &str) -> Result<Vec<CardAssetWithDetails>> {
        let state = self.state.lock();
        Ok(state
            .links
            .iter()
            .filter(|link| link.card_id == card_id)
            .map(|link| CardAssetWithDetails {
                descriptor: link.descriptor.clone(),
                asset: link
                    .asset_id
                    .as_ref()
                    .and_then(|id| state.assets.get(id))
                    .cloned(),
            })
            .collect())
    }
}

const MEMORY_SCHEME: &str = "mem://";

/// Content-addressed in-memory blob store (`mem://<sha256>.<ext>`).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a blob, returning whether it existed.
    pub fn remove(&self, url: &str) -> bool {
        self.blobs.lock().remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetStorage for MemoryStorage {
    fn put(&self, data: &[u8], ext: &str) -> Result<String> {
        let ext = ext.trim_start_matches('.');
        let url = if ext.is_empty() {
            format!("{MEMORY_SCHEME}{}", hash::sha256_hex(data))
        } else {
            format!("{MEMORY_SCHEME}{}.{ext}", hash::sha256_hex(data))
        };
        self.blobs
            .lock()
            .entry(url.clone())
            .or_insert_with(|| data.to_vec());
        Ok(url)
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(url.to_owned()))
    }

    fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.blobs.lock().contains_key(url))
    }
}

#[cfg(test)]
mod tests {
    use cardsmith_card::CardData;

    use super::*;

    #[test]
    fn test_repository_roundtrip() {
        let repo = MemoryRepository::new();
        let id = repo
            .create_card(&CardRecord::V3(CardData::named("Ava")))
            .unwrap();

        let asset = repo
            .create_asset(NewAsset {
                storage_url: "mem://x.png".into(),
                mimetype: "image/png".into(),
                size: 3,
                content_hash: "abc".into(),
                width: None,
                height: None,
            })
            .unwrap();
        repo.create_card_asset_link(CardAssetLink {
            card_id: id.clone(),
            asset_id: Some(asset.id.clone()),
            descriptor: AssetDescriptor::new("icon", "main", "png", "embeded://icon/main.png"),
        })
        .unwrap();
        repo.create_card_asset_link(CardAssetLink {
            card_id: id.clone(),
            asset_id: None,
            descriptor: AssetDescriptor::new("icon", "far", "png", "https://x"),
        })
        .unwrap();
        repo.set_main_asset(&id, &asset.id).unwrap();

        let card = repo.get_card(&id).unwrap().unwrap();
        assert_eq!(card.main_asset_id.as_deref(), Some(asset.id.as_str()));

        let links = repo.list_assets_for_card(&id).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links[0].asset.is_some());
        assert!(links[1].asset.is_none());
    }

    #[test]
    fn test_update_card_keeps_main_asset() {
        let repo = MemoryRepository::new();
        let id = repo
            .create_card(&CardRecord::V2(CardData::named("Ava")))
            .unwrap();
        repo.set_main_asset(&id, "asset-1").unwrap();

        let mut data = CardData::named("Ava");
        data.personality = "calm".into();
        repo.update_card(&id, &CardRecord::V3(data)).unwrap();

        let card = repo.get_card(&id).unwrap().unwrap();
        assert_eq!(card.record.data().personality, "calm");
        assert!(matches!(card.record, CardRecord::V3(_)));
        assert_eq!(card.main_asset_id.as_deref(), Some("asset-1"));

        let missing = repo.update_card("nope", &card.record);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_link_to_missing_card_fails() {
        let repo = MemoryRepository::new();
        let result = repo.create_card_asset_link(CardAssetLink {
            card_id: "nope".into(),
            asset_id: None,
            descriptor: AssetDescriptor::new("icon", "a", "png", ""),
        });
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_storage_is_content_addressed() {
        let storage = MemoryStorage::new();
        let a = storage.put(b"same", "png").unwrap();
        let b = storage.put(b"same", ".png").unwrap();
        assert_eq!(a, b);
        assert_eq!(storage.len(), 1);
        assert!(storage.exists(&a).unwrap());
        assert_eq!(storage.get(&a).unwrap(), b"same");

        assert!(storage.remove(&a));
        assert!(!storage.exists(&a).unwrap());
        assert!(matches!(storage.get(&a), Err(Error::NotFound(_))));
    }
}
