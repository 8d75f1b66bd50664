use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Audio bytes plus the media type the player should use.
#[derive(Clone, Debug)]
pub struct Blob {
    pub bytes: Arc<[u8]>,
    pub media_type: String,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, Blob>,
    next_id: u64,
    created: u64,
    released: u64,
    peak_live: usize,
}

/// Hands out locators for in-memory audio, like object URLs.
///
/// A locator stays resolvable exactly as long as its [`AudioResource`] is alive.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, bytes: Vec<u8>, media_type: &str) -> AudioResource {
        let blob = Blob {
            bytes: Arc::from(bytes),
            media_type: media_type.to_string(),
        };

        let mut inner = self.lock();
        inner.next_id += 1;
        let locator = format!(
            "blob:voiceover/{}-{:08x}",
            inner.next_id,
            rand::random::<u32>()
        );
        inner.entries.insert(locator.clone(), blob.clone());
        inner.created += 1;
        inner.peak_live = inner.peak_live.max(inner.entries.len());
        debug!(
            "Registered audio resource {} ({} bytes, {})",
            locator,
            blob.bytes.len(),
            blob.media_type
        );
        drop(inner);

        AudioResource {
            locator,
            blob,
            registry: self.clone(),
        }
    }

    /// `None` once the owning handle has been dropped.
    pub fn resolve(&self, locator: &str) -> Option<Blob> {
        self.lock().entries.get(locator).cloned()
    }

    fn revoke(&self, locator: &str) {
        let mut inner = self.lock();
        if inner.entries.remove(locator).is_some() {
            inner.released += 1;
            debug!("Released audio resource {}", locator);
        }
    }

    pub fn created(&self) -> u64 {
        self.lock().created
    }

    pub fn released(&self) -> u64 {
        self.lock().released
    }

    pub fn live(&self) -> usize {
        self.lock().entries.len()
    }

    /// Highest number of simultaneously live resources ever observed.
    pub fn peak_live(&self) -> usize {
        self.lock().peak_live
    }
}

/// Exclusive owner of one registered clip. Dropping it revokes the locator.
pub struct AudioResource {
    locator: String,
    blob: Blob,
    registry: ResourceRegistry,
}

impl AudioResource {
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn media_type(&self) -> &str {
        &self.blob.media_type
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        self.blob.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.blob.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.bytes.is_empty()
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("locator", &self.locator)
            .field("media_type", &self.blob.media_type)
            .field("len", &self.blob.bytes.len())
            .finish()
    }
}

impl Drop for AudioResource {
    fn drop(&mut self) {
        self.registry.revoke(&self.locator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_revokes() {
        let registry = ResourceRegistry::new();
        let resource = registry.register(vec![1, 2, 3], "audio/mpeg");
        let locator = resource.locator().to_string();

        assert!(locator.starts_with("blob:voiceover/"));
        assert_eq!(registry.resolve(&locator).map(|b| b.bytes.len()), Some(3));
        assert_eq!(registry.live(), 1);

        drop(resource);
        assert!(registry.resolve(&locator).is_none());
        assert_eq!(registry.live(), 0);
        assert_eq!(registry.created(), 1);
        assert_eq!(registry.released(), 1);
    }

    #[test]
    fn test_locators_are_unique() {
        let registry = ResourceRegistry::new();
        let a = registry.register(vec![0], "audio/mpeg");
        let b = registry.register(vec![0], "audio/mpeg");
        assert_ne!(a.locator(), b.locator());
        assert_eq!(registry.peak_live(), 2);
    }

    #[test]
    fn test_replace_in_slot_keeps_one_alive() {
        let registry = ResourceRegistry::new();
        let mut slot: Option<AudioResource> = None;
        for i in 0..5u8 {
            drop(slot.take());
            slot = Some(registry.register(vec![i; 4], "audio/wav"));
        }
        assert!(slot.is_some());
        assert_eq!(registry.live(), 1);
        assert_eq!(registry.peak_live(), 1);
        assert_eq!(registry.created(), 5);
        assert_eq!(registry.released(), 4);
    }
}
