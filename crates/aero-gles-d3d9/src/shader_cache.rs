use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::error::{BackendError, ResourceKind};
use crate::native::NativeError;
use crate::stats::BackendStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderCacheLookupSource {
    Memory,
    Created,
}

/// Native shader objects keyed by a BLAKE3 hash of their compiled bytecode.
///
/// Entries live until [`Self::clear`]; the number of distinct shaders is bounded by the number of
/// linked programs, so there is no eviction. One instance per shader stage.
#[derive(Debug)]
pub struct ShaderObjectCache<H> {
    kind: ResourceKind,
    by_hash: HashMap<blake3::Hash, H>,
    stats: Arc<BackendStats>,
}

impl<H: Copy> ShaderObjectCache<H> {
    pub fn new(kind: ResourceKind, stats: Arc<BackendStats>) -> Self {
        Self {
            kind,
            by_hash: HashMap::new(),
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Return the cached object for `bytecode`, creating it with `create` on a miss.
    ///
    /// A failed creation inserts nothing and leaves every other entry intact.
    pub fn get_or_create<F>(
        &mut self,
        bytecode: &[u8],
        create: F,
    ) -> Result<(H, ShaderCacheLookupSource), BackendError>
    where
        F: FnOnce(&[u8]) -> Result<H, NativeError>,
    {
        let hash = blake3::hash(bytecode);
        if let Some(&handle) = self.by_hash.get(&hash) {
            self.stats.inc_shader_hits();
            return Ok((handle, ShaderCacheLookupSource::Memory));
        }

        self.stats.inc_shader_misses();
        let handle = create(bytecode).map_err(|err| {
            warn!(kind = ?self.kind, shader_hash = %hash.to_hex(), %err, "shader creation failed");
            BackendError::creation(self.kind, err)
        })?;
        debug!(
            kind = ?self.kind,
            shader_hash = %hash.to_hex(),
            bytes = bytecode.len(),
            "created native shader"
        );
        self.by_hash.insert(hash, handle);
        Ok((handle, ShaderCacheLookupSource::Created))
    }

    /// Drop every entry, handing each native object to `release`.
    pub fn clear(&mut self, mut release: impl FnMut(H)) {
        for (_, handle) in self.by_hash.drain() {
            release(handle);
        }
    }
}
