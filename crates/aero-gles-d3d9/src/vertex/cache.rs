use std::sync::Arc;

use tracing::debug;

use super::declaration::{
    DeclMethod, DeclUsage, ProgramInputs, TranslatedAttribute, VertexElement,
    VertexFormatDescriptor, MAX_VERTEX_ATTRIBS,
};
use crate::caps::DeviceCaps;
use crate::error::{BackendError, ResourceKind};
use crate::native::{NativeDevice, StreamFrequency, VertexBufferHandle, VertexDeclarationHandle};
use crate::stats::BackendStats;

/// Live native declarations kept by [`VertexFormatCache`].
pub const VERTEX_FORMAT_CACHE_CAPACITY: usize = 32;

#[derive(Debug)]
struct CacheEntry {
    lru_count: u64,
    descriptor: VertexFormatDescriptor,
    declaration: VertexDeclarationHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AppliedStream {
    buffer: VertexBufferHandle,
    serial: u32,
    stride: u32,
    offset: u32,
}

/// Bounded LRU cache of native vertex declarations plus the per-stream bindings last issued.
///
/// Slots are scanned in order; on overflow the entry with the smallest recency counter is
/// replaced, empty slots first and the lowest slot index on ties.
#[derive(Debug)]
pub struct VertexFormatCache {
    slots: [Option<CacheEntry>; VERTEX_FORMAT_CACHE_CAPACITY],
    max_lru: u64,
    last_set: Option<VertexDeclarationHandle>,
    streams: [Option<AppliedStream>; MAX_VERTEX_ATTRIBS],
    instancing_enabled: bool,
    stats: Arc<BackendStats>,
}

impl VertexFormatCache {
    pub fn new(stats: Arc<BackendStats>) -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            max_lru: 0,
            last_set: None,
            streams: [None; MAX_VERTEX_ATTRIBS],
            // Stream frequencies are unknown until first programmed.
            instancing_enabled: true,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cached native declaration for `descriptor`, without touching recency.
    pub fn cached_declaration(
        &self,
        descriptor: &VertexFormatDescriptor,
    ) -> Option<VertexDeclarationHandle> {
        self.slots
            .iter()
            .flatten()
            .find(|entry| entry.descriptor == *descriptor)
            .map(|entry| entry.declaration)
    }

    /// Bind streams and the declaration for the attributes `program` consumes.
    ///
    /// Returns the repeat-draw multiplier: `1` normally, or `instances` when per-instance data
    /// has to be emulated by re-issuing the draw.
    pub fn apply_declaration<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        caps: &DeviceCaps,
        attributes: &[TranslatedAttribute],
        program: &ProgramInputs,
        instances: u32,
    ) -> Result<u32, BackendError> {
        if attributes.len() > MAX_VERTEX_ATTRIBS {
            return Err(BackendError::UnsupportedConfiguration(format!(
                "{} vertex attributes exceed the {MAX_VERTEX_ATTRIBS} supported",
                attributes.len()
            )));
        }

        let consumed = move || {
            attributes
                .iter()
                .enumerate()
                .filter(move |(i, _)| program.is_consumed(*i))
        };

        let mut indexed = None;
        let mut instanced = None;
        if instances > 0 {
            for (i, attribute) in consumed() {
                if attribute.divisor == 0 {
                    indexed.get_or_insert(i);
                } else {
                    instanced.get_or_insert(i);
                }
                if indexed.is_some() && instanced.is_some() {
                    break;
                }
            }
            if indexed.is_none() {
                return Err(BackendError::UnsupportedConfiguration(
                    "instanced draw without any per-vertex attribute".to_string(),
                ));
            }
        }

        // Some drivers misbehave when instancing is on but no attribute is instanced.
        let native_instancing = instances > 0 && instanced.is_some() && caps.instancing;
        let repeat_draw = if instances > 0 && !native_instancing {
            instances
        } else {
            1
        };
        let indexed = indexed.unwrap_or(0);

        let mut descriptor = VertexFormatDescriptor::new();
        for (i, attribute) in consumed() {
            let mut stream = i;
            if native_instancing {
                // The indexed attribute must live on stream 0.
                if i == indexed {
                    stream = 0;
                } else if i == 0 {
                    stream = indexed;
                }
                let frequency = if attribute.divisor == 0 {
                    StreamFrequency::IndexedData(instances)
                } else {
                    StreamFrequency::InstanceData(attribute.divisor)
                };
                device.set_stream_source_freq(stream as u32, frequency);
                self.instancing_enabled = true;
            }

            self.bind_stream(device, stream, attribute);
            descriptor.push(VertexElement {
                stream: stream as u16,
                offset: 0,
                ty: attribute.decl_type(caps.decl_types),
                method: DeclMethod::Default,
                usage: DeclUsage::TexCoord,
                usage_index: program.semantic_index(i).unwrap_or(0),
            })?;
        }

        if !native_instancing && self.instancing_enabled {
            for stream in 0..MAX_VERTEX_ATTRIBS as u32 {
                device.set_stream_source_freq(stream, StreamFrequency::Default);
            }
            self.instancing_enabled = false;
        }

        self.bind_descriptor(device, descriptor)?;
        Ok(repeat_draw)
    }

    fn bind_stream<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        stream: usize,
        attribute: &TranslatedAttribute,
    ) {
        let applied = AppliedStream {
            buffer: attribute.buffer,
            serial: attribute.serial,
            stride: attribute.stride,
            offset: attribute.offset,
        };
        let Some(slot) = self.streams.get_mut(stream) else {
            return;
        };
        if *slot != Some(applied) {
            device.set_stream_source(stream as u32, applied.buffer, applied.offset, applied.stride);
            *slot = Some(applied);
        }
    }

    /// Resolve `descriptor` to a native declaration and make it current.
    ///
    /// A hit refreshes the entry's recency. A miss creates the declaration before evicting
    /// anything, so a failed creation leaves the cache exactly as it was.
    pub fn bind_descriptor<Dev: NativeDevice>(
        &mut self,
        device: &mut Dev,
        descriptor: VertexFormatDescriptor,
    ) -> Result<VertexDeclarationHandle, BackendError> {
        if let Some(entry) = self
            .slots
            .iter_mut()
            .flatten()
            .find(|entry| entry.descriptor == descriptor)
        {
            self.max_lru += 1;
            entry.lru_count = self.max_lru;
            self.stats.inc_vertex_format_hits();
            let declaration = entry.declaration;
            if self.last_set != Some(declaration) {
                device.set_vertex_declaration(declaration);
                self.last_set = Some(declaration);
            }
            return Ok(declaration);
        }

        self.stats.inc_vertex_format_misses();
        let declaration = device
            .create_vertex_declaration(descriptor.elements())
            .map_err(|err| BackendError::creation(ResourceKind::VertexDeclaration, err))?;
        debug!(
            declaration = declaration.raw(),
            elements = descriptor.len(),
            "created vertex declaration"
        );

        let victim = self.victim_slot();
        if let Some(evicted) = self.slots[victim].take() {
            debug!(
                slot = victim,
                lru_count = evicted.lru_count,
                declaration = evicted.declaration.raw(),
                "evicting vertex declaration"
            );
            device.release_vertex_declaration(evicted.declaration);
            self.stats.inc_vertex_format_evictions();
        }

        self.max_lru += 1;
        self.slots[victim] = Some(CacheEntry {
            lru_count: self.max_lru,
            descriptor,
            declaration,
        });
        device.set_vertex_declaration(declaration);
        self.last_set = Some(declaration);
        Ok(declaration)
    }

    fn victim_slot(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.as_ref().map_or(0, |entry| entry.lru_count))
            .map_or(0, |(i, _)| i)
    }

    /// Forget what is bound on the device. Cached declarations stay valid.
    pub fn mark_state_dirty(&mut self) {
        self.last_set = None;
        self.streams = [None; MAX_VERTEX_ATTRIBS];
        self.instancing_enabled = true;
    }

    /// Destroy every cached declaration. Required before the device is reset.
    pub fn release_all<Dev: NativeDevice>(&mut self, device: &mut Dev) {
        for entry in self.slots.iter_mut().filter_map(Option::take) {
            device.release_vertex_declaration(entry.declaration);
        }
        self.max_lru = 0;
        self.mark_state_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::recording::{NativeCall, RecordingDevice, RecordingDriver};
    use crate::native::{BehaviorFlags, NativeError};
    use crate::vertex::{ComponentType, DeclType};

    fn cache() -> VertexFormatCache {
        VertexFormatCache::new(Arc::new(BackendStats::new()))
    }

    fn device() -> RecordingDevice {
        RecordingDevice::new(false, BehaviorFlags::HARDWARE_VERTEX_PROCESSING)
    }

    fn descriptor(usage_index: u8) -> VertexFormatDescriptor {
        let mut d = VertexFormatDescriptor::new();
        d.push(VertexElement {
            stream: 0,
            offset: 0,
            ty: DeclType::Float4,
            method: DeclMethod::Default,
            usage: DeclUsage::TexCoord,
            usage_index,
        })
        .unwrap();
        d
    }

    fn attribute(buffer: u32, divisor: u32) -> TranslatedAttribute {
        TranslatedAttribute {
            array_enabled: true,
            ty: ComponentType::Float,
            normalized: false,
            components: 3,
            buffer: VertexBufferHandle(buffer),
            serial: buffer,
            stride: 12,
            offset: 0,
            divisor,
        }
    }

    fn caps(instancing: bool) -> DeviceCaps {
        let mut caps = RecordingDriver::new().probed_caps();
        caps.instancing = instancing;
        caps
    }

    #[test]
    fn hit_skips_redundant_set_declaration() {
        let mut cache = cache();
        let mut device = device();
        let a = cache.bind_descriptor(&mut device, descriptor(0)).unwrap();
        let again = cache.bind_descriptor(&mut device, descriptor(0)).unwrap();
        assert_eq!(a, again);
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::SetVertexDeclaration(_))),
            1
        );

        cache.mark_state_dirty();
        cache.bind_descriptor(&mut device, descriptor(0)).unwrap();
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::SetVertexDeclaration(_))),
            2
        );
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::CreateVertexDeclaration(..))),
            1
        );
    }

    #[test]
    fn empty_slots_fill_before_eviction() {
        let mut cache = cache();
        let mut device = device();
        for i in 0..VERTEX_FORMAT_CACHE_CAPACITY as u8 {
            cache.bind_descriptor(&mut device, descriptor(i)).unwrap();
        }
        assert_eq!(cache.len(), VERTEX_FORMAT_CACHE_CAPACITY);
        assert_eq!(cache.stats.snapshot().vertex_format_evictions, 0);
        assert_eq!(device.live_objects(), VERTEX_FORMAT_CACHE_CAPACITY);
    }

    #[test]
    fn failed_creation_leaves_cache_untouched() {
        let mut cache = cache();
        let mut device = device();
        for i in 0..VERTEX_FORMAT_CACHE_CAPACITY as u8 {
            cache.bind_descriptor(&mut device, descriptor(i)).unwrap();
        }
        device
            .creation_failures
            .push_back(NativeError::OutOfVideoMemory);
        assert!(cache.bind_descriptor(&mut device, descriptor(200)).is_err());
        assert_eq!(cache.len(), VERTEX_FORMAT_CACHE_CAPACITY);
        assert!(cache.cached_declaration(&descriptor(0)).is_some());

        // The next miss still evicts the oldest entry.
        cache.bind_descriptor(&mut device, descriptor(201)).unwrap();
        assert!(cache.cached_declaration(&descriptor(0)).is_none());
        assert!(cache.cached_declaration(&descriptor(1)).is_some());
    }

    #[test]
    fn only_consumed_attributes_are_declared() {
        let mut cache = cache();
        let mut device = device();
        let program = ProgramInputs::new().with_input(1, 4).unwrap();
        let attributes = [attribute(1, 0), attribute(2, 0), attribute(3, 0)];
        let repeat = cache
            .apply_declaration(&mut device, &caps(true), &attributes, &program, 0)
            .unwrap();
        assert_eq!(repeat, 1);

        let created = device.calls().iter().find_map(|c| match c {
            NativeCall::CreateVertexDeclaration(_, elements) => Some(elements.clone()),
            _ => None,
        });
        assert_eq!(
            created.unwrap(),
            vec![VertexElement {
                stream: 1,
                offset: 0,
                ty: DeclType::Float3,
                method: DeclMethod::Default,
                usage: DeclUsage::TexCoord,
                usage_index: 4,
            }]
        );
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::SetStreamSource { .. })),
            1
        );
    }

    #[test]
    fn native_instancing_moves_indexed_attribute_to_stream_zero() {
        let mut cache = cache();
        let mut device = device();
        let program = ProgramInputs::new()
            .with_input(0, 0)
            .unwrap()
            .with_input(1, 1)
            .unwrap();
        // Attribute 0 is per-instance, attribute 1 per-vertex.
        let attributes = [attribute(1, 1), attribute(2, 0)];
        let repeat = cache
            .apply_declaration(&mut device, &caps(true), &attributes, &program, 10)
            .unwrap();
        assert_eq!(repeat, 1);

        let calls = device.take_calls();
        assert!(calls.contains(&NativeCall::SetStreamSourceFreq(
            1,
            StreamFrequency::InstanceData(1)
        )));
        assert!(calls.contains(&NativeCall::SetStreamSourceFreq(
            0,
            StreamFrequency::IndexedData(10)
        )));
        assert!(calls.contains(&NativeCall::SetStreamSource {
            stream: 0,
            buffer: VertexBufferHandle(2),
            offset: 0,
            stride: 12,
        }));

        // Back to a plain draw: every stream frequency is reset once.
        cache
            .apply_declaration(&mut device, &caps(true), &attributes, &program, 0)
            .unwrap();
        assert_eq!(
            device.count_calls(|c| matches!(
                c,
                NativeCall::SetStreamSourceFreq(_, StreamFrequency::Default)
            )),
            MAX_VERTEX_ATTRIBS
        );
    }

    #[test]
    fn missing_instancing_repeats_the_draw() {
        let mut cache = cache();
        let mut device = device();
        let program = ProgramInputs::new()
            .with_input(0, 0)
            .unwrap()
            .with_input(1, 1)
            .unwrap();
        let attributes = [attribute(1, 0), attribute(2, 1)];
        let repeat = cache
            .apply_declaration(&mut device, &caps(false), &attributes, &program, 100)
            .unwrap();
        assert_eq!(repeat, 100);
        assert_eq!(
            device.count_calls(|c| matches!(
                c,
                NativeCall::SetStreamSourceFreq(_, StreamFrequency::IndexedData(_))
            )),
            0
        );
    }

    #[test]
    fn instanced_draw_needs_a_per_vertex_attribute() {
        let mut cache = cache();
        let mut device = device();
        let program = ProgramInputs::new().with_input(0, 0).unwrap();
        let err = cache
            .apply_declaration(&mut device, &caps(true), &[attribute(1, 1)], &program, 4)
            .unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn unchanged_streams_are_not_rebound() {
        let mut cache = cache();
        let mut device = device();
        let program = ProgramInputs::new().with_input(0, 0).unwrap();
        let attributes = [attribute(1, 0)];
        for _ in 0..3 {
            cache
                .apply_declaration(&mut device, &caps(true), &attributes, &program, 0)
                .unwrap();
        }
        assert_eq!(
            device.count_calls(|c| matches!(c, NativeCall::SetStreamSource { .. })),
            1
        );
    }

    #[test]
    fn release_all_destroys_every_declaration() {
        let mut cache = cache();
        let mut device = device();
        for i in 0..5 {
            cache.bind_descriptor(&mut device, descriptor(i)).unwrap();
        }
        cache.release_all(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_objects(), 0);
    }
}
