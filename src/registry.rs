//! Ordered registry of processor instances, built once at initialization
//! and passed by reference; there is no process-global list.

use heapless::Vec;

use crate::config::MAX_PROCESSORS;
use crate::error::Error;
use crate::keymap::KeymapHost;
use crate::processor::Processor;
use crate::settings::SettingsStore;

pub struct ProcessorRegistry {
    processors: Vec<Processor, MAX_PROCESSORS>,
}

impl ProcessorRegistry {
    pub const fn new() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// Adds an instance; registration order defines the numeric ids.
    pub fn register(&mut self, processor: Processor) -> Result<(), Error> {
        self.processors
            .push(processor)
            .map_err(|_| Error::InvalidArgument)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn find_by_name(&mut self, name: &str) -> Option<&mut Processor> {
        self.processors.iter_mut().find(|p| p.name() == name)
    }

    pub fn find_by_id(&mut self, id: usize) -> Option<&mut Processor> {
        self.processors.get_mut(id)
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.processors.iter().position(|p| p.name() == name)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Processor> {
        self.processors.iter_mut()
    }

    /// Visits every instance in order, stopping at the first non-zero
    /// callback return and handing it back; returns 0 otherwise.
    pub fn for_each_until<F>(&mut self, mut callback: F) -> i32
    where
        F: FnMut(&mut Processor) -> i32,
    {
        for processor in self.processors.iter_mut() {
            let ret = callback(processor);
            if ret != 0 {
                return ret;
            }
        }
        0
    }

    /// Dispatch target for the settings backend's load callback.
    pub fn apply_persisted(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        match self.find_by_name(name) {
            Some(processor) => processor.apply_persisted(bytes),
            None => Err(Error::NotFound),
        }
    }

    /// Runs due deferred work on every instance.
    pub fn service_all(
        &mut self,
        now_ms: u64,
        keymap: &mut dyn KeymapHost,
        store: &mut dyn SettingsStore,
    ) {
        for processor in self.processors.iter_mut() {
            processor.service(now_ms, keymap, store);
        }
    }

    /// Earliest pending deadline across all instances.
    pub fn next_wake_ms(&self) -> Option<u64> {
        self.processors
            .iter()
            .filter_map(|p| p.next_wake_ms())
            .min()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
