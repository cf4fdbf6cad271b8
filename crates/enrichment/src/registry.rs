//! Named auxiliary layers.

use crate::layer::LayerKind;
use crate::source::LayerSource;
use pipecast_common::{PipecastError, PipecastResult};
use std::sync::Arc;

/// A registered layer: its name, what it represents, and where it loads from.
#[derive(Clone)]
pub struct LayerEntry {
    pub name: String,
    pub kind: LayerKind,
    pub source: Arc<dyn LayerSource>,
}

impl std::fmt::Debug for LayerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("location", &self.source.location())
            .finish()
    }
}

/// Layers in registration order. Names are unique and make up the
/// `<layer>.` prefix of AOI statistics.
#[derive(Debug, Clone, Default)]
pub struct LayerRegistry {
    entries: Vec<LayerEntry>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: LayerKind,
        source: Arc<dyn LayerSource>,
    ) -> PipecastResult<()> {
        let name = name.into();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PipecastError::Config(format!(
                "invalid layer name '{}': use letters, digits, '_' or '-'",
                name
            )));
        }
        if self.get(&name).is_some() {
            return Err(PipecastError::Config(format!(
                "layer '{}' registered twice",
                name
            )));
        }
        self.entries.push(LayerEntry { name, kind, source });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&LayerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[LayerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
