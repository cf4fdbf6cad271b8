//! Sources of precipitation fields.

use crate::ascii_grid::read_ascii_grid;
use async_trait::async_trait;
use pipecast_common::{CrsCode, Field, ForecastKey, MemberId, PipecastError, PipecastResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Supplies the field for a (date, hour, member).
///
/// A missing field is reported as [`PipecastError::DataUnavailable`], which
/// the pipeline treats as a per-tuple skip.
#[async_trait]
pub trait GridSource: Send + Sync {
    async fn fetch(&self, key: &ForecastKey) -> PipecastResult<Field>;

    /// Short description for logs and the manifest.
    fn describe(&self) -> String;
}

/// ESRI ASCII grids on local disk, laid out as
/// `<root>/<date>/F<hh>_<member>.asc`.
///
/// The `default_member`, if set, may also be stored without the member
/// suffix as `<root>/<date>/F<hh>.asc`.
#[derive(Debug, Clone)]
pub struct LocalGridSource {
    root: PathBuf,
    crs: CrsCode,
    default_member: Option<MemberId>,
}

impl LocalGridSource {
    pub fn new(root: impl Into<PathBuf>, crs: CrsCode) -> Self {
        Self {
            root: root.into(),
            crs,
            default_member: None,
        }
    }

    pub fn with_default_member(mut self, member: MemberId) -> Self {
        self.default_member = Some(member);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate file paths for `key`, most specific first.
    pub fn candidate_paths(&self, key: &ForecastKey) -> Vec<PathBuf> {
        let dir = self.root.join(key.date_label());
        let mut paths = vec![dir.join(format!("{}_{}.asc", key.hour_label(), key.member))];
        if self.default_member.as_ref() == Some(&key.member) {
            paths.push(dir.join(format!("{}.asc", key.hour_label())));
        }
        paths
    }
}

#[async_trait]
impl GridSource for LocalGridSource {
    #[instrument(skip(self), fields(key = %key))]
    async fn fetch(&self, key: &ForecastKey) -> PipecastResult<Field> {
        for path in self.candidate_paths(key) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                let field = read_ascii_grid(&path, self.crs).await?;
                debug!(
                    path = %path.display(),
                    width = field.width(),
                    height = field.height(),
                    "Grid loaded"
                );
                return Ok(field);
            }
        }
        Err(PipecastError::data_unavailable(
            key.to_string(),
            format!("no grid file under {}", self.root.display()),
        ))
    }

    fn describe(&self) -> String {
        format!("ascii grids in {} ({})", self.root.display(), self.crs)
    }
}

/// Fields held in memory, keyed by (date, hour, member).
#[derive(Debug, Clone, Default)]
pub struct InMemoryGridSource {
    fields: HashMap<ForecastKey, Field>,
}

impl InMemoryGridSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ForecastKey, field: Field) {
        self.fields.insert(key, field);
    }

    pub fn with(mut self, key: ForecastKey, field: Field) -> Self {
        self.insert(key, field);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[async_trait]
impl GridSource for InMemoryGridSource {
    async fn fetch(&self, key: &ForecastKey) -> PipecastResult<Field> {
        self.fields
            .get(key)
            .cloned()
            .ok_or_else(|| PipecastError::data_unavailable(key.to_string(), "not in memory"))
    }

    fn describe(&self) -> String {
        format!("{} in-memory fields", self.fields.len())
    }
}
