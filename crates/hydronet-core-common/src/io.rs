//! I/O traits decoupling the pipeline from dataset formats.
//!
//! A [`VectorSource`] exposes a read-only vector dataset as a list of named
//! layers with a feature stream and a declared CRS. A [`RecordSink`] is a
//! writable normalized store with overwrite semantics. Both sides report
//! failures through `anyhow` and leave classification to the caller: the
//! pipeline decides what is layer-fatal and what is run-fatal.

use crate::types::{Feature, NormalizedRecord, TableSchema};
use anyhow::{Result, anyhow};

/// Stream of features read from one source layer.
///
/// Items are `Result` so an adapter can surface a mid-stream decode failure
/// for one record without aborting the iterator.
pub type FeatureStream<'a> = Box<dyn Iterator<Item = Result<Feature>> + 'a>;

/// Read access to a source vector dataset.
pub trait VectorSource {
    /// Names of the layers in this dataset, in dataset order.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset cannot be enumerated (unreadable
    /// file, missing directory).
    fn layer_names(&self) -> Result<Vec<String>>;

    /// Opens a feature stream over the named layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer does not exist or cannot be opened.
    fn read_layer(&self, name: &str) -> Result<FeatureStream<'_>>;

    /// EPSG code declared by the source for the named layer, if any.
    ///
    /// Formats without embedded CRS metadata (shapefiles read without a
    /// usable `.prj`, bare CSV tables) return `Ok(None)` and the pipeline
    /// falls back to the configured source CRS.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer does not exist.
    fn declared_epsg(&self, name: &str) -> Result<Option<u32>>;
}

/// Write access to the normalized target store.
///
/// Implementations must make `replace_table` + ordered `append` calls
/// idempotent: re-running a layer with identical input produces an
/// identical table.
pub trait RecordSink {
    /// Drops any existing table of this name and creates it afresh,
    /// including whatever catalog metadata the store maintains.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be (re)created; the pipeline
    /// treats this as fatal for the layer.
    fn replace_table(&mut self, schema: &TableSchema) -> Result<()>;

    /// Appends a batch of records to the table, in slice order.
    ///
    /// Batching is the caller's concern; a batch is written atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, schema: &TableSchema, records: &[NormalizedRecord]) -> Result<()>;
}

/// One named layer held by a [`MemorySource`].
#[derive(Debug, Clone, Default)]
pub struct MemoryLayer {
    /// Layer name.
    pub name: String,
    /// Declared EPSG code, if any.
    pub epsg: Option<u32>,
    /// Features in iteration order.
    pub features: Vec<Feature>,
}

/// In-memory [`VectorSource`] for tests and synthetic networks.
///
/// # Examples
///
/// ```
/// use hydronet_core_common::{Feature, MemorySource, Value, VectorSource};
/// use geo_types::{Geometry, Point};
///
/// let mut source = MemorySource::new();
/// source.push_layer("wHydrant", Some(27700), vec![Feature::new(
///     vec![("GISID".to_string(), Value::Integer(1))],
///     Some(Geometry::Point(Point::new(531000.0, 181000.0))),
/// )]);
///
/// assert_eq!(source.layer_names().unwrap(), vec!["wHydrant".to_string()]);
/// assert_eq!(source.read_layer("wHydrant").unwrap().count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    layers: Vec<MemoryLayer>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a layer; later layers with the same name shadow earlier ones
    /// for lookup but both are listed.
    pub fn push_layer(
        &mut self,
        name: impl Into<String>,
        epsg: Option<u32>,
        features: Vec<Feature>,
    ) {
        self.layers.push(MemoryLayer {
            name: name.into(),
            epsg,
            features,
        });
    }

    fn find(&self, name: &str) -> Result<&MemoryLayer> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| anyhow!("layer '{name}' not found in memory source"))
    }
}

impl VectorSource for MemorySource {
    fn layer_names(&self) -> Result<Vec<String>> {
        Ok(self.layers.iter().map(|l| l.name.clone()).collect())
    }

    fn read_layer(&self, name: &str) -> Result<FeatureStream<'_>> {
        let layer = self.find(name)?;
        Ok(Box::new(layer.features.iter().cloned().map(Ok)))
    }

    fn declared_epsg(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.find(name)?.epsg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn memory_source_lists_and_streams() {
        let mut source = MemorySource::new();
        source.push_layer("wTrunkMain", Some(27700), Vec::new());
        source.push_layer(
            "wChamber",
            None,
            vec![Feature::new(vec![("tag".to_string(), Value::from("C1"))], None)],
        );

        assert_eq!(
            source.layer_names().unwrap(),
            vec!["wTrunkMain".to_string(), "wChamber".to_string()]
        );
        assert_eq!(source.declared_epsg("wTrunkMain").unwrap(), Some(27700));
        assert_eq!(source.declared_epsg("wChamber").unwrap(), None);

        let features: Vec<_> = source
            .read_layer("wChamber")
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].get("TAG"), Some(&Value::from("C1")));
    }

    #[test]
    fn missing_layer_is_an_error() {
        let source = MemorySource::new();
        assert!(source.read_layer("wHydrant").is_err());
        assert!(source.declared_epsg("wHydrant").is_err());
    }
}
