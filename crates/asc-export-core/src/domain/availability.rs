use std::collections::HashMap;

use asc_export_api::{
    Dimension,
    ProviderSettings,
};
use indexmap::IndexMap;

/// Measures the provider allows under each grouping.
///
/// Groupable dimensions come first in provider order, followed by
/// `NoGrouping`, which lists every measure. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityMap {
    entries: IndexMap<Dimension, Vec<String>>,
}

impl AvailabilityMap {
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let mut entries: IndexMap<Dimension, Vec<String>> = IndexMap::new();
        let mut groupable: HashMap<i64, Dimension> = HashMap::new();

        for dimension in settings.dimensions.iter().filter(|d| d.groupable) {
            let key = Dimension::key(dimension.key.clone());
            groupable.insert(dimension.id, key.clone());
            entries.entry(key).or_default();
        }

        entries.insert(Dimension::NoGrouping, Vec::new());

        for measure in &settings.measures {
            for id in &measure.dimension_ids {
                if let Some(dimension) = groupable.get(id) {
                    if let Some(measures) = entries.get_mut(dimension) {
                        measures.push(measure.key.clone());
                    }
                }
            }

            if let Some(totals) = entries.get_mut(&Dimension::NoGrouping) {
                totals.push(measure.key.clone());
            }
        }

        Self { entries }
    }

    pub fn measures(&self, dimension: &Dimension) -> Option<&[String]> {
        self.entries.get(dimension).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dimension, &[String])> {
        self.entries.iter().map(|(d, m)| (d, m.as_slice()))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
