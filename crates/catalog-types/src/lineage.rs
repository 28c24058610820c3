//! Dataset lineage.

use serde::{Deserialize, Serialize};

use crate::entity::{CatalogRef, RefDatasetType};
use crate::path::CatalogPath;

/// Response of the lineage (graph) query for one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    #[serde(default)]
    pub parents: Vec<CatalogRef>,
    #[serde(default)]
    pub children: Vec<CatalogRef>,
}

impl Lineage {
    pub fn parent_paths(&self) -> Vec<CatalogPath> {
        self.parents.iter().map(|p| p.path.clone()).collect()
    }

    pub fn virtual_parents(&self) -> impl Iterator<Item = &CatalogRef> {
        self.parents
            .iter()
            .filter(|p| p.dataset_type == Some(RefDatasetType::Virtual))
    }
}

/// Dependency record of one VDS as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdsDependency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: CatalogPath,
    #[serde(default)]
    pub parents: Vec<CatalogPath>,
}

impl VdsDependency {
    pub fn new(id: Option<String>, path: CatalogPath, parents: Vec<CatalogPath>) -> Self {
        Self { id, path, parents }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_graph_response() {
        let lineage: Lineage = serde_json::from_str(
            r#"{"parents":[
                {"id":"a","path":["Src","t1"],"type":"DATASET","datasetType":"PROMOTED"},
                {"id":"b","path":["Sp","v1"],"type":"DATASET","datasetType":"VIRTUAL"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(lineage.parent_paths().len(), 2);
        let virtual_ids: Vec<_> = lineage
            .virtual_parents()
            .filter_map(|p| p.id.as_deref())
            .collect();
        assert_eq!(virtual_ids, vec!["b"]);
    }
}
