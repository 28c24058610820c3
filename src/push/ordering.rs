//! Dependency-safe write order for virtual datasets.
//!
//! Levels are computed as a bounded fixed point: each pass places every
//! pending VDS whose VDS dependencies were all placed by earlier passes.
//! Placements are committed at the end of a pass, so a pass never sees its
//! own output. The loop ends when nothing is pending, a pass places nothing,
//! or [`MAX_VDS_HIERARCHY_DEPTH`] levels exist.

use std::collections::{HashMap, HashSet};

use catalog_types::{CatalogPath, Entity, VdsDependency};
use tracing::{debug, warn};

pub const MAX_VDS_HIERARCHY_DEPTH: usize = 10;

#[derive(Debug, Default)]
pub struct VdsOrdering {
    /// `levels[n]` depends only on VDS in `levels[..n]`.
    pub levels: Vec<Vec<Entity>>,
    /// No lineage record, or blocked only by such VDS. Written best-effort.
    pub fallback: Vec<Entity>,
    /// Cycle members, VDS beyond the depth ceiling and whatever depends on them.
    pub abandoned: Vec<Entity>,
    /// Dependencies that match no VDS, in first-seen order.
    pub referenced_pds: Vec<CatalogPath>,
}

impl VdsOrdering {
    pub fn level_of(&self, path: &CatalogPath) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|vds| &vds.path() == path))
    }
}

struct Pending {
    path: CatalogPath,
    /// Dependencies on other VDS, already qualified.
    vds_deps: Vec<CatalogPath>,
}

pub fn order_vds(vds: Vec<Entity>, dependencies: &[VdsDependency]) -> VdsOrdering {
    let records: HashMap<&CatalogPath, &VdsDependency> =
        dependencies.iter().map(|d| (&d.path, d)).collect();
    let vds_paths: HashSet<CatalogPath> = vds.iter().map(Entity::path).collect();

    let mut ordering = VdsOrdering::default();
    let mut seen_pds: HashSet<CatalogPath> = HashSet::new();
    let mut slots: Vec<Option<Entity>> = Vec::with_capacity(vds.len());
    let mut pending: Vec<(usize, Pending)> = Vec::new();
    let mut unorderable: Vec<usize> = Vec::new();

    for (index, entity) in vds.into_iter().enumerate() {
        let path = entity.path();
        match records.get(&path) {
            Some(record) => {
                let mut vds_deps = Vec::new();
                for parent in &record.parents {
                    match resolve_vds_parent(parent, entity.sql_context(), &vds_paths) {
                        Some(vds_path) => vds_deps.push(vds_path),
                        None => {
                            let qualified = parent.qualified_with(entity.sql_context());
                            if seen_pds.insert(qualified.clone()) {
                                ordering.referenced_pds.push(qualified);
                            }
                        }
                    }
                }
                pending.push((index, Pending { path, vds_deps }));
            }
            None => {
                debug!(vds = %path, "No lineage record, VDS cannot be ordered");
                unorderable.push(index);
            }
        }
        slots.push(Some(entity));
    }

    let mut placed: HashSet<CatalogPath> = HashSet::new();
    while !pending.is_empty() && ordering.levels.len() < MAX_VDS_HIERARCHY_DEPTH {
        let mut this_pass = Vec::new();
        let mut still_pending = Vec::new();
        for (index, item) in pending.into_iter().rev() {
            if item.vds_deps.iter().all(|dep| placed.contains(dep)) {
                this_pass.push((index, item));
            } else {
                still_pending.push((index, item));
            }
        }
        still_pending.reverse();
        pending = still_pending;
        if this_pass.is_empty() {
            break;
        }
        let mut level = Vec::with_capacity(this_pass.len());
        for (index, item) in this_pass {
            placed.insert(item.path);
            if let Some(entity) = slots[index].take() {
                level.push(entity);
            }
        }
        debug!(level = ordering.levels.len(), count = level.len(), "VDS level placed");
        ordering.levels.push(level);
    }

    // Pending VDS blocked only by unorderable ones follow them into the
    // fallback list. Anything else left is a cycle or beyond the ceiling.
    let mut fallback_paths: HashSet<CatalogPath> = unorderable
        .iter()
        .filter_map(|i| slots[*i].as_ref().map(Entity::path))
        .collect();
    let mut fallback: Vec<usize> = unorderable;
    loop {
        let mut grew = false;
        pending.retain(|(index, item)| {
            let blocked_by_fallback = item.vds_deps.iter().any(|d| fallback_paths.contains(d));
            let otherwise_ready = item
                .vds_deps
                .iter()
                .all(|d| placed.contains(d) || fallback_paths.contains(d));
            if blocked_by_fallback && otherwise_ready {
                fallback_paths.insert(item.path.clone());
                fallback.push(*index);
                grew = true;
                false
            } else {
                true
            }
        });
        if !grew {
            break;
        }
    }

    ordering.fallback = fallback.into_iter().filter_map(|i| slots[i].take()).collect();
    ordering.abandoned = pending
        .into_iter()
        .filter_map(|(index, _)| slots[index].take())
        .collect();
    if !ordering.abandoned.is_empty() {
        warn!(
            count = ordering.abandoned.len(),
            levels = ordering.levels.len(),
            "VDS left unordered by a dependency cycle or the depth ceiling"
        );
    }
    ordering
}

/// The VDS a lineage parent names: the path as given, else the path
/// relative to the dependent's SQL context.
fn resolve_vds_parent(
    parent: &CatalogPath,
    sql_context: Option<&CatalogPath>,
    vds_paths: &HashSet<CatalogPath>,
) -> Option<CatalogPath> {
    if vds_paths.contains(parent) {
        return Some(parent.clone());
    }
    let context = sql_context.filter(|c| !c.is_empty())?;
    let mut segments = context.segments().to_vec();
    segments.extend(parent.segments().iter().cloned());
    let relative = CatalogPath::from(segments);
    vds_paths.contains(&relative).then_some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_types::{Dataset, DatasetType, EntityBase};
    use proptest::prelude::*;

    fn vds(path: &[&str], context: Option<&[&str]>) -> Entity {
        Entity::Dataset(Dataset {
            path: CatalogPath::from(path),
            dataset_type: DatasetType::VirtualDataset,
            sql: Some("SELECT 1".into()),
            sql_context: context.map(CatalogPath::from),
            base: EntityBase::default(),
        })
    }

    fn dep(path: &[&str], parents: &[&[&str]]) -> VdsDependency {
        VdsDependency::new(
            None,
            CatalogPath::from(path),
            parents.iter().map(|p| CatalogPath::from(*p)).collect(),
        )
    }

    #[test]
    fn unqualified_dependency_resolves_through_sql_context() {
        let a = vds(&["Source1", "A"], Some(&["Source1"]));
        let b = vds(&["Source1", "B"], None);
        let deps = vec![
            dep(&["Source1", "A"], &[&["B"]]),
            dep(&["Source1", "B"], &[&["Source1", "table1"]]),
        ];
        let ordering = order_vds(vec![a, b], &deps);

        assert_eq!(ordering.level_of(&CatalogPath::from(&["Source1", "B"][..])), Some(0));
        assert_eq!(ordering.level_of(&CatalogPath::from(&["Source1", "A"][..])), Some(1));
        assert_eq!(
            ordering.referenced_pds,
            vec![CatalogPath::from(&["Source1", "table1"][..])]
        );
        assert!(ordering.fallback.is_empty() && ordering.abandoned.is_empty());
    }

    #[test]
    fn multi_segment_parent_resolves_relative_to_sql_context() {
        let a = vds(&["Space", "sub", "A"], Some(&["Space"]));
        let b = vds(&["Space", "sub", "B"], None);
        let deps = vec![
            dep(&["Space", "sub", "A"], &[&["sub", "B"]]),
            dep(&["Space", "sub", "B"], &[&["lake", "orders"]]),
        ];
        let ordering = order_vds(vec![a, b], &deps);

        assert_eq!(ordering.level_of(&CatalogPath::from(&["Space", "sub", "B"][..])), Some(0));
        assert_eq!(ordering.level_of(&CatalogPath::from(&["Space", "sub", "A"][..])), Some(1));
        assert_eq!(
            ordering.referenced_pds,
            vec![CatalogPath::from(&["lake", "orders"][..])]
        );
    }

    #[test]
    fn fully_qualified_parent_wins_over_context() {
        let a = vds(&["Space", "A"], Some(&["Space"]));
        let b = vds(&["other", "B"], None);
        let deps = vec![
            dep(&["Space", "A"], &[&["other", "B"]]),
            dep(&["other", "B"], &[]),
        ];
        let ordering = order_vds(vec![a, b], &deps);

        assert_eq!(ordering.level_of(&CatalogPath::from(&["Space", "A"][..])), Some(1));
        assert!(ordering.referenced_pds.is_empty());
    }

    #[test]
    fn cycles_are_abandoned_with_their_dependents() {
        let items = vec![
            vds(&["S", "x"], None),
            vds(&["S", "y"], None),
            vds(&["S", "z"], None),
            vds(&["S", "ok"], None),
        ];
        let deps = vec![
            dep(&["S", "x"], &[&["S", "y"]]),
            dep(&["S", "y"], &[&["S", "x"]]),
            dep(&["S", "z"], &[&["S", "x"]]),
            dep(&["S", "ok"], &[]),
        ];
        let ordering = order_vds(items, &deps);
        assert_eq!(ordering.levels.len(), 1);
        assert_eq!(ordering.abandoned.len(), 3);
    }

    #[test]
    fn chains_longer_than_the_ceiling_are_cut() {
        let names: Vec<String> = (0..12).map(|i| format!("v{i}")).collect();
        let items: Vec<Entity> = names.iter().map(|n| vds(&["S", n], None)).collect();
        let deps: Vec<VdsDependency> = names
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let parents = if i == 0 {
                    vec![]
                } else {
                    vec![CatalogPath::new(["S", names[i - 1].as_str()])]
                };
                VdsDependency::new(None, CatalogPath::new(["S", n.as_str()]), parents)
            })
            .collect();
        let ordering = order_vds(items, &deps);
        assert_eq!(ordering.levels.len(), MAX_VDS_HIERARCHY_DEPTH);
        assert_eq!(ordering.abandoned.len(), 2);
    }

    #[test]
    fn missing_lineage_goes_to_fallback_with_dependents() {
        let items = vec![
            vds(&["S", "unknown"], None),
            vds(&["S", "child"], None),
            vds(&["S", "free"], None),
        ];
        let deps = vec![
            dep(&["S", "child"], &[&["S", "unknown"]]),
            dep(&["S", "free"], &[]),
        ];
        let ordering = order_vds(items, &deps);
        let fallback: Vec<String> = ordering.fallback.iter().map(|v| v.path().to_string()).collect();
        assert_eq!(fallback, vec!["S/unknown", "S/child"]);
        assert_eq!(ordering.levels.len(), 1);
        assert!(ordering.abandoned.is_empty());
    }

    proptest! {
        /// Random DAGs (edges only point to lower indices): every VDS is
        /// placed, strictly after all of its VDS dependencies.
        #[test]
        fn levels_respect_dependencies(
            edges in proptest::collection::vec((0usize..20, 0usize..20), 0..40),
            count in 1usize..20,
        ) {
            let names: Vec<CatalogPath> =
                (0..count).map(|i| CatalogPath::new(["S".to_string(), format!("v{i}")])).collect();
            let mut parents: Vec<Vec<CatalogPath>> = vec![Vec::new(); count];
            for (a, b) in edges {
                let (a, b) = (a % count, b % count);
                if b < a {
                    parents[a].push(names[b].clone());
                }
            }
            let items: Vec<Entity> = names
                .iter()
                .map(|p| {
                    let segs: Vec<&str> = p.segments().iter().map(String::as_str).collect();
                    vds(&segs, None)
                })
                .collect();
            let deps: Vec<VdsDependency> = names
                .iter()
                .zip(&parents)
                .map(|(p, ps)| VdsDependency::new(None, p.clone(), ps.clone()))
                .collect();

            let ordering = order_vds(items, &deps);
            let placed: usize = ordering.levels.iter().map(Vec::len).sum();
            prop_assert_eq!(placed + ordering.abandoned.len(), count);
            prop_assert!(ordering.levels.len() <= MAX_VDS_HIERARCHY_DEPTH);
            prop_assert!(ordering.fallback.is_empty());
            for (i, path) in names.iter().enumerate() {
                if let Some(level) = ordering.level_of(path) {
                    for parent in &parents[i] {
                        let parent_level = ordering.level_of(parent);
                        prop_assert!(parent_level.is_some());
                        prop_assert!(parent_level.unwrap_or(usize::MAX) < level);
                    }
                }
            }
        }

        /// Arbitrary graphs, cycles included, always terminate and account
        /// for every input exactly once.
        #[test]
        fn every_vds_is_accounted_for(
            edges in proptest::collection::vec((0usize..15, 0usize..15), 0..40),
            count in 1usize..15,
        ) {
            let names: Vec<CatalogPath> =
                (0..count).map(|i| CatalogPath::new(["S".to_string(), format!("v{i}")])).collect();
            let mut parents: Vec<Vec<CatalogPath>> = vec![Vec::new(); count];
            for (a, b) in edges {
                parents[a % count].push(names[b % count].clone());
            }
            let items: Vec<Entity> = names
                .iter()
                .map(|p| {
                    let segs: Vec<&str> = p.segments().iter().map(String::as_str).collect();
                    vds(&segs, None)
                })
                .collect();
            let deps: Vec<VdsDependency> = names
                .iter()
                .zip(&parents)
                .map(|(p, ps)| VdsDependency::new(None, p.clone(), ps.clone()))
                .collect();

            let ordering = order_vds(items, &deps);
            let placed: usize = ordering.levels.iter().map(Vec::len).sum();
            prop_assert_eq!(placed + ordering.abandoned.len() + ordering.fallback.len(), count);
        }
    }
}
