//! Structural comparison of two snapshots.
//!
//! Each list is matched by its identity (path or name) and compared on a
//! fixed set of attributes. ACLs and owners are compared by principal name,
//! resolved through each snapshot's own referenced principals, so the same
//! grants captured from two environments compare equal.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use catalog_types::{
    AccessControlList, CatalogRef, Entity, EnvironmentSnapshot, Owner, PrincipalKind, Reflection,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, ToolkitError};

pub const DIFFERENT_ATTRIBUTES: &str = "Different attributes.";
pub const MISSING_ATTRIBUTE: &str = "Missing attribute.";
pub const DIFFERENT_PERMISSIONS: &str = "Different permissions.";
pub const DIFFERENT_OWNER: &str = "Different owner.";
pub const MISSING_IN_COMP: &str = "Item is missing in Comp Environment";
pub const EXTRA_IN_COMP: &str = "Extra item in Comp Environment";

const TABLE_HEADER: &str = "| object_type | object_id | message | base | comp |";

enum Field {
    Plain(&'static str),
    /// Sub-attributes of an object-valued attribute.
    Nested(&'static str, &'static [&'static str]),
}

use Field::{Nested, Plain};

const CONTAINER_FIELDS: &[Field] = &[Plain("containerType")];
const SOURCE_FIELDS: &[Field] = &[
    Plain("accelerationGracePeriodMs"),
    Plain("accelerationNeverExpire"),
    Plain("accelerationNeverRefresh"),
    Plain("accelerationRefreshPeriodMs"),
    Plain("accessControlList"),
    Plain("allowCrossSourceSelection"),
    Plain("checkTableAuthorizer"),
    Plain("config"),
    Plain("disableMetadataValidityCheck"),
    Plain("entityType"),
    Plain("metadataPolicy"),
    Plain("owner"),
    Plain("permissions"),
    Plain("type"),
];
const SPACE_FIELDS: &[Field] = &[Plain("entityType"), Plain("accessControlList"), Plain("owner")];
const VDS_FIELDS: &[Field] = &[
    Plain("entityType"),
    Plain("accessControlList"),
    Plain("owner"),
    Plain("fields"),
    Plain("sql"),
    Plain("sqlContext"),
    Plain("type"),
];
const REFLECTION_FIELDS: &[Field] = &[
    Plain("arrowCachingEnabled"),
    Plain("canAlter"),
    Plain("canView"),
    Plain("enabled"),
    Plain("entityType"),
    Plain("name"),
    Plain("partitionDistributionStrategy"),
    Plain("type"),
    Nested("status", &["availability", "combinedStatus", "config", "refresh"]),
];
const RULE_FIELDS: &[Field] = &[Plain("acceptName"), Plain("action"), Plain("conditions")];
const QUEUE_FIELDS: &[Field] = &[
    Plain("cpuTier"),
    Plain("maxAllowedRunningJobs"),
    Plain("maxStartTimeoutMs"),
];
const TAG_FIELDS: &[Field] = &[Plain("tags")];
const WIKI_FIELDS: &[Field] = &[Plain("text")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRow {
    pub object_type: &'static str,
    pub object_id: String,
    pub message: &'static str,
    /// Differing attribute as `name=value` on the base side, or empty.
    pub base: String,
    pub comp: String,
}

#[derive(Debug, Default)]
pub struct SnapshotDiff {
    rows: Vec<DiffRow>,
}

impl SnapshotDiff {
    pub fn rows(&self) -> &[DiffRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pipe-delimited table, one row per difference.
    pub fn to_table(&self) -> String {
        let cell = |s: &str| s.replace('|', "\\|").replace('\n', " ");
        let mut out = format!("{TABLE_HEADER}\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.object_type,
                cell(&row.object_id),
                row.message,
                cell(&row.base),
                cell(&row.comp)
            ));
        }
        out
    }

    pub fn write_table(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_table()).map_err(|e| ToolkitError::io(path, e))
    }
}

pub fn diff_snapshots(base: &EnvironmentSnapshot, comp: &EnvironmentSnapshot) -> SnapshotDiff {
    let differ = Differ {
        base,
        comp,
        rows: Vec::new(),
    };
    differ.run()
}

type Keyed = Vec<(String, Value)>;

fn keyed<T: Serialize>(items: &[T], identity: impl Fn(&T) -> String) -> Keyed {
    items
        .iter()
        .map(|item| (identity(item), serde_json::to_value(item).unwrap_or_default()))
        .collect()
}

struct Differ<'a> {
    base: &'a EnvironmentSnapshot,
    comp: &'a EnvironmentSnapshot,
    rows: Vec<DiffRow>,
}

struct Finding {
    message: &'static str,
    field: String,
    base: Option<Value>,
    comp: Option<Value>,
}

impl Differ<'_> {
    fn run(mut self) -> SnapshotDiff {
        let (b, c) = (self.base, self.comp);
        let entity_id = |e: &Entity| e.path().to_string();
        let ref_id = |r: &CatalogRef| r.path.to_string();
        let reflection_id =
            |r: &Reflection| format!("{}:{}", r.path.clone().unwrap_or_default(), r.name);

        self.compare(
            "container",
            keyed(&b.containers, ref_id),
            keyed(&c.containers, ref_id),
            CONTAINER_FIELDS,
        );
        self.compare(
            "source",
            keyed(&b.sources, entity_id),
            keyed(&c.sources, entity_id),
            SOURCE_FIELDS,
        );
        self.compare(
            "space",
            keyed(&b.spaces, entity_id),
            keyed(&c.spaces, entity_id),
            SPACE_FIELDS,
        );
        self.compare(
            "folder",
            keyed(&b.folders, entity_id),
            keyed(&c.folders, entity_id),
            SPACE_FIELDS,
        );
        self.compare("vds", keyed(&b.vds, entity_id), keyed(&c.vds, entity_id), VDS_FIELDS);
        self.compare(
            "reflection",
            keyed(&b.reflections, reflection_id),
            keyed(&c.reflections, reflection_id),
            REFLECTION_FIELDS,
        );
        self.compare(
            "rule",
            keyed(&b.rules, |r| r.name.clone()),
            keyed(&c.rules, |r| r.name.clone()),
            RULE_FIELDS,
        );
        self.compare(
            "queue",
            keyed(&b.queues, |q| q.name.clone()),
            keyed(&c.queues, |q| q.name.clone()),
            QUEUE_FIELDS,
        );
        self.compare(
            "tag",
            keyed(&b.tags, |t| t.path.to_string()),
            keyed(&c.tags, |t| t.path.to_string()),
            TAG_FIELDS,
        );
        self.compare(
            "wiki",
            keyed(&b.wikis, |w| w.path.to_string()),
            keyed(&c.wikis, |w| w.path.to_string()),
            WIKI_FIELDS,
        );

        SnapshotDiff { rows: self.rows }
    }

    fn compare(&mut self, object_type: &'static str, base: Keyed, comp: Keyed, fields: &[Field]) {
        let mut comp_index: HashMap<&str, &Value> = HashMap::new();
        for (id, value) in &comp {
            comp_index.entry(id.as_str()).or_insert(value);
        }
        let base_ids: HashSet<&str> = base.iter().map(|(id, _)| id.as_str()).collect();

        for (id, base_item) in &base {
            let row = match comp_index.get(id.as_str()) {
                None => DiffRow {
                    object_type,
                    object_id: id.clone(),
                    message: MISSING_IN_COMP,
                    base: id.clone(),
                    comp: String::new(),
                },
                Some(comp_item) => match self.compare_fields(base_item, comp_item, fields) {
                    None => continue,
                    Some(finding) => DiffRow {
                        object_type,
                        object_id: id.clone(),
                        message: finding.message,
                        base: render(&finding.field, finding.base.as_ref()),
                        comp: render(&finding.field, finding.comp.as_ref()),
                    },
                },
            };
            self.rows.push(row);
        }

        for (id, _) in &comp {
            if !base_ids.contains(id.as_str()) {
                self.rows.push(DiffRow {
                    object_type,
                    object_id: id.clone(),
                    message: EXTRA_IN_COMP,
                    base: String::new(),
                    comp: id.clone(),
                });
            }
        }
    }

    /// First difference on `fields`, in field order.
    fn compare_fields(&self, base: &Value, comp: &Value, fields: &[Field]) -> Option<Finding> {
        for field in fields {
            match field {
                Plain(name) => {
                    if let Some(finding) = self.compare_field(name, base.get(*name), comp.get(*name)) {
                        return Some(finding);
                    }
                }
                Nested(name, children) => match (base.get(*name), comp.get(*name)) {
                    (None, None) => {}
                    (Some(b), Some(c)) => {
                        for child in children.iter() {
                            if let Some(mut finding) = self.compare_field(child, b.get(*child), c.get(*child)) {
                                finding.field = format!("{name}.{child}");
                                return Some(finding);
                            }
                        }
                    }
                    (b, c) => return Some(finding(MISSING_ATTRIBUTE, name, b, c)),
                },
            }
        }
        None
    }

    fn compare_field(&self, name: &str, base: Option<&Value>, comp: Option<&Value>) -> Option<Finding> {
        let (b, c) = match (base, comp) {
            (None, None) => return None,
            (Some(b), Some(c)) => (b, c),
            (b, c) => return Some(finding(MISSING_ATTRIBUTE, name, b, c)),
        };
        let same = match name {
            "accessControlList" => self.same_acl(b, c),
            "owner" => self.same_owner(b, c),
            _ => b == c,
        };
        if same {
            return None;
        }
        let message = match name {
            "accessControlList" => DIFFERENT_PERMISSIONS,
            "owner" => DIFFERENT_OWNER,
            _ => DIFFERENT_ATTRIBUTES,
        };
        Some(finding(message, name, Some(b), Some(c)))
    }

    fn same_acl(&self, base: &Value, comp: &Value) -> bool {
        let (Ok(b), Ok(c)) = (
            serde_json::from_value::<AccessControlList>(base.clone()),
            serde_json::from_value::<AccessControlList>(comp.clone()),
        ) else {
            return base == comp;
        };
        PrincipalKind::ALL.iter().all(|kind| {
            named_grants(self.base, &b, *kind) == named_grants(self.comp, &c, *kind)
        })
    }

    fn same_owner(&self, base: &Value, comp: &Value) -> bool {
        let (Ok(b), Ok(c)) = (
            serde_json::from_value::<Owner>(base.clone()),
            serde_json::from_value::<Owner>(comp.clone()),
        ) else {
            return base == comp;
        };
        b.owner_type == c.owner_type
            && principal_label(self.base, b.owner_type, &b.owner_id)
                == principal_label(self.comp, c.owner_type, &c.owner_id)
    }
}

/// Grants of one kind as sorted `(name, sorted permissions)` pairs.
fn named_grants(
    snapshot: &EnvironmentSnapshot,
    acl: &AccessControlList,
    kind: PrincipalKind,
) -> Vec<(String, Vec<String>)> {
    let mut grants: Vec<(String, Vec<String>)> = acl
        .grants(kind)
        .iter()
        .map(|grant| {
            let mut permissions = grant.permissions.clone();
            permissions.sort();
            (principal_label(snapshot, kind, &grant.id), permissions)
        })
        .collect();
    grants.sort();
    grants
}

/// Principal name, or the raw id marked as unresolved.
fn principal_label(snapshot: &EnvironmentSnapshot, kind: PrincipalKind, id: &str) -> String {
    snapshot
        .principal_name(kind, id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("<unresolved {id}>"))
}

fn finding(message: &'static str, field: &str, base: Option<&Value>, comp: Option<&Value>) -> Finding {
    Finding {
        message,
        field: field.to_string(),
        base: base.cloned(),
        comp: comp.cloned(),
    }
}

fn render(field: &str, value: Option<&Value>) -> String {
    match value {
        Some(value) => format!("{field}={value}"),
        None => String::new(),
    }
}
