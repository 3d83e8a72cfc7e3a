//! Namespace access model
//!
//! Turns directory group names into namespace-scoped grants. A group grants
//! access to a namespace through a trailing permission suffix:
//!
//! | suffix | pull only | delete |
//! |--------|-----------|--------|
//! | `_rwd` | no        | yes    |
//! | `_rw`  | no        | no     |
//! | `_rd`  | yes       | yes    |
//! | `_r`   | yes       | no     |
//!
//! Groups without one of these suffixes are not namespace-permission groups
//! and never produce a grant.

use serde::{Deserialize, Serialize};

/// Permission suffixes, longest first so that `_rwd` is not mistaken for `_r`.
const PERMISSION_SUFFIXES: &[(&str, bool, bool)] = &[
    ("_rwd", false, true),
    ("_rw", false, false),
    ("_rd", true, true),
    ("_r", true, false),
];

/// Permission on one namespace, derived from one directory group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub group: String,
    pub namespace: String,
    pub pull_only: bool,
    pub delete_allowed: bool,
}

/// The single most permissive grant of an actor.
///
/// Used by the raw registry protocol gate, which only ever evaluates one
/// namespace per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryPrincipal {
    pub name: String,
    pub group: String,
    pub namespace: String,
    pub pull_only: bool,
    pub delete_allowed: bool,
}

impl PrimaryPrincipal {
    fn from_grant(name: &str, grant: &Grant) -> Self {
        Self {
            name: name.to_string(),
            group: grant.group.clone(),
            namespace: grant.namespace.clone(),
            pull_only: grant.pull_only,
            delete_allowed: grant.delete_allowed,
        }
    }
}

/// Per-namespace permission summary shown to dashboard clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespacePermission {
    pub namespace: String,
    pub pull_only: bool,
    pub delete_allowed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Derive a grant from a plain group name (not a DN).
///
/// Returns `None` if the group carries no permission suffix or if nothing
/// remains of the name once the suffix is removed.
pub fn derive_grant(group_name: &str) -> Option<Grant> {
    PERMISSION_SUFFIXES
        .iter()
        .find_map(|(suffix, pull_only, delete_allowed)| {
            let namespace = group_name.strip_suffix(suffix)?;
            if namespace.is_empty() {
                return None;
            }
            Some(Grant {
                group: group_name.to_string(),
                namespace: namespace.to_string(),
                pull_only: *pull_only,
                delete_allowed: *delete_allowed,
            })
        })
}

/// Returns true if `a` is strictly more permissive than `b`.
///
/// Delete permission dominates; among equal delete permission, write access
/// beats pull-only.
fn more_permissive(a: &Grant, b: &Grant) -> bool {
    if a.delete_allowed != b.delete_allowed {
        return a.delete_allowed;
    }
    if a.pull_only != b.pull_only {
        return !a.pull_only;
    }
    false
}

/// Reduce raw directory group identifiers into grants and the primary principal.
///
/// Group identifiers may be distinguished names; the leading RDN value is used
/// as the group name. Only groups whose name starts with `prefix` are
/// considered (an empty prefix accepts every group). The primary principal is
/// the most permissive grant, ties going to the first one seen. `None` means
/// the actor holds no authorized group.
pub fn derive_grants(
    username: &str,
    groups: &[String],
    prefix: &str,
) -> (Vec<Grant>, Option<PrimaryPrincipal>) {
    let mut grants: Vec<Grant> = Vec::new();
    let mut selected: Option<usize> = None;

    for raw in groups {
        let group_name = group_name_from_dn(raw);
        if !prefix.is_empty() && !group_name.starts_with(prefix) {
            continue;
        }

        let Some(grant) = derive_grant(group_name) else {
            tracing::debug!(group = %group_name, "Ignoring group without permission suffix");
            continue;
        };

        grants.push(grant);
        let candidate = grants.len() - 1;
        selected = match selected {
            Some(current) if !more_permissive(&grants[candidate], &grants[current]) => {
                Some(current)
            }
            _ => Some(candidate),
        };
    }

    let primary = selected.map(|idx| PrimaryPrincipal::from_grant(username, &grants[idx]));
    (grants, primary)
}

/// Extract the group name from a distinguished name.
///
/// `cn=team1_rw,ou=groups,dc=example,dc=com` yields `team1_rw`. Only `cn` and
/// `ou` leading attributes are recognised (case-insensitively); anything else
/// is returned unchanged.
pub fn group_name_from_dn(dn: &str) -> &str {
    let first = dn.split(',').next().unwrap_or(dn).trim();
    let Some(prefix) = first.get(..3) else {
        return dn;
    };
    if prefix.eq_ignore_ascii_case("cn=") || prefix.eq_ignore_ascii_case("ou=") {
        &first[3..]
    } else {
        dn
    }
}

/// Distinct namespaces of a grant list, in first-seen order
pub fn namespaces_from_grants(grants: &[Grant]) -> Vec<String> {
    let mut namespaces: Vec<String> = Vec::new();
    for grant in grants {
        if !namespaces.iter().any(|ns| ns == &grant.namespace) {
            namespaces.push(grant.namespace.clone());
        }
    }
    namespaces
}

/// Returns true if any grant allows deleting in `namespace`
pub fn namespace_delete_allowed(grants: &[Grant], namespace: &str) -> bool {
    grants
        .iter()
        .any(|grant| grant.namespace == namespace && grant.delete_allowed)
}

/// Merge grants into one permission summary per namespace, in `namespaces` order.
///
/// A namespace is pull-only only if every grant on it is pull-only, and allows
/// delete if any grant does.
pub fn namespace_permissions(namespaces: &[String], grants: &[Grant]) -> Vec<NamespacePermission> {
    namespaces
        .iter()
        .filter(|ns| !ns.is_empty())
        .map(|ns| {
            let matching: Vec<&Grant> = grants.iter().filter(|g| &g.namespace == ns).collect();
            if matching.is_empty() {
                return NamespacePermission {
                    namespace: ns.clone(),
                    pull_only: false,
                    delete_allowed: false,
                    groups: Vec::new(),
                };
            }

            let mut groups: Vec<String> = matching.iter().map(|g| g.group.clone()).collect();
            groups.sort();
            groups.dedup();

            NamespacePermission {
                namespace: ns.clone(),
                pull_only: matching.iter().all(|g| g.pull_only),
                delete_allowed: matching.iter().any(|g| g.delete_allowed),
                groups,
            }
        })
        .collect()
}
