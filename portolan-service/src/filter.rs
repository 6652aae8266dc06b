use crate::transform::{doc_key, join_path, Doc};
use crate::with_timeout;
use portolan_clients::policy::PolicyOracle;
use portolan_core::PortolanError;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

/// Matches the literal spelling `"$ref": "#/definitions/<name>"` with optional
/// whitespace after the colon. References using escaped slashes or line breaks
/// inside the string are intentionally not tracked; the projection stays a
/// cheap substring scan instead of a schema walk.
static REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r##""\$ref": ?"#/definitions/([^"]+)""##).unwrap());

type PathMap = HashMap<String, serde_json::Map<String, Value>>;

/// Project a transformed document down to the operations the caller may see.
///
/// Returns `Ok(false)` when every operation is denied, meaning the document is
/// suppressed. Documents without a `paths` object are kept as-is. Retained
/// operations decide which `definitions` survive, via a transitive `$ref`
/// closure so the filtered document stays self-contained.
pub async fn filter_doc(
    oracle: &dyn PolicyOracle,
    timeout: Duration,
    doc: &mut Doc,
    user_token: &str,
    user_roles: &[String],
    base_path: &str,
) -> Result<bool, PortolanError> {
    let Some(old_paths) = doc_paths(doc)? else {
        return Ok(true);
    };
    if old_paths.is_empty() {
        return Ok(true);
    }

    let (new_paths, mut allowed_refs) = if !user_token.is_empty() {
        new_paths_by_token(oracle, timeout, &old_paths, base_path, user_token).await?
    } else {
        new_paths_by_roles(oracle, timeout, &old_paths, base_path, user_roles).await?
    };
    if new_paths.is_empty() {
        return Ok(false);
    }
    doc.insert(doc_key::PATHS.to_string(), serde_json::to_value(&new_paths)?);

    if let Some(raw_defs) = doc.get(doc_key::DEFINITIONS) {
        let old_defs: HashMap<String, Value> = serde_json::from_value(raw_defs.clone())?;
        if !old_defs.is_empty() {
            let new_defs = filter_definitions(&old_defs, &mut allowed_refs);
            doc.insert(doc_key::DEFINITIONS.to_string(), serde_json::to_value(new_defs)?);
        }
    }
    Ok(true)
}

fn doc_paths(doc: &Doc) -> Result<Option<PathMap>, PortolanError> {
    let Some(raw) = doc.get(doc_key::PATHS) else {
        return Ok(None);
    };
    let paths: PathMap = serde_json::from_value(raw.clone())?;
    Ok(Some(paths))
}

async fn new_paths_by_token(
    oracle: &dyn PolicyOracle,
    timeout: Duration,
    old_paths: &PathMap,
    base_path: &str,
    user_token: &str,
) -> Result<(PathMap, HashSet<String>), PortolanError> {
    let path_methods = path_methods_map(old_paths, base_path);
    let access = with_timeout(
        timeout,
        oracle.get_user_access_policy(user_token, &path_methods),
    )
    .await?;

    let mut new_paths = PathMap::new();
    let mut refs = HashSet::new();
    for (sub_path, methods) in old_paths {
        let full_path = join_path(base_path, sub_path);
        let Some(allowed) = access.get(&full_path) else {
            continue;
        };
        let mut allowed_methods = serde_json::Map::new();
        for method in allowed {
            if let Some(op) = methods.get(method) {
                collect_definition_refs(&op.to_string(), &mut refs);
                allowed_methods.insert(method.clone(), op.clone());
            }
        }
        if !allowed_methods.is_empty() {
            new_paths.insert(sub_path.clone(), allowed_methods);
        }
    }
    Ok((new_paths, refs))
}

async fn new_paths_by_roles(
    oracle: &dyn PolicyOracle,
    timeout: Duration,
    old_paths: &PathMap,
    base_path: &str,
    user_roles: &[String],
) -> Result<(PathMap, HashSet<String>), PortolanError> {
    let mut new_paths = PathMap::new();
    let mut refs = HashSet::new();
    for (sub_path, methods) in old_paths {
        let full_path = join_path(base_path, sub_path);
        let mut allowed_methods = serde_json::Map::new();
        for (method, op) in methods {
            for role in user_roles {
                let allowed = with_timeout(
                    timeout,
                    oracle.get_role_access_policy(role, &full_path, method),
                )
                .await?;
                if allowed {
                    collect_definition_refs(&op.to_string(), &mut refs);
                    allowed_methods.insert(method.clone(), op.clone());
                    break;
                }
            }
        }
        if !allowed_methods.is_empty() {
            new_paths.insert(sub_path.clone(), allowed_methods);
        }
    }
    Ok((new_paths, refs))
}

/// Flatten a path map into `fullPath → [methods]` for a batched oracle call.
fn path_methods_map(old_paths: &PathMap, base_path: &str) -> HashMap<String, Vec<String>> {
    let mut path_methods: HashMap<String, Vec<String>> = HashMap::new();
    for (sub_path, methods) in old_paths {
        let full_path = join_path(base_path, sub_path);
        path_methods
            .entry(full_path)
            .or_default()
            .extend(methods.keys().cloned());
    }
    path_methods
}

/// Keep only definitions reachable from the retained operations, closing the
/// `$ref` graph transitively so no kept definition dangles.
fn filter_definitions(
    old_defs: &HashMap<String, Value>,
    allowed_refs: &mut HashSet<String>,
) -> HashMap<String, Value> {
    let mut pending: Vec<String> = allowed_refs.iter().cloned().collect();
    while let Some(name) = pending.pop() {
        if let Some(def) = old_defs.get(&name) {
            let mut found = HashSet::new();
            collect_definition_refs(&def.to_string(), &mut found);
            for referenced in found {
                if allowed_refs.insert(referenced.clone()) {
                    pending.push(referenced);
                }
            }
        }
    }
    old_defs
        .iter()
        .filter(|(name, _)| allowed_refs.contains(*name))
        .map(|(name, def)| (name.clone(), def.clone()))
        .collect()
}

/// Harvest `#/definitions/<name>` references from a raw JSON fragment.
fn collect_definition_refs(raw: &str, refs: &mut HashSet<String>) {
    for capture in REF_REGEX.captures_iter(raw) {
        refs.insert(capture[1].to_string());
    }
}
