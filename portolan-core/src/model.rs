use serde::{Deserialize, Serialize};

/// Recognized metadata keys stored in [`Args`].
pub mod arg_key {
    /// Document title extracted from `info`.
    pub const TITLE: &str = "title";
    /// Document version extracted from `info`.
    pub const VERSION: &str = "version";
    /// Document description extracted from `info`.
    pub const DESCRIPTION: &str = "description";
    /// Gateway mount path this revision represents.
    pub const BASE_PATH: &str = "base-path";
    /// Repeated; one `"{fullPath}|{method}"` entry per declared operation.
    pub const ROUTE: &str = "route";
    /// Alternative shape: one stored document serving several mounts.
    pub const EXT_PATH: &str = "ext-path";
}

/// Ordered `(key, value)` metadata envelope attached to every stored document.
///
/// Deliberately schema-flexible: keys may repeat (`route`, `ext-path`) and
/// unknown keys survive a round-trip. The on-disk JSON form is an array of
/// pairs, `[["key","value"],...]`, which must be kept for compatibility with
/// existing data directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(pub Vec<(String, String)>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value stored under `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `key`, in insertion order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Metadata of one stored document revision; what the store's `list` returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageData {
    pub id: String,
    #[serde(default)]
    pub args: Args,
}

/// A unique upstream reachable behind the gateway, with the external paths
/// routed to it. Ephemeral: rebuilt on every discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredService {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub ext_paths: Vec<String>,
}

/// Public list view of a stored Swagger/OpenAPI revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwaggerItem {
    pub id: String,
    pub title: String,
    pub version: String,
    pub description: String,
    pub base_path: String,
}

/// Public list view of a stored AsyncAPI document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncapiItem {
    pub id: String,
    pub title: String,
    pub version: String,
    pub description: String,
}

/// Service metadata served on `/info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_serialize_as_array_of_pairs() {
        let mut args = Args::new();
        args.push(arg_key::TITLE, "Device API");
        args.push(arg_key::ROUTE, "/devices|get");
        args.push(arg_key::ROUTE, "/devices|post");
        let json = serde_json::to_string(&args).unwrap();
        assert_eq!(
            json,
            r#"[["title","Device API"],["route","/devices|get"],["route","/devices|post"]]"#
        );
    }

    #[test]
    fn args_round_trip_keeps_order_and_duplicates() {
        let raw = r#"[["route","/b|get"],["route","/a|get"],["custom","x"]]"#;
        let args: Args = serde_json::from_str(raw).unwrap();
        assert_eq!(
            args.all(arg_key::ROUTE).collect::<Vec<_>>(),
            vec!["/b|get", "/a|get"]
        );
        assert_eq!(args.first("custom"), Some("x"));
        assert_eq!(serde_json::to_string(&args).unwrap(), raw);
    }

    #[test]
    fn args_first_on_missing_key_is_none() {
        let args = Args::new();
        assert_eq!(args.first(arg_key::TITLE), None);
    }

    #[test]
    fn storage_data_json_shape() {
        let data = StorageData {
            id: "svc-a_devices".into(),
            args: [(arg_key::BASE_PATH, "/devices")].into_iter().collect(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["id"], "svc-a_devices");
        assert_eq!(json["args"][0][0], "base-path");
        assert_eq!(json["args"][0][1], "/devices");
    }

    #[test]
    fn storage_data_tolerates_missing_args() {
        let data: StorageData = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(data.id, "x");
        assert!(data.args.0.is_empty());
    }
}
