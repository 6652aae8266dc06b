use portolan_core::PortolanError;
use serde_json::Value;

/// A decoded document: the top-level JSON object with every key kept opaque.
/// Partial rewrites go through this map so unknown keys round-trip untouched.
pub type Doc = serde_json::Map<String, Value>;

/// Top-level document keys touched by the pipeline.
pub mod doc_key {
    pub const SWAGGER: &str = "swagger";
    pub const OPENAPI: &str = "openapi";
    pub const ASYNCAPI: &str = "asyncapi";
    pub const INFO: &str = "info";
    pub const CHANNELS: &str = "channels";
    pub const HOST: &str = "host";
    pub const BASE_PATH: &str = "basePath";
    pub const SCHEMES: &str = "schemes";
    pub const PATHS: &str = "paths";
    pub const DEFINITIONS: &str = "definitions";
}

/// Key sets whose full presence marks an acceptable document. Values are not
/// inspected; `{"swagger": null, …}` passes.
pub const SWAGGER_V2_KEYS: &[&str] = &[doc_key::SWAGGER, doc_key::INFO, doc_key::PATHS];
pub const SWAGGER_V3_KEYS: &[&str] = &[doc_key::OPENAPI, doc_key::INFO, doc_key::PATHS];
pub const ASYNCAPI_V2_KEYS: &[&str] = &[doc_key::ASYNCAPI, doc_key::INFO, doc_key::CHANNELS];
pub const ASYNCAPI_V3_KEYS: &[&str] = &[doc_key::ASYNCAPI, doc_key::INFO];

/// Decode the top level of a raw document.
pub fn parse_doc(raw: &[u8]) -> Result<Doc, PortolanError> {
    let doc: Doc = serde_json::from_slice(raw)?;
    Ok(doc)
}

pub fn has_keys(doc: &Doc, keys: &[&str]) -> bool {
    keys.iter().all(|key| doc.contains_key(*key))
}

/// Check Swagger/OpenAPI key presence (v2 or v3 set).
pub fn validate_swagger_doc(doc: &Doc) -> Result<(), PortolanError> {
    if has_keys(doc, SWAGGER_V2_KEYS) || has_keys(doc, SWAGGER_V3_KEYS) {
        return Ok(());
    }
    Err(PortolanError::InvalidInput(
        "missing required keys".to_string(),
    ))
}

/// Check AsyncAPI key presence (v2 or v3 set).
pub fn validate_asyncapi_doc(doc: &Doc) -> Result<(), PortolanError> {
    if has_keys(doc, ASYNCAPI_V2_KEYS) || has_keys(doc, ASYNCAPI_V3_KEYS) {
        return Ok(());
    }
    Err(PortolanError::InvalidInput(
        "missing required keys".to_string(),
    ))
}

/// `info` fields surfaced as list metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocInfo {
    pub title: String,
    pub version: String,
    pub description: String,
}

/// Extract `info.{title, version, description}`; absent fields come back empty.
pub fn doc_info(doc: &Doc) -> DocInfo {
    let info = doc.get(doc_key::INFO).and_then(Value::as_object);
    let field = |name: &str| -> String {
        info.and_then(|i| i.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    DocInfo {
        title: field("title"),
        version: field("version"),
        description: field("description"),
    }
}

/// Rewrite a document so its routes appear to be served by the public
/// gateway: `host` and `basePath` are overwritten, `schemes` defaults to
/// `["https"]` when absent. Every other key is left as-is.
pub fn apply_gateway_view(doc: &mut Doc, gateway_host: &str, base_path: &str) {
    doc.insert(doc_key::HOST.to_string(), Value::String(gateway_host.to_string()));
    doc.insert(doc_key::BASE_PATH.to_string(), Value::String(base_path.to_string()));
    if !doc.contains_key(doc_key::SCHEMES) {
        doc.insert(
            doc_key::SCHEMES.to_string(),
            Value::Array(vec![Value::String("https".to_string())]),
        );
    }
}

/// Decode a raw document and apply the gateway view.
pub fn transform_doc(
    raw: &[u8],
    gateway_host: &str,
    base_path: &str,
) -> Result<Doc, PortolanError> {
    let mut doc = parse_doc(raw)?;
    apply_gateway_view(&mut doc, gateway_host, base_path);
    Ok(doc)
}

/// Slash-join two path segments without doubling separators.
pub fn join_path(base: &str, sub: &str) -> String {
    let base = base.trim_end_matches('/');
    let sub = sub.trim_start_matches('/');
    match (base.is_empty(), sub.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{sub}"),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{sub}"),
    }
}

/// Enumerate every `(subPath, method)` pair a document declares as
/// `"{join(ext_path, subPath)}|{method}"`, sorted ascending.
pub fn enumerate_routes(doc: &Doc, ext_path: &str) -> Vec<String> {
    let mut routes = Vec::new();
    if let Some(paths) = doc.get(doc_key::PATHS).and_then(Value::as_object) {
        for (sub_path, methods) in paths {
            if let Some(methods) = methods.as_object() {
                for method in methods.keys() {
                    routes.push(format!("{}|{}", join_path(ext_path, sub_path), method));
                }
            }
        }
    }
    routes.sort();
    routes
}
