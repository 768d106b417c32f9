//! Decoding Kubernetes objects which have already been fetched, for example
//! with `kubectl get secret my-secret -o json`.
//!
//! We don't talk to the cluster ourselves. Whoever calls us is responsible for
//! fetching objects, authenticating, and retrying.

use serde::de::DeserializeOwned;

use crate::prelude::*;

/// The parts of an object's `metadata` we care about.
#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

/// A ConfigMap or Secret (missing lots of fields).
#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
enum Object {
    #[serde(rename_all = "camelCase")]
    ConfigMap {
        metadata: ObjectMeta,
        #[serde(default)]
        data: BTreeMap<String, String>,
        #[serde(default, with = "base64_encoded_map")]
        binary_data: BTreeMap<String, Vec<u8>>,
    },
    #[serde(rename_all = "camelCase")]
    Secret {
        metadata: ObjectMeta,
        #[serde(default, with = "base64_encoded_map")]
        data: BTreeMap<String, Vec<u8>>,
        #[serde(default)]
        string_data: BTreeMap<String, String>,
    },
}

/// Custom `serde` deserialization module for maps of Base64-encoded values.
/// Use with `#[serde(with = "base64_encoded_map")]` to automatically decode
/// each value.
pub mod base64_encoded_map {
    use serde::de::{Deserialize, Deserializer, Error as DeError};
    use std::{collections::BTreeMap, result};

    /// Deserialize a map whose values are Base64-encoded bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> result::Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = Option::<BTreeMap<String, String>>::deserialize(deserializer)?;
        let mut decoded = BTreeMap::new();
        for (key, value) in encoded.unwrap_or_default() {
            let bytes = base64::decode(&value).map_err(|err| {
                D::Error::custom(format!("could not base64-decode {:?}: {}", key, err))
            })?;
            decoded.insert(key, bytes);
        }
        Ok(decoded)
    }
}

/// A ConfigMap or Secret, decoded and ready to materialize.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchedResource {
    /// The name of the object.
    pub name: String,
    /// The namespace of the object, if the JSON included one.
    pub namespace: Option<String>,
    /// The object's data. Secrets become sensitive bundles.
    pub bundle: KeyedBundle,
}

impl FetchedResource {
    /// The identity of this resource when used by `namespace/app_name`.
    pub fn identity_for(&self, namespace: &str, app_name: &str) -> ResourceIdentity {
        ResourceIdentity::new(namespace, app_name, self.name.clone())
    }
}

/// Decode a ConfigMap or Secret from its JSON representation.
pub fn parse_resource_json(json: &str) -> Result<FetchedResource> {
    let object: Object = parse_json(json)?;
    Ok(match object {
        Object::ConfigMap {
            metadata,
            data,
            binary_data,
        } => {
            // Text and binary keys can't overlap in a valid ConfigMap.
            let mut entries = binary_data;
            entries.extend(data.into_iter().map(|(k, v)| (k, v.into_bytes())));
            FetchedResource {
                name: metadata.name,
                namespace: metadata.namespace,
                bundle: KeyedBundle::Plain(entries),
            }
        }
        Object::Secret {
            metadata,
            data,
            string_data,
        } => {
            // `stringData` wins over `data`, as it does on the API server.
            let mut entries = data;
            entries.extend(string_data.into_iter().map(|(k, v)| (k, v.into_bytes())));
            FetchedResource {
                name: metadata.name,
                namespace: metadata.namespace,
                bundle: KeyedBundle::Sensitive(entries),
            }
        }
    })
}

/// Read and decode a ConfigMap or Secret stored as JSON in `path`.
pub fn read_resource_file(path: &Path) -> Result<FetchedResource> {
    let json = fs::read_to_string(path).map_err(|err| Error::io("read", path, err))?;
    parse_resource_json(&json).map_err(|err| match err {
        Error::InvalidResource(msg) => {
            Error::InvalidResource(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|err| Error::invalid_resource(err.to_string()))
}

#[test]
fn parse_configmap() {
    let json = r#"{
  "apiVersion": "v1",
  "kind": "ConfigMap",
  "metadata": { "name": "spark-conf", "namespace": "spark", "uid": "1234" },
  "data": { "spark-defaults.conf": "spark.master k8s://\n" },
  "binaryData": { "blob": "AAEC" }
}"#;
    let resource = parse_resource_json(json).expect("parse error");
    assert_eq!(resource.name, "spark-conf");
    assert_eq!(resource.namespace.as_deref(), Some("spark"));
    assert_eq!(
        resource.bundle,
        KeyedBundle::plain(vec![
            ("blob", vec![0u8, 1, 2]),
            ("spark-defaults.conf", b"spark.master k8s://\n".to_vec()),
        ]),
    );
}

#[test]
fn parse_secret() {
    let json = r#"{
  "apiVersion": "v1",
  "kind": "Secret",
  "type": "Opaque",
  "metadata": { "name": "gcp" },
  "data": { "key.json": "e30=" },
  "stringData": { "note": "hi" }
}"#;
    let resource = parse_resource_json(json).expect("parse error");
    assert_eq!(resource.namespace, None);
    assert!(resource.bundle.is_sensitive());
    assert_eq!(
        resource.bundle,
        KeyedBundle::sensitive(vec![("key.json", "{}"), ("note", "hi")]),
    );
    assert_eq!(
        resource.identity_for("spark", "pi"),
        ResourceIdentity::new("spark", "pi", "gcp"),
    );
}

#[test]
fn secret_without_data_is_empty() {
    let json = r#"{ "kind": "Secret", "metadata": { "name": "empty" }, "data": null }"#;
    let resource = parse_resource_json(json).expect("parse error");
    assert!(resource.bundle.entries().is_empty());
}

#[test]
fn reject_bad_objects() {
    let bad_base64 = r#"{ "kind": "Secret", "metadata": { "name": "s" }, "data": { "k": "%%%" } }"#;
    let wrong_kind = r#"{ "kind": "Pod", "metadata": { "name": "p" } }"#;
    for json in &[bad_base64, wrong_kind, "not json"] {
        match parse_resource_json(json) {
            Err(Error::InvalidResource(_)) => {}
            other => panic!("expected InvalidResource for {}, got {:?}", json, other),
        }
    }
}
