//! Attribute fingerprints for parent comparison.
//!
//! A fingerprint maps each non-protected attribute of a node to a short,
//! deterministic string `<type code>:<rendering>`. Short scalar renderings are
//! kept literally; long ones, multi-valued attributes and binaries are
//! replaced by a keyed digest.

use hmac::digest::generic_array::GenericArray;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::io::Read;

use canopy_store::{attrs, path, ContentStore, Property, StoreError, StoreResult, Value};

type HmacSha256 = Hmac<Sha256>;

/// Longest scalar rendering that is kept literally.
pub const MAX_LITERAL_LEN: usize = 64;

/// Chunk size used when streaming binaries through the digest.
pub const BINARY_CHUNK_SIZE: usize = 8192;

/// Length of a digest in bytes before hex encoding.
const DIGEST_LEN: usize = 16;

const FINGERPRINT_KEY: &[u8; 64] = b"canopy/node-attribute-fingerprint/v1:0123456789abcdefghijklmnopq";

/// Fingerprint of one node's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFingerprint {
    /// Node path, possibly relative to an offset (but always starting with `/`).
    pub path: String,
    /// Attribute name to rendering or digest.
    pub attribute_digests: BTreeMap<String, String>,
}

struct Digester(HmacSha256);

impl Digester {
    fn new() -> Self {
        Self(<HmacSha256 as KeyInit>::new(GenericArray::from_slice(
            FINGERPRINT_KEY,
        )))
    }

    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Feeds a length-prefixed chunk so concatenations stay unambiguous.
    fn update_framed(&mut self, data: &[u8]) {
        self.0.update(&(data.len() as u64).to_le_bytes());
        self.0.update(data);
    }

    fn finish(self) -> String {
        let bytes = self.0.finalize().into_bytes();
        hex::encode(&bytes[..DIGEST_LEN])
    }
}

/// Digest of a string, as used for long renderings.
pub fn digest_str(text: &str) -> String {
    let mut digester = Digester::new();
    digester.update(text.as_bytes());
    digester.finish()
}

/// Digest of a stream, read in [`BINARY_CHUNK_SIZE`] chunks.
pub fn digest_stream(mut reader: impl Read) -> StoreResult<String> {
    let mut digester = Digester::new();
    let mut buf = vec![0u8; BINARY_CHUNK_SIZE];
    loop {
        let len = reader.read(&mut buf)?;
        if len == 0 {
            break;
        }
        digester.update(&buf[..len]);
    }
    Ok(digester.finish())
}

fn render_value(value: &Value) -> StoreResult<String> {
    Ok(match value {
        Value::Date(date) => date.timestamp_millis().to_string(),
        Value::Binary(binary) => digest_stream(binary.stream())?,
        Value::Double(d) => d.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::String(s)
        | Value::Decimal(s)
        | Value::Name(s)
        | Value::Path(s)
        | Value::Reference(s)
        | Value::WeakReference(s)
        | Value::Uri(s) => s.clone(),
    })
}

fn ordering_is_irrelevant(name: &str) -> bool {
    name == attrs::MIXIN_TYPES
}

/// Renders one attribute as `<type code>:<rendering or digest>`.
pub fn fingerprint_value(name: &str, property: &Property) -> StoreResult<String> {
    let rendering = match property {
        Property::Single(value) => {
            let rendering = render_value(value)?;
            if rendering.len() > MAX_LITERAL_LEN {
                digest_str(&rendering)
            } else {
                rendering
            }
        }
        Property::Multiple { values, .. } => {
            let mut renderings = values
                .iter()
                .map(render_value)
                .collect::<StoreResult<Vec<_>>>()?;
            if ordering_is_irrelevant(name) {
                renderings.sort();
            }
            let mut digester = Digester::new();
            for rendering in &renderings {
                digester.update_framed(rendering.as_bytes());
            }
            digester.finish()
        }
    };
    Ok(format!("{}:{}", property.property_type().code(), rendering))
}

/// Computes the fingerprint of the node at `node_path`.
///
/// With an `offset`, the reported path has the offset removed, so
/// `/target/content/a` with offset `/target` is reported as `/content/a`.
///
/// # Errors
///
/// Fails if the node cannot be read or does not lie below `offset`.
pub fn fingerprint(
    store: &dyn ContentStore,
    node_path: &str,
    offset: Option<&str>,
) -> StoreResult<NodeFingerprint> {
    let reported = match offset {
        None => node_path.to_string(),
        Some(offset) => path::strip_base(offset, node_path).ok_or_else(|| {
            StoreError::invalid_path(node_path, format!("not below {offset}"))
        })?,
    };
    let mut attribute_digests = BTreeMap::new();
    for entry in store.properties(node_path)? {
        if entry.protected {
            continue;
        }
        let digest = fingerprint_value(&entry.name, &entry.property)?;
        attribute_digests.insert(entry.name, digest);
    }
    Ok(NodeFingerprint {
        path: reported,
        attribute_digests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store::{MemoryStore, PropertyType};
    use chrono::{TimeZone, Utc};

    fn node(store: &MemoryStore, path: &str, props: &[(&str, Property)]) {
        store.ensure_node(path).unwrap();
        for (name, prop) in props {
            store.set_property(path, name, prop.clone()).unwrap();
        }
    }

    #[test]
    fn short_scalars_are_literal() {
        assert_eq!(fingerprint_value("t", &Property::string("hello")).unwrap(), "1:hello");
        assert_eq!(fingerprint_value("n", &Property::long(42)).unwrap(), "3:42");
        assert_eq!(fingerprint_value("b", &Property::boolean(true)).unwrap(), "6:true");

        let date = Utc.timestamp_millis_opt(1_600_000_000_123).unwrap();
        assert_eq!(fingerprint_value("d", &Property::date(date)).unwrap(), "5:1600000000123");
    }

    #[test]
    fn long_scalars_are_digested() {
        let long = "x".repeat(MAX_LITERAL_LEN + 1);
        let rep = fingerprint_value("t", &Property::string(long.clone())).unwrap();
        assert_eq!(rep, format!("1:{}", digest_str(&long)));
        assert_eq!(rep.len(), 2 + DIGEST_LEN * 2);

        let exact = "y".repeat(MAX_LITERAL_LEN);
        assert_eq!(
            fingerprint_value("t", &Property::string(exact.clone())).unwrap(),
            format!("1:{exact}")
        );
    }

    #[test]
    fn binaries_are_digested_independent_of_chunking() {
        let data: Vec<u8> = (0..3 * BINARY_CHUNK_SIZE + 17).map(|i| (i % 251) as u8).collect();
        let rep = fingerprint_value("bin", &Property::binary(data.clone())).unwrap();

        let mut digester = Digester::new();
        for chunk in data.chunks(1000) {
            digester.update(chunk);
        }
        assert_eq!(rep, format!("2:{}", digester.finish()));
    }

    #[test]
    fn mixin_order_is_irrelevant() {
        let a = Property::names(["mix:versionable", "mix:referenceable"]);
        let b = Property::names(["mix:referenceable", "mix:versionable"]);
        assert_eq!(
            fingerprint_value(attrs::MIXIN_TYPES, &a).unwrap(),
            fingerprint_value(attrs::MIXIN_TYPES, &b).unwrap()
        );
        assert_ne!(
            fingerprint_value("tags", &a).unwrap(),
            fingerprint_value("tags", &b).unwrap()
        );
    }

    #[test]
    fn multi_values_are_framed() {
        let a = Property::strings(["ab", "c"]);
        let b = Property::strings(["a", "bc"]);
        assert_ne!(
            fingerprint_value("v", &a).unwrap(),
            fingerprint_value("v", &b).unwrap()
        );
        let empty = Property::multiple(PropertyType::Long, vec![]).unwrap();
        assert!(fingerprint_value("v", &empty).unwrap().starts_with("3:"));
    }

    #[test]
    fn fingerprint_skips_protected() {
        let store = MemoryStore::new().with_protected(["secret"]);
        node(&store, "/a", &[("title", Property::string("A"))]);
        let before = fingerprint(&store, "/a", None).unwrap();

        let other = MemoryStore::new();
        node(&other, "/a", &[("title", Property::string("A")), ("secret", Property::long(1))]);
        let other = MemoryStore::from_tree(other.snapshot()).with_protected(["secret"]);
        assert_eq!(fingerprint(&other, "/a", None).unwrap(), before);
    }

    #[test]
    fn fingerprint_with_offset() {
        let store = MemoryStore::new();
        node(&store, "/target/content/a", &[("title", Property::string("A"))]);
        let fp = fingerprint(&store, "/target/content/a", Some("/target")).unwrap();
        assert_eq!(fp.path, "/content/a");
        assert_eq!(fp.attribute_digests.get("title").map(String::as_str), Some("1:A"));

        assert!(fingerprint(&store, "/target/content/a", Some("/other")).is_err());
        assert!(fingerprint(&store, "/missing", None).is_err());
    }
}
