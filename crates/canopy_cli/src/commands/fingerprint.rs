//! Fingerprint command implementation.

use canopy_protocol::{fingerprint, NodeFingerprint};
use std::path::Path;

use super::tree::load_store;

/// Computes the fingerprint of `node` in a tree file.
pub fn compute(
    tree: &Path,
    node: &str,
    offset: Option<&str>,
) -> Result<NodeFingerprint, Box<dyn std::error::Error>> {
    let store = load_store(tree)?;
    Ok(fingerprint(&store, node, offset)?)
}

/// Runs the fingerprint command.
pub fn run(tree: &Path, node: &str, offset: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let result = compute(tree, node, offset)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_testkit::prelude::*;

    #[test]
    fn fingerprint_of_tree_file() {
        let file = TreeFile::write("site", &sample_site());
        let result = compute(file.path(), "/content/site/a", Some("/content")).unwrap();
        assert_eq!(result.path, "/site/a");
        assert!(result.attribute_digests.contains_key("title"));
    }

    #[test]
    fn missing_node_fails() {
        let file = TreeFile::write("site", &sample_site());
        assert!(compute(file.path(), "/content/nope", None).is_err());
    }
}
