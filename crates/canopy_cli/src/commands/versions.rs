//! Versions command implementation.

use canopy_protocol::{versionables_below, VersionableInfo};
use std::path::Path;

use super::tree::load_store;

/// Lists the versionables below `root` in a tree file.
pub fn list(tree: &Path, root: &str) -> Result<Vec<VersionableInfo>, Box<dyn std::error::Error>> {
    let store = load_store(tree)?;
    Ok(versionables_below(&store, root, None)?)
}

/// Runs the versions command.
pub fn run(tree: &Path, root: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let versions = list(tree, root)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&versions)?),
        _ => {
            println!("{} versionables below {root}", versions.len());
            for info in &versions {
                println!("  {}  {}", info.version, info.path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_testkit::prelude::*;

    #[test]
    fn lists_sample_pages() {
        let file = TreeFile::write("site", &sample_site());
        let versions = list(file.path(), SITE_ROOT).unwrap();
        let paths: Vec<_> = versions.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/content/site/a/b",
                "/content/site/a/x",
                "/content/site/c",
                "/content/site/d"
            ]
        );
        assert!(versions.iter().all(|v| v.version == "v1"));
    }
}
