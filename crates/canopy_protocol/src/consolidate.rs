//! Reduction of changed paths to a minimal covering set.
//!
//! A change event may report a node together with many of its descendants.
//! Replicating a subtree covers everything below it, so only the topmost
//! changed paths need to be transferred.

use std::collections::BTreeSet;

use canopy_store::path::is_same_or_descendant;

/// Consolidates `paths` into a set in which no member is an ancestor of another.
///
/// The union of the subtrees rooted at the result equals the union of the
/// subtrees rooted at the input. Input order and duplicates do not matter.
pub fn consolidate<I, S>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    consolidate_ordered(paths).into_iter().collect()
}

/// Like [`consolidate`], but keeps the surviving paths in first-seen order.
///
/// A path that replaces its descendants takes the position of the first
/// descendant it replaces.
pub fn consolidate_ordered<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result: Vec<String> = Vec::new();
    for candidate in paths {
        let candidate = candidate.as_ref();
        if result.iter().any(|kept| is_same_or_descendant(kept, candidate)) {
            continue;
        }
        match result
            .iter()
            .position(|kept| is_same_or_descendant(candidate, kept))
        {
            Some(first) => {
                result[first] = candidate.to_string();
                let mut idx = first + 1;
                while idx < result.len() {
                    if is_same_or_descendant(candidate, &result[idx]) {
                        result.remove(idx);
                    } else {
                        idx += 1;
                    }
                }
            }
            None => result.push(candidate.to_string()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn removes_descendants() {
        let result = consolidate(["/a/b", "/a/b/c", "/a/d"]);
        assert_eq!(result, set(&["/a/b", "/a/d"]));
    }

    #[test]
    fn ancestor_after_descendants() {
        let result = consolidate(["/a/b/c", "/a/b/d", "/x", "/a"]);
        assert_eq!(result, set(&["/a", "/x"]));
    }

    #[test]
    fn similar_prefix_is_not_ancestor() {
        let result = consolidate(["/a/b", "/a/bc"]);
        assert_eq!(result, set(&["/a/b", "/a/bc"]));
    }

    #[test]
    fn duplicates_and_empty() {
        assert_eq!(consolidate(["/a", "/a"]), set(&["/a"]));
        assert!(consolidate(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn ordered_keeps_first_seen_position() {
        let result = consolidate_ordered(["/c", "/a/b", "/d", "/a"]);
        assert_eq!(result, vec!["/c", "/a", "/d"]);
    }

    #[test]
    fn root_covers_everything() {
        assert_eq!(consolidate(["/a", "/", "/b/c"]), set(&["/"]));
    }
}
