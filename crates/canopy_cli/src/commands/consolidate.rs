//! Consolidate command implementation.

use canopy_store::path;

/// Validates and consolidates `paths`, in first-seen order.
pub fn consolidated(paths: &[String]) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    for p in paths {
        path::validate(p)?;
    }
    Ok(canopy_protocol::consolidate_ordered(paths))
}

/// Runs the consolidate command.
pub fn run(paths: &[String], format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = consolidated(paths)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            for p in &result {
                println!("{p}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn consolidates_in_order() {
        let result = consolidated(&strings(&["/a/d", "/a/b/c", "/a/b"])).unwrap();
        assert_eq!(result, vec!["/a/d", "/a/b"]);
    }

    #[test]
    fn rejects_relative_paths() {
        assert!(consolidated(&strings(&["/a", "b"])).is_err());
    }
}
