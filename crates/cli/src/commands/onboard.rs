//! `assay onboard`: write a starter config and an empty resource catalog.

use std::path::Path;

use assay_config::AppConfig;
use assay_core::catalog::ResourceCatalog;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    std::fs::create_dir_all(&dir)?;
    println!("🔬 Setting up assay in {}\n", dir.display());

    let config_path = dir.join("config.toml");
    let wrote_config = write_if_absent(&config_path, &AppConfig::default_toml())?;
    report(&config_path, wrote_config);

    let catalog_path = dir.join("catalog.json");
    let empty = serde_json::to_string_pretty(&ResourceCatalog::new())?;
    let wrote_catalog = write_if_absent(&catalog_path, &empty)?;
    report(&catalog_path, wrote_catalog);

    if wrote_config {
        println!("\nNext:");
        println!("  • put an API key in config.toml or export OPENAI_API_KEY");
        println!("  • list your tools in catalog.json and set agent.catalog_path");
        println!("  • `assay doctor` checks the interpreters");
        println!("  • `assay run -m \"compute 2+2\"`");
    }
    Ok(())
}

/// Returns whether the file was written.
fn write_if_absent(path: &Path, contents: &str) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(path, contents)?;
    Ok(true)
}

fn report(path: &Path, written: bool) {
    if written {
        println!("  ✅ wrote {}", path.display());
    } else {
        println!("  ·  kept existing {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_files_are_left_alone() {
        let path = std::env::temp_dir().join(format!("assay-onboard-{}.toml", std::process::id()));
        std::fs::write(&path, "custom = true").unwrap();

        assert!(!write_if_absent(&path, "replaced").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "custom = true");

        std::fs::remove_file(&path).unwrap();
        assert!(write_if_absent(&path, "fresh").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn empty_catalog_loads_back() {
        let json = serde_json::to_string_pretty(&ResourceCatalog::new()).unwrap();
        let catalog: ResourceCatalog = serde_json::from_str(&json).unwrap();
        assert!(catalog.is_empty());
    }
}
