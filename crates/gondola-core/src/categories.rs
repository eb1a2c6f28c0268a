use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::ConfigError;

/// Shape of `config/categories.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesFile {
    /// Storefront category slugs, e.g. `bebidas` or `pet-shop`.
    pub categories: Vec<String>,
}

/// Load and validate the category list from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_categories(path: &Path) -> Result<CategoriesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CategoriesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_categories(&content)
}

fn parse_categories(content: &str) -> Result<CategoriesFile, ConfigError> {
    let mut file: CategoriesFile = serde_yaml::from_str(content)?;
    for slug in &mut file.categories {
        *slug = slug.trim().to_string();
    }
    validate_categories(&file)?;
    Ok(file)
}

fn validate_categories(file: &CategoriesFile) -> Result<(), ConfigError> {
    if file.categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one category must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for slug in &file.categories {
        if slug.is_empty() {
            return Err(ConfigError::Validation(
                "category slugs must be non-empty".to_string(),
            ));
        }
        if slug.contains(|c: char| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
            return Err(ConfigError::Validation(format!(
                "category '{slug}' is not a bare path segment"
            )));
        }
        if !seen.insert(slug.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category: '{slug}'"
            )));
        }
    }

    Ok(())
}
