use std::collections::HashMap;

use serde::Deserialize;

use crate::error::UnhandledError;

/// Maps product types to the numeric codes downstream finance systems key
/// on. Loaded once at startup from a YAML asset and read-only afterwards;
/// a product type missing from the asset maps to 0, which classifies the
/// payment as non-reconcilable.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductCatalog {
    #[serde(rename = "product_code")]
    codes: HashMap<String, i32>,
}

impl ProductCatalog {
    pub fn load(path: &str) -> Result<Self, UnhandledError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::parse(&raw)?)
    }

    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn code(&self, product_type: &str) -> i32 {
        self.codes.get(product_type).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ASSET: &str = r#"
product_code:
  cic-report: 16220
  certified-copy-same-day: 16135
  secure-register-filing: 16800
"#;

    #[test]
    fn known_product_types_resolve() {
        let catalog = ProductCatalog::parse(ASSET).unwrap();
        assert_eq!(catalog.code("cic-report"), 16220);
        assert_eq!(catalog.code("certified-copy-same-day"), 16135);
    }

    #[test]
    fn unknown_product_types_map_to_zero() {
        let catalog = ProductCatalog::parse(ASSET).unwrap();
        assert_eq!(catalog.code("lfp-penalty"), 0);
        assert_eq!(catalog.code(""), 0);
    }

    #[test]
    fn bundled_asset_parses() {
        let catalog = ProductCatalog::parse(include_str!("../assets/product_code.yml")).unwrap();
        assert!(!catalog.is_empty());
        assert_eq!(catalog.code("cic-report"), 16220);
    }
}
