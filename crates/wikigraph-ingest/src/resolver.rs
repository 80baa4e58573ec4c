//! Property id -> relationship-type token.
//!
//! Tokens are derived from the property's display label, read back from the
//! `Property` node written during `load-nodes`. Labels that sanitize to the
//! same token share one relationship type.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::record::EntityKind;
use crate::store::GraphTransaction;

/// Sanitizes a display label into a relationship-type token.
///
/// Keeps ASCII letters, digits and whitespace, upper-cases, and joins the
/// remaining words with `_`. `"Instance Of!!"` becomes `INSTANCE_OF`.
#[must_use]
pub fn relationship_type_token(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Outcome of resolving one property id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Token to use as relationship type or attribute name.
    pub token: String,
    /// False when the token was derived from the raw property id.
    pub resolved: bool,
}

impl Resolution {
    fn fallback(property_id: &str) -> Self {
        let token = relationship_type_token(property_id);
        Self {
            token: if token.is_empty() {
                property_id.to_string()
            } else {
                token
            },
            resolved: false,
        }
    }
}

/// Resolves property ids through the store, caching results.
///
/// One resolver lives for one stage run; property labels do not change while
/// edges load.
#[derive(Debug, Default)]
pub struct PropertyLabelResolver {
    cache: HashMap<String, Resolution>,
}

impl PropertyLabelResolver {
    /// Creates a resolver with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `property_id` using lookups inside `tx`.
    ///
    /// A missing node, a failed lookup, or a label with no usable characters
    /// yields a token built from the raw id with `resolved == false`; the
    /// caller decides whether that is acceptable.
    pub async fn resolve(
        &mut self,
        tx: &mut dyn GraphTransaction,
        property_id: &str,
    ) -> Resolution {
        if let Some(hit) = self.cache.get(property_id) {
            return hit.clone();
        }

        let resolution = match tx
            .lookup_label(EntityKind::Property.label(), property_id)
            .await
        {
            Ok(Some(label)) => {
                let token = relationship_type_token(&label);
                if token.is_empty() {
                    debug!("Label '{}' of {} has no usable characters", label, property_id);
                    Resolution::fallback(property_id)
                } else {
                    Resolution {
                        token,
                        resolved: true,
                    }
                }
            }
            Ok(None) => Resolution::fallback(property_id),
            Err(e) => {
                // Not cached: a transient failure should not stick for the run.
                warn!("Label lookup for {} failed: {}", property_id, e);
                return Resolution::fallback(property_id);
            }
        };

        self.cache
            .insert(property_id.to_string(), resolution.clone());
        resolution
    }

    /// Number of cached resolutions.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphStore, InMemoryGraphStore, NodeRow};
    use proptest::prelude::*;

    #[test]
    fn test_token_examples() {
        assert_eq!(relationship_type_token("instance of"), "INSTANCE_OF");
        assert_eq!(relationship_type_token("Instance Of!!"), "INSTANCE_OF");
        assert_eq!(relationship_type_token("  part   of "), "PART_OF");
        assert_eq!(relationship_type_token("ISO 639-1 code"), "ISO_6391_CODE");
        assert_eq!(relationship_type_token("P31"), "P31");
        assert_eq!(relationship_type_token("!!!"), "");
    }

    #[test]
    fn test_fallback_keeps_raw_id() {
        assert_eq!(
            Resolution::fallback("P580"),
            Resolution {
                token: "P580".to_string(),
                resolved: false
            }
        );
        // nothing survives sanitation
        assert_eq!(Resolution::fallback("??").token, "??");
    }

    fn seed(store: &InMemoryGraphStore, id: &str, label: &str) {
        tokio_test::block_on(async {
            let mut tx = store.begin().await.unwrap();
            let row = NodeRow {
                id: id.to_string(),
                page_id: None,
                label: Some(label.to_string()),
                description: None,
            };
            tx.upsert_nodes("Property", &[row]).await.unwrap();
            tx.commit().await.unwrap();
        });
    }

    #[test]
    fn test_resolve_uses_store_label_and_caches() {
        let store = InMemoryGraphStore::new();
        seed(&store, "P31", "instance of");
        seed(&store, "P1", "漢字");

        tokio_test::block_on(async {
            let mut resolver = PropertyLabelResolver::new();
            let mut tx = store.begin().await.unwrap();

            let hit = resolver.resolve(tx.as_mut(), "P31").await;
            assert_eq!(hit.token, "INSTANCE_OF");
            assert!(hit.resolved);

            let miss = resolver.resolve(tx.as_mut(), "P9999").await;
            assert_eq!(miss.token, "P9999");
            assert!(!miss.resolved);

            let empty = resolver.resolve(tx.as_mut(), "P1").await;
            assert_eq!(empty.token, "P1");
            assert!(!empty.resolved);

            assert_eq!(resolver.cached(), 3);
        });
    }

    proptest! {
        #[test]
        fn prop_token_is_deterministic_and_clean(label in ".{0,40}") {
            let token = relationship_type_token(&label);
            prop_assert_eq!(&token, &relationship_type_token(&label));
            prop_assert!(token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(!token.starts_with('_'));
            prop_assert!(!token.ends_with('_'));
            prop_assert!(!token.contains("__"));
        }

        #[test]
        fn prop_token_ignores_case_and_punctuation(words in proptest::collection::vec("[a-z]{1,8}", 1..5)) {
            let plain = words.join(" ");
            let noisy = format!("{}!!", words.join("  ").to_uppercase());
            prop_assert_eq!(relationship_type_token(&plain), relationship_type_token(&noisy));
        }
    }
}
