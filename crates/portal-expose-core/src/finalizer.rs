//! Finalizer and default-class marker helpers.
//!
//! These operate on [`ObjectMeta`] so they apply to any resource.

use kube::api::ObjectMeta;

/// Finalizer guarding cleanup of the tunnel Deployment
pub const FINALIZER_NAME: &str = "portal.gosuda.org/cleanup-tunnel-deployment";

/// Annotation marking the cluster-default TunnelClass
pub const DEFAULT_CLASS_ANNOTATION: &str = "portal.gosuda.org/is-default-class";

/// Check if the object carries `finalizer`
#[must_use]
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == finalizer))
}

/// Add `finalizer` if missing. Returns true if the object changed.
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove `finalizer` if present. Returns true if the object changed.
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

/// Check if the object is annotated as the default class
#[must_use]
pub fn is_default_class(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(DEFAULT_CLASS_ANNOTATION))
        .is_some_and(|v| v == "true")
}

/// Strip the default-class annotation. Returns true if the object changed.
pub fn clear_default_class(meta: &mut ObjectMeta) -> bool {
    meta.annotations
        .as_mut()
        .and_then(|a| a.remove(DEFAULT_CLASS_ANNOTATION))
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const OTHER: &str = "other-finalizer";

    fn meta_with(finalizers: &[&str]) -> ObjectMeta {
        ObjectMeta {
            finalizers: Some(finalizers.iter().map(ToString::to_string).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn add_new_finalizer() {
        let mut meta = meta_with(&[OTHER]);
        assert!(add_finalizer(&mut meta, FINALIZER_NAME));
        assert_eq!(
            meta.finalizers.as_deref(),
            Some(&[OTHER.to_string(), FINALIZER_NAME.to_string()][..])
        );
    }

    #[test]
    fn add_existing_finalizer_is_noop() {
        let mut meta = meta_with(&[FINALIZER_NAME]);
        assert!(!add_finalizer(&mut meta, FINALIZER_NAME));
        assert_eq!(meta.finalizers.unwrap().len(), 1);
    }

    #[test]
    fn add_to_missing_list() {
        let mut meta = ObjectMeta::default();
        assert!(add_finalizer(&mut meta, FINALIZER_NAME));
        assert!(has_finalizer(&meta, FINALIZER_NAME));
    }

    #[test]
    fn remove_existing_finalizer() {
        let mut meta = meta_with(&[FINALIZER_NAME, OTHER]);
        assert!(remove_finalizer(&mut meta, FINALIZER_NAME));
        assert!(!has_finalizer(&meta, FINALIZER_NAME));
        assert!(has_finalizer(&meta, OTHER));
    }

    #[test]
    fn remove_absent_finalizer() {
        let mut meta = meta_with(&[OTHER]);
        assert!(!remove_finalizer(&mut meta, FINALIZER_NAME));

        let mut empty = ObjectMeta::default();
        assert!(!remove_finalizer(&mut empty, FINALIZER_NAME));
    }

    #[test]
    fn default_class_marker() {
        let mut meta = ObjectMeta {
            annotations: Some(BTreeMap::from([(
                DEFAULT_CLASS_ANNOTATION.to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        };
        assert!(is_default_class(&meta));
        assert!(clear_default_class(&mut meta));
        assert!(!is_default_class(&meta));
        assert!(!clear_default_class(&mut meta));

        let not_true = ObjectMeta {
            annotations: Some(BTreeMap::from([(
                DEFAULT_CLASS_ANNOTATION.to_string(),
                "false".to_string(),
            )])),
            ..Default::default()
        };
        assert!(!is_default_class(&not_true));
    }
}
