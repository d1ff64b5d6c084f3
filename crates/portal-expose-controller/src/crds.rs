//! CRD manifest rendering.

use kube::CustomResourceExt;

use portal_expose_core::{PortalExpose, TunnelClass};

use crate::Result;

/// Render both CustomResourceDefinitions as a multi-document YAML stream.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn render_crds() -> Result<String> {
    let portal_expose = serde_yaml::to_string(&PortalExpose::crd())?;
    let tunnel_class = serde_yaml::to_string(&TunnelClass::crd())?;
    Ok(format!("{portal_expose}---\n{tunnel_class}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_kinds() {
        let yaml = render_crds().unwrap();
        let docs: Vec<serde_yaml::Value> = yaml
            .split("---\n")
            .map(|doc| serde_yaml::from_str(doc).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);

        assert_eq!(docs[0]["metadata"]["name"], "portalexposes.portal.gosuda.org");
        assert_eq!(docs[0]["spec"]["scope"], "Namespaced");
        assert_eq!(docs[1]["metadata"]["name"], "tunnelclasses.portal.gosuda.org");
        assert_eq!(docs[1]["spec"]["scope"], "Cluster");
    }

    #[test]
    fn exposure_schema_carries_constraints() {
        let crd = PortalExpose::crd();
        let schema = serde_json::to_value(&crd.spec.versions[0].schema).unwrap();
        let spec = &schema["openAPIV3Schema"]["properties"]["spec"]["properties"];

        assert_eq!(
            spec["app"]["properties"]["name"]["pattern"],
            "^[a-z0-9]([-a-z0-9]*[a-z0-9])?$"
        );
        assert_eq!(spec["app"]["properties"]["name"]["maxLength"], 63);
        assert_eq!(spec["relay"]["properties"]["targets"]["minItems"], 1);
    }
}
