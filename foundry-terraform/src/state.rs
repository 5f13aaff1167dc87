//! Terraform state types
//!
//! The subset of the Terraform JSON state format the converter reads: a
//! module tree whose modules carry flat resource lists with decoded
//! attribute values.

use serde::Deserialize;

/// A module in the state tree
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateModule {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub resources: Vec<StateResource>,
    #[serde(default)]
    pub child_modules: Vec<StateModule>,
}

/// A single resource instance in the state
#[derive(Debug, Clone, Deserialize)]
pub struct StateResource {
    /// Full address including any count/for_each index, e.g.
    /// `module.dev.aws_instance.main[0]`.
    pub address: String,
    pub mode: ResourceMode,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default, rename = "values")]
    pub attribute_values: serde_json::Map<String, serde_json::Value>,
}

impl StateResource {
    /// The address without the trailing index specifier; this is what the
    /// dependency graph uses to label nodes.
    pub fn label(&self) -> &str {
        label_of(&self.address)
    }
}

/// Strips the count specifier from an address, e.g.
/// `module.dev.aws_instance.main[0]` becomes `module.dev.aws_instance.main`.
pub fn label_of(address: &str) -> &str {
    match address.find('[') {
        Some(index) => &address[..index],
        None => address,
    }
}

/// Whether a resource is managed or a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    Managed,
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_strips_count_specifier() {
        assert_eq!(label_of("aws_instance.dev[0]"), "aws_instance.dev");
        assert_eq!(
            label_of("module.ec2.aws_instance.dev[\"a\"]"),
            "module.ec2.aws_instance.dev"
        );
        assert_eq!(label_of("aws_instance.dev"), "aws_instance.dev");
    }
}
