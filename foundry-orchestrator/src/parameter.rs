//! Parameter resolver
//!
//! Computes the ordered parameter values for a scope: the schemas pinned to
//! a template import overlaid with the values attached to the template, the
//! workspace, and any caller-supplied extras.

use std::collections::HashMap;

use uuid::Uuid;

use foundry_core::domain::parameter::{
    ParameterDestinationScheme, ParameterScope, ParameterSchema, ParameterSourceScheme,
    ParameterValue,
};

use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("no value for parameter {0:?}")]
    NoValueForParameter(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to resolve parameters against.
#[derive(Debug, Clone, Default)]
pub struct ComputeScope {
    /// The import job whose schemas define the parameter set.
    pub template_import_job_id: Uuid,
    pub template_id: Option<Uuid>,
    pub workspace_id: Option<Uuid>,
    /// Extra values layered on top, used by dry runs.
    pub additional_values: Vec<ParameterValue>,
}

/// A resolved parameter, ordered by its schema index.
#[derive(Debug, Clone)]
pub struct ComputedValue {
    pub schema_id: Uuid,
    pub name: String,
    pub source_value: String,
    pub destination_scheme: ParameterDestinationScheme,
    /// Whether the value came from the schema default rather than a scope.
    pub from_default: bool,
}

/// Resolves every parameter the import job declares. Fails when a schema
/// has neither a default nor a value in any scope.
pub async fn compute(
    store: &dyn Store,
    scope: &ComputeScope,
) -> Result<Vec<ComputedValue>, ComputeError> {
    let schemas = store
        .get_parameter_schemas_by_job(scope.template_import_job_id)
        .await?;
    let schema_by_name: HashMap<&str, &ParameterSchema> = schemas
        .iter()
        .map(|schema| (schema.name.as_str(), schema))
        .collect();

    let mut computed: HashMap<String, ComputedValue> = HashMap::new();
    for schema in &schemas {
        if schema.default_source_scheme == ParameterSourceScheme::Data {
            computed.insert(
                schema.name.clone(),
                ComputedValue {
                    schema_id: schema.id,
                    name: schema.name.clone(),
                    source_value: schema.default_source_value.clone(),
                    destination_scheme: schema.default_destination_scheme,
                    from_default: true,
                },
            );
        }
    }

    // Scopes apply in precedence order. Import-job and template values
    // always land; workspace and caller-supplied values only apply when
    // the schema permits overriding its source.
    let mut apply = |values: Vec<ParameterValue>, requires_override: bool| {
        for value in values {
            let Some(schema) = schema_by_name.get(value.name.as_str()) else {
                continue;
            };
            if requires_override && !schema.allow_override_source {
                continue;
            }
            computed.insert(
                value.name.clone(),
                ComputedValue {
                    schema_id: schema.id,
                    name: value.name,
                    source_value: value.source_value,
                    destination_scheme: value.destination_scheme,
                    from_default: false,
                },
            );
        }
    };

    apply(
        store
            .parameter_values_by_scope(ParameterScope::ImportJob, scope.template_import_job_id)
            .await?,
        false,
    );
    if let Some(template_id) = scope.template_id {
        apply(
            store
                .parameter_values_by_scope(ParameterScope::Template, template_id)
                .await?,
            false,
        );
    }
    if let Some(workspace_id) = scope.workspace_id {
        apply(
            store
                .parameter_values_by_scope(ParameterScope::Workspace, workspace_id)
                .await?,
            true,
        );
    }
    apply(scope.additional_values.clone(), true);

    schemas
        .iter()
        .map(|schema| {
            computed
                .remove(&schema.name)
                .ok_or_else(|| ComputeError::NoValueForParameter(schema.name.clone()))
        })
        .collect()
}
