//! Progress updates
//!
//! Accepts incremental worker reports: log batches, template readmes, and
//! parameter schemas. Logs fan out to the per-job notify channel carrying
//! the lowest inserted id so subscribers can resume without loss.

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use foundry_core::codec;
use foundry_core::domain::job::JobType;
use foundry_core::domain::parameter::{
    ParameterDestinationScheme, ParameterSchema, ParameterSourceScheme,
};
use foundry_core::dto::job::{UpdateJobRequest, UpdateJobResponse};

use crate::parameter::{self, ComputeScope};
use crate::service::{
    computed_values_to_wire, job_logs_channel, parse_job_id, JobError, JobLogsNotifyMessage,
    Server,
};
use crate::store::InsertJobLogsParams;

impl Server {
    /// Applies one progress report from the owning daemon. The response
    /// always carries the cooperative-cancel flag.
    pub async fn update_job(
        &self,
        request: UpdateJobRequest,
    ) -> Result<UpdateJobResponse, JobError> {
        let job_id = parse_job_id(&request.job_id)?;
        tracing::debug!("update for job {} starting", job_id);
        let job = self.owned_job(job_id).await?;

        self.store.update_job(job_id, Utc::now()).await?;

        if !request.logs.is_empty() {
            let mut params = InsertJobLogsParams {
                job_id,
                ..Default::default()
            };
            for log in &request.logs {
                let created_at = Utc
                    .timestamp_millis_opt(log.created_at)
                    .single()
                    .ok_or_else(|| {
                        JobError::Protocol(format!("invalid log timestamp: {}", log.created_at))
                    })?;
                params.created_at.push(created_at);
                params.source.push(codec::log_source_from_wire(log.source));
                params.level.push(codec::log_level_from_wire(log.level));
                params.stage.push(log.stage.clone());
                params.output.push(log.output.clone());
            }
            let inserted = self.store.insert_job_logs(params).await?;

            // Publish the lowest inserted id so the log stream fetches
            // everything from that point.
            if let Some(lowest) = inserted.iter().map(|log| log.id).min() {
                let message = serde_json::to_vec(&JobLogsNotifyMessage {
                    created_after: lowest - 1,
                    end_of_logs: false,
                })
                .map_err(|err| JobError::Protocol(format!("marshal log notification: {err}")))?;
                self.pubsub
                    .publish(&job_logs_channel(job_id), &message)
                    .await?;
                tracing::debug!("published {} log(s) for job {}", inserted.len(), job_id);
            }
        }

        if let Some(readme) = &request.readme {
            if !readme.is_empty() {
                self.store
                    .update_template_version_description_by_job(
                        job_id,
                        readme.clone(),
                        Utc::now(),
                    )
                    .await?;
            }
        }

        let mut parameter_values = Vec::new();
        if !request.parameter_schemas.is_empty() {
            for (index, wire_schema) in request.parameter_schemas.iter().enumerate() {
                self.store
                    .insert_parameter_schema(schema_from_wire(job_id, index as i32, wire_schema))
                    .await?;
            }

            // An import pins schemas for a version that may already belong
            // to a template; resolve against it so template-scope values
            // apply.
            let template_id = if job.job_type == JobType::TemplateVersionImport {
                self.store.get_template_version_by_job(job_id).await?.template_id
            } else {
                None
            };

            let computed = parameter::compute(
                self.store(),
                &ComputeScope {
                    template_import_job_id: job_id,
                    template_id,
                    workspace_id: None,
                    additional_values: Vec::new(),
                },
            )
            .await?;
            parameter_values = computed_values_to_wire(computed)?;
        }

        Ok(UpdateJobResponse {
            canceled: job.canceled_at.is_some(),
            parameter_values,
        })
    }
}

fn schema_from_wire(
    job_id: Uuid,
    index: i32,
    wire: &foundry_core::dto::parameter::ParameterSchema,
) -> ParameterSchema {
    let (default_source_scheme, default_source_value) = match &wire.default_source {
        // A parameter doesn't have to define a default source.
        None => (ParameterSourceScheme::None, String::new()),
        Some(source) => (
            codec::parameter_source_scheme_from_wire(source.scheme),
            source.value.clone(),
        ),
    };
    let default_destination_scheme = match &wire.default_destination {
        None => ParameterDestinationScheme::None,
        Some(destination) => codec::parameter_destination_scheme_from_wire(destination.scheme),
    };

    ParameterSchema {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        job_id,
        name: wire.name.clone(),
        description: wire.description.clone(),
        default_source_scheme,
        default_source_value,
        allow_override_source: wire.allow_override_source,
        default_destination_scheme,
        allow_override_destination: wire.allow_override_destination,
        redisplay_value: wire.redisplay_value,
        validation_error: wire.validation_error.clone(),
        validation_condition: wire.validation_condition.clone(),
        validation_type_system: codec::parameter_type_system_from_wire(
            wire.validation_type_system,
        ),
        validation_value_type: wire.validation_value_type.clone(),
        index,
    }
}
