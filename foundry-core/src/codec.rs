//! Enum codec
//!
//! Bidirectional mappings between the wire enums of the daemon protocol and
//! the storage enums of the domain model, plus the storage-string form each
//! storage enum takes in the database. Unknown inputs fail rather than
//! defaulting.

use std::str::FromStr;

use crate::domain::job::{JobType, LogLevel, LogSource, ProvisionerKind, StorageMethod};
use crate::domain::parameter::{
    ParameterDestinationScheme, ParameterScope, ParameterSourceScheme, ParameterTypeSystem,
};
use crate::domain::resource::{AppHealth, AppSharingLevel};
use crate::domain::workspace::WorkspaceTransition;
use crate::dto;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unknown {kind} value: {value:?}")]
    UnknownEnumValue { kind: &'static str, value: String },
}

impl CodecError {
    fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownEnumValue {
            kind,
            value: value.to_string(),
        }
    }
}

// =============================================================================
// Storage string forms
// =============================================================================

macro_rules! storage_strings {
    ($ty:ty, $kind:literal, { $($variant:path => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = CodecError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(CodecError::unknown($kind, other)),
                }
            }
        }
    };
}

storage_strings!(JobType, "job type", {
    JobType::WorkspaceBuild => "workspace_build",
    JobType::TemplateVersionImport => "template_version_import",
    JobType::TemplateVersionDryRun => "template_version_dry_run",
});

storage_strings!(ProvisionerKind, "provisioner kind", {
    ProvisionerKind::Terraform => "terraform",
    ProvisionerKind::Echo => "echo",
});

storage_strings!(StorageMethod, "storage method", {
    StorageMethod::File => "file",
});

storage_strings!(LogLevel, "log level", {
    LogLevel::Trace => "trace",
    LogLevel::Debug => "debug",
    LogLevel::Info => "info",
    LogLevel::Warn => "warn",
    LogLevel::Error => "error",
});

storage_strings!(LogSource, "log source", {
    LogSource::ProvisionerDaemon => "provisioner_daemon",
    LogSource::Provisioner => "provisioner",
});

storage_strings!(WorkspaceTransition, "workspace transition", {
    WorkspaceTransition::Start => "start",
    WorkspaceTransition::Stop => "stop",
    WorkspaceTransition::Delete => "delete",
});

storage_strings!(ParameterScope, "parameter scope", {
    ParameterScope::Template => "template",
    ParameterScope::ImportJob => "import_job",
    ParameterScope::Workspace => "workspace",
});

storage_strings!(ParameterSourceScheme, "parameter source scheme", {
    ParameterSourceScheme::None => "none",
    ParameterSourceScheme::Data => "data",
});

storage_strings!(ParameterDestinationScheme, "parameter destination scheme", {
    ParameterDestinationScheme::None => "none",
    ParameterDestinationScheme::EnvironmentVariable => "environment_variable",
    ParameterDestinationScheme::ProvisionerVariable => "provisioner_variable",
});

storage_strings!(ParameterTypeSystem, "parameter type system", {
    ParameterTypeSystem::None => "none",
    ParameterTypeSystem::Hcl => "hcl",
});

storage_strings!(AppSharingLevel, "app sharing level", {
    AppSharingLevel::Owner => "owner",
    AppSharingLevel::Authenticated => "authenticated",
    AppSharingLevel::Public => "public",
});

storage_strings!(AppHealth, "app health", {
    AppHealth::Disabled => "disabled",
    AppHealth::Initializing => "initializing",
    AppHealth::Healthy => "healthy",
    AppHealth::Unhealthy => "unhealthy",
});

// =============================================================================
// Wire <-> storage conversions
// =============================================================================

pub fn log_level_from_wire(level: dto::job::LogLevel) -> LogLevel {
    match level {
        dto::job::LogLevel::Trace => LogLevel::Trace,
        dto::job::LogLevel::Debug => LogLevel::Debug,
        dto::job::LogLevel::Info => LogLevel::Info,
        dto::job::LogLevel::Warn => LogLevel::Warn,
        dto::job::LogLevel::Error => LogLevel::Error,
    }
}

pub fn log_level_to_wire(level: LogLevel) -> dto::job::LogLevel {
    match level {
        LogLevel::Trace => dto::job::LogLevel::Trace,
        LogLevel::Debug => dto::job::LogLevel::Debug,
        LogLevel::Info => dto::job::LogLevel::Info,
        LogLevel::Warn => dto::job::LogLevel::Warn,
        LogLevel::Error => dto::job::LogLevel::Error,
    }
}

pub fn log_source_from_wire(source: dto::job::LogSource) -> LogSource {
    match source {
        dto::job::LogSource::ProvisionerDaemon => LogSource::ProvisionerDaemon,
        dto::job::LogSource::Provisioner => LogSource::Provisioner,
    }
}

pub fn log_source_to_wire(source: LogSource) -> dto::job::LogSource {
    match source {
        LogSource::ProvisionerDaemon => dto::job::LogSource::ProvisionerDaemon,
        LogSource::Provisioner => dto::job::LogSource::Provisioner,
    }
}

pub fn parameter_source_scheme_from_wire(
    scheme: dto::parameter::ParameterSourceScheme,
) -> ParameterSourceScheme {
    match scheme {
        dto::parameter::ParameterSourceScheme::Data => ParameterSourceScheme::Data,
    }
}

pub fn parameter_source_scheme_to_wire(
    scheme: ParameterSourceScheme,
) -> Result<dto::parameter::ParameterSourceScheme, CodecError> {
    match scheme {
        ParameterSourceScheme::Data => Ok(dto::parameter::ParameterSourceScheme::Data),
        ParameterSourceScheme::None => Err(CodecError::unknown(
            "wire parameter source scheme",
            scheme.as_str(),
        )),
    }
}

pub fn parameter_destination_scheme_from_wire(
    scheme: dto::parameter::ParameterDestinationScheme,
) -> ParameterDestinationScheme {
    match scheme {
        dto::parameter::ParameterDestinationScheme::EnvironmentVariable => {
            ParameterDestinationScheme::EnvironmentVariable
        }
        dto::parameter::ParameterDestinationScheme::ProvisionerVariable => {
            ParameterDestinationScheme::ProvisionerVariable
        }
    }
}

pub fn parameter_destination_scheme_to_wire(
    scheme: ParameterDestinationScheme,
) -> Result<dto::parameter::ParameterDestinationScheme, CodecError> {
    match scheme {
        ParameterDestinationScheme::EnvironmentVariable => {
            Ok(dto::parameter::ParameterDestinationScheme::EnvironmentVariable)
        }
        ParameterDestinationScheme::ProvisionerVariable => {
            Ok(dto::parameter::ParameterDestinationScheme::ProvisionerVariable)
        }
        ParameterDestinationScheme::None => Err(CodecError::unknown(
            "wire parameter destination scheme",
            scheme.as_str(),
        )),
    }
}

pub fn parameter_type_system_from_wire(
    system: dto::parameter::ParameterTypeSystem,
) -> ParameterTypeSystem {
    match system {
        dto::parameter::ParameterTypeSystem::None => ParameterTypeSystem::None,
        dto::parameter::ParameterTypeSystem::Hcl => ParameterTypeSystem::Hcl,
    }
}

pub fn parameter_type_system_to_wire(
    system: ParameterTypeSystem,
) -> dto::parameter::ParameterTypeSystem {
    match system {
        ParameterTypeSystem::None => dto::parameter::ParameterTypeSystem::None,
        ParameterTypeSystem::Hcl => dto::parameter::ParameterTypeSystem::Hcl,
    }
}

/// Storage `delete` maps to wire `destroy`; the other transitions keep
/// their names.
pub fn transition_to_wire(transition: WorkspaceTransition) -> dto::job::Transition {
    match transition {
        WorkspaceTransition::Start => dto::job::Transition::Start,
        WorkspaceTransition::Stop => dto::job::Transition::Stop,
        WorkspaceTransition::Delete => dto::job::Transition::Destroy,
    }
}

pub fn transition_from_wire(transition: dto::job::Transition) -> WorkspaceTransition {
    match transition {
        dto::job::Transition::Start => WorkspaceTransition::Start,
        dto::job::Transition::Stop => WorkspaceTransition::Stop,
        dto::job::Transition::Destroy => WorkspaceTransition::Delete,
    }
}

pub fn app_sharing_level_from_wire(level: dto::resource::AppSharingLevel) -> AppSharingLevel {
    match level {
        dto::resource::AppSharingLevel::Owner => AppSharingLevel::Owner,
        dto::resource::AppSharingLevel::Authenticated => AppSharingLevel::Authenticated,
        dto::resource::AppSharingLevel::Public => AppSharingLevel::Public,
    }
}

pub fn app_sharing_level_to_wire(level: AppSharingLevel) -> dto::resource::AppSharingLevel {
    match level {
        AppSharingLevel::Owner => dto::resource::AppSharingLevel::Owner,
        AppSharingLevel::Authenticated => dto::resource::AppSharingLevel::Authenticated,
        AppSharingLevel::Public => dto::resource::AppSharingLevel::Public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_strings_round_trip() {
        let levels = [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ];
        for level in levels {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }

        let transitions = [
            WorkspaceTransition::Start,
            WorkspaceTransition::Stop,
            WorkspaceTransition::Delete,
        ];
        for transition in transitions {
            assert_eq!(
                transition.as_str().parse::<WorkspaceTransition>().unwrap(),
                transition
            );
        }

        let schemes = [
            ParameterDestinationScheme::None,
            ParameterDestinationScheme::EnvironmentVariable,
            ParameterDestinationScheme::ProvisionerVariable,
        ];
        for scheme in schemes {
            assert_eq!(
                scheme.as_str().parse::<ParameterDestinationScheme>().unwrap(),
                scheme
            );
        }
    }

    #[test]
    fn unknown_storage_string_fails() {
        let err = "bogus".parse::<LogLevel>().unwrap_err();
        assert!(matches!(err, CodecError::UnknownEnumValue { .. }));
        assert!("".parse::<WorkspaceTransition>().is_err());
        assert!("deleted".parse::<WorkspaceTransition>().is_err());
    }

    #[test]
    fn wire_round_trip() {
        let levels = [
            dto::job::LogLevel::Trace,
            dto::job::LogLevel::Debug,
            dto::job::LogLevel::Info,
            dto::job::LogLevel::Warn,
            dto::job::LogLevel::Error,
        ];
        for level in levels {
            assert_eq!(log_level_to_wire(log_level_from_wire(level)), level);
        }

        let sources = [
            dto::job::LogSource::ProvisionerDaemon,
            dto::job::LogSource::Provisioner,
        ];
        for source in sources {
            assert_eq!(log_source_to_wire(log_source_from_wire(source)), source);
        }

        let transitions = [
            dto::job::Transition::Start,
            dto::job::Transition::Stop,
            dto::job::Transition::Destroy,
        ];
        for transition in transitions {
            assert_eq!(
                transition_to_wire(transition_from_wire(transition)),
                transition
            );
        }
    }

    #[test]
    fn delete_maps_to_destroy() {
        assert_eq!(
            transition_to_wire(WorkspaceTransition::Delete),
            dto::job::Transition::Destroy
        );
        assert_eq!(
            transition_from_wire(dto::job::Transition::Destroy),
            WorkspaceTransition::Delete
        );
    }

    #[test]
    fn none_schemes_have_no_wire_form() {
        assert!(parameter_source_scheme_to_wire(ParameterSourceScheme::None).is_err());
        assert!(
            parameter_destination_scheme_to_wire(ParameterDestinationScheme::None).is_err()
        );
    }
}
