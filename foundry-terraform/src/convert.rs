//! Resource conversion
//!
//! Consumes a Terraform state module tree and the text of `terraform graph`
//! to produce the normalized resources the orchestrator persists. Agents are
//! attached to the nearest managed host resource in the dependency graph,
//! apps to their agents, and metadata blocks to their targets.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;

use foundry_core::dto::resource::{
    Agent, AgentAuth, App, AppSharingLevel, Healthcheck, Resource, ResourceMetadata,
};
use foundry_core::slug;

use crate::graph::{Graph, GraphError};
use crate::state::{ResourceMode, StateModule, StateResource};

/// Attributes of the `coder_agent` resource.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentAttributes {
    auth: String,
    os: String,
    arch: String,
    dir: String,
    id: String,
    token: String,
    env: Option<HashMap<String, String>>,
    startup_script: String,
    connection_timeout: i32,
    troubleshooting_url: String,
}

/// Attributes of the `coder_app` resource.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppAttributes {
    agent_id: String,
    // Slug is required by current templates; older ones fall back to the
    // resource name.
    slug: String,
    display_name: String,
    // Deprecated in favor of display_name.
    name: String,
    icon: String,
    url: String,
    command: String,
    share: String,
    subdomain: bool,
    healthcheck: Option<Vec<HealthcheckAttributes>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HealthcheckAttributes {
    url: String,
    interval: i32,
    threshold: i32,
}

/// Attributes of the `coder_metadata` resource.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataAttributes {
    resource_id: String,
    hide: bool,
    icon: String,
    daily_cost: i32,
    item: Option<Vec<MetadataItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetadataItem {
    key: String,
    value: String,
    sensitive: bool,
    is_null: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("parse graph: {0}")]
    Graph(#[from] GraphError),
    #[error("decode {kind} attributes of {address:?}: {source}")]
    DecodeAttributes {
        kind: &'static str,
        address: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("couldn't find node on graph: {0:?}")]
    MissingGraphNode(String),
    #[error("invalid app slug {0:?}; set the slug property on each app to a lowercase hyphenated identifier")]
    InvalidSlug(String),
    #[error("duplicate app slug, must be unique per template: {0:?}")]
    DuplicateSlug(String),
}

/// Resource types that bind an agent to a cloud instance identity, and the
/// attribute carrying the instance id.
const INSTANCE_ID_ATTRIBUTES: [(&str, &str); 5] = [
    ("google_compute_instance", "instance_id"),
    ("aws_instance", "id"),
    ("aws_spot_instance_request", "spot_instance_id"),
    ("azurerm_linux_virtual_machine", "virtual_machine_id"),
    ("azurerm_windows_virtual_machine", "virtual_machine_id"),
];

/// Resource types whose machine size is surfaced on the emitted resource,
/// and the attribute carrying it.
const INSTANCE_TYPE_ATTRIBUTES: [(&str, &str); 5] = [
    ("google_compute_instance", "machine_type"),
    ("aws_instance", "instance_type"),
    ("aws_spot_instance_request", "instance_type"),
    ("azurerm_linux_virtual_machine", "size"),
    ("azurerm_windows_virtual_machine", "size"),
];

/// Converts a Terraform state module tree and the `terraform graph` text
/// into the resources the orchestrator persists.
pub fn convert_resources(
    module: &StateModule,
    raw_graph: &str,
) -> Result<Vec<Resource>, ConvertError> {
    let graph = Graph::parse(raw_graph)?;

    // Index every resource by its graph label, and by its id attribute when
    // present. Metadata blocks refer to their targets by id; everything else
    // goes through labels. Labels are kept sorted so iteration order, and
    // with it tie-breaking, stays deterministic.
    let mut resource_by_label: BTreeMap<&str, &StateResource> = BTreeMap::new();
    let mut label_by_id: HashMap<&str, &str> = HashMap::new();
    index_module(module, &mut resource_by_label, &mut label_by_id);

    // Associate each agent with the closest managed host resource that
    // depends on it.
    let mut agents_by_host: BTreeMap<String, Vec<Agent>> = BTreeMap::new();
    for resource in resource_by_label.values() {
        if resource.resource_type != "coder_agent" {
            continue;
        }
        let attrs: AgentAttributes = decode_attributes("agent", resource)?;
        let agent = Agent {
            id: attrs.id,
            name: resource.name.clone(),
            env: attrs.env.unwrap_or_default(),
            startup_script: attrs.startup_script,
            operating_system: attrs.os,
            architecture: attrs.arch,
            directory: attrs.dir,
            connection_timeout_seconds: attrs.connection_timeout,
            troubleshooting_url: attrs.troubleshooting_url,
            // Anything but explicit token auth means instance identity; the
            // id itself is resolved later from the host resource.
            auth: Some(if attrs.auth == "token" {
                AgentAuth::Token(attrs.token)
            } else {
                AgentAuth::InstanceId(String::new())
            }),
            apps: Vec::new(),
        };

        let label = resource.label();
        let node = graph
            .node_by_label(label)
            .ok_or_else(|| ConvertError::MissingGraphNode(label.to_string()))?;

        // Agents without a managed host anywhere above them are dropped.
        if let Some(host) = closest_resource(&graph, &resource_by_label, &node.name, true) {
            agents_by_host.entry(host).or_default().push(agent);
        }
    }

    // Explicit instance bindings override whatever auth the agent declared.
    for resource in resource_by_label.values() {
        if resource.resource_type != "coder_agent_instance" {
            continue;
        }
        let Some(agent_id) = resource.attribute_values.get("agent_id").and_then(|v| v.as_str())
        else {
            continue;
        };
        let Some(instance_id) =
            resource.attribute_values.get("instance_id").and_then(|v| v.as_str())
        else {
            continue;
        };
        for agents in agents_by_host.values_mut() {
            if let Some(agent) = agents.iter_mut().find(|agent| agent.id == agent_id) {
                agent.auth = Some(AgentAuth::InstanceId(instance_id.to_string()));
            }
        }
    }

    // Attach apps to every agent whose id matches, enforcing slug validity
    // and template-wide uniqueness.
    let mut app_slugs: HashSet<String> = HashSet::new();
    for resource in resource_by_label.values() {
        if resource.resource_type != "coder_app" {
            continue;
        }
        let mut attrs: AppAttributes = decode_attributes("app", resource)?;
        if attrs.slug.is_empty() {
            attrs.slug = resource.name.clone();
        }
        if attrs.display_name.is_empty() {
            attrs.display_name = if attrs.name.is_empty() {
                attrs.slug.clone()
            } else {
                attrs.name.clone()
            };
        }
        if !slug::is_valid_app_slug(&attrs.slug) {
            return Err(ConvertError::InvalidSlug(attrs.slug));
        }
        if !app_slugs.insert(attrs.slug.clone()) {
            return Err(ConvertError::DuplicateSlug(attrs.slug));
        }

        let sharing_level = match attrs.share.to_lowercase().as_str() {
            "authenticated" => AppSharingLevel::Authenticated,
            "public" => AppSharingLevel::Public,
            _ => AppSharingLevel::Owner,
        };
        let healthcheck = attrs
            .healthcheck
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|check| Healthcheck {
                url: check.url,
                interval: check.interval,
                threshold: check.threshold,
            });

        let app = App {
            slug: attrs.slug,
            display_name: attrs.display_name,
            command: attrs.command,
            url: attrs.url,
            icon: attrs.icon,
            subdomain: attrs.subdomain,
            sharing_level,
            healthcheck,
        };
        for agents in agents_by_host.values_mut() {
            for agent in agents.iter_mut() {
                if agent.id == attrs.agent_id {
                    agent.apps.push(app.clone());
                }
            }
        }
    }

    // Resolve metadata blocks onto their target resources.
    let mut metadata_by_label: BTreeMap<String, Vec<ResourceMetadata>> = BTreeMap::new();
    let mut hidden_by_label: HashMap<String, bool> = HashMap::new();
    let mut icon_by_label: HashMap<String, String> = HashMap::new();
    let mut cost_by_label: HashMap<String, i32> = HashMap::new();
    for resource in resource_by_label.values() {
        if resource.resource_type != "coder_metadata" {
            continue;
        }
        let attrs: MetadataAttributes = decode_attributes("metadata", resource)?;

        // A plan carries no resource ids, so fall back to the closest
        // managed resource below the metadata node.
        let target = if attrs.resource_id.is_empty() {
            graph
                .node_by_label(resource.label())
                .and_then(|node| closest_resource(&graph, &resource_by_label, &node.name, false))
        } else {
            label_by_id.get(attrs.resource_id.as_str()).map(|label| label.to_string())
        };
        let Some(target) = target else {
            continue;
        };

        hidden_by_label.insert(target.clone(), attrs.hide);
        icon_by_label.insert(target.clone(), attrs.icon);
        cost_by_label.insert(target.clone(), attrs.daily_cost);
        for item in attrs.item.unwrap_or_default() {
            metadata_by_label
                .entry(target.clone())
                .or_default()
                .push(ResourceMetadata {
                    key: item.key,
                    value: item.value,
                    sensitive: item.sensitive,
                    is_null: item.is_null,
                });
        }
    }

    // Emit every managed, non-Coder resource with its attachments.
    let mut resources = Vec::new();
    for (label, resource) in &resource_by_label {
        if resource.mode == ResourceMode::Data {
            continue;
        }
        if resource.resource_type.starts_with("coder_") {
            continue;
        }

        let mut agents = agents_by_host.remove(*label).unwrap_or_default();
        apply_automatic_instance_id(resource, &mut agents);

        resources.push(Resource {
            name: resource.name.clone(),
            resource_type: resource.resource_type.clone(),
            agents,
            metadata: metadata_by_label.remove(*label).unwrap_or_default(),
            hide: hidden_by_label.get(*label).copied().unwrap_or(false),
            icon: icon_by_label.get(*label).cloned().unwrap_or_default(),
            instance_type: instance_type_of(resource).unwrap_or_default(),
            daily_cost: cost_by_label.get(*label).copied().unwrap_or(0),
        });
    }

    Ok(resources)
}

fn index_module<'a>(
    module: &'a StateModule,
    resource_by_label: &mut BTreeMap<&'a str, &'a StateResource>,
    label_by_id: &mut HashMap<&'a str, &'a str>,
) {
    for child in &module.child_modules {
        index_module(child, resource_by_label, label_by_id);
    }
    for resource in &module.resources {
        let label = resource.label();
        resource_by_label.insert(label, resource);
        if let Some(id) = resource.attribute_values.get("id").and_then(|v| v.as_str()) {
            label_by_id.insert(id, label);
        }
    }
}

fn decode_attributes<T: for<'de> Deserialize<'de>>(
    kind: &'static str,
    resource: &StateResource,
) -> Result<T, ConvertError> {
    serde_json::from_value(serde_json::Value::Object(resource.attribute_values.clone())).map_err(
        |source| ConvertError::DecodeAttributes {
            kind,
            address: resource.address.clone(),
            source,
        },
    )
}

/// A candidate found during graph traversal.
struct GraphResource {
    label: String,
    depth: u32,
}

/// Walks the graph from `node_name` and returns the label of the closest
/// managed, non-Coder resource. `up` follows dependents (used for agents,
/// whose hosts reference them); otherwise dependencies are followed (used
/// for metadata, which references its target). Ties at equal depth break on
/// the lexicographically smaller label.
fn closest_resource(
    graph: &Graph,
    resource_by_label: &BTreeMap<&str, &StateResource>,
    node_name: &str,
    up: bool,
) -> Option<String> {
    let mut candidates = Vec::new();
    collect_resources(graph, resource_by_label, node_name, 0, up, &mut candidates);
    candidates
        .into_iter()
        .min_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.label.cmp(&b.label)))
        .map(|candidate| candidate.label)
}

fn collect_resources(
    graph: &Graph,
    resource_by_label: &BTreeMap<&str, &StateResource>,
    node_name: &str,
    depth: u32,
    up: bool,
    out: &mut Vec<GraphResource>,
) {
    let neighbors = if up {
        graph.sources_of(node_name)
    } else {
        graph.destinations_of(node_name)
    };
    for neighbor in neighbors {
        collect_resources(graph, resource_by_label, neighbor, depth + 1, up, out);

        let Some(label) = graph.node(neighbor).and_then(|node| node.label.as_deref()) else {
            continue;
        };
        let Some(resource) = resource_by_label.get(label) else {
            continue;
        };
        // Data sources can't host agents, and Coder resources never
        // associate with each other.
        if resource.mode != ResourceMode::Managed {
            continue;
        }
        if resource.resource_type.starts_with("coder_") {
            continue;
        }
        out.push(GraphResource {
            label: label.to_string(),
            depth,
        });
    }
}

/// Injects the host's instance identity into agents that declared neither a
/// token nor an explicit instance id.
fn apply_automatic_instance_id(resource: &StateResource, agents: &mut [Agent]) {
    let Some(attribute) = lookup(&INSTANCE_ID_ATTRIBUTES, &resource.resource_type) else {
        return;
    };
    let Some(instance_id) = resource.attribute_values.get(attribute).and_then(|v| v.as_str())
    else {
        return;
    };
    for agent in agents {
        if agent.token().is_some() || agent.instance_id().is_some() {
            continue;
        }
        agent.auth = Some(AgentAuth::InstanceId(instance_id.to_string()));
    }
}

fn instance_type_of(resource: &StateResource) -> Option<String> {
    let attribute = lookup(&INSTANCE_TYPE_ATTRIBUTES, &resource.resource_type)?;
    resource
        .attribute_values
        .get(attribute)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn lookup(table: &[(&str, &'static str)], resource_type: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(ty, _)| *ty == resource_type)
        .map(|(_, attribute)| *attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn managed(resource_type: &str, name: &str, values: serde_json::Value) -> StateResource {
        StateResource {
            address: format!("{resource_type}.{name}"),
            mode: ResourceMode::Managed,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attribute_values: values.as_object().cloned().unwrap_or_default(),
        }
    }

    fn module(resources: Vec<StateResource>) -> StateModule {
        StateModule {
            address: String::new(),
            resources,
            child_modules: Vec::new(),
        }
    }

    /// Builds graph text where every listed address is a node and each
    /// `(src, dst)` pair an edge.
    fn graph_text(nodes: &[&str], edges: &[(&str, &str)]) -> String {
        let mut out = String::from("digraph {\n\tsubgraph \"root\" {\n");
        for node in nodes {
            out.push_str(&format!(
                "\t\t\"[root] {node}\" [label = \"{node}\", shape = \"box\"]\n"
            ));
        }
        for (src, dst) in edges {
            out.push_str(&format!("\t\t\"[root] {src}\" -> \"[root] {dst}\"\n"));
        }
        out.push_str("\t}\n}\n");
        out
    }

    #[test]
    fn agent_attaches_to_host() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({"instance_type": "t3.micro"})),
            managed(
                "coder_agent",
                "dev",
                json!({"id": "agent-id", "auth": "token", "token": "abc", "os": "linux", "arch": "amd64"}),
            ),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        assert_eq!(resources.len(), 1);
        let resource = &resources[0];
        assert_eq!(resource.resource_type, "aws_instance");
        assert_eq!(resource.instance_type, "t3.micro");
        assert_eq!(resource.agents.len(), 1);
        let agent = &resource.agents[0];
        assert_eq!(agent.name, "dev");
        assert_eq!(agent.operating_system, "linux");
        assert_eq!(agent.token(), Some("abc"));
    }

    #[test]
    fn agent_host_tie_breaks_on_label() {
        let state = module(vec![
            managed("aws_instance", "a", json!({})),
            managed("aws_instance", "b", json!({})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
        ]);
        let graph = graph_text(
            &["aws_instance.a", "aws_instance.b", "coder_agent.dev"],
            &[
                ("aws_instance.b", "coder_agent.dev"),
                ("aws_instance.a", "coder_agent.dev"),
            ],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        let a = resources.iter().find(|r| r.name == "a").unwrap();
        let b = resources.iter().find(|r| r.name == "b").unwrap();
        assert_eq!(a.agents.len(), 1);
        assert!(b.agents.is_empty());
    }

    #[test]
    fn agent_without_host_is_dropped() {
        let state = module(vec![
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
            managed("aws_instance", "dev", json!({})),
        ]);
        // No edges between them.
        let graph = graph_text(&["coder_agent.dev", "aws_instance.dev"], &[]);

        let resources = convert_resources(&state, &graph).unwrap();
        assert_eq!(resources.len(), 1);
        assert!(resources[0].agents.is_empty());
    }

    #[test]
    fn automatic_instance_id_applies_without_token() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({"id": "i-0123456789"})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        let agent = &resources[0].agents[0];
        assert_eq!(agent.instance_id(), Some("i-0123456789"));
    }

    #[test]
    fn automatic_instance_id_skips_token_agents() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({"id": "i-0123456789"})),
            managed(
                "coder_agent",
                "dev",
                json!({"id": "agent-id", "auth": "token", "token": "secret"}),
            ),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        let agent = &resources[0].agents[0];
        assert_eq!(agent.token(), Some("secret"));
        assert_eq!(agent.instance_id(), None);
    }

    #[test]
    fn explicit_instance_binding_overrides() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({"id": "i-host"})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
            managed(
                "coder_agent_instance",
                "dev",
                json!({"agent_id": "agent-id", "instance_id": "i-explicit"}),
            ),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev", "coder_agent_instance.dev"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        let agent = &resources[0].agents[0];
        assert_eq!(agent.instance_id(), Some("i-explicit"));
    }

    #[test]
    fn apps_attach_by_agent_id() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
            managed(
                "coder_app",
                "code",
                json!({
                    "agent_id": "agent-id",
                    "slug": "code-server",
                    "share": "AUTHENTICATED",
                    "healthcheck": [{"url": "http://localhost:13337/healthz", "interval": 5, "threshold": 6}],
                }),
            ),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev", "coder_app.code"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        let agent = &resources[0].agents[0];
        assert_eq!(agent.apps.len(), 1);
        let app = &agent.apps[0];
        assert_eq!(app.slug, "code-server");
        // display_name falls back to the slug.
        assert_eq!(app.display_name, "code-server");
        assert_eq!(app.sharing_level, AppSharingLevel::Authenticated);
        assert_eq!(
            app.healthcheck.as_ref().unwrap().url,
            "http://localhost:13337/healthz"
        );
    }

    #[test]
    fn app_slug_defaults_to_resource_name() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
            managed("coder_app", "code", json!({"agent_id": "agent-id"})),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev", "coder_app.code"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        assert_eq!(resources[0].agents[0].apps[0].slug, "code");
    }

    #[test]
    fn invalid_app_slug_fails() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
            managed(
                "coder_app",
                "code",
                json!({"agent_id": "agent-id", "slug": "Not Valid"}),
            ),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_agent.dev", "coder_app.code"],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let err = convert_resources(&state, &graph).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSlug(slug) if slug == "Not Valid"));
    }

    #[test]
    fn duplicate_app_slug_fails() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({})),
            managed("coder_agent", "dev", json!({"id": "agent-id"})),
            managed(
                "coder_app",
                "one",
                json!({"agent_id": "agent-id", "slug": "ide"}),
            ),
            managed(
                "coder_app",
                "two",
                json!({"agent_id": "agent-id", "slug": "ide"}),
            ),
        ]);
        let graph = graph_text(
            &[
                "aws_instance.dev",
                "coder_agent.dev",
                "coder_app.one",
                "coder_app.two",
            ],
            &[("aws_instance.dev", "coder_agent.dev")],
        );

        let err = convert_resources(&state, &graph).unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateSlug(slug) if slug == "ide"));
    }

    #[test]
    fn metadata_targets_by_resource_id() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({"id": "i-target"})),
            managed(
                "coder_metadata",
                "about",
                json!({
                    "resource_id": "i-target",
                    "hide": true,
                    "icon": "/icon/server.svg",
                    "daily_cost": 20,
                    "item": [
                        {"key": "region", "value": "us-east-1"},
                        {"key": "secret", "value": "hunter2", "sensitive": true},
                        {"key": "empty", "is_null": true},
                    ],
                }),
            ),
        ]);
        let graph = graph_text(&["aws_instance.dev", "coder_metadata.about"], &[]);

        let resources = convert_resources(&state, &graph).unwrap();
        assert_eq!(resources.len(), 1);
        let resource = &resources[0];
        assert!(resource.hide);
        assert_eq!(resource.icon, "/icon/server.svg");
        assert_eq!(resource.daily_cost, 20);
        assert_eq!(resource.metadata.len(), 3);
        assert!(resource.metadata[1].sensitive);
        assert!(resource.metadata[2].is_null);
    }

    #[test]
    fn metadata_targets_nearest_resource_through_graph() {
        // No resource_id (a plan); the metadata depends on the instance, so
        // the downward walk finds it.
        let state = module(vec![
            managed("aws_instance", "dev", json!({})),
            managed(
                "coder_metadata",
                "about",
                json!({"hide": true, "item": [{"key": "region", "value": "sa-east-1"}]}),
            ),
        ]);
        let graph = graph_text(
            &["aws_instance.dev", "coder_metadata.about"],
            &[("coder_metadata.about", "aws_instance.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        assert!(resources[0].hide);
        assert_eq!(resources[0].metadata.len(), 1);
    }

    #[test]
    fn unresolvable_metadata_is_skipped() {
        let state = module(vec![
            managed("aws_instance", "dev", json!({})),
            managed(
                "coder_metadata",
                "about",
                json!({"item": [{"key": "region", "value": "us-east-1"}]}),
            ),
        ]);
        let graph = graph_text(&["aws_instance.dev", "coder_metadata.about"], &[]);

        let resources = convert_resources(&state, &graph).unwrap();
        assert!(resources[0].metadata.is_empty());
    }

    #[test]
    fn data_sources_are_not_emitted() {
        let mut data_source = managed("aws_ami", "ubuntu", json!({}));
        data_source.address = "data.aws_ami.ubuntu".to_string();
        data_source.mode = ResourceMode::Data;
        let state = module(vec![data_source, managed("aws_instance", "dev", json!({}))]);
        let graph = graph_text(&["aws_instance.dev", "data.aws_ami.ubuntu"], &[]);

        let resources = convert_resources(&state, &graph).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_type, "aws_instance");
    }

    #[test]
    fn child_module_resources_are_indexed() {
        let state = StateModule {
            address: String::new(),
            resources: vec![managed("coder_agent", "dev", json!({"id": "agent-id"}))],
            child_modules: vec![StateModule {
                address: "module.ec2".to_string(),
                resources: vec![StateResource {
                    address: "module.ec2.aws_instance.dev[0]".to_string(),
                    mode: ResourceMode::Managed,
                    resource_type: "aws_instance".to_string(),
                    name: "dev".to_string(),
                    attribute_values: serde_json::Map::new(),
                }],
                child_modules: Vec::new(),
            }],
        };
        let graph = graph_text(
            &["module.ec2.aws_instance.dev", "coder_agent.dev"],
            &[("module.ec2.aws_instance.dev", "coder_agent.dev")],
        );

        let resources = convert_resources(&state, &graph).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].agents.len(), 1);
    }
}
