/*!
The functions the bootstrap templates call.

Every function closes over one shared [`Snapshot`] and only reads from it, so expanding the custom
data and the CSE from the same snapshot always observes the same configuration. Functions are
grouped by what they inspect: [`cluster`] (orchestrator, identity and custom cloud facts),
[`network`] (plugins, proxies and outbound policy), [`node`] (the pool, its runtime and its kubelet)
and [`windows`].
*/
mod cluster;
pub(crate) mod network;
pub(crate) mod node;
mod windows;

use crate::snapshot::Snapshot;
use crate::template::{self, FuncMap};
use datamodel::nbc::KubernetesConfig;
use datamodel::NodeBootstrappingConfiguration;
use serde_json::Value;
use std::sync::Arc;

/// Collects functions bound to one snapshot.
pub(crate) struct Registry {
    funcs: FuncMap,
    snapshot: Arc<Snapshot>,
}

impl Registry {
    fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            funcs: FuncMap::new(),
            snapshot,
        }
    }

    /// Registers a function computed from the snapshot alone. Arguments are ignored.
    pub(crate) fn add<V, F>(&mut self, name: &'static str, func: F)
    where
        V: Into<Value>,
        F: Fn(&Snapshot) -> V + Send + Sync + 'static,
    {
        let snapshot = Arc::clone(&self.snapshot);
        self.funcs.insert(name, move |_| Ok(func(&snapshot).into()));
    }

    /// Registers a function that also reads its arguments.
    pub(crate) fn add_with_args<F>(&mut self, name: &'static str, func: F)
    where
        F: Fn(&Snapshot, &[Value]) -> template::Result<Value> + Send + Sync + 'static,
    {
        let snapshot = Arc::clone(&self.snapshot);
        self.funcs.insert(name, move |args| func(&snapshot, args));
    }

    fn into_func_map(self) -> FuncMap {
        self.funcs
    }
}

/// The string argument at `index`.
pub(crate) fn string_arg<'a>(
    function: &'static str,
    args: &'a [Value],
    index: usize,
) -> template::Result<&'a str> {
    match args.get(index) {
        Some(Value::String(value)) => Ok(value),
        Some(other) => template::error::CallSnafu {
            function,
            message: format!("argument {} must be a string, got {}", index + 1, other),
        }
        .fail(),
        None => template::error::CallSnafu {
            function,
            message: format!("missing argument {}", index + 1),
        }
        .fail(),
    }
}

/// A string field of the cluster-wide kubernetes config, empty when there is none.
pub(crate) fn k8s_field<'a>(
    nbc: &'a NodeBootstrappingConfiguration,
    field: fn(&KubernetesConfig) -> &String,
) -> &'a str {
    nbc.kubernetes_config()
        .map(|config| field(config).as_str())
        .unwrap_or_default()
}

/// An optional flag of the cluster-wide kubernetes config; unset reads as false.
pub(crate) fn k8s_flag(
    nbc: &NodeBootstrappingConfiguration,
    field: fn(&KubernetesConfig) -> Option<bool>,
) -> bool {
    nbc.kubernetes_config().and_then(field).unwrap_or(false)
}

/// The functions every template of a request can call.
pub fn base_func_map(snapshot: Arc<Snapshot>) -> FuncMap {
    let mut registry = Registry::new(snapshot);
    cluster::register(&mut registry);
    network::register(&mut registry);
    node::register(&mut registry);
    windows::register(&mut registry);

    // ARM evaluates the custom data again after expansion; these let a template emit literal
    // delimiters.
    registry.add("OpenBraces", |_| "{{");
    registry.add("CloseBraces", |_| "}}");
    registry.into_func_map()
}

fn lookup(map: &Value, name: &str) -> Value {
    map.get(name).cloned().unwrap_or(Value::Null)
}

/// The base functions plus the parameter and variable accessors of one outer template.
///
/// `GetParameter` reads `parameters[name].value` and `GetVariable` reads `variables[name]`; the
/// `*Property` forms read one field further. Missing entries read as null.
pub fn outer_func_map(snapshot: Arc<Snapshot>, variables: Value) -> FuncMap {
    let parameters = Value::Object(
        snapshot
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    );
    let mut funcs = base_func_map(snapshot);

    let params = Arc::new(parameters);
    let p = Arc::clone(&params);
    funcs.insert("GetParameter", move |args| {
        let name = string_arg("GetParameter", args, 0)?;
        Ok(lookup(&lookup(&p, name), "value"))
    });
    let p = params;
    funcs.insert("GetParameterProperty", move |args| {
        let name = string_arg("GetParameterProperty", args, 0)?;
        let property = string_arg("GetParameterProperty", args, 1)?;
        Ok(lookup(&lookup(&lookup(&p, name), "value"), property))
    });

    let vars = Arc::new(variables);
    let v = Arc::clone(&vars);
    funcs.insert("GetVariable", move |args| {
        let name = string_arg("GetVariable", args, 0)?;
        Ok(lookup(&v, name))
    });
    let v = vars;
    funcs.insert("GetVariableProperty", move |args| {
        let name = string_arg("GetVariableProperty", args, 0)?;
        let property = string_arg("GetVariableProperty", args, 1)?;
        Ok(lookup(&lookup(&v, name), property))
    });
    funcs
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::template::render;
    use datamodel::constants;
    use datamodel::nbc::OrchestratorProfile;
    use serde_json::json;

    pub(crate) fn nbc() -> NodeBootstrappingConfiguration {
        let mut nbc = NodeBootstrappingConfiguration::default();
        nbc.container_service.location = "southcentralus".to_string();
        nbc.container_service.properties.orchestrator_profile = Some(OrchestratorProfile {
            orchestrator_type: constants::KUBERNETES.to_string(),
            orchestrator_version: "1.31.0".to_string(),
            kubernetes_config: Some(KubernetesConfig::default()),
        });
        nbc.agent_pool_profile.name = "nodepool1".to_string();
        nbc.agent_pool_profile.vm_size = "Standard_DS2_v2".to_string();
        nbc
    }

    pub(crate) fn snapshot_of(nbc: NodeBootstrappingConfiguration) -> Arc<Snapshot> {
        let mut parameters = crate::params::get_parameters(&nbc);
        parameters.insert("custom".to_string(), json!({"value": {"a": "b"}}));
        Arc::new(Snapshot {
            nbc,
            parameters,
            ..Default::default()
        })
    }

    /// Expands `src` with the base functions of `nbc`.
    pub(crate) fn expand(nbc: NodeBootstrappingConfiguration, src: &str) -> String {
        render("test", src, &Value::Null, &base_func_map(snapshot_of(nbc))).unwrap()
    }

    #[test]
    fn test_outer_accessors() {
        let funcs = outer_func_map(
            snapshot_of(nbc()),
            json!({"cloudInitData": {"provisionScript": "abc"}, "TENANT_ID": "t"}),
        );
        let test_cases = vec![
            ("{{GetParameter \"location\"}}", "southcentralus"),
            ("{{GetParameterProperty \"custom\" \"a\"}}", "b"),
            ("{{GetParameter \"missing\"}}", ""),
            ("{{GetVariable \"TENANT_ID\"}}", "t"),
            (
                "{{GetVariableProperty \"cloudInitData\" \"provisionScript\"}}",
                "abc",
            ),
            ("{{GetVariableProperty \"cloudInitData\" \"missing\"}}", ""),
            ("{{OpenBraces}}x{{CloseBraces}}", "{{x}}"),
        ];
        for (src, expected) in test_cases {
            assert_eq!(
                render("test", src, &Value::Null, &funcs).unwrap(),
                expected,
                "{}",
                src
            );
        }
    }

    #[test]
    fn test_argument_errors() {
        let funcs = outer_func_map(snapshot_of(nbc()), Value::Null);
        assert!(render("test", "{{GetVariable}}", &Value::Null, &funcs).is_err());
        assert!(render("test", "{{GetVariable 1}}", &Value::Null, &funcs).is_err());
    }
}
