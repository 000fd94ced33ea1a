//! JSON manifest describing an authored entity graph.
//!
//! A manifest declares tasks, references, workflows and launch plans by
//! name. Nodes name the entity they run; names are unique across the whole
//! manifest. Types are written in the textual native type form, e.g.
//! `list[int]` or `dict[str, float]`.
//!
//! ```json
//! {
//!   "tasks": [{ "name": "square", "inputs": { "x": "int" }, "outputs": { "o0": "int" } }],
//!   "workflows": [{
//!     "name": "wf",
//!     "inputs": { "x": "int" },
//!     "outputs": { "o0": "int" },
//!     "nodes": [{ "id": "n0", "entity": "square", "inputs": { "x": { "promise": "start-node.x" } } }],
//!     "output_bindings": { "o0": { "promise": "n0.o0" } }
//!   }],
//!   "launch_plans": [{ "name": "wf_lp", "workflow": "wf", "fixed_inputs": { "x": 3 } }]
//! }
//! ```

use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use weft_core::{Identifier, ResourceType};
use weft_model::{
    Annotations, AuthRole, Binding, BindingData, BooleanExpression, BranchError, Labels, Literal,
    LiteralMap, NodeMetadata, Notification, OutputReference, Parameter, Primitive,
    RawOutputDataConfig, ResourceName, Resources, RetryStrategy, Scalar, Schedule, TaskMetadata,
    Variable, WorkflowFailurePolicy, WorkflowMetadata, WorkflowMetadataDefaults,
};
use weft_plan::{
    BranchNode, GLOBAL_INPUT_NODE_ID, LaunchPlan, LocalEntity, Node, ReferenceEntity, Task,
    Workflow,
};
use weft_types::{NativeType, Signature, TypeEngine};

/// Parsed manifest
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Tasks
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
    /// Entities registered elsewhere
    #[serde(default)]
    pub references: Vec<ReferenceDef>,
    /// Workflows
    #[serde(default)]
    pub workflows: Vec<WorkflowDef>,
    /// Launch plans
    #[serde(default)]
    pub launch_plans: Vec<LaunchPlanDef>,
}

/// Task declaration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDef {
    name: String,
    #[serde(default)]
    inputs: IndexMap<String, String>,
    #[serde(default)]
    outputs: IndexMap<String, String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    command: Option<Vec<String>>,
    /// Plugin task type; absent for container tasks
    #[serde(default)]
    plugin: Option<String>,
    #[serde(default)]
    task_type_version: u32,
    #[serde(default)]
    env: IndexMap<String, String>,
    #[serde(default)]
    config: IndexMap<String, String>,
    #[serde(default)]
    custom: Option<Value>,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    interruptible: Option<bool>,
    /// Enables result caching under this version
    #[serde(default)]
    cache_version: Option<String>,
    #[serde(default)]
    resources: Option<ResourceDef>,
}

/// Reference declaration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceDef {
    /// Local name nodes use
    name: String,
    resource_type: ResourceType,
    project: String,
    domain: String,
    /// Registered name; the local name when absent
    #[serde(default)]
    target: Option<String>,
    version: String,
    #[serde(default)]
    inputs: IndexMap<String, String>,
    #[serde(default)]
    outputs: IndexMap<String, String>,
}

/// Workflow declaration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDef {
    name: String,
    #[serde(default)]
    inputs: IndexMap<String, String>,
    #[serde(default)]
    outputs: IndexMap<String, String>,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    output_bindings: IndexMap<String, BindingDef>,
    #[serde(default)]
    on_failure: WorkflowFailurePolicy,
    #[serde(default)]
    interruptible: bool,
}

/// Node declaration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDef {
    id: String,
    /// Name of the entity to run
    #[serde(default)]
    entity: Option<String>,
    /// Inline conditional to run instead of an entity
    #[serde(default)]
    branch: Option<BranchDef>,
    #[serde(default)]
    upstream: Vec<String>,
    #[serde(default)]
    inputs: IndexMap<String, BindingDef>,
    #[serde(default)]
    resources: Option<ResourceDef>,
    #[serde(default)]
    aliases: IndexMap<String, String>,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    interruptible: Option<bool>,
}

/// Conditional declaration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchDef {
    #[serde(default)]
    name: Option<String>,
    cases: Vec<CaseDef>,
    #[serde(default, rename = "else")]
    otherwise: Option<Box<NodeDef>>,
    /// Failure message when no case matches
    #[serde(default)]
    error: Option<String>,
}

/// One case of a conditional
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseDef {
    condition: BooleanExpression,
    then: Box<NodeDef>,
}

/// Launch plan declaration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchPlanDef {
    name: String,
    workflow: String,
    #[serde(default)]
    default_inputs: IndexMap<String, Value>,
    #[serde(default)]
    fixed_inputs: IndexMap<String, Value>,
    #[serde(default)]
    schedule: Option<Schedule>,
    #[serde(default)]
    notifications: Vec<Notification>,
    #[serde(default)]
    labels: IndexMap<String, String>,
    #[serde(default)]
    annotations: IndexMap<String, String>,
    #[serde(default)]
    auth_role: Option<AuthRole>,
    #[serde(default)]
    raw_output_prefix: Option<String>,
    #[serde(default)]
    max_parallelism: Option<u32>,
}

/// Resource requests and limits by resource name
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDef {
    #[serde(default)]
    requests: IndexMap<ResourceName, String>,
    #[serde(default)]
    limits: IndexMap<ResourceName, String>,
}

impl ResourceDef {
    fn to_resources(&self) -> Resources {
        let requests = self
            .requests
            .iter()
            .fold(Resources::new(), |r, (name, value)| r.with_request(*name, value));
        self.limits
            .iter()
            .fold(requests, |r, (name, value)| r.with_limit(*name, value))
    }
}

/// Node input value: `{"promise": "node.output"}` or a JSON constant
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BindingDef {
    /// Output of another node
    Promise {
        /// `node_id.output`
        promise: String,
    },
    /// Constant
    Value(Value),
}

impl BindingDef {
    fn to_binding_data(&self) -> Result<BindingData> {
        match self {
            Self::Promise { promise } => promise_binding(promise),
            Self::Value(value) => constant_binding(value),
        }
    }
}

fn promise_binding(promise: &str) -> Result<BindingData> {
    let (node_id, var) = promise
        .split_once('.')
        .ok_or_else(|| eyre!("promise '{promise}' must have the form node.output"))?;
    Ok(BindingData::Promise(OutputReference {
        node_id: node_id.to_string(),
        var: var.to_string(),
    }))
}

/// Entities built from a manifest
#[derive(Debug, Default)]
pub struct Graph {
    entities: IndexMap<String, LocalEntity>,
}

impl Graph {
    /// Entity declared under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LocalEntity> {
        self.entities.get(name)
    }

    /// Registrable roots: tasks, then workflows, then launch plans, each in
    /// declaration order
    #[must_use]
    pub fn roots(&self) -> Vec<LocalEntity> {
        let by_kind = |kind: &'static str| {
            self.entities
                .values()
                .filter(move |e| e.kind() == kind)
                .cloned()
        };
        by_kind("task")
            .chain(by_kind("workflow"))
            .chain(by_kind("launch_plan"))
            .collect()
    }

    fn declare(&mut self, name: &str, entity: LocalEntity) -> Result<()> {
        if self.entities.contains_key(name) {
            bail!("'{name}' is declared more than once");
        }
        self.entities.insert(name.to_string(), entity);
        Ok(())
    }

    fn lookup(&self, name: &str, context: &str) -> Result<&LocalEntity> {
        self.entities
            .get(name)
            .ok_or_else(|| eyre!("{context} refers to unknown entity '{name}'"))
    }
}

impl Manifest {
    /// Read a manifest file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid manifest
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read manifest {}", path.display()))?;
        Self::from_json(&text).wrap_err_with(|| format!("invalid manifest {}", path.display()))
    }

    /// Parse a manifest
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a valid manifest
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the authored entity graph
    ///
    /// Workflows are created before any node is attached, so nodes may run
    /// workflows and launch plans declared later in the manifest.
    ///
    /// # Errors
    ///
    /// Returns error on duplicate or unknown names, malformed types, or
    /// nodes that depend on nodes declared after them
    pub fn build(&self) -> Result<Graph> {
        let mut graph = Graph::default();

        for def in &self.tasks {
            graph.declare(&def.name, build_task(def)?.into())?;
        }
        for def in &self.references {
            let target = def.target.clone().unwrap_or_else(|| def.name.clone());
            let reference = Identifier::new(
                def.resource_type,
                def.project.as_str(),
                def.domain.as_str(),
                target,
                def.version.as_str(),
            );
            let signature = signature(&def.inputs, &def.outputs, &def.name)?;
            graph.declare(&def.name, ReferenceEntity::new(reference, signature).into())?;
        }

        let mut workflows = Vec::with_capacity(self.workflows.len());
        for def in &self.workflows {
            let wf = Arc::new(Workflow::with_metadata(
                def.name.as_str(),
                signature(&def.inputs, &def.outputs, &def.name)?,
                WorkflowMetadata {
                    on_failure: def.on_failure,
                },
                WorkflowMetadataDefaults {
                    interruptible: def.interruptible,
                },
            ));
            graph.declare(&def.name, Arc::clone(&wf).into())?;
            workflows.push((def, wf));
        }

        for def in &self.launch_plans {
            let lp = build_launch_plan(def, &graph)?;
            graph.declare(&def.name, Arc::new(lp).into())?;
        }

        for (def, wf) in &workflows {
            populate_workflow(def, wf, &graph)
                .wrap_err_with(|| format!("in workflow '{}'", def.name))?;
        }
        Ok(graph)
    }
}

fn signature(
    inputs: &IndexMap<String, String>,
    outputs: &IndexMap<String, String>,
    owner: &str,
) -> Result<Signature> {
    let mut sig = Signature::new();
    for (name, text) in inputs {
        sig = sig.with_input(name.as_str(), parse_type(text, owner, name)?);
    }
    for (name, text) in outputs {
        sig = sig.with_output(name.as_str(), parse_type(text, owner, name)?);
    }
    Ok(sig)
}

fn parse_type(text: &str, owner: &str, var: &str) -> Result<NativeType> {
    text.parse::<NativeType>()
        .wrap_err_with(|| format!("type of '{var}' in '{owner}'"))
}

fn build_task(def: &TaskDef) -> Result<Arc<Task>> {
    let metadata = TaskMetadata {
        discoverable: def.cache_version.is_some(),
        timeout: def.timeout_secs.map(Duration::from_secs),
        retries: RetryStrategy {
            retries: def.retries,
        },
        interruptible: def.interruptible,
        discovery_version: def.cache_version.clone().unwrap_or_default(),
        ..TaskMetadata::default()
    };

    let mut builder = Task::builder(def.name.as_str())
        .signature(signature(&def.inputs, &def.outputs, &def.name)?)
        .metadata(metadata);
    if let Some(plugin) = &def.plugin {
        builder = builder.plugin(plugin.as_str());
    }
    builder = builder.task_type(
        def.plugin.as_deref().unwrap_or("python-task"),
        def.task_type_version,
    );
    if let Some(image) = &def.image {
        builder = builder.image(image.as_str());
    }
    if let Some(command) = &def.command {
        builder = builder.command(command.iter().cloned());
    }
    for (k, v) in &def.env {
        builder = builder.env(k.as_str(), v.as_str());
    }
    for (k, v) in &def.config {
        builder = builder.config(k.as_str(), v.as_str());
    }
    if let Some(custom) = &def.custom {
        builder = builder.custom(custom.clone());
    }
    if let Some(resources) = &def.resources {
        builder = builder.resources(resources.to_resources());
    }
    Ok(builder.build())
}

fn build_launch_plan(def: &LaunchPlanDef, graph: &Graph) -> Result<LaunchPlan> {
    let context = format!("launch plan '{}'", def.name);
    let LocalEntity::Workflow(wf) = graph.lookup(&def.workflow, &context)? else {
        bail!("{context} must launch a workflow, '{}' is not one", def.workflow);
    };

    let engine = TypeEngine::new();
    let mut lp = LaunchPlan::new(def.name.as_str(), Arc::clone(wf));
    for (name, value) in &def.default_inputs {
        let native = wf
            .signature()
            .inputs
            .get(name)
            .ok_or_else(|| eyre!("{context} sets a default for unknown input '{name}'"))?;
        let literal_type = engine
            .to_literal_type(native)
            .wrap_err_with(|| format!("{context} input '{name}'"))?;
        lp.parameters.insert(
            name.clone(),
            Parameter {
                var: Variable::new(literal_type),
                default: Some(literal(value)?),
                required: false,
            },
        );
    }
    lp.fixed_inputs = def
        .fixed_inputs
        .iter()
        .map(|(name, value)| -> Result<(String, Literal)> { Ok((name.clone(), literal(value)?)) })
        .collect::<Result<LiteralMap>>()?;
    lp.schedule = def.schedule.clone();
    lp.notifications = def.notifications.clone();
    if !def.labels.is_empty() {
        lp.labels = Some(Labels {
            values: def.labels.clone(),
        });
    }
    if !def.annotations.is_empty() {
        lp.annotations = Some(Annotations {
            values: def.annotations.clone(),
        });
    }
    lp.auth_role = def.auth_role.clone();
    lp.raw_output_data_config = def
        .raw_output_prefix
        .as_ref()
        .map(|prefix| RawOutputDataConfig {
            output_location_prefix: prefix.clone(),
        });
    lp.max_parallelism = def.max_parallelism;
    Ok(lp)
}

/// Nodes of one workflow built so far, by authored id
struct Scope {
    input: Arc<Node>,
    nodes: IndexMap<String, Arc<Node>>,
}

fn populate_workflow(def: &WorkflowDef, wf: &Workflow, graph: &Graph) -> Result<()> {
    let mut scope = Scope {
        input: Node::graph_input(),
        nodes: IndexMap::new(),
    };
    for node_def in &def.nodes {
        if scope.nodes.contains_key(&node_def.id) || node_def.id == GLOBAL_INPUT_NODE_ID {
            bail!("node id '{}' is used more than once", node_def.id);
        }
        let node = Arc::new(build_node(node_def, graph, &scope)?);
        scope.nodes.insert(node_def.id.clone(), Arc::clone(&node));
        wf.add_node(node);
    }
    for (var, binding) in &def.output_bindings {
        wf.add_output(Binding {
            var: var.clone(),
            binding: binding.to_binding_data()?,
        });
    }
    Ok(())
}

fn build_node(def: &NodeDef, graph: &Graph, scope: &Scope) -> Result<Node> {
    let context = format!("node '{}'", def.id);
    let entity = match (&def.entity, &def.branch) {
        (Some(name), None) => graph.lookup(name, &context)?.clone(),
        (None, Some(branch)) => Arc::new(build_branch(def, branch, graph, scope)?).into(),
        _ => bail!("{context} must set exactly one of 'entity' or 'branch'"),
    };

    let mut bindings = Vec::with_capacity(def.inputs.len());
    for (var, binding) in &def.inputs {
        bindings.push(Binding {
            var: var.clone(),
            binding: binding
                .to_binding_data()
                .wrap_err_with(|| format!("{context} input '{var}'"))?,
        });
    }

    let mut upstream: IndexSet<&str> = def.upstream.iter().map(String::as_str).collect();
    for binding in &bindings {
        upstream.extend(binding.upstream_node_ids());
    }

    let metadata = NodeMetadata {
        name: entity.name().to_string(),
        timeout: def.timeout_secs.map(Duration::from_secs),
        retries: def.retries,
        interruptible: def.interruptible,
    };
    let mut node = Node::new(def.id.as_str(), entity).with_metadata(metadata);
    for id in upstream {
        let dep = if id == GLOBAL_INPUT_NODE_ID {
            &scope.input
        } else {
            scope.nodes.get(id).ok_or_else(|| {
                eyre!("{context} depends on '{id}', which is not declared before it")
            })?
        };
        node = node.with_upstream(dep);
    }
    for binding in bindings {
        node = node.with_binding(binding);
    }
    if let Some(resources) = &def.resources {
        node = node.with_resources(resources.to_resources());
    }
    for (var, alias) in &def.aliases {
        node = node.with_alias(var.as_str(), alias.as_str());
    }
    Ok(node)
}

fn build_branch(
    owner: &NodeDef,
    def: &BranchDef,
    graph: &Graph,
    scope: &Scope,
) -> Result<BranchNode> {
    let mut cases = def.cases.iter();
    let first = cases
        .next()
        .ok_or_else(|| eyre!("branch in node '{}' has no cases", owner.id))?;
    let name = def.name.clone().unwrap_or_else(|| owner.id.clone());

    let mut branch = BranchNode::new(
        name,
        first.condition.clone(),
        Arc::new(build_node(&first.then, graph, scope)?),
    );
    for case in cases {
        branch = branch.elif(
            case.condition.clone(),
            Arc::new(build_node(&case.then, graph, scope)?),
        );
    }
    if let Some(otherwise) = &def.otherwise {
        branch = branch.otherwise(Arc::new(build_node(otherwise, graph, scope)?));
    }
    if let Some(message) = &def.error {
        branch = branch.fail(BranchError {
            failed_node_id: owner.id.clone(),
            message: message.clone(),
        });
    }
    Ok(branch)
}

fn primitive(value: &Value) -> Result<Option<Scalar>> {
    Ok(Some(match value {
        Value::Null => Scalar::NoneType,
        Value::Bool(b) => Scalar::Primitive(Primitive::Boolean(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Scalar::Primitive(Primitive::Integer(i)),
            (None, Some(f)) => Scalar::Primitive(Primitive::Float(f)),
            (None, None) => bail!("number {n} cannot be represented"),
        },
        Value::String(s) => Scalar::Primitive(Primitive::String(s.clone())),
        Value::Array(_) | Value::Object(_) => return Ok(None),
    }))
}

fn constant_binding(value: &Value) -> Result<BindingData> {
    if let Some(scalar) = primitive(value)? {
        return Ok(BindingData::Scalar(scalar));
    }
    match value {
        Value::Array(items) => Ok(BindingData::Collection(
            items.iter().map(constant_binding).collect::<Result<_>>()?,
        )),
        // A single-key `promise` object inside a container is an upstream output
        Value::Object(map) => match (map.len(), map.get("promise")) {
            (1, Some(Value::String(promise))) => promise_binding(promise),
            _ => Ok(BindingData::Map(
                map.iter()
                    .map(|(k, v)| -> Result<(String, BindingData)> {
                        Ok((k.clone(), constant_binding(v)?))
                    })
                    .collect::<Result<_>>()?,
            )),
        },
        _ => bail!("unsupported constant {value}"),
    }
}

fn literal(value: &Value) -> Result<Literal> {
    if let Some(scalar) = primitive(value)? {
        return Ok(Literal::Scalar(scalar));
    }
    match value {
        Value::Array(items) => Ok(Literal::Collection(
            items.iter().map(literal).collect::<Result<_>>()?,
        )),
        Value::Object(map) => Ok(Literal::Map(
            map.iter()
                .map(|(k, v)| -> Result<(String, Literal)> { Ok((k.clone(), literal(v)?)) })
                .collect::<Result<_>>()?,
        )),
        _ => bail!("unsupported literal {value}"),
    }
}
