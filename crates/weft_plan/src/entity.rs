//! Authored entity graph.
//!
//! These are the objects an authoring front end builds before registration:
//! tasks, workflows made of nodes, conditional branches, launch plans and
//! references to entities registered elsewhere. Every object gets an
//! [`EntityId`] at construction; handles are `Arc`s, so every reference to
//! "the same" entity shares that id.
//!
//! Apart from the node list of a workflow under construction and the
//! command override of a task, authored entities are immutable.

use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use weft_core::{EntityId, Identifier, ResourceType, SerializationSettings};
use weft_model::{
    Alias, Annotations, AuthRole, Binding, BooleanExpression, BranchError, Container, Labels,
    LiteralMap, NodeMetadata, Notification, ParameterMap, RawOutputDataConfig, Resources,
    Schedule, SecurityContext, TaskMetadata, WorkflowMetadata, WorkflowMetadataDefaults,
};
use weft_types::Signature;

/// Id of the synthetic node standing for workflow inputs
pub const GLOBAL_INPUT_NODE_ID: &str = "start-node";

/// Produces a task's command for given settings
pub type CommandFn = Arc<dyn Fn(&SerializationSettings) -> Vec<String> + Send + Sync>;

/// How a task is packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// User code baked into (or fetched into) a container the SDK builds
    AutoContainer,
    /// Backend plugin task with no user container
    Plugin,
}

/// Authored task
pub struct Task {
    id: EntityId,
    name: String,
    task_type: String,
    task_type_version: u32,
    kind: TaskKind,
    metadata: TaskMetadata,
    signature: Signature,
    image: Option<String>,
    command: Vec<String>,
    env: IndexMap<String, String>,
    resources: Resources,
    custom: Option<serde_json::Value>,
    config: IndexMap<String, String>,
    k8s_pod: Option<serde_json::Value>,
    security_context: Option<SecurityContext>,
    command_fn: RwLock<Option<CommandFn>>,
}

impl Task {
    /// Start building an auto-container task
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(name.into())
    }

    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin type
    #[must_use]
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Plugin payload version
    #[must_use]
    pub fn task_type_version(&self) -> u32 {
        self.task_type_version
    }

    /// Packaging kind
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Execution metadata
    #[must_use]
    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    /// Declared signature
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Plugin payload
    #[must_use]
    pub fn custom(&self) -> Option<&serde_json::Value> {
        self.custom.as_ref()
    }

    /// Plugin configuration
    #[must_use]
    pub fn config(&self) -> &IndexMap<String, String> {
        &self.config
    }

    /// Pod spec
    #[must_use]
    pub fn k8s_pod(&self) -> Option<&serde_json::Value> {
        self.k8s_pod.as_ref()
    }

    /// Security settings
    #[must_use]
    pub fn security_context(&self) -> Option<&SecurityContext> {
        self.security_context.as_ref()
    }

    /// Command used when no override is installed
    #[must_use]
    pub fn default_command(&self, _settings: &SerializationSettings) -> Vec<String> {
        self.command.clone()
    }

    /// Current command: the override if one is installed, else the default
    #[must_use]
    pub fn command(&self, settings: &SerializationSettings) -> Vec<String> {
        let guard = self.command_fn.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(f) => f(settings),
            None => self.default_command(settings),
        }
    }

    /// Whether a command override is installed
    #[must_use]
    pub fn has_command_override(&self) -> bool {
        self.command_fn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Install a command override
    pub fn set_command_fn(&self, f: CommandFn) {
        self.replace_command_fn(Some(f));
    }

    /// Remove any command override
    pub fn reset_command_fn(&self) {
        self.replace_command_fn(None);
    }

    /// Swap the override, returning the previous one
    pub fn replace_command_fn(&self, f: Option<CommandFn>) -> Option<CommandFn> {
        let mut guard = self
            .command_fn
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, f)
    }

    /// Container for this task, or `None` when no image can be resolved
    ///
    /// The task's own image wins over the settings image. Settings
    /// environment is applied first so task values override it.
    #[must_use]
    pub fn container(&self, settings: &SerializationSettings) -> Option<Container> {
        let image = self.image.clone().or_else(|| settings.image.clone())?;
        let mut env = settings.env.clone();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        Some(Container {
            image,
            command: Vec::new(),
            args: self.command(settings),
            resources: self.resources.clone(),
            env,
        })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("task_type", &self.task_type)
            .field("kind", &self.kind)
            .field("has_command_override", &self.has_command_override())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`]
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    name: String,
    task_type: String,
    task_type_version: u32,
    kind: TaskKind,
    metadata: TaskMetadata,
    signature: Signature,
    image: Option<String>,
    command: Option<Vec<String>>,
    env: IndexMap<String, String>,
    resources: Resources,
    custom: Option<serde_json::Value>,
    config: IndexMap<String, String>,
    k8s_pod: Option<serde_json::Value>,
    security_context: Option<SecurityContext>,
}

impl TaskBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            task_type: "python-task".to_string(),
            task_type_version: 0,
            kind: TaskKind::AutoContainer,
            metadata: TaskMetadata::default(),
            signature: Signature::default(),
            image: None,
            command: None,
            env: IndexMap::new(),
            resources: Resources::default(),
            custom: None,
            config: IndexMap::new(),
            k8s_pod: None,
            security_context: None,
        }
    }

    /// Make this a plugin task of the given type
    #[must_use]
    pub fn plugin(mut self, task_type: impl Into<String>) -> Self {
        self.kind = TaskKind::Plugin;
        self.task_type = task_type.into();
        self
    }

    /// Set the plugin type, keeping the packaging kind
    #[must_use]
    pub fn task_type(mut self, task_type: impl Into<String>, version: u32) -> Self {
        self.task_type = task_type.into();
        self.task_type_version = version;
        self
    }

    /// Set execution metadata
    #[must_use]
    pub fn metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the declared signature
    #[must_use]
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Set the container image
    #[must_use]
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the default command
    #[must_use]
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set container resources
    #[must_use]
    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Set the plugin payload
    #[must_use]
    pub fn custom(mut self, custom: serde_json::Value) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Add a plugin configuration entry
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Set the pod spec
    #[must_use]
    pub fn k8s_pod(mut self, pod: serde_json::Value) -> Self {
        self.k8s_pod = Some(pod);
        self
    }

    /// Set security settings
    #[must_use]
    pub fn security_context(mut self, ctx: SecurityContext) -> Self {
        self.security_context = Some(ctx);
        self
    }

    /// Finish the task
    #[must_use]
    pub fn build(self) -> Arc<Task> {
        let command = self
            .command
            .unwrap_or_else(|| default_execute_command(&self.name));
        Arc::new(Task {
            id: EntityId::new(),
            name: self.name,
            task_type: self.task_type,
            task_type_version: self.task_type_version,
            kind: self.kind,
            metadata: self.metadata,
            signature: self.signature,
            image: self.image,
            command,
            env: self.env,
            resources: self.resources,
            custom: self.custom,
            config: self.config,
            k8s_pod: self.k8s_pod,
            security_context: self.security_context,
            command_fn: RwLock::new(None),
        })
    }
}

/// Entrypoint invocation the runtime expands for a task execution
fn default_execute_command(task_name: &str) -> Vec<String> {
    [
        "weft-execute",
        "--inputs",
        "{{.input}}",
        "--output-prefix",
        "{{.outputPrefix}}",
        "--raw-output-data-prefix",
        "{{.rawOutputDataPrefix}}",
        "--task",
        task_name,
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Authored workflow
///
/// Nodes may be appended after construction while the workflow is being
/// authored; lowering reads a snapshot.
pub struct Workflow {
    id: EntityId,
    name: String,
    signature: Signature,
    metadata: WorkflowMetadata,
    metadata_defaults: WorkflowMetadataDefaults,
    nodes: RwLock<Vec<Arc<Node>>>,
    outputs: RwLock<Vec<Binding>>,
}

impl Workflow {
    /// Create an empty workflow
    #[must_use]
    pub fn new(name: impl Into<String>, signature: Signature) -> Arc<Self> {
        Arc::new(Self::with_metadata(
            name,
            signature,
            WorkflowMetadata::default(),
            WorkflowMetadataDefaults::default(),
        ))
    }

    /// Create an empty workflow with explicit metadata
    #[must_use]
    pub fn with_metadata(
        name: impl Into<String>,
        signature: Signature,
        metadata: WorkflowMetadata,
        metadata_defaults: WorkflowMetadataDefaults,
    ) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            signature,
            metadata,
            metadata_defaults,
            nodes: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
        }
    }

    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared signature
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Settings
    #[must_use]
    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    /// Node defaults
    #[must_use]
    pub fn metadata_defaults(&self) -> &WorkflowMetadataDefaults {
        &self.metadata_defaults
    }

    /// Append a node
    pub fn add_node(&self, node: Arc<Node>) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
    }

    /// Append an output binding
    pub fn add_output(&self, binding: Binding) {
        self.outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(binding);
    }

    /// Snapshot of the nodes in declaration order
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the output bindings
    #[must_use]
    pub fn output_bindings(&self) -> Vec<Binding> {
        self.outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for Workflow {
    // Nodes may point back at this workflow; print only their count.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes().len())
            .finish_non_exhaustive()
    }
}

/// Authored workflow node
#[derive(Debug)]
pub struct Node {
    id: EntityId,
    node_id: String,
    entity: Option<LocalEntity>,
    upstream: Vec<Arc<Node>>,
    bindings: Vec<Binding>,
    metadata: NodeMetadata,
    resources: Option<Resources>,
    aliases: Vec<Alias>,
    graph_input: bool,
}

impl Node {
    /// Node running `entity`
    #[must_use]
    pub fn new(node_id: impl Into<String>, entity: impl Into<LocalEntity>) -> Self {
        let entity = entity.into();
        let metadata = NodeMetadata {
            name: entity.name().to_string(),
            ..NodeMetadata::default()
        };
        Self {
            id: EntityId::new(),
            node_id: node_id.into(),
            entity: Some(entity),
            upstream: Vec::new(),
            bindings: Vec::new(),
            metadata,
            resources: None,
            aliases: Vec::new(),
            graph_input: false,
        }
    }

    /// Node with nothing to run
    #[must_use]
    pub fn empty(node_id: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            node_id: node_id.into(),
            entity: None,
            upstream: Vec::new(),
            bindings: Vec::new(),
            metadata: NodeMetadata::default(),
            resources: None,
            aliases: Vec::new(),
            graph_input: false,
        }
    }

    /// The sentinel standing for workflow inputs
    #[must_use]
    pub fn graph_input() -> Arc<Self> {
        Arc::new(Self {
            graph_input: true,
            ..Self::empty(GLOBAL_INPUT_NODE_ID)
        })
    }

    /// Add an upstream dependency
    #[must_use]
    pub fn with_upstream(mut self, node: &Arc<Node>) -> Self {
        self.upstream.push(Arc::clone(node));
        self
    }

    /// Add an input binding
    #[must_use]
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Replace node metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override task resources
    #[must_use]
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Rename an output
    #[must_use]
    pub fn with_alias(mut self, var: impl Into<String>, alias: impl Into<String>) -> Self {
        self.aliases.push(Alias {
            var: var.into(),
            alias: alias.into(),
        });
        self
    }

    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Authored node id
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Wrapped entity
    #[must_use]
    pub fn entity(&self) -> Option<&LocalEntity> {
        self.entity.as_ref()
    }

    /// Upstream nodes, sentinel included if authored so
    #[must_use]
    pub fn upstream(&self) -> &[Arc<Node>] {
        &self.upstream
    }

    /// Input bindings
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Metadata
    #[must_use]
    pub fn metadata(&self) -> &NodeMetadata {
        &self.metadata
    }

    /// Resource overrides
    #[must_use]
    pub fn resources(&self) -> Option<&Resources> {
        self.resources.as_ref()
    }

    /// Output aliases
    #[must_use]
    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Whether this is the workflow-input sentinel
    ///
    /// Only [`Node::graph_input`] builds one; an authored node that merely
    /// uses the sentinel id is an ordinary node.
    #[must_use]
    pub fn is_graph_input(&self) -> bool {
        self.graph_input
    }
}

/// One `if` arm of an authored branch
#[derive(Debug, Clone)]
pub struct Case {
    /// Guard
    pub condition: BooleanExpression,
    /// Node run when the guard holds
    pub then_node: Arc<Node>,
}

/// Authored conditional
#[derive(Debug)]
pub struct BranchNode {
    id: EntityId,
    name: String,
    case: Case,
    other: Vec<Case>,
    else_node: Option<Arc<Node>>,
    error: Option<BranchError>,
}

impl BranchNode {
    /// Branch with a single case
    #[must_use]
    pub fn new(name: impl Into<String>, condition: BooleanExpression, then_node: Arc<Node>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            case: Case {
                condition,
                then_node,
            },
            other: Vec::new(),
            else_node: None,
            error: None,
        }
    }

    /// Add an `elif` case
    #[must_use]
    pub fn elif(mut self, condition: BooleanExpression, then_node: Arc<Node>) -> Self {
        self.other.push(Case {
            condition,
            then_node,
        });
        self
    }

    /// Set the `else` node
    #[must_use]
    pub fn otherwise(mut self, node: Arc<Node>) -> Self {
        self.else_node = Some(node);
        self
    }

    /// Fail with `error` when no case matches
    #[must_use]
    pub fn fail(mut self, error: BranchError) -> Self {
        self.error = Some(error);
        self
    }

    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First case
    #[must_use]
    pub fn case(&self) -> &Case {
        &self.case
    }

    /// Further cases
    #[must_use]
    pub fn other(&self) -> &[Case] {
        &self.other
    }

    /// Else node
    #[must_use]
    pub fn else_node(&self) -> Option<&Arc<Node>> {
        self.else_node.as_ref()
    }

    /// No-match error
    #[must_use]
    pub fn error(&self) -> Option<&BranchError> {
        self.error.as_ref()
    }

    /// Then-nodes of every case followed by the else node
    pub fn leaf_nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        std::iter::once(&self.case.then_node)
            .chain(self.other.iter().map(|c| &c.then_node))
            .chain(self.else_node.iter())
    }
}

/// Authored launch plan
#[derive(Debug)]
pub struct LaunchPlan {
    id: EntityId,
    name: String,
    workflow: Arc<Workflow>,
    /// Schedule
    pub schedule: Option<Schedule>,
    /// Notifications
    pub notifications: Vec<Notification>,
    /// Inputs with defaults
    pub parameters: ParameterMap,
    /// Pinned inputs
    pub fixed_inputs: LiteralMap,
    /// Labels; empty when unset
    pub labels: Option<Labels>,
    /// Annotations; empty when unset
    pub annotations: Option<Annotations>,
    /// Role; settings default when unset
    pub auth_role: Option<AuthRole>,
    /// Raw output location; settings default when unset
    pub raw_output_data_config: Option<RawOutputDataConfig>,
    /// Concurrent node bound
    pub max_parallelism: Option<u32>,
}

impl LaunchPlan {
    /// Launch plan for `workflow` with nothing else set
    #[must_use]
    pub fn new(name: impl Into<String>, workflow: Arc<Workflow>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            workflow,
            schedule: None,
            notifications: Vec::new(),
            parameters: ParameterMap::new(),
            fixed_inputs: LiteralMap::new(),
            labels: None,
            annotations: None,
            auth_role: None,
            raw_output_data_config: None,
            max_parallelism: None,
        }
    }

    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launched workflow
    #[must_use]
    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }
}

/// Pointer to an entity registered outside this run
#[derive(Debug)]
pub struct ReferenceEntity {
    id: EntityId,
    reference: Identifier,
    signature: Signature,
}

impl ReferenceEntity {
    /// Reference to `reference`
    #[must_use]
    pub fn new(reference: Identifier, signature: Signature) -> Arc<Self> {
        Arc::new(Self {
            id: EntityId::new(),
            reference,
            signature,
        })
    }

    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Target identifier
    #[must_use]
    pub fn reference(&self) -> &Identifier {
        &self.reference
    }

    /// Target resource type
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.reference.resource_type
    }

    /// Target interface
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

/// Any authored entity
#[derive(Debug, Clone)]
pub enum LocalEntity {
    /// Task
    Task(Arc<Task>),
    /// Workflow
    Workflow(Arc<Workflow>),
    /// Node
    Node(Arc<Node>),
    /// Launch plan
    LaunchPlan(Arc<LaunchPlan>),
    /// Conditional
    Branch(Arc<BranchNode>),
    /// Reference
    Reference(Arc<ReferenceEntity>),
}

impl LocalEntity {
    /// Identity
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Task(t) => t.id(),
            Self::Workflow(w) => w.id(),
            Self::Node(n) => n.id(),
            Self::LaunchPlan(lp) => lp.id(),
            Self::Branch(b) => b.id(),
            Self::Reference(r) => r.id(),
        }
    }

    /// Name, or node id for nodes
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Task(t) => t.name(),
            Self::Workflow(w) => w.name(),
            Self::Node(n) => n.node_id(),
            Self::LaunchPlan(lp) => lp.name(),
            Self::Branch(b) => b.name(),
            Self::Reference(r) => &r.reference().name,
        }
    }

    /// Short label of the variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Task(_) => "task",
            Self::Workflow(_) => "workflow",
            Self::Node(_) => "node",
            Self::LaunchPlan(_) => "launch_plan",
            Self::Branch(_) => "branch",
            Self::Reference(_) => "reference",
        }
    }
}

impl fmt::Display for LocalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.name())
    }
}

impl From<Arc<Task>> for LocalEntity {
    fn from(t: Arc<Task>) -> Self {
        Self::Task(t)
    }
}

impl From<Arc<Workflow>> for LocalEntity {
    fn from(w: Arc<Workflow>) -> Self {
        Self::Workflow(w)
    }
}

impl From<Arc<Node>> for LocalEntity {
    fn from(n: Arc<Node>) -> Self {
        Self::Node(n)
    }
}

impl From<Arc<LaunchPlan>> for LocalEntity {
    fn from(lp: Arc<LaunchPlan>) -> Self {
        Self::LaunchPlan(lp)
    }
}

impl From<Arc<BranchNode>> for LocalEntity {
    fn from(b: Arc<BranchNode>) -> Self {
        Self::Branch(b)
    }
}

impl From<Arc<ReferenceEntity>> for LocalEntity {
    fn from(r: Arc<ReferenceEntity>) -> Self {
        Self::Reference(r)
    }
}
