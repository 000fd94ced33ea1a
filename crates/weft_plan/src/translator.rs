//! Lowering of authored entities into control-plane specs.
//!
//! Lowering is a memoized depth-first traversal: each entity is looked up in
//! the [`EntityMapping`] first, otherwise its dependencies are lowered, then
//! its own spec is built and recorded. A spec is therefore always recorded
//! after everything it references.

use crate::entity::{
    BranchNode, Case, CommandFn, GLOBAL_INPUT_NODE_ID, LaunchPlan, LocalEntity, Node, Task,
    TaskKind, Workflow,
};
use crate::error::{LowerError, LowerResult};
use crate::mapping::EntityMapping;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use weft_core::{EntityId, Identifier, ResourceType, SerializationSettings, dnsify};
use weft_model as model;
use weft_model::{
    AuthRole, ControlPlaneEntity, IfBlock, IfElseBlock, LaunchPlanClosure, LaunchPlanMetadata,
    LaunchPlanSpec, NodeTarget, RawOutputDataConfig, TaskNode, TaskNodeOverrides, TaskSpec,
    TaskTemplate, TypedInterface, WorkflowNode, WorkflowSpec, WorkflowTemplate,
};
use weft_types::{Signature, TypeEngine};

const FAST_COMMAND_PREFIX: [&str; 6] = [
    "pyflyte-fast-execute",
    "--additional-distribution",
    "{{ .remote_package_path }}",
    "--dest-dir",
    "{{ .dest_dir }}",
    "--",
];

/// Fast-registration command wrapping `default`
///
/// The runtime downloads the code distribution into the destination
/// directory, then runs the default command.
#[must_use]
pub fn fast_command(default: &[String]) -> Vec<String> {
    FAST_COMMAND_PREFIX
        .iter()
        .map(|s| (*s).to_string())
        .chain(default.iter().cloned())
        .collect()
}

/// Command override installed on a task for the lifetime of the guard
///
/// Dropping the guard puts back whatever the task had before, on every exit
/// path.
pub struct CommandOverride<'a> {
    task: &'a Task,
    previous: Option<CommandFn>,
}

impl<'a> CommandOverride<'a> {
    /// Install `f` on `task`
    #[must_use]
    pub fn install(task: &'a Task, f: CommandFn) -> Self {
        let previous = task.replace_command_fn(Some(f));
        Self { task, previous }
    }
}

impl Drop for CommandOverride<'_> {
    fn drop(&mut self) {
        self.task.replace_command_fn(self.previous.take());
    }
}

/// Lowers authored entities into an [`EntityMapping`]
pub struct Translator<'a> {
    mapping: &'a mut EntityMapping,
    settings: &'a SerializationSettings,
    engine: TypeEngine,
    fast: bool,
    in_progress: HashSet<EntityId>,
}

impl<'a> Translator<'a> {
    /// Translator recording into `mapping`
    #[must_use]
    pub fn new(mapping: &'a mut EntityMapping, settings: &'a SerializationSettings) -> Self {
        Self {
            mapping,
            settings,
            engine: TypeEngine::new(),
            fast: false,
            in_progress: HashSet::new(),
        }
    }

    /// Enable or disable fast-registration commands
    #[must_use]
    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Mapping recorded so far
    #[must_use]
    pub fn mapping(&self) -> &EntityMapping {
        self.mapping
    }

    /// Lower `entity` and everything it depends on
    ///
    /// Returns the recorded spec. An entity already in the mapping returns
    /// its recorded spec with no other effect.
    ///
    /// # Errors
    ///
    /// Returns the first [`LowerError`] met during the traversal
    pub fn lower(&mut self, entity: &LocalEntity) -> LowerResult<Arc<ControlPlaneEntity>> {
        let key = entity.id();
        if let Some(hit) = self.mapping.get(key) {
            trace!(kind = entity.kind(), name = entity.name(), "already lowered");
            return Ok(hit);
        }
        if !self.in_progress.insert(key) {
            return Err(LowerError::Cycle {
                entity: entity.to_string(),
            });
        }
        let result = self.lower_uncached(entity);
        self.in_progress.remove(&key);
        let spec = result?;

        let identifier = spec.identifier().map(ToString::to_string).unwrap_or_default();
        debug!(
            kind = entity.kind(),
            name = entity.name(),
            identifier = identifier.as_str(),
            "lowered entity"
        );
        Ok(self.mapping.insert(key, entity.kind(), entity.name(), spec))
    }

    /// Lower every root in order and return the registration plan
    ///
    /// # Errors
    ///
    /// Returns the first [`LowerError`]; later roots are not lowered
    pub fn lower_all<'e, I>(&mut self, roots: I) -> LowerResult<Vec<Arc<ControlPlaneEntity>>>
    where
        I: IntoIterator<Item = &'e LocalEntity>,
    {
        for root in roots {
            self.lower(root)?;
        }
        Ok(self
            .mapping
            .registration_plan()
            .map(|e| Arc::clone(&e.spec))
            .collect())
    }

    fn lower_uncached(&mut self, entity: &LocalEntity) -> LowerResult<ControlPlaneEntity> {
        match entity {
            LocalEntity::Reference(r) => {
                self.interface(r.signature(), || format!("reference {}", r.reference()))?;
                Ok(ControlPlaneEntity::Placeholder)
            }
            LocalEntity::Task(task) => self.lower_task(task),
            LocalEntity::Workflow(wf) => self.lower_workflow(wf),
            LocalEntity::Node(node) => self.lower_node(node).map(ControlPlaneEntity::Node),
            LocalEntity::LaunchPlan(lp) => self.lower_launch_plan(lp),
            LocalEntity::Branch(branch) => self.lower_branch(branch),
        }
    }

    fn lower_task(&mut self, task: &Task) -> LowerResult<ControlPlaneEntity> {
        let id = self.settings.identifier(ResourceType::Task, task.name());

        let _override = (self.fast && task.kind() == TaskKind::AutoContainer).then(|| {
            let command = fast_command(&task.default_command(self.settings));
            CommandOverride::install(
                task,
                Arc::new(move |_: &SerializationSettings| command.clone()),
            )
        });

        let interface = self.interface(task.signature(), || format!("task '{}'", task.name()))?;
        let container = match task.kind() {
            TaskKind::AutoContainer => Some(task.container(self.settings).ok_or_else(|| {
                LowerError::MissingImage {
                    task: task.name().to_string(),
                }
            })?),
            TaskKind::Plugin => None,
        };

        Ok(ControlPlaneEntity::Task(TaskSpec {
            template: TaskTemplate {
                id,
                task_type: task.task_type().to_string(),
                metadata: task.metadata().clone(),
                interface,
                custom: task.custom().cloned(),
                container,
                k8s_pod: task.k8s_pod().cloned(),
                task_type_version: task.task_type_version(),
                security_context: task.security_context().cloned(),
                config: task.config().clone(),
            },
        }))
    }

    fn lower_workflow(&mut self, wf: &Workflow) -> LowerResult<ControlPlaneEntity> {
        let interface = self.interface(wf.signature(), || format!("workflow '{}'", wf.name()))?;

        let authored = wf.nodes();
        let mut nodes: Vec<model::Node> = Vec::with_capacity(authored.len());
        let mut seen = HashSet::from([GLOBAL_INPUT_NODE_ID.to_string()]);
        for node in authored.iter().filter(|n| !n.is_graph_input()) {
            let ir = self.node_ir(node)?;
            if !seen.insert(ir.id.clone()) {
                return Err(LowerError::DuplicateNodeId {
                    workflow: wf.name().to_string(),
                    node: node.node_id().to_string(),
                    normalized: ir.id,
                });
            }
            nodes.push(ir);
        }

        let mut sub_workflows = IndexMap::new();
        for node in &authored {
            self.absorb_sub_workflows(node, &mut sub_workflows)?;
        }

        Ok(ControlPlaneEntity::Workflow(WorkflowSpec {
            template: WorkflowTemplate {
                id: self.settings.identifier(ResourceType::Workflow, wf.name()),
                metadata: wf.metadata().clone(),
                metadata_defaults: wf.metadata_defaults().clone(),
                interface,
                nodes,
                outputs: wf
                    .output_bindings()
                    .into_iter()
                    .map(|b| b.rename_nodes(dnsify))
                    .collect(),
            },
            sub_workflows: sub_workflows.into_values().collect(),
        }))
    }

    /// Collect the templates of workflows `node` embeds, first occurrence wins
    fn absorb_sub_workflows(
        &mut self,
        node: &Node,
        acc: &mut IndexMap<Identifier, WorkflowTemplate>,
    ) -> LowerResult<()> {
        match node.entity() {
            Some(LocalEntity::Workflow(sub)) => {
                let entity = LocalEntity::Workflow(Arc::clone(sub));
                let spec = self.lower(&entity)?;
                let ControlPlaneEntity::Workflow(spec) = spec.as_ref() else {
                    return Err(unexpected(&entity, "workflow", &spec));
                };
                for template in std::iter::once(&spec.template).chain(&spec.sub_workflows) {
                    acc.entry(template.id.clone())
                        .or_insert_with(|| template.clone());
                }
            }
            Some(LocalEntity::Reference(r)) if r.resource_type() == ResourceType::Workflow => {
                return Err(LowerError::ReferenceSubWorkflow {
                    node: node.node_id().to_string(),
                });
            }
            Some(LocalEntity::Branch(branch)) => {
                for leaf in branch.leaf_nodes() {
                    self.absorb_sub_workflows(leaf, acc)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn lower_node(&mut self, node: &Node) -> LowerResult<model::Node> {
        let Some(entity) = node.entity() else {
            return Err(LowerError::MissingEntity {
                node: node.node_id().to_string(),
            });
        };

        let upstream_node_ids = node
            .upstream()
            .iter()
            .filter(|u| !u.is_graph_input())
            .map(|u| self.node_ir(u).map(|ir| ir.id))
            .collect::<LowerResult<Vec<_>>>()?;

        let mut output_aliases = Vec::new();
        let target = match entity {
            LocalEntity::Reference(r) => {
                self.lower(entity)?;
                let reference = r.reference().clone();
                match r.resource_type() {
                    ResourceType::Task => NodeTarget::TaskNode(TaskNode {
                        reference_id: reference,
                        overrides: None,
                    }),
                    ResourceType::Workflow => {
                        NodeTarget::WorkflowNode(WorkflowNode::SubWorkflowRef(reference))
                    }
                    ResourceType::LaunchPlan => {
                        NodeTarget::WorkflowNode(WorkflowNode::LaunchplanRef(reference))
                    }
                    other @ (ResourceType::Unspecified | ResourceType::Dataset) => {
                        return Err(LowerError::UnknownReferenceType {
                            reference: reference.to_string(),
                            resource_type: other,
                        });
                    }
                }
            }
            LocalEntity::Task(_) => {
                output_aliases = node.aliases().to_vec();
                NodeTarget::TaskNode(TaskNode {
                    reference_id: self.lower_identifier(entity)?,
                    overrides: node.resources().map(|r| TaskNodeOverrides {
                        resources: r.clone(),
                    }),
                })
            }
            LocalEntity::Workflow(_) => NodeTarget::WorkflowNode(WorkflowNode::SubWorkflowRef(
                self.lower_identifier(entity)?,
            )),
            LocalEntity::LaunchPlan(_) => NodeTarget::WorkflowNode(WorkflowNode::LaunchplanRef(
                self.lower_identifier(entity)?,
            )),
            LocalEntity::Branch(_) => {
                let spec = self.lower(entity)?;
                let ControlPlaneEntity::Branch(branch) = spec.as_ref() else {
                    return Err(unexpected(entity, "branch", &spec));
                };
                NodeTarget::BranchNode(Box::new(branch.clone()))
            }
            LocalEntity::Node(_) => {
                return Err(LowerError::NonSerializableEntity {
                    node: node.node_id().to_string(),
                    kind: entity.kind(),
                });
            }
        };

        Ok(model::Node {
            id: dnsify(node.node_id()),
            metadata: node.metadata().clone(),
            inputs: node
                .bindings()
                .iter()
                .cloned()
                .map(|b| b.rename_nodes(dnsify))
                .collect(),
            upstream_node_ids,
            output_aliases,
            target,
        })
    }

    fn lower_launch_plan(&mut self, lp: &LaunchPlan) -> LowerResult<ControlPlaneEntity> {
        let workflow_id = self.lower_identifier(&LocalEntity::Workflow(Arc::clone(lp.workflow())))?;

        let auth_role = lp.auth_role.clone().unwrap_or_else(|| {
            self.settings
                .default_auth_role
                .as_ref()
                .map(|role| AuthRole {
                    assumable_iam_role: role.assumable_iam_role.clone(),
                    kubernetes_service_account: role.kubernetes_service_account.clone(),
                })
                .unwrap_or_default()
        });
        let raw_output_data_config = lp.raw_output_data_config.clone().unwrap_or_else(|| {
            RawOutputDataConfig {
                output_location_prefix: self.settings.raw_output_prefix.clone().unwrap_or_default(),
            }
        });

        Ok(ControlPlaneEntity::LaunchPlan(model::LaunchPlan {
            id: self.settings.identifier(ResourceType::LaunchPlan, lp.name()),
            spec: LaunchPlanSpec {
                workflow_id,
                entity_metadata: LaunchPlanMetadata {
                    schedule: lp.schedule.clone(),
                    notifications: lp.notifications.clone(),
                },
                default_inputs: lp.parameters.clone(),
                fixed_inputs: lp.fixed_inputs.clone(),
                labels: lp.labels.clone().unwrap_or_default(),
                annotations: lp.annotations.clone().unwrap_or_default(),
                auth_role,
                raw_output_data_config,
                max_parallelism: lp.max_parallelism,
            },
            closure: LaunchPlanClosure::default(),
        }))
    }

    fn lower_branch(&mut self, branch: &BranchNode) -> LowerResult<ControlPlaneEntity> {
        let case = self.lower_case(branch.case())?;
        let other = branch
            .other()
            .iter()
            .map(|c| self.lower_case(c))
            .collect::<LowerResult<Vec<_>>>()?;
        let else_node = branch
            .else_node()
            .map(|n| self.node_ir(n).map(Box::new))
            .transpose()?;

        Ok(ControlPlaneEntity::Branch(model::BranchNode {
            if_else: IfElseBlock {
                case,
                other,
                else_node,
                error: branch.error().cloned(),
            },
        }))
    }

    fn lower_case(&mut self, case: &Case) -> LowerResult<IfBlock> {
        Ok(IfBlock {
            condition: case.condition.clone(),
            then_node: Box::new(self.node_ir(&case.then_node)?),
        })
    }

    /// Lower a node and return a copy of its IR
    fn node_ir(&mut self, node: &Arc<Node>) -> LowerResult<model::Node> {
        let entity = LocalEntity::Node(Arc::clone(node));
        let spec = self.lower(&entity)?;
        match spec.as_ref() {
            ControlPlaneEntity::Node(ir) => Ok(ir.clone()),
            _ => Err(unexpected(&entity, "node", &spec)),
        }
    }

    /// Lower a task, workflow or launch plan and return its identifier
    fn lower_identifier(&mut self, entity: &LocalEntity) -> LowerResult<Identifier> {
        let spec = self.lower(entity)?;
        match spec.identifier() {
            Some(id) if spec.kind() == entity.kind() => Ok(id.clone()),
            _ => Err(unexpected(entity, entity.kind(), &spec)),
        }
    }

    fn interface(
        &self,
        signature: &Signature,
        describe: impl FnOnce() -> String,
    ) -> LowerResult<TypedInterface> {
        self.engine
            .to_interface(signature)
            .map_err(|source| LowerError::Type {
                entity: describe(),
                source,
            })
    }
}

fn unexpected(entity: &LocalEntity, expected: &'static str, found: &ControlPlaneEntity) -> LowerError {
    LowerError::UnexpectedSpec {
        entity: entity.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Lower `entity` into `mapping`
///
/// # Errors
///
/// See [`Translator::lower`]
pub fn lower(
    mapping: &mut EntityMapping,
    settings: &SerializationSettings,
    entity: &LocalEntity,
    fast: bool,
) -> LowerResult<Arc<ControlPlaneEntity>> {
    Translator::new(mapping, settings)
        .with_fast(fast)
        .lower(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ReferenceEntity;
    use weft_core::settings::DefaultAuthRole;
    use weft_model::{
        Binding, BooleanExpression, BranchError, ComparisonOperator, Labels, Operand, Primitive,
        ResourceName, Resources,
    };
    use weft_types::NativeType;

    fn settings() -> SerializationSettings {
        SerializationSettings::new("proj", "dev", "v1").with_image("registry/app:v1")
    }

    fn plain_task(name: &str) -> Arc<Task> {
        Task::builder(name).build()
    }

    fn int_task(name: &str) -> Arc<Task> {
        Task::builder(name)
            .signature(
                Signature::new()
                    .with_input("a", NativeType::int())
                    .with_output("o0", NativeType::int()),
            )
            .build()
    }

    fn node(id: &str, entity: impl Into<LocalEntity>) -> Arc<Node> {
        Arc::new(Node::new(id, entity))
    }

    fn cond() -> BooleanExpression {
        BooleanExpression::compare(
            ComparisonOperator::Gt,
            Operand::Var("x".to_string()),
            Operand::Primitive(Primitive::Integer(0)),
        )
    }

    fn workflow_with_task(name: &str, task: &Arc<Task>) -> Arc<Workflow> {
        let wf = Workflow::new(name, Signature::new());
        wf.add_node(node("n0", Arc::clone(task)));
        wf
    }

    fn lower_one(entity: impl Into<LocalEntity>) -> LowerResult<Arc<ControlPlaneEntity>> {
        let mut mapping = EntityMapping::new();
        lower(&mut mapping, &settings(), &entity.into(), false)
    }

    #[test]
    fn test_task_lowering_is_memoized() {
        let t = plain_task("t");
        let entity = LocalEntity::from(Arc::clone(&t));
        let s = settings();
        let mut mapping = EntityMapping::new();

        let first = lower(&mut mapping, &s, &entity, false).unwrap();
        let second = lower(&mut mapping, &s, &entity, false).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains(t.id()));
    }

    #[test]
    fn test_task_spec_fields() {
        let t = Task::builder("compute")
            .signature(Signature::new().with_input("xs", NativeType::list(NativeType::int())))
            .config("k", "v")
            .build();
        let spec = lower_one(t).unwrap();
        let ControlPlaneEntity::Task(spec) = spec.as_ref() else {
            panic!("expected a task spec");
        };
        let tpl = &spec.template;
        assert_eq!(
            tpl.id,
            Identifier::new(ResourceType::Task, "proj", "dev", "compute", "v1")
        );
        assert_eq!(tpl.task_type, "python-task");
        assert_eq!(tpl.interface.inputs.len(), 1);
        assert_eq!(tpl.config.get("k").map(String::as_str), Some("v"));
        let container = tpl.container.as_ref().unwrap();
        assert_eq!(container.image, "registry/app:v1");
        assert_eq!(container.args.first().map(String::as_str), Some("weft-execute"));
    }

    #[test]
    fn test_plugin_task_has_no_container() {
        let t = Task::builder("query")
            .plugin("sql")
            .custom(serde_json::json!({"statement": "select 1"}))
            .build();
        let spec = lower_one(t).unwrap();
        let ControlPlaneEntity::Task(spec) = spec.as_ref() else {
            panic!("expected a task spec");
        };
        assert!(spec.template.container.is_none());
        assert_eq!(spec.template.task_type, "sql");
        assert!(spec.template.custom.is_some());
    }

    #[test]
    fn test_missing_image_fails() {
        let t = plain_task("t");
        let mut mapping = EntityMapping::new();
        let s = SerializationSettings::new("proj", "dev", "v1");
        let err = lower(&mut mapping, &s, &t.into(), false).unwrap_err();
        assert!(matches!(err, LowerError::MissingImage { .. }));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_shared_task_lowered_once_before_nodes() {
        let t = plain_task("t");
        let wf = Workflow::new("w", Signature::new());
        let n1 = node("n1", Arc::clone(&t));
        let n2 = node("n2", Arc::clone(&t));
        wf.add_node(Arc::clone(&n1));
        wf.add_node(Arc::clone(&n2));

        let mut mapping = EntityMapping::new();
        lower(&mut mapping, &settings(), &Arc::clone(&wf).into(), false).unwrap();

        let tasks = mapping
            .entries()
            .filter(|e| matches!(e.spec.as_ref(), ControlPlaneEntity::Task(_)))
            .count();
        assert_eq!(tasks, 1);
        let t_pos = mapping.position(t.id()).unwrap();
        assert!(t_pos < mapping.position(n1.id()).unwrap());
        assert!(t_pos < mapping.position(n2.id()).unwrap());
        assert_eq!(mapping.position(wf.id()), Some(mapping.len() - 1));
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let t = plain_task("t");
        let inner = workflow_with_task("inner", &t);
        let outer = Workflow::new("outer", Signature::new());
        let first = node("first", Arc::clone(&t));
        let second = Arc::new(Node::new("second", Arc::clone(&inner)).with_upstream(&first));
        outer.add_node(first);
        outer.add_node(second);
        let lp = Arc::new(LaunchPlan::new("outer_lp", Arc::clone(&outer)));

        let mut mapping = EntityMapping::new();
        let s = settings();
        let mut tr = Translator::new(&mut mapping, &s);
        let plan = tr.lower_all([&LocalEntity::from(Arc::clone(&lp))]).unwrap();

        let kinds: Vec<&str> = plan.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec!["task", "workflow", "workflow", "launch_plan"]);
        let pos = |id| mapping.position(id).unwrap();
        assert!(pos(t.id()) < pos(inner.id()));
        assert!(pos(inner.id()) < pos(outer.id()));
        assert!(pos(outer.id()) < pos(lp.id()));
    }

    #[test]
    fn test_upstream_ids_and_sentinel() {
        let t = int_task("t");
        let wf = Workflow::new("w", Signature::new().with_input("a", NativeType::int()));
        let start = Node::graph_input();
        let n0 = Arc::new(
            Node::new("n0", Arc::clone(&t))
                .with_upstream(&start)
                .with_binding(Binding::promise("a", "start-node", "a")),
        );
        let n1 = Arc::new(
            Node::new("n1", Arc::clone(&t))
                .with_upstream(&n0)
                .with_binding(Binding::promise("a", "n0", "o0")),
        );
        wf.add_node(start);
        wf.add_node(Arc::clone(&n0));
        wf.add_node(n1);
        wf.add_output(Binding::promise("o0", "n1", "o0"));

        let spec = lower_one(wf).unwrap();
        let ControlPlaneEntity::Workflow(spec) = spec.as_ref() else {
            panic!("expected a workflow spec");
        };
        let nodes = &spec.template.nodes;
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].upstream_node_ids.is_empty());
        assert_eq!(nodes[1].upstream_node_ids, vec!["n0".to_string()]);
        assert_eq!(spec.template.outputs.len(), 1);
    }

    #[test]
    fn test_node_ids_are_dnsified() {
        let t = plain_task("t");
        let n = node("My_Node.1", t);
        let spec = lower_one(n).unwrap();
        let ControlPlaneEntity::Node(ir) = spec.as_ref() else {
            panic!("expected node IR");
        };
        assert_eq!(ir.id, "my-node-1");
    }

    #[test]
    fn test_task_node_overrides_and_aliases() {
        let t = int_task("t");
        let n = Arc::new(
            Node::new("n0", t)
                .with_resources(Resources::new().with_limit(ResourceName::Memory, "2Gi"))
                .with_alias("o0", "total"),
        );
        let spec = lower_one(n).unwrap();
        let ControlPlaneEntity::Node(ir) = spec.as_ref() else {
            panic!("expected node IR");
        };
        let NodeTarget::TaskNode(task_node) = &ir.target else {
            panic!("expected a task node");
        };
        assert_eq!(task_node.reference_id.name, "t");
        assert!(!task_node.overrides.as_ref().unwrap().resources.is_empty());
        assert_eq!(ir.output_aliases.len(), 1);
    }

    #[test]
    fn test_branch_sub_workflows_deduplicated() {
        let t = plain_task("t");
        let a = workflow_with_task("a", &t);
        let b = workflow_with_task("b", &t);
        let c = workflow_with_task("c", &t);
        let branch = Arc::new(
            BranchNode::new("br", cond(), node("then-a", Arc::clone(&a)))
                .elif(cond(), node("then-b", Arc::clone(&b)))
                .otherwise(node("else-c", Arc::clone(&c))),
        );
        let outer = Workflow::new("outer", Signature::new());
        outer.add_node(node("branch", Arc::clone(&branch)));
        outer.add_node(node("again", Arc::clone(&a)));

        let spec = lower_one(outer).unwrap();
        let ControlPlaneEntity::Workflow(spec) = spec.as_ref() else {
            panic!("expected a workflow spec");
        };
        let names: Vec<&str> = spec
            .sub_workflows
            .iter()
            .map(|t| t.id.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nested_sub_workflows_hoisted() {
        let t = plain_task("t");
        let leaf = workflow_with_task("leaf", &t);
        let mid = Workflow::new("mid", Signature::new());
        mid.add_node(node("n0", Arc::clone(&leaf)));
        let top = Workflow::new("top", Signature::new());
        top.add_node(node("n0", Arc::clone(&mid)));
        top.add_node(node("n1", Arc::clone(&leaf)));

        let spec = lower_one(top).unwrap();
        let ControlPlaneEntity::Workflow(spec) = spec.as_ref() else {
            panic!("expected a workflow spec");
        };
        let names: Vec<&str> = spec
            .sub_workflows
            .iter()
            .map(|t| t.id.name.as_str())
            .collect();
        assert_eq!(names, vec!["mid", "leaf"]);
    }

    #[test]
    fn test_branch_ir_preserves_order_and_error() {
        let t = plain_task("t");
        let branch = Arc::new(
            BranchNode::new("br", cond(), node("one", Arc::clone(&t)))
                .elif(cond(), node("two", Arc::clone(&t)))
                .elif(cond(), node("three", Arc::clone(&t)))
                .fail(BranchError {
                    failed_node_id: "br".to_string(),
                    message: "no case matched".to_string(),
                }),
        );
        let spec = lower_one(branch).unwrap();
        let ControlPlaneEntity::Branch(ir) = spec.as_ref() else {
            panic!("expected branch IR");
        };
        assert_eq!(ir.if_else.case.then_node.id, "one");
        let others: Vec<&str> = ir.if_else.other.iter().map(|c| c.then_node.id.as_str()).collect();
        assert_eq!(others, vec!["two", "three"]);
        assert!(ir.if_else.else_node.is_none());
        assert_eq!(ir.if_else.error.as_ref().unwrap().message, "no case matched");
    }

    #[test]
    fn test_fast_mode_installs_and_restores_command() {
        let t = Task::builder("t").command(["run", "t"]).build();
        let mut mapping = EntityMapping::new();
        let spec = lower(&mut mapping, &settings(), &Arc::clone(&t).into(), true).unwrap();
        let ControlPlaneEntity::Task(spec) = spec.as_ref() else {
            panic!("expected a task spec");
        };
        let args = &spec.template.container.as_ref().unwrap().args;
        assert_eq!(args, &fast_command(&["run".to_string(), "t".to_string()]));
        assert_eq!(args[0], "pyflyte-fast-execute");
        assert_eq!(args[5], "--");
        assert!(!t.has_command_override());
        assert_eq!(t.command(&settings()), vec!["run".to_string(), "t".to_string()]);
    }

    #[test]
    fn test_fast_override_reverted_on_failure() {
        let t = Task::builder("t")
            .command(["run"])
            .signature(Signature::new().with_input("bad", NativeType::tuple(vec![])))
            .build();
        let mut mapping = EntityMapping::new();
        let err = lower(&mut mapping, &settings(), &Arc::clone(&t).into(), true).unwrap_err();
        assert!(err.is_unsupported_type());
        assert!(!t.has_command_override());
        assert_eq!(t.command(&settings()), vec!["run".to_string()]);
    }

    #[test]
    fn test_fast_mode_leaves_plugin_tasks_alone() {
        let t = Task::builder("q").plugin("sql").image("img").command(["run"]).build();
        let spec = {
            let mut mapping = EntityMapping::new();
            lower(&mut mapping, &settings(), &t.into(), true).unwrap()
        };
        assert!(matches!(spec.as_ref(), ControlPlaneEntity::Task(_)));
    }

    #[test]
    fn test_reference_lowers_to_placeholder() {
        let r = ReferenceEntity::new(
            Identifier::new(ResourceType::Task, "other", "prod", "shared", "v7"),
            Signature::new(),
        );
        let mut mapping = EntityMapping::new();
        let spec = lower(&mut mapping, &settings(), &r.into(), false).unwrap();
        assert_eq!(spec.as_ref(), &ControlPlaneEntity::Placeholder);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.registration_plan().count(), 0);
    }

    #[test]
    fn test_reference_interface_is_checked() {
        let r = ReferenceEntity::new(
            Identifier::new(ResourceType::Task, "other", "prod", "shared", "v7"),
            Signature::new().with_input("pair", NativeType::tuple(vec![NativeType::int()])),
        );
        let mut mapping = EntityMapping::new();
        let err = lower(&mut mapping, &settings(), &r.into(), false).unwrap_err();
        assert!(err.is_unsupported_type());
        assert!(err.to_string().contains("task:other/prod/shared@v7"));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_reference_node_kinds() {
        let cases = [
            (ResourceType::Task, "task"),
            (ResourceType::Workflow, "sub_workflow"),
            (ResourceType::LaunchPlan, "launch_plan"),
        ];
        for (resource_type, expected) in cases {
            let reference = Identifier::new(resource_type, "other", "prod", "shared", "v7");
            let r = ReferenceEntity::new(reference.clone(), Signature::new());
            let spec = lower_one(node("n0", r)).unwrap();
            let ControlPlaneEntity::Node(ir) = spec.as_ref() else {
                panic!("expected node IR");
            };
            let found = match &ir.target {
                NodeTarget::TaskNode(tn) => {
                    assert_eq!(tn.reference_id, reference);
                    "task"
                }
                NodeTarget::WorkflowNode(WorkflowNode::SubWorkflowRef(id)) => {
                    assert_eq!(id, &reference);
                    "sub_workflow"
                }
                NodeTarget::WorkflowNode(WorkflowNode::LaunchplanRef(id)) => {
                    assert_eq!(id, &reference);
                    "launch_plan"
                }
                NodeTarget::BranchNode(_) => "branch",
            };
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_unknown_reference_type_fails() {
        let r = ReferenceEntity::new(
            Identifier::new(ResourceType::Dataset, "p", "d", "data", "v"),
            Signature::new(),
        );
        let err = lower_one(node("n0", r)).unwrap_err();
        assert!(matches!(
            err,
            LowerError::UnknownReferenceType {
                resource_type: ResourceType::Dataset,
                ..
            }
        ));
    }

    #[test]
    fn test_reference_sub_workflow_rejected() {
        let r = ReferenceEntity::new(
            Identifier::new(ResourceType::Workflow, "p", "d", "remote", "v"),
            Signature::new(),
        );
        let wf = Workflow::new("w", Signature::new());
        wf.add_node(node("uses-remote", r));
        let err = lower_one(wf).unwrap_err();
        assert_eq!(
            err,
            LowerError::ReferenceSubWorkflow {
                node: "uses-remote".to_string()
            }
        );
    }

    #[test]
    fn test_reference_sub_workflow_in_branch_rejected() {
        let r = ReferenceEntity::new(
            Identifier::new(ResourceType::Workflow, "p", "d", "remote", "v"),
            Signature::new(),
        );
        let branch = Arc::new(BranchNode::new("br", cond(), node("leaf", r)));
        let wf = Workflow::new("w", Signature::new());
        wf.add_node(node("branch", branch));
        let err = lower_one(wf).unwrap_err();
        assert!(matches!(err, LowerError::ReferenceSubWorkflow { node } if node == "leaf"));
    }

    #[test]
    fn test_reference_launch_plan_allowed_in_workflow() {
        let r = ReferenceEntity::new(
            Identifier::new(ResourceType::LaunchPlan, "p", "d", "remote_lp", "v"),
            Signature::new(),
        );
        let wf = Workflow::new("w", Signature::new());
        wf.add_node(node("child", r));
        assert!(lower_one(wf).is_ok());
    }

    #[test]
    fn test_missing_entity_fails() {
        let err = lower_one(Arc::new(Node::empty("orphan"))).unwrap_err();
        assert_eq!(
            err,
            LowerError::MissingEntity {
                node: "orphan".to_string()
            }
        );
    }

    #[test]
    fn test_node_wrapping_node_fails() {
        let inner = node("inner", plain_task("t"));
        let err = lower_one(node("outer", inner)).unwrap_err();
        assert!(matches!(
            err,
            LowerError::NonSerializableEntity { kind: "node", .. }
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let wf = Workflow::new("loop", Signature::new());
        wf.add_node(node("self", Arc::clone(&wf)));
        let mut mapping = EntityMapping::new();
        let err = lower(&mut mapping, &settings(), &Arc::clone(&wf).into(), false).unwrap_err();
        assert!(matches!(err, LowerError::Cycle { .. }));
        assert!(!mapping.contains(wf.id()));
    }

    #[test]
    fn test_launch_plan_defaults() {
        let t = plain_task("t");
        let wf = workflow_with_task("w", &t);
        let lp = Arc::new(LaunchPlan::new("w_lp", wf));
        let spec = lower_one(lp).unwrap();
        let ControlPlaneEntity::LaunchPlan(lp) = spec.as_ref() else {
            panic!("expected a launch plan");
        };
        assert_eq!(lp.id.resource_type, ResourceType::LaunchPlan);
        assert_eq!(lp.spec.workflow_id.name, "w");
        assert!(lp.spec.labels.values.is_empty());
        assert!(lp.spec.annotations.values.is_empty());
        assert_eq!(lp.spec.auth_role, AuthRole::default());
        assert_eq!(lp.spec.raw_output_data_config.output_location_prefix, "");
        assert!(lp.closure.state.is_none());
        assert!(lp.closure.expected_inputs.is_empty());
        assert!(lp.closure.expected_outputs.is_empty());
    }

    #[test]
    fn test_launch_plan_settings_defaults_and_overrides() {
        let t = plain_task("t");
        let wf = workflow_with_task("w", &t);
        let s = settings()
            .with_default_auth_role(DefaultAuthRole {
                assumable_iam_role: Some("arn:role".to_string()),
                kubernetes_service_account: None,
            })
            .with_raw_output_prefix("s3://bucket/raw");

        let mut plain = LaunchPlan::new("plain", Arc::clone(&wf));
        plain.max_parallelism = Some(4);
        let mut custom = LaunchPlan::new("custom", wf);
        custom.labels = Some(Labels {
            values: [("team".to_string(), "ml".to_string())].into_iter().collect(),
        });
        custom.raw_output_data_config = Some(RawOutputDataConfig {
            output_location_prefix: "gs://other".to_string(),
        });

        let mut mapping = EntityMapping::new();
        let mut tr = Translator::new(&mut mapping, &s);
        let plain = tr.lower(&Arc::new(plain).into()).unwrap();
        let custom = tr.lower(&Arc::new(custom).into()).unwrap();

        let ControlPlaneEntity::LaunchPlan(plain) = plain.as_ref() else {
            panic!("expected a launch plan");
        };
        assert_eq!(plain.spec.auth_role.assumable_iam_role.as_deref(), Some("arn:role"));
        assert_eq!(plain.spec.raw_output_data_config.output_location_prefix, "s3://bucket/raw");
        assert_eq!(plain.spec.max_parallelism, Some(4));

        let ControlPlaneEntity::LaunchPlan(custom) = custom.as_ref() else {
            panic!("expected a launch plan");
        };
        assert_eq!(custom.spec.labels.values.len(), 1);
        assert_eq!(custom.spec.raw_output_data_config.output_location_prefix, "gs://other");
    }

    #[test]
    fn test_workflow_type_error_names_entity() {
        let bad = NativeType::dict(NativeType::int(), NativeType::str());
        let wf = Workflow::new("w", Signature::new().with_output("o", bad));
        let err = lower_one(wf).unwrap_err();
        assert!(err.is_unsupported_type());
        assert!(err.to_string().contains("workflow 'w'"));
    }

    fn workflow_ir(spec: &ControlPlaneEntity) -> &WorkflowTemplate {
        let ControlPlaneEntity::Workflow(spec) = spec else {
            panic!("expected a workflow spec");
        };
        &spec.template
    }

    fn promised_nodes(bindings: &[Binding]) -> Vec<&str> {
        bindings.iter().flat_map(Binding::upstream_node_ids).collect()
    }

    #[test]
    fn test_promises_follow_normalized_node_ids() {
        let t = int_task("t");
        let wf = Workflow::new(
            "w",
            Signature::new()
                .with_input("a", NativeType::int())
                .with_output("o0", NativeType::int()),
        );
        let start = Node::graph_input();
        let one = Arc::new(
            Node::new("step_one", Arc::clone(&t))
                .with_upstream(&start)
                .with_binding(Binding::promise("a", GLOBAL_INPUT_NODE_ID, "a")),
        );
        let two = Arc::new(
            Node::new("step_two", Arc::clone(&t))
                .with_upstream(&one)
                .with_binding(Binding::promise("a", "step_one", "o0")),
        );
        wf.add_node(start);
        wf.add_node(one);
        wf.add_node(two);
        wf.add_output(Binding::promise("o0", "step_two", "o0"));

        let spec = lower_one(wf).unwrap();
        let tpl = workflow_ir(&spec);
        let ids: Vec<&str> = tpl.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["step-one", "step-two"]);

        assert_eq!(promised_nodes(&tpl.nodes[0].inputs), vec![GLOBAL_INPUT_NODE_ID]);
        assert_eq!(promised_nodes(&tpl.nodes[1].inputs), vec!["step-one"]);
        assert_eq!(tpl.nodes[1].upstream_node_ids, vec!["step-one"]);
        assert_eq!(promised_nodes(&tpl.outputs), vec!["step-two"]);
        for id in promised_nodes(&tpl.outputs)
            .into_iter()
            .chain(tpl.nodes.iter().flat_map(|n| promised_nodes(&n.inputs)))
            .filter(|id| *id != GLOBAL_INPUT_NODE_ID)
        {
            assert!(ids.contains(&id), "promise targets missing node '{id}'");
        }
    }

    #[test]
    fn test_colliding_node_ids_rejected() {
        let t = plain_task("t");
        let wf = Workflow::new("w", Signature::new());
        wf.add_node(node("step_one", Arc::clone(&t)));
        wf.add_node(node("step.one", Arc::clone(&t)));
        let err = lower_one(wf).unwrap_err();
        match err {
            LowerError::DuplicateNodeId {
                workflow,
                node,
                normalized,
            } => {
                assert_eq!(workflow, "w");
                assert_eq!(node, "step.one");
                assert_eq!(normalized, "step-one");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_authored_node_named_like_sentinel_is_not_skipped() {
        let t = plain_task("t");
        let wf = Workflow::new("w", Signature::new());
        let n = node(GLOBAL_INPUT_NODE_ID, Arc::clone(&t));
        wf.add_node(Arc::clone(&n));
        let mut mapping = EntityMapping::new();
        let err = lower(&mut mapping, &settings(), &wf.into(), false).unwrap_err();
        assert!(matches!(err, LowerError::DuplicateNodeId { .. }));
        assert!(mapping.contains(n.id()));
    }

    #[test]
    fn test_failure_keeps_earlier_entries() {
        let good = plain_task("good");
        let wf = Workflow::new("w", Signature::new());
        wf.add_node(node("ok", Arc::clone(&good)));
        wf.add_node(Arc::new(Node::empty("broken")));
        let mut mapping = EntityMapping::new();
        assert!(lower(&mut mapping, &settings(), &wf.into(), false).is_err());
        assert!(mapping.contains(good.id()));
    }
}
