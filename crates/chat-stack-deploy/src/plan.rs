//! Deployment plan emission
//!
//! The orderer's output, packaged for the external apply/destroy executor:
//! a creation sequence carrying full resource specs, a destruction sequence
//! carrying the step kind (plain removal, or running a declared cleanup
//! action), and the stack outputs to resolve after apply.

use serde::Serialize;
use serde_json::Value;

use chat_stack_common::ResourceKind;

use crate::graph::GraphError;
use crate::stack::{StackDefinition, StackOutput};

/// What the executor does at one step of the destruction sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StepAction {
    /// Provision the resource
    Create,
    /// Delete the resource
    Remove,
    /// Invoke the declared cleanup action, then retire the node
    RunCleanup,
}

/// One ordered step of the plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub id: String,
    pub kind: ResourceKind,
    pub action: StepAction,
    /// Full resource spec; present on creation steps only
    #[serde(skip_serializing_if = "Value::is_null")]
    pub spec: Value,
}

/// Ordered creation and destruction sequences for one deployment
#[derive(Debug, Serialize)]
pub struct DeploymentPlan {
    pub creation: Vec<PlanStep>,
    pub destruction: Vec<PlanStep>,
    pub outputs: Vec<StackOutput>,
}

impl DeploymentPlan {
    /// Compute both sequences for a declared stack
    ///
    /// Fails on the first ordering error; no partial plan is emitted.
    pub fn compute(stack: &StackDefinition) -> Result<Self, GraphError> {
        let creation = stack
            .graph
            .creation_order()?
            .into_iter()
            .map(|node| PlanStep {
                id: node.id.clone(),
                kind: node.kind,
                action: StepAction::Create,
                spec: node.spec.clone(),
            })
            .collect();

        let destruction = stack
            .graph
            .destruction_order()?
            .into_iter()
            .map(|node| PlanStep {
                id: node.id.clone(),
                kind: node.kind,
                action: if node.kind == ResourceKind::CustomAction {
                    StepAction::RunCleanup
                } else {
                    StepAction::Remove
                },
                spec: Value::Null,
            })
            .collect();

        Ok(Self {
            creation,
            destruction,
            outputs: stack.outputs.clone(),
        })
    }

    /// Pretty-printed JSON for file output or piping to the executor
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::graph::{ResourceGraph, ResourceNode};
    use crate::stack::chat_system_stack;
    use serde_json::json;

    #[test]
    fn both_sequences_cover_every_node_once() {
        let stack = chat_system_stack(&StackConfig::default()).unwrap();
        let plan = DeploymentPlan::compute(&stack).unwrap();

        assert_eq!(plan.creation.len(), stack.graph.len());
        assert_eq!(plan.destruction.len(), stack.graph.len());

        let mut created: Vec<_> = plan.creation.iter().map(|s| s.id.as_str()).collect();
        let mut destroyed: Vec<_> = plan.destruction.iter().map(|s| s.id.as_str()).collect();
        created.sort_unstable();
        destroyed.sort_unstable();
        created.dedup();
        destroyed.dedup();
        assert_eq!(created.len(), stack.graph.len());
        assert_eq!(destroyed.len(), stack.graph.len());
    }

    #[test]
    fn custom_actions_become_cleanup_steps_on_destruction() {
        let stack = chat_system_stack(&StackConfig::default()).unwrap();
        let plan = DeploymentPlan::compute(&stack).unwrap();

        let step = plan
            .destruction
            .iter()
            .find(|s| s.id == "queue-cleanup")
            .unwrap();
        assert_eq!(step.action, StepAction::RunCleanup);

        assert!(plan
            .destruction
            .iter()
            .filter(|s| s.id != "queue-cleanup")
            .all(|s| s.action == StepAction::Remove));
    }

    #[test]
    fn creation_steps_carry_specs_and_destruction_steps_do_not() {
        let stack = chat_system_stack(&StackConfig::default()).unwrap();
        let plan = DeploymentPlan::compute(&stack).unwrap();

        assert!(plan.creation.iter().all(|s| !s.spec.is_null()));
        assert!(plan.destruction.iter().all(|s| s.spec.is_null()));

        let rendered = plan.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(parsed["destruction"][0].get("spec").is_none());
        assert_eq!(parsed["outputs"][0]["name"], "LoadBalancerDNS");
    }

    #[test]
    fn ordering_errors_surface_instead_of_a_partial_plan() {
        let mut graph = ResourceGraph::new();
        graph
            .add_node(ResourceNode::new("a", ResourceKind::Compute, json!({})))
            .unwrap();
        graph
            .add_node(ResourceNode::new("b", ResourceKind::Compute, json!({})))
            .unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "a").unwrap();

        let stack = StackDefinition {
            graph,
            outputs: Vec::new(),
        };
        assert!(matches!(
            DeploymentPlan::compute(&stack),
            Err(GraphError::CycleDetected { .. })
        ));
    }
}
