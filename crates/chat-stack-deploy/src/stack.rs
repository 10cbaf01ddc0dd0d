//! Chat-system stack declaration
//!
//! Declares every resource of the WebSocket chat deployment as a flat
//! node/edge list: VPC, security groups, the application bucket and its
//! asset uploads, the consumer registry table, the EC2 role, the consumer
//! instance, the server fleet, the load balancer, and the queue cleanup
//! step that runs during teardown.
//!
//! Edges are declared explicitly, including the ones with no data
//! dependency: asset uploads must land before compute boots, the consumer
//! must be up before the server fleet, and the server fleet must be gone
//! before the queue cleanup runs.

use serde::Serialize;
use serde_json::json;

use chat_stack_common::defaults;
use chat_stack_common::tags::{MANAGED_BY_VALUE, QUEUE_NAME_PREFIX, TAG_MANAGED_BY};
use chat_stack_common::ResourceKind;

use crate::config::StackConfig;
use crate::graph::{GraphError, ResourceGraph, ResourceNode};

/// A named stack output resolved by the provisioning engine
///
/// `value` is a template over node attributes (`${node.attribute}`); the
/// engine substitutes provider-assigned values after apply.
#[derive(Debug, Clone, Serialize)]
pub struct StackOutput {
    pub name: String,
    pub value: String,
    pub description: String,
}

/// A fully declared deployment: the resource graph plus its outputs
#[derive(Debug)]
pub struct StackDefinition {
    pub graph: ResourceGraph,
    pub outputs: Vec<StackOutput>,
}

/// Declare the chat-system deployment graph
///
/// Builds a fresh graph on every call; nothing is shared between
/// invocations.
pub fn chat_system_stack(config: &StackConfig) -> Result<StackDefinition, GraphError> {
    let mut graph = ResourceGraph::new();
    let jar_file = config.artifact.jar_file_name();

    graph.add_node(ResourceNode::new(
        "vpc",
        ResourceKind::Network,
        json!({
            "max_azs": config.network.max_azs,
            "nat_gateways": 0,
            "subnets": [{ "name": "public", "type": "public", "cidr_mask": config.network.subnet_cidr_mask }],
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "app-bucket",
        ResourceKind::Storage,
        json!({
            "auto_delete_objects": true,
            "removal_policy": "destroy",
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "jar-upload",
        ResourceKind::Storage,
        json!({
            "bucket": "app-bucket",
            "key_prefix": "jars/",
            "source": format!("build/libs/{jar_file}"),
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "server-config-upload",
        ResourceKind::Storage,
        json!({
            "bucket": "app-bucket",
            "key_prefix": "server/",
            "source": "resources/ec2/server",
            "exclude": ["userdata.sh"],
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "consumer-config-upload",
        ResourceKind::Storage,
        json!({
            "bucket": "app-bucket",
            "key_prefix": "consumer/",
            "source": "resources/ec2/consumer",
            "exclude": ["userdata.sh"],
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "alb-security-group",
        ResourceKind::SecurityRule,
        json!({
            "vpc": "vpc",
            "description": "Security group for Application Load Balancer",
            "ingress": [{ "port": 80, "peer": "any-ipv4", "description": "HTTP from internet" }],
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "server-security-group",
        ResourceKind::SecurityRule,
        json!({
            "vpc": "vpc",
            "description": "Security group for chat server instances",
            "ingress": [
                { "port": defaults::SERVER_PORT, "peer": "alb-security-group", "description": "WebSocket traffic from ALB" },
                { "port": defaults::SERVER_HEALTH_PORT, "peer": "alb-security-group", "description": "Health checks from ALB" },
                { "port": 22, "peer": "any-ipv4", "description": "SSH management" },
            ],
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "consumer-security-group",
        ResourceKind::SecurityRule,
        json!({
            "vpc": "vpc",
            "description": "Security group for chat consumer instances",
            "ingress": [
                { "port": defaults::CONSUMER_PORT, "peer": "server-security-group", "description": "STOMP relay from servers" },
                { "port": defaults::CONSUMER_HEALTH_PORT, "peer": "server-security-group", "description": "Health checks from servers" },
                { "port": 22, "peer": "any-ipv4", "description": "SSH management" },
            ],
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "consumer-registry-table",
        ResourceKind::Table,
        json!({
            "table_name": defaults::REGISTRY_TABLE_NAME,
            "partition_key": { "name": "roomId", "type": "string" },
            "sort_key": { "name": "consumerId", "type": "string" },
            "billing_mode": "pay-per-request",
            "ttl_attribute": "expiresAt",
            "removal_policy": "destroy",
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "ec2-role",
        ResourceKind::Identity,
        json!({
            "assumed_by": "ec2.amazonaws.com",
            "managed_policies": ["AmazonSSMManagedInstanceCore", "CloudWatchAgentServerPolicy"],
            "grants": [
                { "read": "app-bucket" },
                { "read_write": "consumer-registry-table" },
            ],
            "statements": [
                { "actions": ["cloudwatch:PutMetricData"], "resources": ["*"] },
                {
                    "actions": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents", "logs:DescribeLogStreams"],
                    "resources": [
                        "arn:aws:logs:*:*:log-group:websocketchat-server:*",
                        "arn:aws:logs:*:*:log-group:websocketchat-consumer:*",
                    ],
                },
                {
                    "actions": [
                        "sqs:SendMessage", "sqs:ReceiveMessage", "sqs:DeleteMessage", "sqs:GetQueueUrl",
                        "sqs:CreateQueue", "sqs:TagQueue", "sqs:GetQueueAttributes",
                    ],
                    "resources": [format!("arn:aws:sqs:*:*:{QUEUE_NAME_PREFIX}*")],
                },
            ],
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "consumer-instance",
        ResourceKind::Compute,
        json!({
            "vpc": "vpc",
            "subnet_type": "public",
            "instance_type": config.server.instance_type,
            "machine_image": "amazon-linux-2023",
            "security_group": "consumer-security-group",
            "role": "ec2-role",
            "key_pair": config.server.key_pair,
            "user_data": {
                "template": "resources/ec2/consumer/userdata.sh",
                "bucket": "app-bucket",
                "jar_file": jar_file,
            },
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "alb",
        ResourceKind::LoadBalancer,
        json!({
            "vpc": "vpc",
            "internet_facing": true,
            "security_group": "alb-security-group",
            "idle_timeout_secs": defaults::ALB_IDLE_TIMEOUT_SECS,
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "target-group",
        ResourceKind::LoadBalancer,
        json!({
            "vpc": "vpc",
            "port": defaults::SERVER_PORT,
            "protocol": "http",
            "target_type": "instance",
            "health_check": {
                "path": defaults::HEALTH_CHECK_PATH,
                "port": defaults::SERVER_HEALTH_PORT,
                "interval_secs": 30,
                "timeout_secs": 5,
                "healthy_threshold": 2,
                "unhealthy_threshold": 3,
            },
            "stickiness_cookie_days": 1,
            "deregistration_delay_secs": 30,
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "ws-listener",
        ResourceKind::LoadBalancer,
        json!({
            "load_balancer": "alb",
            "port": 80,
            "protocol": "http",
            "default_target_group": "target-group",
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "server-asg",
        ResourceKind::Compute,
        json!({
            "vpc": "vpc",
            "subnet_type": "public",
            "instance_type": config.server.instance_type,
            "machine_image": "amazon-linux-2023",
            "security_group": "server-security-group",
            "role": "ec2-role",
            "key_pair": config.server.key_pair,
            "min_capacity": config.server.min_capacity,
            "max_capacity": config.server.max_capacity,
            "desired_capacity": config.server.desired_capacity,
            "scaling": { "cpu_target_percent": config.server.cpu_target_percent },
            "target_group": "target-group",
            "user_data": {
                "template": "resources/ec2/server/userdata.sh",
                "bucket": "app-bucket",
                "jar_file": jar_file,
            },
        }),
    ))?;

    graph.add_node(ResourceNode::new(
        "queue-cleanup-fn",
        ResourceKind::Function,
        json!({
            "runtime": "python3.11",
            "handler": "sqs_cleanup_function.handler",
            "code": "resources/lambda",
            "timeout_secs": defaults::DEFAULT_CLEANUP_TIMEOUT_SECS,
            "description": "Cleanup dynamically created SQS queues on stack deletion",
            "statements": [{
                "actions": ["sqs:ListQueues", "sqs:DeleteQueue", "sqs:ListQueueTags", "sqs:GetQueueUrl"],
                "resources": ["*"],
            }],
        }),
    ))?;
    graph.add_node(ResourceNode::new(
        "queue-cleanup",
        ResourceKind::CustomAction,
        json!({
            "handler": "queue-cleanup-fn",
            "queue_prefix": QUEUE_NAME_PREFIX,
            "required_tag": { TAG_MANAGED_BY: MANAGED_BY_VALUE },
        }),
    ))?;

    // Security groups need the VPC, and reference each other in ingress
    // rules.
    graph.add_edge("vpc", "alb-security-group")?;
    graph.add_edge("vpc", "server-security-group")?;
    graph.add_edge("vpc", "consumer-security-group")?;
    graph.add_edge("alb-security-group", "server-security-group")?;
    graph.add_edge("server-security-group", "consumer-security-group")?;

    // Uploads land in the bucket; the role's grants reference the bucket
    // and the registry table.
    graph.add_edge("app-bucket", "jar-upload")?;
    graph.add_edge("app-bucket", "server-config-upload")?;
    graph.add_edge("app-bucket", "consumer-config-upload")?;
    graph.add_edge("app-bucket", "ec2-role")?;
    graph.add_edge("consumer-registry-table", "ec2-role")?;

    // The consumer boots from uploaded assets.
    graph.add_edge("vpc", "consumer-instance")?;
    graph.add_edge("consumer-security-group", "consumer-instance")?;
    graph.add_edge("ec2-role", "consumer-instance")?;
    graph.add_edge("jar-upload", "consumer-instance")?;
    graph.add_edge("consumer-config-upload", "consumer-instance")?;

    graph.add_edge("vpc", "alb")?;
    graph.add_edge("alb-security-group", "alb")?;
    graph.add_edge("vpc", "target-group")?;
    graph.add_edge("alb", "ws-listener")?;
    graph.add_edge("target-group", "ws-listener")?;

    // The server fleet boots from uploaded assets, attaches to the target
    // group, and must find the consumer already running.
    graph.add_edge("vpc", "server-asg")?;
    graph.add_edge("server-security-group", "server-asg")?;
    graph.add_edge("ec2-role", "server-asg")?;
    graph.add_edge("jar-upload", "server-asg")?;
    graph.add_edge("server-config-upload", "server-asg")?;
    graph.add_edge("consumer-instance", "server-asg")?;
    graph.add_edge("target-group", "server-asg")?;

    // Teardown: the fleet that created the per-room queues is gone before
    // the cleanup runs, and the cleanup function outlives its own run.
    graph.add_edge("queue-cleanup-fn", "queue-cleanup")?;
    graph.add_edge("server-asg", "queue-cleanup")?;
    graph.mark_teardown_action("queue-cleanup", "queue-cleanup-fn")?;

    let outputs = vec![
        StackOutput {
            name: "LoadBalancerDNS".to_string(),
            value: "${alb.dns_name}".to_string(),
            description: "DNS name of the Application Load Balancer".to_string(),
        },
        StackOutput {
            name: "WebSocketURL".to_string(),
            value: "ws://${alb.dns_name}/chat/{roomid}".to_string(),
            description: "WebSocket endpoint URL".to_string(),
        },
        StackOutput {
            name: "ConsumerRegistryTableName".to_string(),
            value: "${consumer-registry-table.table_name}".to_string(),
            description: "DynamoDB Consumer Registry Table Name".to_string(),
        },
    ];

    Ok(StackDefinition { graph, outputs })
}
