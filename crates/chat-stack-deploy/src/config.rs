//! Configuration for the chat-system stack declaration
//!
//! Composed of focused sub-configs. These carry the parameterization that
//! feeds node spec payloads; none of them change the shape of the graph.

use chat_stack_common::defaults;

/// Application artifact parameters
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Application version, used to derive the server jar name
    pub version: String,
}

impl ArtifactConfig {
    /// File name of the pre-built server jar for this version
    pub fn jar_file_name(&self) -> String {
        format!("WebSocketChatSystemPOC-{}.jar", self.version)
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            version: defaults::DEFAULT_APP_VERSION.to_string(),
        }
    }
}

/// VPC layout parameters
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of availability zones to span
    pub max_azs: u32,
    /// CIDR mask for the public subnets
    pub subnet_cidr_mask: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_azs: defaults::MAX_AZS,
            subnet_cidr_mask: defaults::SUBNET_CIDR_MASK,
        }
    }
}

/// Server fleet sizing and scaling
#[derive(Debug, Clone)]
pub struct ServerFleetConfig {
    pub instance_type: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub desired_capacity: u32,
    /// CPU utilization target for the scaling policy (percent)
    pub cpu_target_percent: u32,
    /// SSH key pair name, if instances should be reachable for management
    pub key_pair: Option<String>,
}

impl Default for ServerFleetConfig {
    fn default() -> Self {
        Self {
            instance_type: defaults::INSTANCE_TYPE.to_string(),
            min_capacity: defaults::ASG_MIN_CAPACITY,
            max_capacity: defaults::ASG_MAX_CAPACITY,
            desired_capacity: defaults::ASG_DESIRED_CAPACITY,
            cpu_target_percent: defaults::CPU_TARGET_UTILIZATION,
            key_pair: None,
        }
    }
}

/// AWS environment settings
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    /// AWS profile name (overrides default credential resolution)
    pub profile: Option<String>,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: defaults::DEFAULT_REGION.to_string(),
            profile: None,
        }
    }
}

/// Full configuration for one stack declaration
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    pub artifact: ArtifactConfig,
    pub network: NetworkConfig,
    pub server: ServerFleetConfig,
    pub aws: AwsSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jar_name_follows_version() {
        let artifact = ArtifactConfig {
            version: "2.3.1".to_string(),
        };
        assert_eq!(artifact.jar_file_name(), "WebSocketChatSystemPOC-2.3.1.jar");
    }

    #[test]
    fn defaults_mirror_the_shipped_deployment() {
        let config = StackConfig::default();
        assert_eq!(config.server.min_capacity, 2);
        assert_eq!(config.server.max_capacity, 10);
        assert_eq!(config.server.cpu_target_percent, 70);
        assert_eq!(config.network.max_azs, 2);
    }
}
