//! Kind tags for declared stack resources
//!
//! Every node in the deployment graph carries one of these tags. The tag is
//! informational for plan consumers; ordering comes from explicit edges, not
//! from the kind.

/// Kind of a declared stack resource
///
/// Serialized in kebab-case in emitted plans (e.g. `load-balancer`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// VPC, subnets, routing
    Network,
    /// Security group and its ingress rules
    SecurityRule,
    /// Bucket or bucket asset upload
    Storage,
    /// IAM role or instance profile
    Identity,
    /// EC2 instance or auto scaling group
    Compute,
    /// ALB, target group, listener
    LoadBalancer,
    /// DynamoDB table
    Table,
    /// Lambda function
    Function,
    /// One-shot action run by the provisioning engine during teardown
    CustomAction,
}

impl ResourceKind {
    /// Kebab-case name as used in plan output and logging
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kebab_case_names() {
        assert_eq!(ResourceKind::LoadBalancer.as_str(), "load-balancer");
        assert_eq!(ResourceKind::CustomAction.as_str(), "custom-action");
        assert_eq!(ResourceKind::Network.to_string(), "network");
    }

    #[test]
    fn display_matches_as_str() {
        for kind in [
            ResourceKind::Network,
            ResourceKind::SecurityRule,
            ResourceKind::Storage,
            ResourceKind::Identity,
            ResourceKind::Compute,
            ResourceKind::LoadBalancer,
            ResourceKind::Table,
            ResourceKind::Function,
            ResourceKind::CustomAction,
        ] {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn parses_from_plan_output() {
        assert_eq!(
            ResourceKind::from_str("load-balancer").unwrap(),
            ResourceKind::LoadBalancer
        );
        assert!(ResourceKind::from_str("does-not-exist").is_err());
    }
}
