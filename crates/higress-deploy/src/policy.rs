//! IAM policy document handling for the load balancer controller.
//!
//! The published baseline policy lags behind what the controller actually
//! calls, so a fixed set of listener permissions is merged into the statement
//! that grants `elasticloadbalancing` actions before the policy is pushed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Permissions missing from the v2.7.0 baseline document.
pub const ADDITIONAL_PERMISSIONS: &[&str] = &[
    "elasticloadbalancing:DescribeListenerAttributes",
    "elasticloadbalancing:ModifyListenerAttributes",
    "elasticloadbalancing:DescribeListenerCertificates",
    "elasticloadbalancing:ModifyListenerCertificates",
];

/// IAM keeps at most five versions of a managed policy.
pub const MAX_POLICY_VERSIONS: usize = 5;

/// Non-default version count at which the oldest one is evicted before a new
/// version is pushed. The default version plus this many fills the cap.
pub const VERSION_EVICTION_THRESHOLD: usize = MAX_POLICY_VERSIONS - 1;

const ELB_ACTION_PREFIX: &str = "elasticloadbalancing";

/// Which statements receive the additional permissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentScope {
    /// Only the first `Allow` statement with load balancer actions.
    #[default]
    FirstMatch,
    /// Every `Allow` statement with load balancer actions.
    AllMatches,
}

/// Merge [`ADDITIONAL_PERMISSIONS`] into the matching statements of `policy`.
///
/// Returns the permissions that were added. Permissions already present are
/// skipped, so running this twice adds nothing the second time. Statements
/// whose `Action` is a single string rather than a list are left untouched.
pub fn augment(policy: &mut Value, scope: AugmentScope) -> Vec<String> {
    let mut added = Vec::new();

    let Some(statements) = policy.get_mut("Statement").and_then(|s| s.as_array_mut()) else {
        return added;
    };

    for statement in statements {
        if statement.get("Effect").and_then(|e| e.as_str()) != Some("Allow") {
            continue;
        }
        let Some(actions) = statement.get_mut("Action").and_then(|a| a.as_array_mut()) else {
            continue;
        };
        let grants_elb = actions
            .iter()
            .filter_map(|a| a.as_str())
            .any(|a| a.contains(ELB_ACTION_PREFIX));
        if !grants_elb {
            continue;
        }

        for permission in ADDITIONAL_PERMISSIONS {
            if !actions.iter().any(|a| a.as_str() == Some(permission)) {
                actions.push(Value::String(permission.to_string()));
                added.push(permission.to_string());
            }
        }

        if scope == AugmentScope::FirstMatch {
            break;
        }
    }

    added
}

/// Pick the version to delete before creating a new one, if the cap is close.
///
/// `non_default_versions` is the whitespace separated `VersionId` list printed
/// by `aws iam list-policy-versions`. The oldest version is the one with the
/// lowest numeric suffix (`v2` before `v10`).
pub fn version_to_evict(non_default_versions: &str) -> Option<String> {
    let versions: Vec<&str> = non_default_versions.split_whitespace().collect();
    if versions.len() < VERSION_EVICTION_THRESHOLD {
        return None;
    }
    versions
        .into_iter()
        .min_by_key(|v| {
            v.trim_start_matches(['v', 'V'])
                .parse::<u64>()
                .unwrap_or(u64::MAX)
        })
        .map(str::to_string)
}
