//! Allow/deny rule evaluation for libraries and conditional arguments.

use crate::error::EngineError;
use crate::platform::RuleEnv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsPredicate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Regex matched against the host OS version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsPredicate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, bool>>,
}

/// Evaluate a rule list against an environment.
///
/// The empty list allows. A non-empty list starts from deny; each matching
/// rule overwrites the outcome with its action, so the last match wins.
/// Returns `true` for allow.
pub fn evaluate(rules: &[Rule], env: &RuleEnv) -> Result<bool, EngineError> {
    if rules.is_empty() {
        return Ok(true);
    }

    let mut allow = false;

    for rule in rules {
        if rule_matches(rule, env)? {
            allow = rule.action == RuleAction::Allow;
        }
    }

    Ok(allow)
}

fn rule_matches(rule: &Rule, env: &RuleEnv) -> Result<bool, EngineError> {
    if let Some(ref os) = rule.os {
        if let Some(ref name) = os.name {
            if name != env.os.as_str() {
                return Ok(false);
            }
        }

        if let Some(ref arch) = os.arch {
            if arch != env.arch.as_str() {
                return Ok(false);
            }
        }

        if let Some(ref version_expr) = os.version {
            let re = regex::Regex::new(version_expr)
                .map_err(|e| EngineError::BadRule(format!("os.version regex: {}", e)))?;
            if !re.is_match(&env.os_version) {
                return Ok(false);
            }
        }
    }

    if let Some(ref features) = rule.features {
        for (key, required) in features {
            // A feature the environment does not declare never matches.
            if env.features.get(key) != Some(required) {
                return Ok(false);
            }
        }
    }

    Ok(true)
}
