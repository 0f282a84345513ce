use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::path;

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type Normalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A single normalization rule: names created inside a matching directory are rewritten.
#[derive(Clone)]
pub struct NamingRule {
    label: String,
    applies: Predicate,
    normalize: Normalizer,
}

impl NamingRule {
    pub fn new<P, N>(label: impl Into<String>, applies: P, normalize: N) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
        N: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            applies: Arc::new(applies),
            normalize: Arc::new(normalize),
        }
    }

    /// Route-safe names for everything at or below `prefix`.
    pub fn route_namespace(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let label = format!("route:{}", prefix);
        Self::new(
            label,
            move |dir: &str| path::is_within(dir, &prefix) && !prefix.trim_matches('/').is_empty(),
            route_slug,
        )
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for NamingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingRule").field("label", &self.label).finish()
    }
}

/// Ordered set of naming rules. The first rule matching the target directory wins;
/// names outside every rule pass through untouched.
#[derive(Clone, Debug, Default)]
pub struct NamingPolicy {
    rules: Vec<NamingRule>,
}

impl NamingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy with a route namespace rule for each prefix.
    pub fn with_route_namespaces<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut policy = Self::new();
        for prefix in prefixes {
            policy.push(NamingRule::route_namespace(prefix));
        }
        policy
    }

    pub fn push(&mut self, rule: NamingRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[NamingRule] {
        &self.rules
    }

    /// Normalize `raw_name` for creation inside directory `dir`.
    pub fn normalize(&self, dir: &str, raw_name: &str) -> String {
        match self.rules.iter().find(|rule| (rule.applies)(dir)) {
            Some(rule) => (rule.normalize)(raw_name),
            None => raw_name.to_string(),
        }
    }
}

/// Replace whitespace runs with a single hyphen and lower-case the result.
pub fn route_slug(name: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"));
    re.replace_all(name, "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_slug() {
        assert_eq!(route_slug("My Page"), "my-page");
        assert_eq!(route_slug("About \t  Us.svelte"), "about-us.svelte");
        assert_eq!(route_slug("plain"), "plain");
    }

    #[test]
    fn test_policy_applies_only_inside_namespace() {
        let policy = NamingPolicy::with_route_namespaces(["routes"]);
        assert_eq!(policy.normalize("routes/pages", "My Page"), "my-page");
        assert_eq!(policy.normalize("routes", "My Page"), "my-page");
        assert_eq!(policy.normalize("src/lib", "My Page"), "My Page");
        assert_eq!(policy.normalize("routesextra", "My Page"), "My Page");
        assert_eq!(policy.normalize("", "My Page"), "My Page");
    }

    #[test]
    fn test_custom_rule_first_match_wins() {
        let mut policy = NamingPolicy::new();
        policy.push(NamingRule::new("upper", |dir| dir == "consts", |n| n.to_uppercase()));
        policy.push(NamingRule::route_namespace("consts"));
        assert_eq!(policy.normalize("consts", "max size"), "MAX SIZE");
        assert_eq!(policy.rules()[0].label(), "upper");
    }

    #[test]
    fn test_empty_policy_is_identity() {
        let policy = NamingPolicy::default();
        assert_eq!(policy.normalize("routes", "My Page"), "My Page");
    }
}
