//! Pure diff between declared routing hosts and existing TLS bindings.

use std::collections::HashSet;

use crate::cluster::{RoutingRule, TlsBinding};

/// Hosts declared by `rules` that appear in no binding's host list, in
/// first-declared order, each at most once.
///
/// Used by forced-TLS synthesis to decide which hosts still need a binding.
pub fn missing_hosts(rules: &[RoutingRule], bindings: &[TlsBinding]) -> Vec<String> {
    let covered: HashSet<&str> = bindings
        .iter()
        .flat_map(|binding| binding.hosts.iter().map(String::as_str))
        .collect();

    let mut seen = HashSet::new();
    rules
        .iter()
        .map(|rule| rule.host.as_str())
        .filter(|host| !covered.contains(host))
        .filter(|host| seen.insert(*host))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rules(hosts: &[&str]) -> Vec<RoutingRule> {
        hosts.iter().map(|host| RoutingRule::for_host(*host)).collect()
    }

    fn binding(hosts: &[&str]) -> TlsBinding {
        TlsBinding {
            hosts: hosts.iter().map(|host| host.to_string()).collect(),
            secret_name: "test.tls".to_string(),
        }
    }

    #[test]
    fn test_uncovered_host_is_reported() {
        let rules = rules(&["foo.example.com", "bar.example.com"]);
        let bindings =
            vec![binding(&["blab.example.com", "bar.example.com"]), binding(&["bang.example.com"])];

        let missing = missing_hosts(&rules, &bindings);
        assert_eq!(missing, vec!["foo.example.com"]);
    }

    #[test]
    fn test_no_bindings_reports_all_hosts_in_order() {
        let rules = rules(&["b.example.com", "a.example.com"]);
        let missing = missing_hosts(&rules, &[]);
        assert_eq!(missing, vec!["b.example.com", "a.example.com"]);
    }

    #[test]
    fn test_duplicate_rule_hosts_reported_once() {
        let rules = rules(&["dup.example.com", "other.example.com", "dup.example.com"]);
        let missing = missing_hosts(&rules, &[]);
        assert_eq!(missing, vec!["dup.example.com", "other.example.com"]);
    }

    #[test]
    fn test_fully_covered_rules_yield_nothing() {
        let rules = rules(&["foo.example.com"]);
        let bindings = vec![binding(&["foo.example.com"])];
        assert!(missing_hosts(&rules, &bindings).is_empty());
    }

    proptest! {
        #[test]
        fn prop_result_is_exactly_the_uncovered_hosts(
            rule_hosts in proptest::collection::vec("[a-c]{1,2}", 0..8),
            bound_hosts in proptest::collection::vec("[a-c]{1,2}", 0..8),
        ) {
            let rules: Vec<RoutingRule> =
                rule_hosts.iter().map(|h| RoutingRule::for_host(h.clone())).collect();
            let bindings = vec![TlsBinding {
                hosts: bound_hosts.clone(),
                secret_name: "p.tls".to_string(),
            }];

            let missing = missing_hosts(&rules, &bindings);

            // No reported host is covered, and none repeats.
            let mut seen = std::collections::HashSet::new();
            for host in &missing {
                prop_assert!(!bound_hosts.contains(host));
                prop_assert!(seen.insert(host.clone()));
            }

            // Every uncovered declared host is reported.
            for host in &rule_hosts {
                if !bound_hosts.contains(host) {
                    prop_assert!(missing.contains(host));
                }
            }

            // Order follows first declaration.
            let declaration_order: Vec<&String> = {
                let mut seen = std::collections::HashSet::new();
                rule_hosts
                    .iter()
                    .filter(|h| !bound_hosts.contains(*h) && seen.insert(*h))
                    .collect()
            };
            prop_assert_eq!(missing.iter().collect::<Vec<_>>(), declaration_order);
        }
    }
}
