use crate::state::CompatibleNodes;
use std::collections::BTreeSet;

/// Intersect the matched-node sets of a Pod's feature groups
///
/// Each item is one group's matched nodes, or `None` when the group's status
/// could not be read this round. Unreadable groups are skipped instead of
/// emptying the result, but if no group was readable the result is empty.
/// With no groups at all nothing constrains the Pod.
pub fn intersect<I>(statuses: I) -> CompatibleNodes
where
    I: IntoIterator<Item = Option<BTreeSet<String>>>,
{
    let mut any_group = false;
    let mut any_readable = false;
    let mut result = CompatibleNodes::All;

    for nodes in statuses {
        any_group = true;
        if let Some(nodes) = nodes {
            any_readable = true;
            result = result.narrow(&nodes);
        }
    }

    if any_group && !any_readable {
        return CompatibleNodes::Only(BTreeSet::new());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> Option<BTreeSet<String>> {
        Some(names.iter().map(|n| n.to_string()).collect())
    }

    fn only(names: &[&str]) -> CompatibleNodes {
        CompatibleNodes::Only(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn test_two_groups() {
        let result = intersect(vec![nodes(&["n1", "n2", "n3"]), nodes(&["n2", "n3", "n4"])]);
        assert_eq!(result, only(&["n2", "n3"]));
    }

    #[test]
    fn test_order_independent() {
        let a = nodes(&["n1", "n2", "n3"]);
        let b = nodes(&["n2", "n3", "n4"]);
        let c = nodes(&["n3", "n2", "n5"]);
        let expected = only(&["n2", "n3"]);

        let permutations = [
            vec![a.clone(), b.clone(), c.clone()],
            vec![a.clone(), c.clone(), b.clone()],
            vec![b.clone(), a.clone(), c.clone()],
            vec![b.clone(), c.clone(), a.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![c, b, a],
        ];
        for permutation in permutations {
            assert_eq!(intersect(permutation), expected);
        }
    }

    #[test]
    fn test_no_groups_is_unconstrained() {
        assert_eq!(intersect(Vec::new()), CompatibleNodes::All);
    }

    #[test]
    fn test_unreadable_group_is_skipped() {
        let result = intersect(vec![None, nodes(&["n1", "n2"]), None]);
        assert_eq!(result, only(&["n1", "n2"]));
    }

    #[test]
    fn test_all_unreadable_is_empty() {
        let result = intersect(vec![None, None]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_disjoint_groups_are_empty() {
        let result = intersect(vec![nodes(&["n1"]), nodes(&["n2"])]);
        assert_eq!(result, only(&[]));
        assert!(result.is_empty());
    }

    #[test]
    fn test_populated_empty_status_constrains() {
        let result = intersect(vec![nodes(&["n1"]), nodes(&[])]);
        assert!(result.is_empty());
    }
}
