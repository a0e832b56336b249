pub mod feature_group;
pub mod owner;

pub use feature_group::{
    group_name_prefix, managed_labels, managed_selector, FeatureGroupNode, NodeFeatureGroup,
    NodeFeatureGroupSpec, NodeFeatureGroupStatus, MANAGED_BY_LABEL, PLUGIN_NAME, TEMPORARY_LABEL,
};
pub use owner::OwnerEdge;

/// Check a DNS-1123 label, the form namespace names take
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    name.len() <= 63
        && first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}
