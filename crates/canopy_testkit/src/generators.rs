//! Property-based test generators using proptest.

use canopy_store::{Binary, NodeTree, Property, PropertyType, Value};
use proptest::prelude::*;

/// Strategy for a single path segment from a small alphabet, so generated
/// paths often share prefixes.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-c]{1,2}").expect("Invalid regex")
}

/// Strategy for absolute paths of 1 to `max_depth` segments.
pub fn path_strategy(max_depth: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=max_depth)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Strategy for a list of changed paths.
pub fn path_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(path_strategy(4), 0..16)
}

/// Strategy for scalar attribute values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        ".{0,80}".prop_map(Value::String),
        any::<i64>().prop_map(Value::Long),
        any::<bool>().prop_map(Value::Boolean),
        "[a-z]{1,8}:[a-z]{1,8}".prop_map(Value::Name),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|b| Value::Binary(Binary::new(b))),
    ]
}

/// Strategy for single and multi-valued string attributes.
pub fn property_strategy() -> impl Strategy<Value = Property> {
    prop_oneof![
        value_strategy().prop_map(Property::Single),
        prop::collection::vec("[a-z]{0,12}".prop_map(Value::String), 0..5).prop_map(|values| {
            Property::Multiple {
                element_type: PropertyType::String,
                values,
            }
        }),
    ]
}

/// Strategy for attribute maps.
pub fn properties_strategy() -> impl Strategy<Value = Vec<(String, Property)>> {
    prop::collection::vec(("[a-z]{1,6}", property_strategy()), 0..6)
}

/// Strategy for small node trees.
pub fn node_tree_strategy() -> impl Strategy<Value = NodeTree> {
    let leaf = properties_strategy().prop_map(|props| {
        props
            .into_iter()
            .fold(NodeTree::new(), |node, (name, prop)| node.with_property(name, prop))
    });
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            properties_strategy(),
            prop::collection::vec((segment_strategy(), inner), 0..4),
        )
            .prop_map(|(props, children)| {
                let node = props
                    .into_iter()
                    .fold(NodeTree::new(), |node, (name, prop)| node.with_property(name, prop));
                children
                    .into_iter()
                    .fold(node, |node, (name, child)| node.with_child(name, child))
            })
    })
}
