use std::collections::HashSet;

use serde_json::json;

use super::*;
use crate::token::Token;

fn tok(tag: &str, value: i64) -> Token {
    Token::value(tag, json!(value))
}

#[tokio::test]
async fn dot_product_waits_for_all_items() {
    let mut dot = DotProductCombinator::new("dot");
    dot.add_item("p");
    dot.add_item("q");

    assert!(dot.combine("p", tok("1", 10)).await.unwrap().is_empty());
    let schemas = dot.combine("q", tok("1", 20)).await.unwrap();
    assert_eq!(schemas.len(), 1);
    let schema = &schemas[0];
    assert_eq!(schema["p"].tag().unwrap().as_str(), "1");
    assert_eq!(schema["q"].tag().unwrap().as_str(), "1");

    // The slot was cleared: the same tag needs both items again.
    assert!(dot.combine("p", tok("1", 11)).await.unwrap().is_empty());
}

#[tokio::test]
async fn dot_product_keeps_tags_apart() {
    let mut dot = DotProductCombinator::new("dot");
    dot.add_item("p");
    dot.add_item("q");

    assert!(dot.combine("p", tok("1", 1)).await.unwrap().is_empty());
    assert!(dot.combine("q", tok("2", 2)).await.unwrap().is_empty());
    assert_eq!(dot.combine("q", tok("1", 3)).await.unwrap().len(), 1);
    assert_eq!(dot.combine("p", tok("2", 4)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cartesian_product_emits_all_pairs() {
    let mut cross = CartesianProductCombinator::new("cross");
    cross.add_item("p");
    cross.add_item("q");

    let mut emitted = Vec::new();
    emitted.extend(cross.combine("p", tok("1", 1)).await.unwrap());
    emitted.extend(cross.combine("q", tok("1", 2)).await.unwrap());
    emitted.extend(cross.combine("p", tok("2", 3)).await.unwrap());
    emitted.extend(cross.combine("q", tok("2", 4)).await.unwrap());

    assert_eq!(emitted.len(), 4);
    // Every schema carries the concatenated tag on both tokens.
    let tags: Vec<String> = emitted
        .iter()
        .map(|s| s["p"].tag().unwrap().as_str().to_string())
        .collect();
    assert_eq!(tags, vec!["1.1", "1.2", "2.1", "2.2"]);
    for schema in &emitted {
        assert_eq!(schema["p"].tag(), schema["q"].tag());
    }
}

#[tokio::test]
async fn cartesian_unknown_port_is_definition_error() {
    let mut cross = CartesianProductCombinator::new("cross");
    cross.add_item("p");
    assert!(cross.combine("nope", tok("1", 1)).await.is_err());
}

#[tokio::test]
async fn loop_combinator_counts_iterations_per_tag() {
    let mut looped = LoopCombinator::new("loop");
    looped.add_item("p");

    let first = looped.combine("p", tok("a", 1)).await.unwrap();
    let second = looped.combine("p", tok("a", 2)).await.unwrap();
    let other = looped.combine("p", tok("b", 3)).await.unwrap();

    assert_eq!(first[0]["p"].tag().unwrap().as_str(), "a.0");
    assert_eq!(second[0]["p"].tag().unwrap().as_str(), "a.1");
    assert_eq!(other[0]["p"].tag().unwrap().as_str(), "b.0");
}

#[tokio::test]
async fn nested_combinator_contributes_as_one_item() {
    // dot( p, cross(q, r) ): the nested cross product's schemas feed the
    // outer dot product as contributions of the "inner" item.
    let mut inner = CartesianProductCombinator::new("inner");
    inner.add_item("q");
    inner.add_item("r");

    let mut outer = DotProductCombinator::new("outer");
    outer.add_item("p");
    outer.add_combinator(
        Box::new(inner),
        HashSet::from(["q".to_string(), "r".to_string()]),
    );

    assert!(outer.combine("p", tok("1.2", 1)).await.unwrap().is_empty());
    assert!(outer.combine("q", tok("1", 2)).await.unwrap().is_empty());
    let schemas = outer.combine("r", tok("2", 3)).await.unwrap();

    // cross(q@1, r@2) yields tag "1.2", matching p's tag at the outer level.
    assert_eq!(schemas.len(), 1);
    let schema = &schemas[0];
    assert_eq!(schema.len(), 3);
    assert_eq!(schema["q"].tag().unwrap().as_str(), "1.2");
    assert_eq!(schema["p"].tag().unwrap().as_str(), "1.2");

    assert_eq!(
        outer.items(true),
        HashSet::from([
            "p".to_string(),
            "inner".to_string(),
            "q".to_string(),
            "r".to_string()
        ])
    );
}
