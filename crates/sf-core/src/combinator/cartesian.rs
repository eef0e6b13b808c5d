use std::collections::HashMap;

use async_trait::async_trait;

use super::{Combinator, CombinatorBase, join_tags};
use crate::error::CoreResult;
use crate::tag::Tag;
use crate::token::{Token, TokenMap};

// ---------------------------------------------------------------------------
// CartesianProductCombinator
// ---------------------------------------------------------------------------

/// Emits every combination of one contribution per item.
///
/// Each item keeps its full contribution history; a new arrival pairs with
/// everything the other items have seen so far, so the stream of emitted
/// schemas converges on the full cross product in arrival order. All tokens
/// of an emitted schema are retagged to the dot-joined concatenation of the
/// contributing tags, in item order.
pub struct CartesianProductCombinator {
    base: CombinatorBase,
    seen: HashMap<String, Vec<(Tag, TokenMap)>>,
}

impl CartesianProductCombinator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: CombinatorBase::new(name),
            seen: HashMap::new(),
        }
    }

    /// Cross one new contribution with the stored history of every other
    /// item, visiting items in declaration order.
    fn cross(&self, item: &str, tag: &Tag, schema: &TokenMap) -> Vec<TokenMap> {
        let mut outputs = Vec::new();
        let mut stack: Vec<(Tag, TokenMap)> = Vec::new();
        self.cross_rec(self.base.item_order(), item, tag, schema, &mut stack, &mut outputs);
        outputs
    }

    fn cross_rec(
        &self,
        remaining: &[String],
        item: &str,
        tag: &Tag,
        schema: &TokenMap,
        stack: &mut Vec<(Tag, TokenMap)>,
        outputs: &mut Vec<TokenMap>,
    ) {
        let Some((current, rest)) = remaining.split_first() else {
            let joined = join_tags(stack.iter().map(|(t, _)| t));
            let mut merged = TokenMap::new();
            for (_, part) in stack.iter() {
                for (port, token) in part {
                    merged.insert(port.clone(), token.retag(joined.clone()));
                }
            }
            outputs.push(merged);
            return;
        };

        if current == item {
            stack.push((tag.clone(), schema.clone()));
            self.cross_rec(rest, item, tag, schema, stack, outputs);
            stack.pop();
        } else if let Some(history) = self.seen.get(current) {
            for (seen_tag, seen_schema) in history {
                stack.push((seen_tag.clone(), seen_schema.clone()));
                self.cross_rec(rest, item, tag, schema, stack, outputs);
                stack.pop();
            }
        }
    }
}

#[async_trait]
impl Combinator for CartesianProductCombinator {
    fn base(&self) -> &CombinatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CombinatorBase {
        &mut self.base
    }

    async fn combine(&mut self, port_name: &str, token: Token) -> CoreResult<Vec<TokenMap>> {
        let mut outputs = Vec::new();
        for contribution in self.base.route(port_name, token).await? {
            let ready = self
                .base
                .item_order()
                .iter()
                .all(|other| {
                    other == &contribution.item
                        || self.seen.get(other).is_some_and(|h| !h.is_empty())
                });
            if ready {
                outputs.extend(self.cross(
                    &contribution.item,
                    &contribution.tag,
                    &contribution.schema,
                ));
            }
            self.seen
                .entry(contribution.item)
                .or_default()
                .push((contribution.tag, contribution.schema));
        }
        Ok(outputs)
    }
}
