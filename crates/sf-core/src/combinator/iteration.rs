use std::collections::HashMap;

use async_trait::async_trait;

use super::{Combinator, CombinatorBase, merge_schemas};
use crate::error::CoreResult;
use crate::tag::Tag;
use crate::token::{Token, TokenMap};

// ---------------------------------------------------------------------------
// LoopCombinator
// ---------------------------------------------------------------------------

/// Dot-product pairing whose emitted tuples enter the iteration tag space.
///
/// Tuples are grouped by tag exactly like the dot product; the n-th tuple
/// emitted for a tag `T` is retagged `T.n`, starting at 0. Downstream loop
/// accounting (iteration-termination tokens tagged `T.N`) then sees each
/// pass through the loop as its own sub-iteration.
pub struct LoopCombinator {
    base: CombinatorBase,
    groups: HashMap<Tag, HashMap<String, TokenMap>>,
    iterations: HashMap<Tag, usize>,
}

impl LoopCombinator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: CombinatorBase::new(name),
            groups: HashMap::new(),
            iterations: HashMap::new(),
        }
    }
}

#[async_trait]
impl Combinator for LoopCombinator {
    fn base(&self) -> &CombinatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CombinatorBase {
        &mut self.base
    }

    async fn combine(&mut self, port_name: &str, token: Token) -> CoreResult<Vec<TokenMap>> {
        let mut outputs = Vec::new();
        for contribution in self.base.route(port_name, token).await? {
            let slots = self.groups.entry(contribution.tag.clone()).or_default();
            slots.insert(contribution.item, contribution.schema);
            if slots.len() == self.base.item_order().len() {
                let slots = self
                    .groups
                    .remove(&contribution.tag)
                    .expect("slot just filled");
                let merged =
                    merge_schemas(self.base.item_order(), |item| slots.get(item));

                let counter = self.iterations.entry(contribution.tag.clone()).or_insert(0);
                let iteration_tag = contribution.tag.with_index(*counter);
                *counter += 1;

                outputs.push(
                    merged
                        .into_iter()
                        .map(|(port, token)| {
                            let retagged = token.retag(iteration_tag.clone());
                            (port, retagged)
                        })
                        .collect(),
                );
            }
        }
        Ok(outputs)
    }
}
