use std::collections::HashMap;

use async_trait::async_trait;

use super::{Combinator, CombinatorBase, merge_schemas};
use crate::error::CoreResult;
use crate::tag::Tag;
use crate::token::{Token, TokenMap};

// ---------------------------------------------------------------------------
// DotProductCombinator
// ---------------------------------------------------------------------------

/// Pairs same-tag tokens across all items.
///
/// A tag is complete once every item has contributed for it; the merged
/// schema is emitted and the tag's slots are cleared. Contributions for a
/// tag overwrite earlier ones from the same item.
pub struct DotProductCombinator {
    base: CombinatorBase,
    groups: HashMap<Tag, HashMap<String, TokenMap>>,
}

impl DotProductCombinator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: CombinatorBase::new(name),
            groups: HashMap::new(),
        }
    }
}

#[async_trait]
impl Combinator for DotProductCombinator {
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
                let slots = self.groups.remove(&contribution.tag).expect("slot just filled");
                outputs.push(merge_schemas(self.base.item_order(), |item| {
                    slots.get(item)
                }));
            }
        }
        Ok(outputs)
    }
}
