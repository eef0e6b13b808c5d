mod cartesian;
mod dot;
mod iteration;

#[cfg(test)]
mod tests;

pub use cartesian::CartesianProductCombinator;
pub use dot::DotProductCombinator;
pub use iteration::LoopCombinator;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use orion_error::StructError;

use crate::error::{CoreReason, CoreResult};
use crate::tag::Tag;
use crate::token::{Token, TokenMap};

// ---------------------------------------------------------------------------
// Combinator — composable token-combining operator
// ---------------------------------------------------------------------------

/// A composable operator over multiple input token streams.
///
/// `combine` consumes one token from one port and yields zero or more
/// *schemas*: complete `{port_name -> token}` tuples ready to emit. Nested
/// combinators form a tree; a nested combinator's schemas act as single
/// contributions of the parent item that owns them.
#[async_trait]
pub trait Combinator: Send {
    fn base(&self) -> &CombinatorBase;

    fn base_mut(&mut self) -> &mut CombinatorBase;

    async fn combine(&mut self, port_name: &str, token: Token) -> CoreResult<Vec<TokenMap>>;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn add_item(&mut self, item: &str) {
        self.base_mut().add_item(item);
    }

    fn add_combinator(&mut self, combinator: Box<dyn Combinator>, items: HashSet<String>) {
        self.base_mut().add_combinator(combinator, items);
    }

    /// The item names of this combinator, optionally including every nested
    /// combinator's items.
    fn items(&self, recursive: bool) -> HashSet<String> {
        self.base().items(recursive)
    }
}

// ---------------------------------------------------------------------------
// CombinatorBase — shared tree bookkeeping
// ---------------------------------------------------------------------------

/// One contribution toward a combination: the owning item, the tag it
/// arrived under, and the partial schema it carries.
pub struct Contribution {
    pub item: String,
    pub tag: Tag,
    pub schema: TokenMap,
}

/// Tree bookkeeping shared by every combinator kind: the ordered item list,
/// nested combinators, and the port-to-combinator routing map.
pub struct CombinatorBase {
    name: String,
    items: Vec<String>,
    combinators: HashMap<String, Box<dyn Combinator>>,
    /// `port name -> owning nested combinator name`.
    combinators_map: HashMap<String, String>,
}

impl CombinatorBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            combinators: HashMap::new(),
            combinators_map: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_item(&mut self, item: &str) {
        self.items.push(item.to_string());
    }

    pub fn add_combinator(&mut self, combinator: Box<dyn Combinator>, items: HashSet<String>) {
        let name = combinator.name().to_string();
        self.items.push(name.clone());
        for port in items {
            self.combinators_map.insert(port, name.clone());
        }
        self.combinators.insert(name, combinator);
    }

    /// Ordered item names (ports and nested combinator names).
    pub fn item_order(&self) -> &[String] {
        &self.items
    }

    pub fn items(&self, recursive: bool) -> HashSet<String> {
        let mut items: HashSet<String> = self.items.iter().cloned().collect();
        if recursive {
            for combinator in self.combinators.values() {
                items.extend(combinator.items(true));
            }
        }
        items
    }

    /// Resolve an incoming token into contributions at this tree level.
    ///
    /// A token for a port owned by a nested combinator is first combined
    /// there; each schema the nested combinator yields becomes one
    /// contribution of the nested item. Any other port contributes itself.
    pub async fn route(&mut self, port_name: &str, token: Token) -> CoreResult<Vec<Contribution>> {
        if let Some(owner) = self.combinators_map.get(port_name).cloned() {
            let combinator = self.combinators.get_mut(&owner).ok_or_else(|| {
                StructError::from(CoreReason::Definition)
                    .with_detail(format!("combinator {owner} not registered"))
            })?;
            let schemas = combinator.combine(port_name, token).await?;
            Ok(schemas
                .into_iter()
                .filter_map(|schema| {
                    let tag = schema.values().find_map(|t| t.tag().cloned())?;
                    Some(Contribution {
                        item: owner.clone(),
                        tag,
                        schema,
                    })
                })
                .collect())
        } else {
            if !self.items.iter().any(|i| i == port_name) {
                return Err(StructError::from(CoreReason::Definition).with_detail(format!(
                    "port {port_name} is not an item of combinator {}",
                    self.name
                )));
            }
            let tag = token.tag().cloned().ok_or_else(|| {
                StructError::from(CoreReason::Execution)
                    .with_detail("combinator received a token without a tag".to_string())
            })?;
            let mut schema = TokenMap::new();
            schema.insert(port_name.to_string(), token);
            Ok(vec![Contribution {
                item: port_name.to_string(),
                tag,
                schema,
            }])
        }
    }
}

// ---------------------------------------------------------------------------
// Schema helpers
// ---------------------------------------------------------------------------

/// Merge per-item schemas into one, visiting items in declaration order.
pub(crate) fn merge_schemas<'a>(
    items: &[String],
    parts: impl Fn(&str) -> Option<&'a TokenMap>,
) -> TokenMap {
    let mut merged = TokenMap::new();
    for item in items {
        if let Some(part) = parts(item) {
            for (port, token) in part {
                merged.insert(port.clone(), token.clone());
            }
        }
    }
    merged
}

/// Dot-join contribution tags in item order: `"1"` + `"2"` -> `"1.2"`.
pub(crate) fn join_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Tag {
    let parts: Vec<&str> = tags
        .into_iter()
        .map(Tag::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    Tag::new(parts.join("."))
}
