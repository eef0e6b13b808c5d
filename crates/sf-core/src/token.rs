use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::job::Job;
use crate::tag::Tag;

/// Tokens keyed by port name: one gathered input tuple, or one combinator
/// schema ready to emit.
pub type TokenMap = BTreeMap<String, Token>;

// ---------------------------------------------------------------------------
// Token — the unit of data on a port
// ---------------------------------------------------------------------------

/// The unit of data flowing on a port.
///
/// Data-bearing variants carry a [`Tag`] and an optional persistent
/// identifier assigned when the token is written through to the provenance
/// store. `Termination` marks end-of-stream for a producer;
/// `IterationTermination` marks the end of one iteration, with the expected
/// item count encoded as the last tag segment (`<prefix>.<N>`).
#[derive(Debug, Clone)]
pub enum Token {
    Value(ValueToken),
    List(ListToken),
    Job(JobToken),
    IterationTermination(IterationTermination),
    Termination,
}

#[derive(Debug, Clone)]
pub struct ValueToken {
    pub tag: Tag,
    pub value: Value,
    pub persistent_id: Option<i64>,
}

/// A token whose value is an ordered sequence of tokens.
#[derive(Debug, Clone)]
pub struct ListToken {
    pub tag: Tag,
    pub tokens: Vec<Token>,
    pub persistent_id: Option<i64>,
}

/// A token carrying a [`Job`] descriptor.
#[derive(Debug, Clone)]
pub struct JobToken {
    pub tag: Tag,
    pub job: Arc<Job>,
    pub persistent_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IterationTermination {
    pub tag: Tag,
    pub persistent_id: Option<i64>,
}

impl Token {
    pub fn value(tag: impl Into<Tag>, value: Value) -> Self {
        Token::Value(ValueToken {
            tag: tag.into(),
            value,
            persistent_id: None,
        })
    }

    pub fn list(tag: impl Into<Tag>, tokens: Vec<Token>) -> Self {
        Token::List(ListToken {
            tag: tag.into(),
            tokens,
            persistent_id: None,
        })
    }

    pub fn job(tag: impl Into<Tag>, job: Arc<Job>) -> Self {
        Token::Job(JobToken {
            tag: tag.into(),
            job,
            persistent_id: None,
        })
    }

    pub fn iteration_termination(tag: impl Into<Tag>) -> Self {
        Token::IterationTermination(IterationTermination {
            tag: tag.into(),
            persistent_id: None,
        })
    }

    /// The token's tag. `Termination` carries none.
    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Token::Value(t) => Some(&t.tag),
            Token::List(t) => Some(&t.tag),
            Token::Job(t) => Some(&t.tag),
            Token::IterationTermination(t) => Some(&t.tag),
            Token::Termination => None,
        }
    }

    pub fn persistent_id(&self) -> Option<i64> {
        match self {
            Token::Value(t) => t.persistent_id,
            Token::List(t) => t.persistent_id,
            Token::Job(t) => t.persistent_id,
            Token::IterationTermination(t) => t.persistent_id,
            Token::Termination => None,
        }
    }

    pub fn set_persistent_id(&mut self, id: i64) {
        match self {
            Token::Value(t) => t.persistent_id = Some(id),
            Token::List(t) => t.persistent_id = Some(id),
            Token::Job(t) => t.persistent_id = Some(id),
            Token::IterationTermination(t) => t.persistent_id = Some(id),
            Token::Termination => {}
        }
    }

    /// The same token under a new tag. The persistent identifier is cleared:
    /// a retagged token is a new token for provenance purposes.
    pub fn retag(&self, tag: Tag) -> Token {
        let mut token = self.clone();
        match &mut token {
            Token::Value(t) => {
                t.tag = tag;
                t.persistent_id = None;
            }
            Token::List(t) => {
                t.tag = tag;
                t.persistent_id = None;
            }
            Token::Job(t) => {
                t.tag = tag;
                t.persistent_id = None;
            }
            Token::IterationTermination(t) => {
                t.tag = tag;
                t.persistent_id = None;
            }
            Token::Termination => {}
        }
        token
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, Token::Termination)
    }

    pub fn is_iteration_termination(&self) -> bool {
        matches!(self, Token::IterationTermination(_))
    }

    /// Kind discriminator recorded alongside the persisted value.
    pub fn kind(&self) -> &'static str {
        match self {
            Token::Value(_) => "value",
            Token::List(_) => "list",
            Token::Job(_) => "job",
            Token::IterationTermination(_) => "iteration-termination",
            Token::Termination => "termination",
        }
    }

    /// Serialize for the provenance store.
    pub fn save(&self) -> Value {
        match self {
            Token::Value(t) => t.value.clone(),
            Token::List(t) => Value::Array(t.tokens.iter().map(Token::save).collect()),
            Token::Job(t) => t.job.save(),
            Token::IterationTermination(t) => json!({ "tag": t.tag }),
            Token::Termination => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch helpers
// ---------------------------------------------------------------------------

/// True iff any token in the batch is a `Termination`.
pub fn has_termination<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> bool {
    tokens.into_iter().any(Token::is_termination)
}

/// True iff any token in the batch is an `IterationTermination`.
pub fn has_iteration_termination<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> bool {
    tokens.into_iter().any(Token::is_iteration_termination)
}

/// The tag a token derived from a set of inputs should carry: the deepest
/// input tag, or the root tag when there are no inputs.
pub fn derived_tag<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> Tag {
    tokens
        .into_iter()
        .filter_map(Token::tag)
        .max_by_key(|tag| tag.depth())
        .cloned()
        .unwrap_or_else(Tag::root)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retag_clears_persistent_id() {
        let mut token = Token::value("a", json!(1));
        token.set_persistent_id(7);
        let retagged = token.retag(Tag::from("a.0"));
        assert_eq!(retagged.tag().unwrap().as_str(), "a.0");
        assert_eq!(retagged.persistent_id(), None);
        assert_eq!(token.persistent_id(), Some(7));
    }

    #[test]
    fn termination_detection() {
        let batch = vec![Token::value("a", json!(1)), Token::Termination];
        assert!(has_termination(&batch));
        assert!(!has_iteration_termination(&batch));
        assert!(has_iteration_termination(&[
            Token::iteration_termination("p.2")
        ]));
    }

    #[test]
    fn derived_tag_picks_deepest() {
        let batch = vec![
            Token::value("a", json!(1)),
            Token::value("a.0.1", json!(2)),
            Token::value("a.0", json!(3)),
        ];
        assert_eq!(derived_tag(&batch).as_str(), "a.0.1");
        assert_eq!(derived_tag([]).as_str(), "0");
    }

    #[test]
    fn list_save_is_elementwise() {
        let token = Token::list("a", vec![Token::value("a.0", json!(1))]);
        assert_eq!(token.save(), json!([1]));
    }
}
