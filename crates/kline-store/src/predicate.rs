//! Merge predicates.
//!
//! A predicate is a conjunction of key equalities between the incoming
//! (`source`/`src`) rows and the stored (`target`/`tgt`) rows:
//!
//! ```text
//! target.id = source.id
//! tgt.symbol = src.symbol AND tgt.open_time = src.open_time
//! ```

use crate::error::{StoreError, StoreResult};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

fn parse_side(alias: &str) -> Option<Side> {
    match alias.to_ascii_lowercase().as_str() {
        "source" | "src" => Some(Side::Source),
        "target" | "tgt" => Some(Side::Target),
        _ => None,
    }
}

/// One `target.<col> = source.<col>` equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub target: String,
    pub source: String,
}

/// Parsed uniqueness predicate for `merge_upsert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePredicate {
    keys: Vec<KeyPair>,
}

impl MergePredicate {
    /// `target.<column> = source.<column>` for each given column.
    pub fn on<I, S>(columns: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<KeyPair> = columns
            .into_iter()
            .map(|c| {
                let c = c.into();
                KeyPair {
                    target: c.clone(),
                    source: c,
                }
            })
            .collect();
        if keys.is_empty() {
            return Err(StoreError::InvalidPredicate {
                predicate: String::new(),
                reason: "at least one key column is required".to_string(),
            });
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[KeyPair] {
        &self.keys
    }

    pub fn target_columns(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.target.as_str()).collect()
    }

    pub fn source_columns(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.source.as_str()).collect()
    }
}

impl FromStr for MergePredicate {
    type Err = StoreError;

    fn from_str(predicate: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StoreError::InvalidPredicate {
            predicate: predicate.to_string(),
            reason: reason.to_string(),
        };

        // Split on the AND keyword, then glue each clause back without spaces
        let mut clauses = vec![String::new()];
        for token in predicate.split_whitespace() {
            if token.eq_ignore_ascii_case("and") {
                clauses.push(String::new());
            } else if let Some(last) = clauses.last_mut() {
                last.push_str(token);
            }
        }

        let mut keys = Vec::with_capacity(clauses.len());
        for clause in &clauses {
            if clause.is_empty() {
                return Err(invalid("empty clause"));
            }
            let (lhs, rhs) = clause
                .split_once('=')
                .ok_or_else(|| invalid("expected '<alias>.<column> = <alias>.<column>'"))?;
            if rhs.contains('=') {
                return Err(invalid("only '=' comparisons are supported"));
            }

            let operand = |side: &str| -> StoreResult<(Side, String)> {
                let (alias, column) = side
                    .split_once('.')
                    .ok_or_else(|| invalid("operands must be qualified with an alias"))?;
                let side =
                    parse_side(alias).ok_or_else(|| invalid("alias must be source/src or target/tgt"))?;
                if column.is_empty() {
                    return Err(invalid("missing column name"));
                }
                Ok((side, column.to_string()))
            };

            let pair = match (operand(lhs)?, operand(rhs)?) {
                ((Side::Target, target), (Side::Source, source))
                | ((Side::Source, source), (Side::Target, target)) => KeyPair { target, source },
                _ => return Err(invalid("each clause must compare source with target")),
            };
            keys.push(pair);
        }

        Ok(Self { keys })
    }
}

impl fmt::Display for MergePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("target.{} = source.{}", k.target, k.source))
            .collect();
        f.write_str(&clauses.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_key() {
        let p: MergePredicate = "target.id = source.id".parse().unwrap();
        assert_eq!(
            p.keys(),
            &[KeyPair {
                target: "id".to_string(),
                source: "id".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_short_aliases_either_order() {
        let p: MergePredicate = "src.open_time=tgt.open_time and tgt.symbol = src.sym"
            .parse()
            .unwrap();
        assert_eq!(p.target_columns(), vec!["open_time", "symbol"]);
        assert_eq!(p.source_columns(), vec!["open_time", "sym"]);
    }

    #[test]
    fn test_display_is_canonical() {
        let p: MergePredicate = "src.id = tgt.id".parse().unwrap();
        assert_eq!(p.to_string(), "target.id = source.id");
        assert_eq!(MergePredicate::on(["id"]).unwrap(), p);
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "id = id",
            "target.id = target.id",
            "target.id > source.id",
            "target.id = source.id AND",
            "foo.id = source.id",
            "target. = source.id",
        ] {
            assert!(
                matches!(
                    bad.parse::<MergePredicate>(),
                    Err(StoreError::InvalidPredicate { .. })
                ),
                "accepted {bad:?}"
            );
        }
    }
}
