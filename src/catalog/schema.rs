// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

use std::fmt;

use itertools::Itertools;
use serde::Serialize;

use crate::types::DataType;

/// One output column of a plan node: an optionally qualified name with a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub relation: Option<String>,
    pub name: String,
    pub datatype: DataType,
}

impl Field {
    pub fn new(relation: Option<&str>, name: &str, datatype: DataType) -> Field {
        Field {
            relation: relation.map(Into::into),
            name: name.into(),
            datatype,
        }
    }

    fn matches(&self, relation: Option<&str>, name: &str) -> bool {
        self.name == name && relation.is_none_or(|r| self.relation.as_deref() == Some(r))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}.{}", relation, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The resolved output schema of a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Schema {
        Schema { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Find the index of a column, honouring the qualifier if one is given.
    pub fn resolve(&self, relation: Option<&str>, name: &str) -> Result<usize, SchemaError> {
        let mut matches = self
            .fields
            .iter()
            .positions(|f| f.matches(relation, name));
        let display = match relation {
            Some(r) => format!("{r}.{name}"),
            None => name.to_string(),
        };
        match (matches.next(), matches.next()) {
            (Some(i), None) => Ok(i),
            (Some(_), Some(_)) => Err(SchemaError::Ambiguous(display)),
            (None, _) => Err(SchemaError::NotFound(display)),
        }
    }

    /// The column pairs `(index here, index in other)` a natural join
    /// equates.
    ///
    /// Pairing runs in two passes. Fully qualified matches go first: a
    /// column pairs with the rightmost column of `other` carrying the same
    /// qualifier and name, so a schema embedded into a wider universe (by a
    /// cross join) pairs with its own copy. Name-only matches are then
    /// formed between the columns both passes have left unclaimed; an
    /// unclaimed name present more than once is ambiguous. With `columns`,
    /// only the listed names are paired.
    pub fn natural_join_pairs(
        &self,
        other: &Schema,
        columns: Option<&[String]>,
    ) -> Result<Vec<(usize, usize)>, SchemaError> {
        if let Some(names) = columns {
            return names
                .iter()
                .map(|name| {
                    let i = self.resolve(None, name)?;
                    match Self::pair_for(&self.fields[i], other)? {
                        Some(j) => Ok((i, j)),
                        None => Err(SchemaError::NotFound(name.clone())),
                    }
                })
                .collect();
        }

        let mut pairs = Vec::new();
        let mut left_claimed = vec![false; self.fields.len()];
        let mut right_claimed = vec![false; other.fields.len()];
        for (i, field) in self.fields.iter().enumerate() {
            if field.relation.is_none() {
                continue;
            }
            let exact = other
                .fields
                .iter()
                .positions(|g| g.name == field.name && g.relation == field.relation)
                .last();
            if let Some(j) = exact {
                if !right_claimed[j] {
                    pairs.push((i, j));
                    left_claimed[i] = true;
                    right_claimed[j] = true;
                }
            }
        }
        for (i, field) in self.fields.iter().enumerate() {
            if left_claimed[i] {
                continue;
            }
            let mut candidates = other
                .fields
                .iter()
                .positions(|g| g.name == field.name)
                .filter(|&j| !right_claimed[j]);
            match (candidates.next(), candidates.next()) {
                (Some(j), None) => {
                    pairs.push((i, j));
                    right_claimed[j] = true;
                }
                (Some(_), Some(_)) => {
                    return Err(SchemaError::Ambiguous(field.name.clone()));
                }
                (None, _) => {}
            }
        }
        pairs.sort_unstable();
        Ok(pairs)
    }

    fn pair_for(field: &Field, other: &Schema) -> Result<Option<usize>, SchemaError> {
        let candidates: Vec<usize> = other
            .fields
            .iter()
            .positions(|g| g.name == field.name)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        let same_qualifier = candidates
            .iter()
            .copied()
            .filter(|&j| field.relation.is_some() && other.fields[j].relation == field.relation)
            .last();
        match same_qualifier {
            Some(j) => Ok(Some(j)),
            None if candidates.len() == 1 => Ok(Some(candidates[0])),
            None => Err(SchemaError::Ambiguous(field.name.clone())),
        }
    }

    /// Whether a set operation may combine the two schemas: same arity and
    /// pairwise compatible types.
    pub fn is_union_compatible_with(&self, other: &Schema) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.datatype.is_compatible_with(b.datatype))
    }

    /// The schema with every field requalified to `alias`.
    pub fn qualified(&self, alias: &str) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| Field::new(Some(alias), &f.name, f.datatype))
                .collect(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields.iter().format(", "))
    }
}

/// The error type of column resolution.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("column {0:?} not found")]
    NotFound(String),
    #[error("ambiguous column {0:?}")]
    Ambiguous(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(Some("r"), "a", DataType::Number),
            Field::new(Some("r"), "b", DataType::String),
            Field::new(Some("s"), "b", DataType::String),
        ])
    }

    #[test]
    fn resolve_qualified() {
        let schema = schema();
        assert_eq!(schema.resolve(Some("r"), "a"), Ok(0));
        assert_eq!(schema.resolve(Some("s"), "b"), Ok(2));
        assert_eq!(schema.resolve(None, "a"), Ok(0));
    }

    #[test]
    fn resolve_ambiguous() {
        assert_eq!(
            schema().resolve(None, "b"),
            Err(SchemaError::Ambiguous("b".into()))
        );
    }

    #[test]
    fn resolve_missing() {
        assert_eq!(
            schema().resolve(Some("r"), "z"),
            Err(SchemaError::NotFound("r.z".into()))
        );
    }

    #[test]
    fn natural_join_pairs_across_relations() {
        let left = Schema::new(vec![
            Field::new(Some("r"), "a", DataType::Number),
            Field::new(Some("r"), "b", DataType::String),
        ]);
        let right = Schema::new(vec![Field::new(Some("s"), "b", DataType::String)]);
        assert_eq!(left.natural_join_pairs(&right, None), Ok(vec![(1, 0)]));
    }

    #[test]
    fn natural_join_pairs_prefer_same_qualifier() {
        // the right side embeds the left schema after a cross join
        let left = Schema::new(vec![Field::new(Some("r"), "b", DataType::String)]);
        let right = Schema::new(vec![
            Field::new(Some("s"), "b", DataType::String),
            Field::new(Some("r"), "b", DataType::String),
        ]);
        assert_eq!(left.natural_join_pairs(&right, None), Ok(vec![(0, 1)]));
    }

    #[test]
    fn embedded_schema_pairs_only_with_itself() {
        // left is a cross-joined universe; right extends only its r part,
        // so s.b must stay unpaired
        let left = Schema::new(vec![
            Field::new(Some("s"), "b", DataType::String),
            Field::new(Some("r"), "b", DataType::String),
        ]);
        let right = Schema::new(vec![Field::new(Some("r"), "b", DataType::String)]);
        assert_eq!(left.natural_join_pairs(&right, None), Ok(vec![(1, 0)]));
    }

    #[test]
    fn natural_join_pairs_restricted() {
        let left = Schema::new(vec![
            Field::new(Some("r"), "a", DataType::Number),
            Field::new(Some("r"), "b", DataType::String),
        ]);
        let right = Schema::new(vec![Field::new(Some("s"), "b", DataType::String)]);
        assert_eq!(
            left.natural_join_pairs(&right, Some(&["b".to_string()])),
            Ok(vec![(1, 0)])
        );
        assert_eq!(
            left.natural_join_pairs(&right, Some(&["a".to_string()])),
            Err(SchemaError::NotFound("a".into()))
        );
    }
}
