//! Parses field path strings (`a.b[0].c`, `a[key=value].c`) into a compiled
//! `Vec<Segment>`, reused across reconciles (spec.md §9: "Field paths parse
//! once into a compiled representation").
//!
//! Grounded in the teacher's pest-based grammar (`sherpack-convert::parser`),
//! adapted to this crate's much smaller field-path DSL.

use pest::Parser;
use pest_derive::Parser;

use crate::error::{PatchError, Result};

#[derive(Parser)]
#[grammar = "fieldpath.pest"]
struct FieldPathParser;

/// One step of a compiled field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A plain object field, e.g. `spec`.
    Field(String),
    /// A numeric array index, e.g. `[0]`.
    Index(usize),
    /// A map key used as an array index, e.g. `labels[app]`.
    MapKey(String),
    /// A filter expression selecting the array element whose `key` field
    /// equals `value`, e.g. `[name=foo]`.
    Filter { key: String, value: String },
}

/// A parsed, reusable field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(pub Vec<Segment>);

impl FieldPath {
    pub fn parse(input: &str) -> Result<Self> {
        let pairs = FieldPathParser::parse(Rule::path, input)
            .map_err(|e| PatchError::InvalidFieldPath {
                path: input.to_string(),
                message: e.to_string(),
            })?;

        let mut segments = Vec::new();
        for pair in pairs {
            if pair.as_rule() != Rule::path {
                continue;
            }
            for segment_pair in pair.into_inner() {
                if segment_pair.as_rule() != Rule::segment {
                    continue;
                }
                let mut inner = segment_pair.into_inner();
                let ident = inner.next().expect("segment always has an ident");
                segments.push(Segment::Field(ident.as_str().to_string()));

                for index_pair in inner {
                    let content = index_pair.into_inner().next().expect("index always has content");
                    match content.as_rule() {
                        Rule::number => {
                            let n: usize = content.as_str().parse().map_err(|_| PatchError::InvalidFieldPath {
                                path: input.to_string(),
                                message: format!("invalid array index '{}'", content.as_str()),
                            })?;
                            segments.push(Segment::Index(n));
                        }
                        Rule::filter => {
                            let mut filter_inner = content.into_inner();
                            let key = filter_inner.next().unwrap().as_str().to_string();
                            let value = filter_inner.next().unwrap().as_str().to_string();
                            segments.push(Segment::Filter { key, value });
                        }
                        Rule::mapkey => {
                            segments.push(Segment::MapKey(content.as_str().to_string()));
                        }
                        _ => unreachable!("unexpected index content rule"),
                    }
                }
            }
        }

        if segments.is_empty() {
            return Err(PatchError::InvalidFieldPath {
                path: input.to_string(),
                message: "empty field path".to_string(),
            });
        }

        Ok(FieldPath(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dotted_path() {
        let p = FieldPath::parse("spec.forProvider.size").unwrap();
        assert_eq!(
            p.0,
            vec![
                Segment::Field("spec".to_string()),
                Segment::Field("forProvider".to_string()),
                Segment::Field("size".to_string()),
            ]
        );
    }

    #[test]
    fn parses_array_index() {
        let p = FieldPath::parse("spec.items[0].name").unwrap();
        assert_eq!(
            p.0,
            vec![
                Segment::Field("spec".to_string()),
                Segment::Field("items".to_string()),
                Segment::Index(0),
                Segment::Field("name".to_string()),
            ]
        );
    }

    #[test]
    fn parses_filter_expression() {
        let p = FieldPath::parse("spec.containers[name=app].image").unwrap();
        assert_eq!(
            p.0,
            vec![
                Segment::Field("spec".to_string()),
                Segment::Field("containers".to_string()),
                Segment::Filter { key: "name".to_string(), value: "app".to_string() },
                Segment::Field("image".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_empty_path() {
        assert!(FieldPath::parse("").is_err());
    }

    #[test]
    fn parses_map_key_index() {
        let p = FieldPath::parse("metadata.labels[app.kubernetes.io/name]").unwrap();
        assert_eq!(
            p.0,
            vec![
                Segment::Field("metadata".to_string()),
                Segment::Field("labels".to_string()),
                Segment::MapKey("app.kubernetes.io/name".to_string()),
            ]
        );
    }
}
