//! Graph statements and their Cypher rendering
//!
//! Every write is a self-contained `MERGE`, so replaying any prefix of a run
//! (or the whole run) converges on the same graph. Labels and relationship
//! types are normalized identifiers before they get here; they are still
//! backtick-quoted since Cypher cannot bind them as parameters.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One unit of work for a graph store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphStatement {
    /// Uniqueness constraint on `id` for a label
    EnsureUniqueId { label: String },

    /// Create the node if absent; `refresh` also overwrites the description
    /// of an existing node
    UpsertNode {
        label: String,
        id: String,
        description: String,
        refresh: bool,
    },

    /// Provenance node for one source file
    UpsertDocument {
        label: String,
        id: String,
        name: String,
        content_hash: String,
    },

    /// Count nodes with the given identity (0 or 1)
    NodeExists { label: String, id: String },

    /// Merge an edge between two existing nodes; returns the number of edges
    /// matched or created (0 when an endpoint is missing)
    UpsertRelationship {
        source_label: String,
        source_id: String,
        relationship_type: String,
        target_label: String,
        target_id: String,
    },

    /// Node counts grouped by label
    CountNodesByLabel,

    /// Relationship counts grouped by type
    CountRelationshipsByType,
}

/// Kind of value in a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

/// Query text plus bound parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CypherQuery {
    pub text: String,
    pub params: BTreeMap<&'static str, String>,
}

impl CypherQuery {
    fn new(text: String) -> Self {
        Self {
            text,
            params: BTreeMap::new(),
        }
    }

    fn param(mut self, key: &'static str, value: &str) -> Self {
        self.params.insert(key, value.to_string());
        self
    }
}

/// Quote an identifier for use as a label or relationship type
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Render a Cypher string literal
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl GraphStatement {
    /// Whether the statement modifies the graph
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Self::NodeExists { .. } | Self::CountNodesByLabel | Self::CountRelationshipsByType
        )
    }

    /// Entity ids touched by the statement, for error reports
    pub fn entity_ids(&self) -> Vec<String> {
        match self {
            Self::EnsureUniqueId { .. }
            | Self::CountNodesByLabel
            | Self::CountRelationshipsByType => Vec::new(),
            Self::UpsertNode { label, id, .. }
            | Self::UpsertDocument { label, id, .. }
            | Self::NodeExists { label, id } => vec![format!("{label}:{id}")],
            Self::UpsertRelationship {
                source_label,
                source_id,
                target_label,
                target_id,
                ..
            } => vec![
                format!("{source_label}:{source_id}"),
                format!("{target_label}:{target_id}"),
            ],
        }
    }

    /// Columns returned by the statement
    pub fn result_columns(&self) -> &'static [(&'static str, ColumnKind)] {
        match self {
            Self::NodeExists { .. } | Self::UpsertRelationship { .. } => {
                &[("count", ColumnKind::Integer)]
            }
            Self::CountNodesByLabel => &[("label", ColumnKind::Text), ("count", ColumnKind::Integer)],
            Self::CountRelationshipsByType => {
                &[("type", ColumnKind::Text), ("count", ColumnKind::Integer)]
            }
            _ => &[],
        }
    }

    /// Parameterized query for a live store
    pub fn to_cypher(&self) -> CypherQuery {
        match self {
            Self::EnsureUniqueId { label } => CypherQuery::new(format!(
                "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE",
                constraint_name(label),
                quote_identifier(label)
            )),
            Self::UpsertNode {
                label,
                id,
                description,
                refresh,
            } => {
                let mut text = format!(
                    "MERGE (n:{} {{id: $id}}) ON CREATE SET n.description = $description",
                    quote_identifier(label)
                );
                if *refresh {
                    text.push_str(" ON MATCH SET n.description = $description");
                }
                CypherQuery::new(text)
                    .param("id", id)
                    .param("description", description)
            }
            Self::UpsertDocument {
                label,
                id,
                name,
                content_hash,
            } => CypherQuery::new(format!(
                "MERGE (d:{} {{id: $id}}) SET d.name = $name, d.content_hash = $content_hash",
                quote_identifier(label)
            ))
            .param("id", id)
            .param("name", name)
            .param("content_hash", content_hash),
            Self::NodeExists { label, id } => CypherQuery::new(format!(
                "MATCH (n:{} {{id: $id}}) RETURN count(n) AS count",
                quote_identifier(label)
            ))
            .param("id", id),
            Self::UpsertRelationship {
                source_label,
                source_id,
                relationship_type,
                target_label,
                target_id,
            } => CypherQuery::new(format!(
                "MATCH (a:{} {{id: $source_id}}), (b:{} {{id: $target_id}}) \
                 MERGE (a)-[r:{}]->(b) RETURN count(r) AS count",
                quote_identifier(source_label),
                quote_identifier(target_label),
                quote_identifier(relationship_type)
            ))
            .param("source_id", source_id)
            .param("target_id", target_id),
            Self::CountNodesByLabel => CypherQuery::new(
                "MATCH (n) UNWIND labels(n) AS label RETURN label, count(*) AS count ORDER BY label"
                    .to_string(),
            ),
            Self::CountRelationshipsByType => CypherQuery::new(
                "MATCH ()-[r]->() RETURN type(r) AS type, count(*) AS count ORDER BY type"
                    .to_string(),
            ),
        }
    }

    /// Standalone script line with literals inlined, `None` for reads
    pub fn to_script_line(&self) -> Option<String> {
        if !self.is_write() {
            return None;
        }

        let query = self.to_cypher();

        // a script has no use for RETURN; cut it from the template, never
        // from the inlined literals
        let template = match query.text.find(" RETURN ") {
            Some(idx) => &query.text[..idx],
            None => query.text.as_str(),
        };

        let mut line = param_regex()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                match query.params.get(&caps[1]) {
                    Some(value) => quote_literal(value),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
        line.push(';');
        Some(line)
    }
}

fn param_regex() -> &'static Regex {
    static PARAM_RE: OnceLock<Regex> = OnceLock::new();
    PARAM_RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex pattern"))
}

fn constraint_name(label: &str) -> String {
    format!("constraint_{label}_id")
}
