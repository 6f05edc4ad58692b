//! Cypher rendering of typed commands.
//!
//! A [`Batch`] becomes one or more [`CypherStatement`]s. Variables are only
//! in scope inside the statement that binds them, so the renderer tracks
//! which ids the current statement has bound: an edge to an entity created
//! in an earlier batch first re-binds it with a `MATCH` by id, repeated stub
//! merges are elided and an upsert of an already bound variable collapses to
//! a plain `SET`. Bulk passes are parameterised `UNWIND $rows` statements.

use ahash::AHashSet;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;

use treeload_model::entity::PropValue;
use treeload_model::{Batch, BulkPass, Command, Entity, EntityKey, EntityKind, PARENT_OF};

pub const DELETE_ALL: &str = "MATCH (n) DETACH DELETE n";
pub const SHOW_CONSTRAINTS: &str = "SHOW CONSTRAINTS YIELD name RETURN name";

/// A single statement for the transactional endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CypherStatement {
    #[serde(rename = "statement")]
    pub text: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

impl CypherStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Value::Null,
        }
    }

    pub fn with_parameters(text: impl Into<String>, parameters: Value) -> Self {
        Self {
            text: text.into(),
            parameters,
        }
    }
}

pub fn constraint_name(kind: EntityKind) -> String {
    format!("{}_id", kind.label().to_lowercase())
}

pub fn create_constraint(kind: EntityKind) -> CypherStatement {
    CypherStatement::new(format!(
        "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE",
        constraint_name(kind),
        kind.label()
    ))
}

pub fn drop_constraint(kind: EntityKind) -> CypherStatement {
    drop_constraint_named(&constraint_name(kind))
}

pub fn drop_constraint_named(name: &str) -> CypherStatement {
    CypherStatement::new(format!("DROP CONSTRAINT {name} IF EXISTS"))
}

pub fn count_by_label(kind: EntityKind) -> CypherStatement {
    CypherStatement::new(format!("MATCH (n:{}) RETURN count(n)", kind.label()))
}

pub fn count_edges() -> CypherStatement {
    CypherStatement::new(format!("MATCH ()-[r:{PARENT_OF}]->() RETURN count(r)"))
}

// ============================================================================
// Batch rendering
// ============================================================================

#[derive(Default)]
struct StatementBuilder {
    lines: Vec<String>,
    bound: AHashSet<u64>,
    out: Vec<CypherStatement>,
}

impl StatementBuilder {
    fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Bring `key` into scope, matching it by id if this statement has not
    /// bound it yet.
    fn bind_existing(&mut self, key: &EntityKey) {
        if self.bound.insert(key.id) {
            let prefix = if self.lines.is_empty() { "" } else { "WITH * " };
            self.lines.push(format!("{prefix}MATCH {}", key.render()));
        }
    }

    fn flush(&mut self) {
        if !self.lines.is_empty() {
            self.out.push(CypherStatement::new(self.lines.join("\n")));
            self.lines.clear();
        }
        self.bound.clear();
    }

    fn command(&mut self, command: &Command<'_>) {
        match command {
            Command::CreateEntity(entity) => {
                self.bound.insert(entity.id);
                self.push(format!("CREATE {}", entity.render_full()));
            }
            Command::UpsertEntity(entity) => {
                if self.bound.insert(entity.id) {
                    self.push(format!(
                        "MERGE {} SET {}",
                        entity.render_key(),
                        entity.render_assignments()
                    ));
                } else {
                    self.push(format!("SET {}", entity.render_assignments()));
                }
            }
            Command::MergeParentStub(key) => {
                if self.bound.insert(key.id) {
                    self.push(format!("MERGE {}", key.render()));
                }
            }
            Command::CreateEdge { parent, child } => {
                self.bind_existing(parent);
                self.bind_existing(child);
                self.push(format!(
                    "CREATE ({})-[:{PARENT_OF}]->({})",
                    parent.var(),
                    child.var()
                ));
            }
            Command::MergeEdge { parent, child } => {
                self.bind_existing(parent);
                self.bind_existing(child);
                self.push(format!(
                    "MERGE ({})-[:{PARENT_OF}]->({})",
                    parent.var(),
                    child.var()
                ));
            }
            Command::BulkLoadRef { records, pass } => {
                self.flush();
                let rows: Vec<Value> = records.rows.iter().map(|e| row_json(e)).collect();
                self.out.push(CypherStatement::with_parameters(
                    bulk_text(records.kind, *pass),
                    json!({ "rows": rows }),
                ));
            }
        }
    }
}

fn bulk_text(kind: EntityKind, pass: BulkPass) -> String {
    match pass {
        BulkPass::Create => format!(
            "UNWIND $rows AS row CREATE (e:{}) SET e = row",
            kind.label()
        ),
        BulkPass::Link => format!(
            "UNWIND $rows AS row WITH row WHERE row.parent_id IS NOT NULL \
             MATCH (c:{} {{id: row.id}}) \
             MERGE (p:Directory {{id: row.parent_id}}) \
             MERGE (p)-[:{PARENT_OF}]->(c)",
            kind.label()
        ),
    }
}

fn row_json(entity: &Entity) -> Value {
    let mut row = Map::new();
    for (name, value) in entity.properties() {
        let value = match value {
            PropValue::Int(v) => json!(v),
            PropValue::Str(s) => json!(s),
        };
        row.insert(name.to_string(), value);
    }
    Value::Object(row)
}

/// A row as a Cypher map literal, for scripts run outside the HTTP endpoint.
fn row_literal(entity: &Entity) -> String {
    let fields = entity
        .properties()
        .into_iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{fields}}}")
}

/// Render one batch. Statement boundaries only fall where a bulk pass
/// forces one, so a batch without bulk commands is a single statement.
pub fn render_batch(batch: &Batch<'_>) -> Vec<CypherStatement> {
    let mut builder = StatementBuilder::default();
    for command in &batch.commands {
        builder.command(command);
    }
    builder.flush();
    builder.out
}

/// Render a whole run as a `cypher-shell` script: statements end with `;`
/// and bulk rows are bound with `:param` beforehand.
pub fn render_script<'a>(batches: impl IntoIterator<Item = Batch<'a>>) -> String {
    let mut script = String::new();
    for (i, batch) in batches.into_iter().enumerate() {
        let scope = if batch.is_standalone() {
            "standalone"
        } else {
            "session-scoped"
        };
        let _ = writeln!(script, "// batch {} ({scope}, {} lines)", i + 1, batch.lines());
        let mut builder = StatementBuilder::default();
        for command in &batch.commands {
            if let Command::BulkLoadRef { records, .. } = command {
                builder.flush();
                let rows = records
                    .rows
                    .iter()
                    .map(|e| row_literal(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                builder.out.push(CypherStatement::new(format!(":param rows => [{rows}]")));
            }
            builder.command(command);
        }
        builder.flush();
        for statement in builder.out {
            let _ = writeln!(script, "{};", statement.text);
        }
        script.push('\n');
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use treeload_model::RecordSet;

    fn entity(id: u64, parent_id: Option<u64>, kind: EntityKind) -> Entity {
        Entity {
            id,
            parent_id,
            kind,
            name: format!("e{id}"),
            stem: format!("e{id}"),
            extension: String::new(),
            path: format!("/e{id}"),
            size: 1,
            owner: 2,
            group: 3,
            created: 4,
            accessed: 5,
            modified: 6,
        }
    }

    #[test]
    fn test_self_contained_batch_is_one_statement() {
        let root = entity(1, None, EntityKind::Directory);
        let file = entity(2, Some(1), EntityKind::File);
        let batch = Batch::new(vec![
            Command::CreateEntity(&root),
            Command::CreateEntity(&file),
            Command::CreateEdge {
                parent: root.key(),
                child: file.key(),
            },
        ]);
        let statements = render_batch(&batch);
        assert_eq!(statements.len(), 1);
        let lines: Vec<&str> = statements[0].text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CREATE (n1:Directory {id: 1, name: 'e1'"));
        assert_eq!(lines[2], "CREATE (n1)-[:PARENT_OF]->(n2)");
    }

    #[test]
    fn test_edge_to_earlier_batch_matches_by_id() {
        let file = entity(2, Some(1), EntityKind::File);
        let batch = Batch::new(vec![
            Command::CreateEntity(&file),
            Command::CreateEdge {
                parent: EntityKey::directory(1),
                child: file.key(),
            },
        ]);
        let text = &render_batch(&batch)[0].text;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "WITH * MATCH (n1:Directory {id: 1})");
        assert_eq!(lines[2], "CREATE (n1)-[:PARENT_OF]->(n2)");
    }

    #[test]
    fn test_repeated_stub_is_elided() {
        let a = entity(2, Some(1), EntityKind::File);
        let b = entity(3, Some(1), EntityKind::File);
        let parent = EntityKey::directory(1);
        let batch = Batch::new(vec![
            Command::UpsertEntity(&a),
            Command::MergeParentStub(parent),
            Command::MergeEdge {
                parent,
                child: a.key(),
            },
            Command::UpsertEntity(&b),
            Command::MergeParentStub(parent),
            Command::MergeEdge {
                parent,
                child: b.key(),
            },
        ]);
        let text = &render_batch(&batch)[0].text;
        assert_eq!(text.matches("MERGE (n1:Directory {id: 1})").count(), 1);
        assert!(text.starts_with("MERGE (n2:File {id: 2}) SET n2.id = 2, n2.parent_id = 1"));
    }

    #[test]
    fn test_upsert_of_bound_variable_is_plain_set() {
        let a = entity(2, Some(1), EntityKind::File);
        let batch = Batch::new(vec![Command::UpsertEntity(&a), Command::UpsertEntity(&a)]);
        let text = &render_batch(&batch)[0].text;
        assert!(text.lines().nth(1).unwrap().starts_with("SET n2.id = 2"));
    }

    #[test]
    fn test_bulk_pass_splits_statements_and_carries_rows() {
        let root = entity(1, None, EntityKind::Directory);
        let records = Arc::new(RecordSet {
            kind: EntityKind::Directory,
            name: "directory_0000".to_string(),
            rows: vec![&root],
        });
        let batch = Batch::new(vec![
            Command::BulkLoadRef {
                records: records.clone(),
                pass: BulkPass::Create,
            },
            Command::BulkLoadRef {
                records,
                pass: BulkPass::Link,
            },
        ]);
        let statements = render_batch(&batch);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].text,
            "UNWIND $rows AS row CREATE (e:Directory) SET e = row"
        );
        assert_eq!(statements[0].parameters["rows"][0]["id"], json!(1));
        assert!(statements[0].parameters["rows"][0].get("parent_id").is_none());
        assert!(statements[1].text.contains("WHERE row.parent_id IS NOT NULL"));
    }

    #[test]
    fn test_statement_serializes_for_transactional_endpoint() {
        let value = serde_json::to_value(create_constraint(EntityKind::File)).unwrap();
        assert_eq!(
            value,
            json!({"statement": "CREATE CONSTRAINT file_id IF NOT EXISTS FOR (n:File) REQUIRE n.id IS UNIQUE"})
        );
        assert_eq!(
            drop_constraint(EntityKind::Directory).text,
            "DROP CONSTRAINT directory_id IF EXISTS"
        );
    }

    #[test]
    fn test_script_terminates_statements() {
        let root = entity(1, None, EntityKind::Directory);
        let records = Arc::new(RecordSet {
            kind: EntityKind::Directory,
            name: "directory_0000".to_string(),
            rows: vec![&root],
        });
        let script = render_script(vec![
            Batch::new(vec![Command::CreateEntity(&root)]),
            Batch::new(vec![Command::BulkLoadRef {
                records,
                pass: BulkPass::Create,
            }]),
        ]);
        assert!(script.contains("// batch 1 (standalone, 1 lines)"));
        assert!(script.contains(":param rows => [{id: 1, name: 'e1'"));
        assert!(script.contains("CREATE (e:Directory) SET e = row;"));
    }
}
