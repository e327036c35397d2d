use super::models::FileRecord;
use crate::paths;
use rusqlite::types::Value;

/// Tables keyed by path that must move and disappear together.
pub const PARTITION_TABLES: [&str; 3] = ["file", "file_state", "small_file"];

/// SQL engine the statements are rendered for. Only prefix rewrites differ,
/// apart from placeholders: MySQL text uses plain positional `?`.
///
/// `Database` always executes `Sqlite`; `Mysql` output is for handing the
/// batch to a MySQL client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Mysql,
}

/// A single column assignment on the `file` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Length(i64),
    ModificationTime(i64),
    AccessTime(i64),
    Owner(String),
    Group(String),
    Permission(i32),
    Replication(i32),
}

impl FieldUpdate {
    pub fn column(&self) -> &'static str {
        match self {
            FieldUpdate::Length(_) => "length",
            FieldUpdate::ModificationTime(_) => "modification_time",
            FieldUpdate::AccessTime(_) => "access_time",
            FieldUpdate::Owner(_) => "owner",
            FieldUpdate::Group(_) => "owner_group",
            FieldUpdate::Permission(_) => "permission",
            FieldUpdate::Replication(_) => "block_replication",
        }
    }

    /// Applies the assignment to an in-memory record.
    pub fn apply_to(&self, record: &mut FileRecord) {
        match self {
            FieldUpdate::Length(v) => record.length = *v,
            FieldUpdate::ModificationTime(v) => record.modification_time = *v,
            FieldUpdate::AccessTime(v) => record.access_time = *v,
            FieldUpdate::Owner(s) => record.owner = s.clone(),
            FieldUpdate::Group(s) => record.group = s.clone(),
            FieldUpdate::Permission(v) => record.permission = *v,
            FieldUpdate::Replication(v) => record.replication = *v,
        }
    }

    fn value(&self) -> Value {
        match self {
            FieldUpdate::Length(v)
            | FieldUpdate::ModificationTime(v)
            | FieldUpdate::AccessTime(v) => Value::Integer(*v),
            FieldUpdate::Owner(s) | FieldUpdate::Group(s) => Value::Text(s.clone()),
            FieldUpdate::Permission(v) | FieldUpdate::Replication(v) => Value::Integer(i64::from(*v)),
        }
    }
}

/// A replica mutation queued by the translator and executed as part of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOp {
    /// Replace the `file` row at the record's path.
    Insert(FileRecord),
    /// Remove the rows at exactly this path from every partition.
    DeleteByPath(String),
    /// Remove every partition row whose path starts with this literal prefix.
    DeleteByPrefix(String),
    /// Move the row at `from` to `to` in every partition; with `descendants`,
    /// also move every row under `from/` to the same place under `to/`.
    RewritePrefix {
        from: String,
        to: String,
        descendants: bool,
    },
    UpdateFields {
        path: String,
        fields: Vec<FieldUpdate>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: String, params: Vec<Value>) -> Self {
        Self { sql, params }
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn char_len(s: &str) -> i64 {
    s.chars().count() as i64
}

impl Dialect {
    /// Expression that yields `?1` followed by `path` from character position `?2` onwards.
    fn splice_expr(self) -> &'static str {
        match self {
            Dialect::Sqlite => "?1 || substr(path, ?2)",
            Dialect::Mysql => "CONCAT(?1, SUBSTR(path, ?2))",
        }
    }
}

/// `?1`, `?2`, ... become `?`. Every statement binds its parameters in the
/// order they appear, so positions are unchanged.
fn positional(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '?' {
            while chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                chars.next();
            }
        }
    }
    out
}

impl MutationOp {
    pub fn render(&self, dialect: Dialect) -> Vec<Statement> {
        let statements = self.render_numbered(dialect);
        match dialect {
            Dialect::Sqlite => statements,
            Dialect::Mysql => statements
                .into_iter()
                .map(|s| Statement::new(positional(&s.sql), s.params))
                .collect(),
        }
    }

    fn render_numbered(&self, dialect: Dialect) -> Vec<Statement> {
        match self {
            MutationOp::Insert(record) => vec![
                Statement::new(
                    "DELETE FROM file WHERE path = ?1".to_string(),
                    vec![text(&record.path)],
                ),
                Statement::new(
                    "INSERT INTO file \
                     (path, is_dir, length, modification_time, access_time, \
                      owner, owner_group, permission, block_replication) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                        .to_string(),
                    vec![
                        text(&record.path),
                        Value::Integer(record.is_dir as i64),
                        Value::Integer(record.length),
                        Value::Integer(record.modification_time),
                        Value::Integer(record.access_time),
                        text(&record.owner),
                        text(&record.group),
                        Value::Integer(i64::from(record.permission)),
                        Value::Integer(i64::from(record.replication)),
                    ],
                ),
            ],
            MutationOp::DeleteByPath(path) => PARTITION_TABLES
                .iter()
                .map(|table| {
                    Statement::new(
                        format!("DELETE FROM {} WHERE path = ?1", table),
                        vec![text(path)],
                    )
                })
                .collect(),
            MutationOp::DeleteByPrefix(prefix) => PARTITION_TABLES
                .iter()
                .map(|table| delete_prefix_statement(table, prefix))
                .collect(),
            MutationOp::RewritePrefix {
                from,
                to,
                descendants,
            } => render_rewrite(dialect, from, to, *descendants),
            MutationOp::UpdateFields { path, fields } => {
                if fields.is_empty() {
                    return Vec::new();
                }
                let assignments: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| format!("{} = ?{}", f.column(), i + 1))
                    .collect();
                let mut params: Vec<Value> = fields.iter().map(FieldUpdate::value).collect();
                params.push(text(path));
                vec![Statement::new(
                    format!(
                        "UPDATE file SET {} WHERE path = ?{}",
                        assignments.join(", "),
                        params.len()
                    ),
                    params,
                )]
            }
        }
    }
}

fn delete_prefix_statement(table: &str, prefix: &str) -> Statement {
    Statement::new(
        format!("DELETE FROM {} WHERE substr(path, 1, ?1) = ?2", table),
        vec![Value::Integer(char_len(prefix)), text(prefix)],
    )
}

/// Rows already sitting at the destination are cleared first so the move
/// cannot collide with the one-row-per-path constraint.
fn render_rewrite(dialect: Dialect, from: &str, to: &str, descendants: bool) -> Vec<Statement> {
    let from = paths::strip_trailing_slash(from);
    let to = paths::strip_trailing_slash(to);
    let from_prefix = paths::with_trailing_slash(from);
    let to_prefix = paths::with_trailing_slash(to);

    let mut statements = Vec::new();
    for table in PARTITION_TABLES {
        statements.push(Statement::new(
            format!("DELETE FROM {} WHERE path = ?1", table),
            vec![text(to)],
        ));
        if descendants {
            statements.push(delete_prefix_statement(table, &to_prefix));
        }
        statements.push(Statement::new(
            format!("UPDATE {} SET path = ?1 WHERE path = ?2", table),
            vec![text(to), text(from)],
        ));
        if descendants {
            statements.push(Statement::new(
                format!(
                    "UPDATE {} SET path = {} WHERE substr(path, 1, ?3) = ?4",
                    table,
                    dialect.splice_expr()
                ),
                vec![
                    text(&to_prefix),
                    Value::Integer(char_len(&from_prefix) + 1),
                    Value::Integer(char_len(&from_prefix)),
                    text(&from_prefix),
                ],
            ));
        }
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_by_path_touches_every_partition() {
        let statements = MutationOp::DeleteByPath("/a/b".to_string()).render(Dialect::Sqlite);
        assert_eq!(statements.len(), 3);
        for (statement, table) in statements.iter().zip(PARTITION_TABLES) {
            assert_eq!(statement.sql, format!("DELETE FROM {} WHERE path = ?1", table));
            assert_eq!(statement.params, vec![Value::Text("/a/b".to_string())]);
        }
    }

    #[test]
    fn test_rewrite_prefix_is_the_only_dialect_difference() {
        let op = MutationOp::RewritePrefix {
            from: "/src/dir".to_string(),
            to: "/dst/dir".to_string(),
            descendants: true,
        };
        let sqlite = op.render(Dialect::Sqlite);
        let mysql = op.render(Dialect::Mysql);
        assert_eq!(sqlite.len(), mysql.len());
        assert!(sqlite
            .iter()
            .any(|s| s.sql == "UPDATE file SET path = ?1 || substr(path, ?2) WHERE substr(path, 1, ?3) = ?4"));
        assert!(mysql
            .iter()
            .any(|s| s.sql == "UPDATE file SET path = CONCAT(?, SUBSTR(path, ?)) WHERE substr(path, 1, ?) = ?"));

        let splice = sqlite
            .iter()
            .find(|s| s.sql.contains("substr(path, ?2)"))
            .unwrap();
        assert_eq!(
            splice.params,
            vec![
                Value::Text("/dst/dir/".to_string()),
                Value::Integer(10),
                Value::Integer(9),
                Value::Text("/src/dir/".to_string()),
            ]
        );

        let delete = MutationOp::DeleteByPrefix("/x/".to_string());
        let sqlite = delete.render(Dialect::Sqlite);
        let mysql = delete.render(Dialect::Mysql);
        assert_eq!(sqlite[0].sql, "DELETE FROM file WHERE substr(path, 1, ?1) = ?2");
        assert_eq!(mysql[0].sql, "DELETE FROM file WHERE substr(path, 1, ?) = ?");
        assert_eq!(sqlite[0].params, mysql[0].params);
    }

    #[test]
    fn test_mysql_uses_positional_placeholders() {
        let ops = [
            MutationOp::Insert(FileRecord {
                path: "/a".to_string(),
                is_dir: false,
                length: 1,
                modification_time: 0,
                access_time: 0,
                owner: String::new(),
                group: String::new(),
                permission: 0o644,
                replication: 1,
            }),
            MutationOp::UpdateFields {
                path: "/a".to_string(),
                fields: vec![FieldUpdate::Length(2), FieldUpdate::Owner("bob".to_string())],
            },
            MutationOp::RewritePrefix {
                from: "/a".to_string(),
                to: "/b".to_string(),
                descendants: true,
            },
        ];
        for op in &ops {
            for statement in op.render(Dialect::Mysql) {
                let placeholders = statement.sql.matches('?').count();
                assert_eq!(placeholders, statement.params.len(), "{}", statement.sql);
                let numbered = statement
                    .sql
                    .split('?')
                    .skip(1)
                    .any(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));
                assert!(!numbered, "{}", statement.sql);
            }
        }
        assert_eq!(positional("a = ?12, b = ?3"), "a = ?, b = ?");
    }

    #[test]
    fn test_rewrite_of_single_file_skips_descendants() {
        let op = MutationOp::RewritePrefix {
            from: "/a.txt".to_string(),
            to: "/b.txt".to_string(),
            descendants: false,
        };
        let statements = op.render(Dialect::Sqlite);
        assert_eq!(statements.len(), 6);
        assert!(statements.iter().all(|s| !s.sql.contains("substr")));
    }

    #[test]
    fn test_update_fields_numbers_parameters() {
        let op = MutationOp::UpdateFields {
            path: "/a.txt".to_string(),
            fields: vec![FieldUpdate::Length(25), FieldUpdate::ModificationTime(1000)],
        };
        let statements = op.render(Dialect::Sqlite);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "UPDATE file SET length = ?1, modification_time = ?2 WHERE path = ?3"
        );
        assert_eq!(statements[0].params.len(), 3);

        let empty = MutationOp::UpdateFields {
            path: "/a.txt".to_string(),
            fields: Vec::new(),
        };
        assert!(empty.render(Dialect::Sqlite).is_empty());
    }
}
