use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, warn};

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::{GraphStore, GraphTx};
use flowde_core::types::{
    ActorId, Assignment, AssignmentId, Connection as Edge, ConnectionId, Endpoint, NewAssignment,
    NewStep, Position, Step, StepId, StepRole,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS assignments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        deadline TEXT,
        completed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_assignments_owner
        ON assignments(owner, created_at);

    CREATE TABLE IF NOT EXISTS steps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        assignment_id INTEGER NOT NULL REFERENCES assignments(id) ON DELETE CASCADE,
        parent_id INTEGER REFERENCES steps(id),
        content TEXT NOT NULL,
        position_x REAL NOT NULL,
        position_y REAL NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_steps_assignment ON steps(assignment_id);
    CREATE INDEX IF NOT EXISTS idx_steps_parent ON steps(parent_id, position_y);

    CREATE TABLE IF NOT EXISTS connections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        assignment_id INTEGER NOT NULL REFERENCES assignments(id) ON DELETE CASCADE,
        from_step INTEGER NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
        to_step INTEGER NOT NULL REFERENCES steps(id) ON DELETE CASCADE
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_pair
        ON connections(assignment_id, from_step, to_step);
    CREATE INDEX IF NOT EXISTS idx_connections_to ON connections(to_step);";

const STEP_COLUMNS: &str =
    "s.id, s.assignment_id, s.parent_id, s.content, s.position_x, s.position_y, s.completed";
const CONNECTION_COLUMNS: &str = "c.id, c.assignment_id, c.from_step, c.to_step";
const ASSIGNMENT_COLUMNS: &str =
    "id, owner, title, description, deadline, completed, created_at";

fn db_err(e: rusqlite::Error) -> FlowError {
    FlowError::Persistence(e.to_string())
}

/// SQLite-backed graph store. Every transaction takes the write lock up
/// front, so read-decide-write sequences never interleave.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::Persistence(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL lets readers proceed during a write transaction.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;

        let store = Self::init(conn)?;
        debug!(path = %path.display(), "Graph store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteGraphStore {
    fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn GraphTx) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Persistence(e.to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let result = f(&mut SqliteTx { conn: &tx });
        match result {
            Ok(value) => {
                tx.commit().map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Rolling back graph transaction");
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// A [`GraphTx`] over an open SQLite transaction.
pub struct SqliteTx<'a> {
    conn: &'a Connection,
}

fn step_from_row(row: &Row<'_>) -> rusqlite::Result<Step> {
    let parent: Option<i64> = row.get(2)?;
    Ok(Step {
        id: StepId(row.get(0)?),
        assignment_id: AssignmentId(row.get(1)?),
        role: StepRole::from_parent(parent.map(StepId)),
        content: row.get(3)?,
        position_x: row.get(4)?,
        position_y: row.get(5)?,
        completed: row.get(6)?,
    })
}

fn connection_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        id: ConnectionId(row.get(0)?),
        assignment_id: AssignmentId(row.get(1)?),
        from_step: StepId(row.get(2)?),
        to_step: StepId(row.get(3)?),
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    let deadline: Option<String> = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(Assignment {
        id: AssignmentId(row.get(0)?),
        owner: ActorId(row.get(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        deadline: deadline
            .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        completed: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// SQL condition on the joined step `s` plus its optional parent parameter.
fn endpoint_clause(endpoint: Endpoint) -> (&'static str, Option<i64>) {
    match endpoint {
        Endpoint::Any => ("1 = 1", None),
        Endpoint::Main => ("s.parent_id IS NULL", None),
        Endpoint::ChildOf(parent) => ("s.parent_id = ?2", Some(parent.0)),
        Endpoint::MainOrChildOf(parent) => {
            ("(s.parent_id IS NULL OR s.parent_id = ?2)", Some(parent.0))
        }
    }
}

impl SqliteTx<'_> {
    fn query_steps(&self, sql: &str, id: i64) -> Result<Vec<Step>> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params![id], step_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn query_connections(&self, sql: &str, id: i64) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![id], connection_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// `join_on` names the connection column whose step is filtered.
    fn find_connection(
        &self,
        anchor_column: &str,
        join_on: &str,
        anchor: StepId,
        endpoint: Endpoint,
    ) -> Result<Option<Edge>> {
        let (clause, parent) = endpoint_clause(endpoint);
        let sql = format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections c
             JOIN steps s ON s.id = c.{join_on}
             WHERE c.{anchor_column} = ?1 AND {clause}
             ORDER BY c.id
             LIMIT 1"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let found = match parent {
            Some(parent) => stmt.query_row(params![anchor.0, parent], connection_from_row),
            None => stmt.query_row(params![anchor.0], connection_from_row),
        };
        found.optional().map_err(db_err)
    }

    fn expect_step_row(&self, changed: usize, id: StepId) -> Result<()> {
        if changed == 0 {
            return Err(FlowError::StepNotFound(id));
        }
        Ok(())
    }
}

impl GraphTx for SqliteTx<'_> {
    fn create_assignment(&mut self, new: &NewAssignment) -> Result<Assignment> {
        let created_at = Utc::now();
        self.conn
            .execute(
                "INSERT INTO assignments (owner, title, description, deadline, completed, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    new.owner.0,
                    new.title,
                    new.description,
                    new.deadline.map(|d| d.to_rfc3339()),
                    created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        Ok(Assignment {
            id: AssignmentId(self.conn.last_insert_rowid()),
            owner: new.owner.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            deadline: new.deadline,
            completed: false,
            created_at,
        })
    }

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>> {
        self.conn
            .query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = ?1"),
                params![id.0],
                assignment_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn assignments_owned_by(&self, owner: &ActorId) -> Result<Vec<Assignment>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments
                 WHERE owner = ?1
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![owner.0], assignment_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn set_assignment_completed(&mut self, id: AssignmentId, completed: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE assignments SET completed = ?2 WHERE id = ?1",
                params![id.0, completed],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FlowError::AssignmentNotFound(id));
        }
        Ok(())
    }

    fn delete_assignment(&mut self, id: AssignmentId) -> Result<()> {
        // Connections first, then children before parents, so the self
        // reference on steps never points at a removed row.
        self.conn
            .execute("DELETE FROM connections WHERE assignment_id = ?1", params![id.0])
            .map_err(db_err)?;
        self.conn
            .execute(
                "DELETE FROM steps WHERE assignment_id = ?1 AND parent_id IS NOT NULL",
                params![id.0],
            )
            .map_err(db_err)?;
        let changed = self
            .conn
            .execute("DELETE FROM assignments WHERE id = ?1", params![id.0])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FlowError::AssignmentNotFound(id));
        }
        Ok(())
    }

    fn step(&self, id: StepId) -> Result<Option<Step>> {
        self.conn
            .query_row(
                &format!("SELECT {STEP_COLUMNS} FROM steps s WHERE s.id = ?1"),
                params![id.0],
                step_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn steps(&self, assignment: AssignmentId) -> Result<Vec<Step>> {
        self.query_steps(
            &format!(
                "SELECT {STEP_COLUMNS} FROM steps s WHERE s.assignment_id = ?1 ORDER BY s.id"
            ),
            assignment.0,
        )
    }

    fn children(&self, parent: StepId) -> Result<Vec<Step>> {
        self.query_steps(
            &format!(
                "SELECT {STEP_COLUMNS} FROM steps s
                 WHERE s.parent_id = ?1
                 ORDER BY s.position_y, s.id"
            ),
            parent.0,
        )
    }

    fn create_step(&mut self, new: &NewStep) -> Result<Step> {
        let parent = new.role.parent_id().map(|p| p.0);
        self.conn
            .execute(
                "INSERT INTO steps (assignment_id, parent_id, content, position_x, position_y, completed)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![
                    new.assignment_id.0,
                    parent,
                    new.content,
                    new.position.x,
                    new.position.y,
                ],
            )
            .map_err(db_err)?;
        Ok(Step {
            id: StepId(self.conn.last_insert_rowid()),
            assignment_id: new.assignment_id,
            role: new.role,
            content: new.content.clone(),
            position_x: new.position.x,
            position_y: new.position.y,
            completed: false,
        })
    }

    fn set_parent(&mut self, id: StepId, parent: Option<StepId>) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE steps SET parent_id = ?2 WHERE id = ?1",
                params![id.0, parent.map(|p| p.0)],
            )
            .map_err(db_err)?;
        self.expect_step_row(changed, id)
    }

    fn set_position(&mut self, id: StepId, position: Position) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE steps SET position_x = ?2, position_y = ?3 WHERE id = ?1",
                params![id.0, position.x, position.y],
            )
            .map_err(db_err)?;
        self.expect_step_row(changed, id)
    }

    fn set_content(&mut self, id: StepId, content: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE steps SET content = ?2 WHERE id = ?1",
                params![id.0, content],
            )
            .map_err(db_err)?;
        self.expect_step_row(changed, id)
    }

    fn set_completed(&mut self, id: StepId, completed: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE steps SET completed = ?2 WHERE id = ?1",
                params![id.0, completed],
            )
            .map_err(db_err)?;
        self.expect_step_row(changed, id)
    }

    fn delete_step(&mut self, id: StepId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM steps WHERE id = ?1", params![id.0])
            .map_err(db_err)?;
        self.expect_step_row(changed, id)
    }

    fn connections(&self, assignment: AssignmentId) -> Result<Vec<Edge>> {
        self.query_connections(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections c
                 WHERE c.assignment_id = ?1 ORDER BY c.id"
            ),
            assignment.0,
        )
    }

    fn connections_from(&self, step: StepId) -> Result<Vec<Edge>> {
        self.query_connections(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections c
                 WHERE c.from_step = ?1 ORDER BY c.id"
            ),
            step.0,
        )
    }

    fn connections_to(&self, step: StepId) -> Result<Vec<Edge>> {
        self.query_connections(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections c
                 WHERE c.to_step = ?1 ORDER BY c.id"
            ),
            step.0,
        )
    }

    fn find_outgoing(&self, from: StepId, target: Endpoint) -> Result<Option<Edge>> {
        self.find_connection("from_step", "to_step", from, target)
    }

    fn find_incoming(&self, to: StepId, source: Endpoint) -> Result<Option<Edge>> {
        self.find_connection("to_step", "from_step", to, source)
    }

    fn connection_between(&self, from: StepId, to: StepId) -> Result<Option<Edge>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {CONNECTION_COLUMNS} FROM connections c
                     WHERE c.from_step = ?1 AND c.to_step = ?2"
                ),
                params![from.0, to.0],
                connection_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn create_connection(
        &mut self,
        assignment: AssignmentId,
        from: StepId,
        to: StepId,
    ) -> Result<Edge> {
        if let Some(existing) = self.connection_between(from, to)? {
            debug!(from = %from, to = %to, "Connection already exists");
            return Ok(existing);
        }
        self.conn
            .execute(
                "INSERT INTO connections (assignment_id, from_step, to_step) VALUES (?1, ?2, ?3)",
                params![assignment.0, from.0, to.0],
            )
            .map_err(db_err)?;
        Ok(Edge {
            id: ConnectionId(self.conn.last_insert_rowid()),
            assignment_id: assignment,
            from_step: from,
            to_step: to,
        })
    }

    fn redirect_connection(&mut self, id: ConnectionId, from: StepId, to: StepId) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE connections SET from_step = ?2, to_step = ?3 WHERE id = ?1",
                params![id.0, from.0, to.0],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FlowError::ConnectionNotFound(id));
        }
        Ok(())
    }

    fn delete_connection(&mut self, id: ConnectionId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM connections WHERE id = ?1", params![id.0])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(FlowError::ConnectionNotFound(id));
        }
        Ok(())
    }
}
