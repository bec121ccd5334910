// src/core/database.rs

//! SQLite implementation of [`Repository`].
//!
//! The schema is brought up to date in [`SqliteRepository::open`] before the
//! repository is handed out, using `PRAGMA user_version` as the version
//! counter. A database written by a newer binary is refused.

use crate::core::repository::{RepoResult, Repository, RepositoryError};
use crate::models::{
    ClaimedHostname, Command, DomainAlias, NewProject, Project, ProjectRecord, Variable,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};

/// Ordered schema migrations. Index `i` upgrades version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[
    // v1: projects, commands and their association, per-project variables.
    "CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        domain TEXT NOT NULL UNIQUE,
        port INTEGER NOT NULL UNIQUE,
        dir TEXT
    );
    CREATE TABLE IF NOT EXISTS commands (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        command TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS project_commands (
        project_id INTEGER NOT NULL,
        command_id INTEGER NOT NULL,
        PRIMARY KEY (project_id, command_id),
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (command_id) REFERENCES commands(id) ON DELETE CASCADE
    );
    CREATE TABLE IF NOT EXISTS variables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        project_id INTEGER NOT NULL,
        UNIQUE (project_id, name),
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
    );",
    // v2: extra hostnames per project.
    "CREATE TABLE IF NOT EXISTS domain_aliases (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        value TEXT NOT NULL UNIQUE,
        project_id INTEGER NOT NULL,
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_domain_aliases_project_id ON domain_aliases(project_id);
    CREATE INDEX IF NOT EXISTS idx_variables_project_id ON variables(project_id);",
];

const PROJECT_COLUMNS: &str = "id, name, domain, port, dir";

/// [`Repository`] backed by a single SQLite connection.
pub struct SqliteRepository {
    conn: Connection,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteRepository {
    /// Opens (or creates) the database at `path` and migrates it.
    pub fn open(path: &Path) -> RepoResult<Self> {
        let conn = Connection::open(path).map_err(|source| RepositoryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// A fresh, migrated database that lives only as long as the value.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RepoResult<Self> {
        // Must be enabled on every connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    /// Runs raw SQL, e.g. to install failure-injecting triggers.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> RepoResult<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// The `user_version` the schema has been migrated to.
    pub fn schema_version(&self) -> RepoResult<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn migrate(&self) -> RepoResult<()> {
        let supported = i64::try_from(MIGRATIONS.len()).unwrap_or(i64::MAX);
        let current = self.schema_version()?;

        if current > supported {
            return Err(RepositoryError::SchemaTooNew {
                found: current,
                supported,
            });
        }

        for (version, sql) in (1..).zip(MIGRATIONS.iter()).skip_while(|(v, _)| *v <= current) {
            log::debug!("Migrating database to schema version {}", version);
            let tx = self.conn.unchecked_transaction()?;
            tx.execute_batch(sql)
                .and_then(|()| tx.pragma_update(None, "user_version", version))
                .map_err(|source| RepositoryError::Migration { version, source })?;
            tx.commit()?;
        }
        Ok(())
    }

    // --- Row loading ---

    fn load_project(&self, record: ProjectRecord) -> RepoResult<Project> {
        let commands = self.query_list(
            "SELECT c.id, c.name, c.command FROM commands c
             JOIN project_commands pc ON pc.command_id = c.id
             WHERE pc.project_id = ?1
             ORDER BY c.name",
            record.id,
            command_from_row,
        )?;
        let variables = self.query_list(
            "SELECT id, name, value, project_id FROM variables
             WHERE project_id = ?1 ORDER BY name",
            record.id,
            |row| {
                Ok(Variable {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    value: row.get(2)?,
                    project_id: row.get(3)?,
                })
            },
        )?;
        let domain_aliases = self.query_list(
            "SELECT id, value, project_id FROM domain_aliases
             WHERE project_id = ?1 ORDER BY id",
            record.id,
            |row| {
                Ok(DomainAlias {
                    id: row.get(0)?,
                    value: row.get(1)?,
                    project_id: row.get(2)?,
                })
            },
        )?;
        Ok(Project::from_record(
            record,
            commands,
            variables,
            domain_aliases,
        ))
    }

    fn query_list<T, F>(&self, sql: &str, project_id: i64, map: F) -> RepoResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![project_id], map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn project_record(&self, name: &str) -> RepoResult<Option<ProjectRecord>> {
        let sql = format!("SELECT {} FROM projects WHERE name = ?1", PROJECT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![name], project_from_row)
            .optional()?)
    }

    fn insert_associations(
        conn: &Connection,
        project_id: i64,
        command_ids: &[i64],
    ) -> RepoResult<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO project_commands (project_id, command_id) VALUES (?1, ?2)",
        )?;
        for command_id in command_ids {
            stmt.execute(params![project_id, command_id])?;
        }
        Ok(())
    }
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectRecord> {
    let port: i64 = row.get(3)?;
    let dir: Option<String> = row.get(4)?;
    Ok(ProjectRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        domain: row.get(2)?,
        port: u16::try_from(port)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(3, port))?,
        dir: dir.map(PathBuf::from),
    })
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<Command> {
    Ok(Command {
        id: row.get(0)?,
        name: row.get(1)?,
        command: row.get(2)?,
    })
}

fn dir_to_sql(dir: Option<&Path>) -> Option<String> {
    dir.map(|d| d.to_string_lossy().into_owned())
}

/// Turns "0 rows changed" into a typed not-found error.
fn expect_changed(changed: usize, what: impl FnOnce() -> String) -> RepoResult<()> {
    if changed == 0 {
        Err(RepositoryError::NotFound(what()))
    } else {
        Ok(())
    }
}

impl Repository for SqliteRepository {
    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        let sql = format!("SELECT {} FROM projects ORDER BY name", PROJECT_COLUMNS);
        let records = {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map([], project_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        records
            .into_iter()
            .map(|record| self.load_project(record))
            .collect()
    }

    fn get_project(&self, name: &str) -> RepoResult<Option<Project>> {
        self.project_record(name)?
            .map(|record| self.load_project(record))
            .transpose()
    }

    fn project_with_port(&self, port: u16) -> RepoResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT name FROM projects WHERE port = ?1",
                params![port],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn create_project(&self, project: &NewProject) -> RepoResult<Project> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO projects (name, domain, port, dir) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.name,
                project.domain,
                project.port,
                dir_to_sql(project.dir.as_deref())
            ],
        )?;
        let id = tx.last_insert_rowid();
        Self::insert_associations(&tx, id, &project.command_ids)?;
        tx.commit()?;

        log::debug!("Inserted project '{}' (id {})", project.name, id);
        self.get_project(&project.name)?
            .ok_or_else(|| RepositoryError::NotFound(format!("Project '{}'", project.name)))
    }

    fn update_project(&self, name: &str, port: u16, command_ids: &[i64]) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let id: i64 = tx
            .query_row(
                "SELECT id FROM projects WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("Project '{}'", name)))?;

        tx.execute(
            "UPDATE projects SET port = ?1 WHERE id = ?2",
            params![port, id],
        )?;
        tx.execute(
            "DELETE FROM project_commands WHERE project_id = ?1",
            params![id],
        )?;
        Self::insert_associations(&tx, id, command_ids)?;
        tx.commit()?;
        Ok(())
    }

    fn rename_project(&self, old: &str, new: &str, new_domain: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects SET name = ?1, domain = ?2 WHERE name = ?3",
            params![new, new_domain, old],
        )?;
        expect_changed(changed, || format!("Project '{}'", old))
    }

    fn set_project_dir(&self, name: &str, dir: Option<&Path>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects SET dir = ?1 WHERE name = ?2",
            params![dir_to_sql(dir), name],
        )?;
        expect_changed(changed, || format!("Project '{}'", name))
    }

    fn delete_project(&self, name: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE name = ?1", params![name])?;
        expect_changed(changed, || format!("Project '{}'", name))
    }

    fn add_project_command(&self, project_id: i64, command_id: i64) -> RepoResult<()> {
        Self::insert_associations(&self.conn, project_id, &[command_id])
    }

    fn remove_project_command(&self, project_id: i64, command_id: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM project_commands WHERE project_id = ?1 AND command_id = ?2",
            params![project_id, command_id],
        )?;
        Ok(changed > 0)
    }

    fn list_commands(&self) -> RepoResult<Vec<Command>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, command FROM commands ORDER BY name")?;
        let rows = stmt.query_map([], command_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_command(&self, name: &str) -> RepoResult<Option<Command>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, command FROM commands WHERE name = ?1",
                params![name],
                command_from_row,
            )
            .optional()?)
    }

    fn create_command(&self, name: &str, command: &str) -> RepoResult<Command> {
        self.conn.execute(
            "INSERT INTO commands (name, command) VALUES (?1, ?2)",
            params![name, command],
        )?;
        Ok(Command {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            command: command.to_string(),
        })
    }

    fn rename_command(&self, old: &str, new: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE commands SET name = ?1 WHERE name = ?2",
            params![new, old],
        )?;
        expect_changed(changed, || format!("Command '{}'", old))
    }

    fn edit_command(&self, name: &str, command: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE commands SET command = ?1 WHERE name = ?2",
            params![command, name],
        )?;
        expect_changed(changed, || format!("Command '{}'", name))
    }

    fn delete_command(&self, name: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM commands WHERE name = ?1", params![name])?;
        expect_changed(changed, || format!("Command '{}'", name))
    }

    fn create_variable(&self, project_id: i64, name: &str, value: &str) -> RepoResult<Variable> {
        self.conn.execute(
            "INSERT INTO variables (name, value, project_id) VALUES (?1, ?2, ?3)",
            params![name, value, project_id],
        )?;
        Ok(Variable {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            value: value.to_string(),
            project_id,
        })
    }

    fn delete_variable(&self, project_id: i64, name: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM variables WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
        )?;
        Ok(changed > 0)
    }

    fn create_domain_alias(&self, project_id: i64, value: &str) -> RepoResult<DomainAlias> {
        self.conn.execute(
            "INSERT INTO domain_aliases (value, project_id) VALUES (?1, ?2)",
            params![value, project_id],
        )?;
        Ok(DomainAlias {
            id: self.conn.last_insert_rowid(),
            value: value.to_string(),
            project_id,
        })
    }

    fn delete_domain_alias(&self, project_id: i64, value: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM domain_aliases WHERE project_id = ?1 AND value = ?2",
            params![project_id, value],
        )?;
        Ok(changed > 0)
    }

    fn claimed_hostnames(&self) -> RepoResult<Vec<ClaimedHostname>> {
        let mut stmt = self.conn.prepare(
            "SELECT domain, name, 0 FROM projects
             UNION ALL
             SELECT a.value, p.name, 1 FROM domain_aliases a
             JOIN projects p ON p.id = a.project_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ClaimedHostname {
                hostname: row.get(0)?,
                project_name: row.get(1)?,
                is_alias: row.get::<_, i64>(2)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
