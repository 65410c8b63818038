//! Sequence store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist tasks and groups of one container with their order keys.
//! - Apply single-row key/scope updates guarded by the container order version.
//! - Provide the scope rebalance used when the key space runs out.
//!
//! # Invariants
//! - Scope listing is deterministic: `order_key ASC, entity_uuid ASC`.
//! - Every write bumps `containers.order_version` inside the same immediate
//!   transaction, so allocation and rebalance are serialized per container.
//! - `apply_move` never writes a key already held by another entity of the
//!   destination scope.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entity::{ContainerId, Entity, EntityId, EntityKind, OrderVersion, Scope};
use crate::model::reorder::MoveReceipt;
use crate::order::key::{allocate, rebalance_keys, OrderKey};
use crate::order::snapshot::ContainerSnapshot;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ENTITY_SELECT_SQL: &str = "SELECT
    entity_uuid,
    container_uuid,
    kind,
    group_uuid,
    order_key
FROM sequence_entries";

/// Result type used by sequence store operations.
pub type SequenceRepoResult<T> = Result<T, SequenceRepoError>;

/// Errors from sequence store operations.
#[derive(Debug)]
pub enum SequenceRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    ContainerNotFound(ContainerId),
    /// Entity does not exist in the addressed container.
    EntityNotFound(EntityId),
    /// Scope group does not exist or is not a group.
    GroupNotFound(EntityId),
    /// Groups cannot be nested.
    InvalidScope { entity_id: EntityId, scope: Scope },
    /// Container order changed since the caller read it.
    Conflict {
        container_id: ContainerId,
        expected: OrderVersion,
        actual: OrderVersion,
    },
    /// Another entity of the destination scope already holds the key.
    KeyCollision { entity_id: EntityId, key: OrderKey },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for SequenceRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ContainerNotFound(id) => write!(f, "container not found: {id}"),
            Self::EntityNotFound(id) => write!(f, "entity not found: {id}"),
            Self::GroupNotFound(id) => write!(f, "group not found: {id}"),
            Self::InvalidScope { entity_id, scope } => {
                write!(f, "entity {entity_id} cannot live in scope {scope}")
            }
            Self::Conflict {
                container_id,
                expected,
                actual,
            } => write!(
                f,
                "container {container_id} order changed: expected version {expected}, found {actual}"
            ),
            Self::KeyCollision { entity_id, key } => {
                write!(f, "order key {key} already taken in scope of entity {entity_id}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "sequence store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "sequence store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "sequence store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid sequence data: {message}"),
        }
    }
}

impl Error for SequenceRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SequenceRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SequenceRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Single-entity key update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveCommit {
    pub container_id: ContainerId,
    pub entity_id: EntityId,
    /// Destination scope; differs from the current one for cross-scope moves.
    pub scope: Scope,
    pub order_key: OrderKey,
    /// Container order version the move was resolved against.
    pub expected_version: OrderVersion,
}

/// Store interface for ordered container content.
pub trait SequenceStore {
    /// Creates one empty container.
    fn create_container(&self, display_name: &str) -> SequenceRepoResult<ContainerId>;
    /// Appends one group at the end of the top-level sequence.
    fn create_group(&self, container_id: ContainerId) -> SequenceRepoResult<Entity>;
    /// Appends one task at the end of the top level or of a group.
    fn create_task(
        &self,
        container_id: ContainerId,
        group_id: Option<EntityId>,
    ) -> SequenceRepoResult<Entity>;
    /// Deletes one task.
    fn delete_task(&self, task_id: EntityId) -> SequenceRepoResult<()>;
    /// Deletes one group, appending its tasks to the end of the top level.
    fn delete_group(&self, group_id: EntityId) -> SequenceRepoResult<()>;
    /// Current order version of one container.
    fn container_version(&self, container_id: ContainerId) -> SequenceRepoResult<OrderVersion>;
    /// Lists one scope ordered by key.
    fn list_scope(
        &self,
        container_id: ContainerId,
        scope: Scope,
    ) -> SequenceRepoResult<Vec<Entity>>;
    /// Reads every scope of one container at one consistent version.
    fn load_container(&self, container_id: ContainerId) -> SequenceRepoResult<ContainerSnapshot>;
    /// Writes one entity's key and scope if the version still matches.
    fn apply_move(&self, commit: &MoveCommit) -> SequenceRepoResult<MoveReceipt>;
    /// Evenly respaces one scope if the version still matches.
    fn rebalance_scope(
        &self,
        container_id: ContainerId,
        scope: Scope,
        expected_version: OrderVersion,
    ) -> SequenceRepoResult<OrderVersion>;
}

/// SQLite-backed sequence store.
pub struct SqliteSequenceStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSequenceStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> SequenceRepoResult<Self> {
        ensure_sequence_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SequenceStore for SqliteSequenceStore<'_> {
    fn create_container(&self, display_name: &str) -> SequenceRepoResult<ContainerId> {
        let container_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO containers (container_uuid, display_name, order_version)
             VALUES (?1, ?2, 0);",
            params![container_uuid.to_string(), display_name],
        )?;
        Ok(container_uuid)
    }

    fn create_group(&self, container_id: ContainerId) -> SequenceRepoResult<Entity> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_version(&tx, container_id)?;
        let entity = insert_entity(&tx, container_id, EntityKind::Group, Scope::TopLevel)?;
        bump_version(&tx, container_id)?;
        tx.commit()?;
        Ok(entity)
    }

    fn create_task(
        &self,
        container_id: ContainerId,
        group_id: Option<EntityId>,
    ) -> SequenceRepoResult<Entity> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        load_version(&tx, container_id)?;
        let scope = Scope::from(group_id);
        if let Scope::Group(group_id) = scope {
            ensure_group_in_container(&tx, container_id, group_id)?;
        }
        let entity = insert_entity(&tx, container_id, EntityKind::Task, scope)?;
        bump_version(&tx, container_id)?;
        tx.commit()?;
        Ok(entity)
    }

    fn delete_task(&self, task_id: EntityId) -> SequenceRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let task = load_entity(&tx, task_id)?.ok_or(SequenceRepoError::EntityNotFound(task_id))?;
        if task.kind != EntityKind::Task {
            return Err(SequenceRepoError::EntityNotFound(task_id));
        }
        tx.execute(
            "DELETE FROM sequence_entries WHERE entity_uuid = ?1;",
            [task_id.to_string()],
        )?;
        bump_version(&tx, task.container_id)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_group(&self, group_id: EntityId) -> SequenceRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let group =
            load_entity(&tx, group_id)?.ok_or(SequenceRepoError::GroupNotFound(group_id))?;
        if !group.is_group() {
            return Err(SequenceRepoError::GroupNotFound(group_id));
        }

        let nested = list_scope_in(&tx, group.container_id, Scope::Group(group_id))?;
        for task in &nested {
            let key = append_key(&tx, group.container_id, Scope::TopLevel)?;
            write_position(&tx, task.id, Scope::TopLevel, key)?;
        }
        tx.execute(
            "DELETE FROM sequence_entries WHERE entity_uuid = ?1;",
            [group_id.to_string()],
        )?;
        bump_version(&tx, group.container_id)?;
        tx.commit()?;

        info!(
            "event=group_dissolve module=repo status=ok container={} moved_tasks={}",
            group.container_id,
            nested.len()
        );
        Ok(())
    }

    fn container_version(&self, container_id: ContainerId) -> SequenceRepoResult<OrderVersion> {
        load_version(self.conn, container_id)
    }

    fn list_scope(
        &self,
        container_id: ContainerId,
        scope: Scope,
    ) -> SequenceRepoResult<Vec<Entity>> {
        load_version(self.conn, container_id)?;
        list_scope_in(self.conn, container_id, scope)
    }

    fn load_container(&self, container_id: ContainerId) -> SequenceRepoResult<ContainerSnapshot> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)?;
        let version = load_version(&tx, container_id)?;
        let mut stmt = tx.prepare(&format!(
            "{ENTITY_SELECT_SQL}
             WHERE container_uuid = ?1
             ORDER BY order_key ASC, entity_uuid ASC;"
        ))?;
        let mut rows = stmt.query([container_id.to_string()])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(row)?);
        }
        drop(rows);
        drop(stmt);
        tx.commit()?;
        Ok(ContainerSnapshot::from_entities(
            container_id,
            version,
            entities,
        ))
    }

    fn apply_move(&self, commit: &MoveCommit) -> SequenceRepoResult<MoveReceipt> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let actual = load_version(&tx, commit.container_id)?;
        if actual != commit.expected_version {
            warn!(
                "event=apply_move module=repo status=conflict container={} expected_version={} actual_version={}",
                commit.container_id, commit.expected_version, actual
            );
            return Err(SequenceRepoError::Conflict {
                container_id: commit.container_id,
                expected: commit.expected_version,
                actual,
            });
        }

        let entity = load_entity(&tx, commit.entity_id)?
            .filter(|entity| entity.container_id == commit.container_id)
            .ok_or(SequenceRepoError::EntityNotFound(commit.entity_id))?;
        if let Scope::Group(group_id) = commit.scope {
            if entity.is_group() {
                return Err(SequenceRepoError::InvalidScope {
                    entity_id: entity.id,
                    scope: commit.scope,
                });
            }
            ensure_group_in_container(&tx, commit.container_id, group_id)?;
        }
        if key_taken(
            &tx,
            commit.container_id,
            commit.scope,
            commit.order_key,
            entity.id,
        )? {
            return Err(SequenceRepoError::KeyCollision {
                entity_id: entity.id,
                key: commit.order_key,
            });
        }

        write_position(&tx, entity.id, commit.scope, commit.order_key)?;
        let version = bump_version(&tx, commit.container_id)?;
        tx.commit()?;

        Ok(MoveReceipt {
            entity: Entity {
                group_id: commit.scope.group_id(),
                order_key: commit.order_key,
                ..entity
            },
            version,
        })
    }

    fn rebalance_scope(
        &self,
        container_id: ContainerId,
        scope: Scope,
        expected_version: OrderVersion,
    ) -> SequenceRepoResult<OrderVersion> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let actual = load_version(&tx, container_id)?;
        if actual != expected_version {
            return Err(SequenceRepoError::Conflict {
                container_id,
                expected: expected_version,
                actual,
            });
        }
        let rewritten = rebalance_in(&tx, container_id, scope)?;
        let version = bump_version(&tx, container_id)?;
        tx.commit()?;

        info!(
            "event=rebalance module=repo status=ok container={} scope={} entities={} version={}",
            container_id, scope, rewritten, version
        );
        Ok(version)
    }
}

fn insert_entity(
    conn: &Connection,
    container_id: ContainerId,
    kind: EntityKind,
    scope: Scope,
) -> SequenceRepoResult<Entity> {
    let entity_uuid = Uuid::new_v4();
    let order_key = append_key(conn, container_id, scope)?;
    conn.execute(
        "INSERT INTO sequence_entries (
            entity_uuid,
            container_uuid,
            kind,
            group_uuid,
            order_key
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            entity_uuid.to_string(),
            container_id.to_string(),
            kind.as_str(),
            scope.group_id().map(|value| value.to_string()),
            order_key.value(),
        ],
    )?;
    Ok(Entity::new(
        entity_uuid,
        kind,
        container_id,
        scope.group_id(),
        order_key,
    ))
}

/// Key past the current end of `scope`, respacing the scope first when the
/// open end has hit the integer bound.
fn append_key(
    conn: &Connection,
    container_id: ContainerId,
    scope: Scope,
) -> SequenceRepoResult<OrderKey> {
    if let Ok(key) = allocate(max_key(conn, container_id, scope)?, None) {
        return Ok(key);
    }
    rebalance_in(conn, container_id, scope)?;
    allocate(max_key(conn, container_id, scope)?, None)
        .map_err(|err| SequenceRepoError::InvalidData(err.to_string()))
}

fn max_key(
    conn: &Connection,
    container_id: ContainerId,
    scope: Scope,
) -> SequenceRepoResult<Option<OrderKey>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(order_key)
         FROM sequence_entries
         WHERE container_uuid = ?1
           AND group_uuid IS ?2;",
        params![
            container_id.to_string(),
            scope.group_id().map(|value| value.to_string()),
        ],
        |row| row.get(0),
    )?;
    Ok(max.map(OrderKey::new))
}

fn rebalance_in(
    conn: &Connection,
    container_id: ContainerId,
    scope: Scope,
) -> SequenceRepoResult<usize> {
    let entities = list_scope_in(conn, container_id, scope)?;
    let keys = rebalance_keys(entities.len());
    for (entity, key) in entities.iter().zip(keys) {
        conn.execute(
            "UPDATE sequence_entries
             SET order_key = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE entity_uuid = ?1;",
            params![entity.id.to_string(), key.value()],
        )?;
    }
    Ok(entities.len())
}

fn list_scope_in(
    conn: &Connection,
    container_id: ContainerId,
    scope: Scope,
) -> SequenceRepoResult<Vec<Entity>> {
    let mut stmt = conn.prepare(&format!(
        "{ENTITY_SELECT_SQL}
         WHERE container_uuid = ?1
           AND group_uuid IS ?2
         ORDER BY order_key ASC, entity_uuid ASC;"
    ))?;
    let mut rows = stmt.query(params![
        container_id.to_string(),
        scope.group_id().map(|value| value.to_string()),
    ])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_entity_row(row)?);
    }
    Ok(items)
}

fn load_entity(conn: &Connection, entity_id: EntityId) -> SequenceRepoResult<Option<Entity>> {
    let mut stmt = conn.prepare(&format!("{ENTITY_SELECT_SQL} WHERE entity_uuid = ?1;"))?;
    let mut rows = stmt.query([entity_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_entity_row(row)?));
    }
    Ok(None)
}

fn ensure_group_in_container(
    conn: &Connection,
    container_id: ContainerId,
    group_id: EntityId,
) -> SequenceRepoResult<()> {
    match load_entity(conn, group_id)? {
        Some(group) if group.is_group() && group.container_id == container_id => Ok(()),
        _ => Err(SequenceRepoError::GroupNotFound(group_id)),
    }
}

fn key_taken(
    conn: &Connection,
    container_id: ContainerId,
    scope: Scope,
    key: OrderKey,
    except: EntityId,
) -> SequenceRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sequence_entries
            WHERE container_uuid = ?1
              AND group_uuid IS ?2
              AND order_key = ?3
              AND entity_uuid != ?4
        );",
        params![
            container_id.to_string(),
            scope.group_id().map(|value| value.to_string()),
            key.value(),
            except.to_string(),
        ],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn write_position(
    conn: &Connection,
    entity_id: EntityId,
    scope: Scope,
    key: OrderKey,
) -> SequenceRepoResult<()> {
    conn.execute(
        "UPDATE sequence_entries
         SET group_uuid = ?2,
             order_key = ?3,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE entity_uuid = ?1;",
        params![
            entity_id.to_string(),
            scope.group_id().map(|value| value.to_string()),
            key.value(),
        ],
    )?;
    Ok(())
}

fn load_version(conn: &Connection, container_id: ContainerId) -> SequenceRepoResult<OrderVersion> {
    conn.query_row(
        "SELECT order_version FROM containers WHERE container_uuid = ?1;",
        [container_id.to_string()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(SequenceRepoError::ContainerNotFound(container_id))
}

fn bump_version(conn: &Connection, container_id: ContainerId) -> SequenceRepoResult<OrderVersion> {
    conn.execute(
        "UPDATE containers
         SET order_version = order_version + 1,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE container_uuid = ?1;",
        [container_id.to_string()],
    )?;
    load_version(conn, container_id)
}

fn parse_entity_row(row: &Row<'_>) -> SequenceRepoResult<Entity> {
    let entity_uuid_text: String = row.get("entity_uuid")?;
    let container_uuid_text: String = row.get("container_uuid")?;
    let group_id = row
        .get::<_, Option<String>>("group_uuid")?
        .map(|value| parse_uuid(&value, "sequence_entries.group_uuid"))
        .transpose()?;

    let kind_text: String = row.get("kind")?;
    let kind = parse_entity_kind(&kind_text).ok_or_else(|| {
        SequenceRepoError::InvalidData(format!(
            "invalid entity kind `{kind_text}` in sequence_entries.kind"
        ))
    })?;

    Ok(Entity {
        id: parse_uuid(&entity_uuid_text, "sequence_entries.entity_uuid")?,
        kind,
        container_id: parse_uuid(&container_uuid_text, "sequence_entries.container_uuid")?,
        group_id,
        order_key: OrderKey::new(row.get("order_key")?),
    })
}

fn parse_entity_kind(value: &str) -> Option<EntityKind> {
    match value {
        "task" => Some(EntityKind::Task),
        "group" => Some(EntityKind::Group),
        _ => None,
    }
}

fn parse_uuid(value: &str, column: &'static str) -> SequenceRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| SequenceRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_sequence_connection_ready(conn: &Connection) -> SequenceRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(SequenceRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "containers")? {
        return Err(SequenceRepoError::MissingRequiredTable("containers"));
    }
    if !table_exists(conn, "sequence_entries")? {
        return Err(SequenceRepoError::MissingRequiredTable("sequence_entries"));
    }

    for column in [
        "entity_uuid",
        "container_uuid",
        "kind",
        "group_uuid",
        "order_key",
    ] {
        if !table_has_column(conn, "sequence_entries", column)? {
            return Err(SequenceRepoError::MissingRequiredColumn {
                table: "sequence_entries",
                column,
            });
        }
    }
    if !table_has_column(conn, "containers", "order_version")? {
        return Err(SequenceRepoError::MissingRequiredColumn {
            table: "containers",
            column: "order_version",
        });
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> SequenceRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> SequenceRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
