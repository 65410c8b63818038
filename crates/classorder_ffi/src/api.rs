//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the class order read and the reorder mutation to Dart via FRB.
//! - Flatten core types into plain string/integer envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures carry the wire error kind (`not_found`, `conflict`, ...) so the
//!   client can treat every kind the same way: roll back and re-read.

use classorder_core::db::open_db;
use classorder_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ContainerSnapshot,
    Entity, ErrorKind, Position, ReorderFailure, ReorderRequest, ReorderService, Scope,
    SqliteSequenceStore,
};
use log::warn;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

const DB_FILE_NAME: &str = "classorder.sqlite3";
const DB_PATH_ENV: &str = "CLASSORDER_DB_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Pins the database file used by every later call.
///
/// Must run before the first DB-backed call; afterwards only the already
/// active path is accepted.
///
/// # FFI contract
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_db_path(db_path: String) -> String {
    let trimmed = db_path.trim();
    if trimmed.is_empty() {
        return "db_path cannot be empty".to_string();
    }
    let requested = PathBuf::from(trimmed);
    let active = DB_PATH.get_or_init(|| requested.clone());
    if *active == requested {
        String::new()
    } else {
        format!(
            "db path already set to `{}`; refusing to switch to `{}`",
            active.display(),
            requested.display()
        )
    }
}

/// One task or group as shown in the class list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedItem {
    pub entity_id: String,
    /// `task|group`.
    pub kind: String,
    /// Enclosing group for nested tasks.
    pub group_id: Option<String>,
    pub order_key: i64,
}

/// Class order envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSnapshotResponse {
    pub ok: bool,
    /// Wire error kind on failure.
    pub kind: Option<String>,
    pub message: String,
    /// Order version to show alongside diagnostics.
    pub version: i64,
    /// Display order: each top-level entry, and after a group its nested tasks.
    pub items: Vec<OrderedItem>,
}

/// Reorder result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderResponse {
    pub ok: bool,
    /// Wire error kind on failure.
    pub kind: Option<String>,
    pub message: String,
    /// Moved entity with its committed key and scope.
    pub entity: Option<OrderedItem>,
}

impl ReorderResponse {
    fn failure(failure: ReorderFailure) -> Self {
        Self {
            ok: false,
            kind: Some(failure.kind.as_str().to_string()),
            message: failure.message,
            entity: None,
        }
    }
}

/// Reads the authoritative order of one class.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn class_snapshot(container_id: String) -> ClassSnapshotResponse {
    let result = parse_id(&container_id, ErrorKind::NotFound, "container_id").and_then(|id| {
        with_reorder_service(|service| service.load(id).map_err(|err| err.to_failure()))
    });

    match result {
        Ok(snapshot) => {
            let items = flatten(&snapshot);
            ClassSnapshotResponse {
                ok: true,
                kind: None,
                message: format!("{} item(s).", items.len()),
                version: snapshot.version,
                items,
            }
        }
        Err(failure) => ClassSnapshotResponse {
            ok: false,
            kind: Some(failure.kind.as_str().to_string()),
            message: failure.message,
            version: 0,
            items: Vec::new(),
        },
    }
}

/// Moves one task or group.
///
/// Input semantics:
/// - `position`: `start|end|before|after` (case-insensitive).
/// - `target_id`: anchor for `before`/`after`; with `start`/`end` it picks the
///   scope (a group id addresses that group's nested list).
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics; every failure is reported through `kind` + `message`.
#[flutter_rust_bridge::frb(sync)]
pub fn reorder(
    container_id: String,
    moved_id: String,
    position: String,
    target_id: Option<String>,
) -> ReorderResponse {
    let request = match parse_request(&container_id, &moved_id, &position, target_id.as_deref()) {
        Ok(request) => request,
        Err(failure) => return ReorderResponse::failure(failure),
    };

    let result = with_reorder_service(|service| {
        service.reorder(&request).map_err(|err| err.to_failure())
    });
    match result {
        Ok(receipt) => ReorderResponse {
            ok: true,
            kind: None,
            message: format!("Moved at version {}.", receipt.version),
            entity: Some(to_item(&receipt.entity)),
        },
        Err(failure) => ReorderResponse::failure(failure),
    }
}

fn parse_request(
    container_id: &str,
    moved_id: &str,
    position: &str,
    target_id: Option<&str>,
) -> Result<ReorderRequest, ReorderFailure> {
    let container_id = parse_id(container_id, ErrorKind::NotFound, "container_id")?;
    let moved_id = parse_id(moved_id, ErrorKind::NotFound, "moved_id")?;
    let position = Position::parse(position).ok_or_else(|| {
        ReorderFailure::new(
            ErrorKind::AmbiguousPosition,
            format!("unsupported position `{position}`; expected start|end|before|after"),
        )
    })?;
    let target_id = target_id
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_id(value, ErrorKind::AnchorNotFound, "target_id"))
        .transpose()?;
    Ok(ReorderRequest::new(container_id, moved_id, position, target_id))
}

/// Malformed ids cannot name an existing row, so they map to lookup kinds.
fn parse_id(value: &str, kind: ErrorKind, field: &str) -> Result<Uuid, ReorderFailure> {
    Uuid::parse_str(value.trim())
        .map_err(|_| ReorderFailure::new(kind, format!("invalid {field} `{value}`")))
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn open_class_db() -> Result<Connection, ReorderFailure> {
    open_db(resolve_db_path()).map_err(|err| {
        warn!("event=ffi_db_open module=ffi status=error error={err}");
        ReorderFailure::new(ErrorKind::Internal, format!("class DB open failed: {err}"))
    })
}

fn with_reorder_service<T>(
    f: impl FnOnce(&ReorderService<SqliteSequenceStore<'_>>) -> Result<T, ReorderFailure>,
) -> Result<T, ReorderFailure> {
    let conn = open_class_db()?;
    let store = SqliteSequenceStore::try_new(&conn).map_err(|err| {
        ReorderFailure::new(ErrorKind::Internal, format!("class store init failed: {err}"))
    })?;
    f(&ReorderService::new(store))
}

fn flatten(snapshot: &ContainerSnapshot) -> Vec<OrderedItem> {
    let mut items = Vec::with_capacity(snapshot.len());
    for entity in snapshot.top_level() {
        items.push(to_item(entity));
        if entity.is_group() {
            items.extend(
                snapshot
                    .scope_entities(Scope::Group(entity.id))
                    .iter()
                    .map(to_item),
            );
        }
    }
    items
}

fn to_item(entity: &Entity) -> OrderedItem {
    OrderedItem {
        entity_id: entity.id.to_string(),
        kind: entity.kind.as_str().to_string(),
        group_id: entity.group_id.map(|id| id.to_string()),
        order_key: entity.order_key.value(),
    }
}
