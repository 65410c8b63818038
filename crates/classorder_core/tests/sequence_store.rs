use classorder_core::db::open_db_in_memory;
use classorder_core::{
    Entity, EntityKind, MoveCommit, OrderKey, Scope, SequenceRepoError, SequenceStore,
    SqliteSequenceStore, KEY_STEP,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn keys(entities: &[Entity]) -> Vec<i64> {
    entities.iter().map(|entity| entity.order_key.value()).collect()
}

fn ids(entities: &[Entity]) -> Vec<Uuid> {
    entities.iter().map(|entity| entity.id).collect()
}

#[test]
fn created_entities_are_appended_at_scope_end() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Algebra I").unwrap();

    let a = store.create_task(class, None).unwrap();
    let b = store.create_group(class).unwrap();
    let c = store.create_task(class, None).unwrap();
    let nested = store.create_task(class, Some(b.id)).unwrap();

    let top = store.list_scope(class, Scope::TopLevel).unwrap();
    assert_eq!(ids(&top), vec![a.id, b.id, c.id]);
    assert_eq!(keys(&top), vec![0, KEY_STEP, 2 * KEY_STEP]);
    assert_eq!(top[1].kind, EntityKind::Group);

    let inside = store.list_scope(class, Scope::Group(b.id)).unwrap();
    assert_eq!(ids(&inside), vec![nested.id]);
    assert_eq!(inside[0].order_key, OrderKey::new(0));
    assert_eq!(inside[0].group_id, Some(b.id));
    assert_eq!(store.container_version(class).unwrap(), 4);
}

#[test]
fn load_container_groups_nested_tasks_under_their_group() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Biology").unwrap();
    let group = store.create_group(class).unwrap();
    let first = store.create_task(class, Some(group.id)).unwrap();
    let second = store.create_task(class, Some(group.id)).unwrap();
    let loose = store.create_task(class, None).unwrap();

    let snapshot = store.load_container(class).unwrap();
    assert_eq!(snapshot.version, 4);
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot.scope_ids(Scope::TopLevel), vec![group.id, loose.id]);
    assert_eq!(
        snapshot.scope_ids(Scope::Group(group.id)),
        vec![first.id, second.id]
    );
    assert!(snapshot.keys_strictly_ascending());
}

#[test]
fn create_task_rejects_unknown_or_non_group_parent() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Chemistry").unwrap();
    let task = store.create_task(class, None).unwrap();
    let missing = Uuid::new_v4();

    assert!(matches!(
        store.create_task(class, Some(missing)),
        Err(SequenceRepoError::GroupNotFound(id)) if id == missing
    ));
    assert!(matches!(
        store.create_task(class, Some(task.id)),
        Err(SequenceRepoError::GroupNotFound(id)) if id == task.id
    ));
    assert!(matches!(
        store.create_task(Uuid::new_v4(), None),
        Err(SequenceRepoError::ContainerNotFound(_))
    ));
}

#[test]
fn apply_move_writes_key_and_scope_and_bumps_version() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("History").unwrap();
    let group = store.create_group(class).unwrap();
    let task = store.create_task(class, None).unwrap();
    let version = store.container_version(class).unwrap();

    let receipt = store
        .apply_move(&MoveCommit {
            container_id: class,
            entity_id: task.id,
            scope: Scope::Group(group.id),
            order_key: OrderKey::new(0),
            expected_version: version,
        })
        .unwrap();

    assert_eq!(receipt.version, version + 1);
    assert_eq!(receipt.entity.id, task.id);
    assert_eq!(receipt.entity.group_id, Some(group.id));
    assert_eq!(
        ids(&store.list_scope(class, Scope::Group(group.id)).unwrap()),
        vec![task.id]
    );
    assert_eq!(
        ids(&store.list_scope(class, Scope::TopLevel).unwrap()),
        vec![group.id]
    );
}

#[test]
fn apply_move_with_stale_version_is_a_conflict_and_changes_nothing() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Physics").unwrap();
    let a = store.create_task(class, None).unwrap();
    let stale = store.container_version(class).unwrap();
    let b = store.create_task(class, None).unwrap();

    let err = store
        .apply_move(&MoveCommit {
            container_id: class,
            entity_id: b.id,
            scope: Scope::TopLevel,
            order_key: OrderKey::new(-KEY_STEP),
            expected_version: stale,
        })
        .unwrap_err();

    match err {
        SequenceRepoError::Conflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, stale);
            assert_eq!(actual, stale + 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        ids(&store.list_scope(class, Scope::TopLevel).unwrap()),
        vec![a.id, b.id]
    );
}

#[test]
fn apply_move_refuses_a_key_held_by_another_entity() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Art").unwrap();
    let a = store.create_task(class, None).unwrap();
    let b = store.create_task(class, None).unwrap();
    let version = store.container_version(class).unwrap();

    let err = store
        .apply_move(&MoveCommit {
            container_id: class,
            entity_id: b.id,
            scope: Scope::TopLevel,
            order_key: a.order_key,
            expected_version: version,
        })
        .unwrap_err();

    assert!(matches!(err, SequenceRepoError::KeyCollision { entity_id, .. } if entity_id == b.id));
    assert_eq!(store.container_version(class).unwrap(), version);
}

#[test]
fn apply_move_refuses_to_nest_groups() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Music").unwrap();
    let outer = store.create_group(class).unwrap();
    let inner = store.create_group(class).unwrap();
    let version = store.container_version(class).unwrap();

    let err = store
        .apply_move(&MoveCommit {
            container_id: class,
            entity_id: inner.id,
            scope: Scope::Group(outer.id),
            order_key: OrderKey::new(0),
            expected_version: version,
        })
        .unwrap_err();

    assert!(matches!(err, SequenceRepoError::InvalidScope { entity_id, .. } if entity_id == inner.id));
}

#[test]
fn rebalance_scope_respaces_keys_and_keeps_order() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Geography").unwrap();
    let a = store.create_task(class, None).unwrap();
    let b = store.create_task(class, None).unwrap();
    let c = store.create_task(class, None).unwrap();

    let version = store.container_version(class).unwrap();
    store
        .apply_move(&MoveCommit {
            container_id: class,
            entity_id: c.id,
            scope: Scope::TopLevel,
            order_key: OrderKey::new(1),
            expected_version: version,
        })
        .unwrap();
    let version = store.container_version(class).unwrap();

    let next = store
        .rebalance_scope(class, Scope::TopLevel, version)
        .unwrap();

    assert_eq!(next, version + 1);
    let top = store.list_scope(class, Scope::TopLevel).unwrap();
    assert_eq!(ids(&top), vec![a.id, c.id, b.id]);
    assert_eq!(keys(&top), vec![0, KEY_STEP, 2 * KEY_STEP]);

    assert!(matches!(
        store.rebalance_scope(class, Scope::TopLevel, version),
        Err(SequenceRepoError::Conflict { .. })
    ));
}

#[test]
fn delete_group_appends_its_tasks_to_top_level_end() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Literature").unwrap();
    let a = store.create_task(class, None).unwrap();
    let group = store.create_group(class).unwrap();
    let c = store.create_task(class, None).unwrap();
    let first = store.create_task(class, Some(group.id)).unwrap();
    let second = store.create_task(class, Some(group.id)).unwrap();

    store.delete_group(group.id).unwrap();

    let snapshot = store.load_container(class).unwrap();
    assert_eq!(
        snapshot.scope_ids(Scope::TopLevel),
        vec![a.id, c.id, first.id, second.id]
    );
    assert!(snapshot.find(group.id).is_none());
    assert!(snapshot.keys_strictly_ascending());
    assert!(snapshot
        .top_level()
        .iter()
        .all(|entity| entity.group_id.is_none()));
}

#[test]
fn delete_task_and_delete_group_check_entity_kind() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Drama").unwrap();
    let task = store.create_task(class, None).unwrap();
    let group = store.create_group(class).unwrap();

    assert!(matches!(
        store.delete_task(group.id),
        Err(SequenceRepoError::EntityNotFound(_))
    ));
    assert!(matches!(
        store.delete_group(task.id),
        Err(SequenceRepoError::GroupNotFound(_))
    ));

    store.delete_task(task.id).unwrap();
    assert_eq!(
        ids(&store.list_scope(class, Scope::TopLevel).unwrap()),
        vec![group.id]
    );
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteSequenceStore::try_new(&conn) {
        Err(SequenceRepoError::UninitializedConnection { actual_version, .. }) => {
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("unmigrated connection must be rejected"),
    }
}
