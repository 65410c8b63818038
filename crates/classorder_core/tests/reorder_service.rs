use classorder_core::db::open_db_in_memory;
use classorder_core::{
    ContainerId, EntityId, ErrorKind, Position, ReorderError, ReorderRequest, ReorderService,
    ResolveError, Scope, SequenceStore, SqliteSequenceStore,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn top_ids<S: SequenceStore>(service: &ReorderService<S>, class: ContainerId) -> Vec<EntityId> {
    service.load(class).unwrap().scope_ids(Scope::TopLevel)
}

fn group_ids<S: SequenceStore>(
    service: &ReorderService<S>,
    class: ContainerId,
    group: EntityId,
) -> Vec<EntityId> {
    service.load(class).unwrap().scope_ids(Scope::Group(group))
}

#[test]
fn mixed_tasks_and_groups_follow_drag_scenario() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 1").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let b = store.create_group(class).unwrap().id;
    let c = store.create_task(class, None).unwrap().id;

    service
        .reorder(&ReorderRequest::before(class, c, b))
        .unwrap();
    assert_eq!(top_ids(&service, class), vec![a, c, b]);

    service.reorder(&ReorderRequest::after(class, a, b)).unwrap();
    assert_eq!(top_ids(&service, class), vec![c, b, a]);
    assert!(service.load(class).unwrap().keys_strictly_ascending());
}

#[test]
fn start_and_end_move_to_scope_bounds() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 2").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let b = store.create_task(class, None).unwrap().id;
    let c = store.create_task(class, None).unwrap().id;

    let receipt = service.reorder(&ReorderRequest::start(class, c)).unwrap();
    assert_eq!(top_ids(&service, class), vec![c, a, b]);
    let snapshot = service.load(class).unwrap();
    assert!(snapshot
        .top_level()
        .iter()
        .skip(1)
        .all(|entity| receipt.entity.order_key < entity.order_key));

    service.reorder(&ReorderRequest::end(class, c)).unwrap();
    assert_eq!(top_ids(&service, class), vec![a, b, c]);
}

#[test]
fn before_and_after_make_moved_entity_adjacent_to_target() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 3").unwrap();
    let ids: Vec<EntityId> = (0..5)
        .map(|_| store.create_task(class, None).unwrap().id)
        .collect();

    service
        .reorder(&ReorderRequest::after(class, ids[0], ids[3]))
        .unwrap();
    assert_eq!(
        top_ids(&service, class),
        vec![ids[1], ids[2], ids[3], ids[0], ids[4]]
    );

    service
        .reorder(&ReorderRequest::before(class, ids[4], ids[1]))
        .unwrap();
    assert_eq!(
        top_ids(&service, class),
        vec![ids[4], ids[1], ids[2], ids[3], ids[0]]
    );
}

#[test]
fn move_to_current_position_keeps_version() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 4").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let b = store.create_task(class, None).unwrap().id;
    let version = store.container_version(class).unwrap();

    let receipt = service.reorder(&ReorderRequest::after(class, b, a)).unwrap();

    assert_eq!(receipt.version, version);
    assert_eq!(store.container_version(class).unwrap(), version);
    assert_eq!(top_ids(&service, class), vec![a, b]);
}

#[test]
fn self_reference_is_rejected_and_order_is_unchanged() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 5").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let b = store.create_task(class, None).unwrap().id;
    let version = store.container_version(class).unwrap();

    let err = service
        .reorder(&ReorderRequest::before(class, b, b))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SelfReferential);
    assert_eq!(top_ids(&service, class), vec![a, b]);
    assert_eq!(store.container_version(class).unwrap(), version);
}

#[test]
fn missing_moved_entity_anchor_or_target_report_distinct_kinds() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 6").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let b = store.create_task(class, None).unwrap().id;

    store.delete_task(b).unwrap();
    let err = service
        .reorder(&ReorderRequest::after(class, a, b))
        .unwrap_err();
    assert!(matches!(
        err,
        ReorderError::Resolve(ResolveError::AnchorNotFound(id)) if id == b
    ));
    assert_eq!(err.kind(), ErrorKind::AnchorNotFound);

    let err = service
        .reorder(&ReorderRequest::start(class, Uuid::new_v4()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .reorder(&ReorderRequest::start(Uuid::new_v4(), a))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .reorder(&ReorderRequest::new(class, a, Position::Before, None))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousPosition);
    assert_eq!(err.to_failure().kind, ErrorKind::AmbiguousPosition);
}

#[test]
fn tasks_move_into_within_and_out_of_groups() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 7").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let group = store.create_group(class).unwrap().id;
    let c = store.create_task(class, None).unwrap().id;

    // End with a group target drops into the (empty) nested list.
    let receipt = service
        .reorder(&ReorderRequest::new(class, a, Position::End, Some(group)))
        .unwrap();
    assert_eq!(receipt.entity.group_id, Some(group));
    assert_eq!(top_ids(&service, class), vec![group, c]);
    assert_eq!(group_ids(&service, class, group), vec![a]);

    service
        .reorder(&ReorderRequest::before(class, c, a))
        .unwrap();
    assert_eq!(top_ids(&service, class), vec![group]);
    assert_eq!(group_ids(&service, class, group), vec![c, a]);

    service
        .reorder(&ReorderRequest::new(class, a, Position::Start, Some(group)))
        .unwrap();
    assert_eq!(group_ids(&service, class, group), vec![a, c]);

    let receipt = service
        .reorder(&ReorderRequest::before(class, c, group))
        .unwrap();
    assert_eq!(receipt.entity.group_id, None);
    assert_eq!(top_ids(&service, class), vec![c, group]);
    assert_eq!(group_ids(&service, class, group), vec![a]);
    assert!(service.load(class).unwrap().keys_strictly_ascending());
}

#[test]
fn groups_cannot_be_dropped_inside_groups() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 8").unwrap();
    let outer = store.create_group(class).unwrap().id;
    let inner = store.create_group(class).unwrap().id;
    let nested = store.create_task(class, Some(outer)).unwrap().id;

    let err = service
        .reorder(&ReorderRequest::after(class, inner, nested))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidScope);

    let err = service
        .reorder(&ReorderRequest::new(class, inner, Position::End, Some(outer)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidScope);

    service
        .reorder(&ReorderRequest::before(class, inner, outer))
        .unwrap();
    assert_eq!(top_ids(&service, class), vec![inner, outer]);
}

#[test]
fn repeated_insertion_between_same_neighbors_rebalances_transparently() {
    let conn = setup();
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn).unwrap());
    let store = service.store();
    let class = store.create_container("Period 9").unwrap();
    let head = store.create_task(class, None).unwrap().id;
    let mut moved = store.create_task(class, None).unwrap().id;
    let mut other = store.create_task(class, None).unwrap().id;
    let start_version = store.container_version(class).unwrap();

    for _ in 0..40 {
        service
            .reorder(&ReorderRequest::after(class, moved, head))
            .unwrap();
        assert_eq!(top_ids(&service, class), vec![head, moved, other]);
        assert!(service.load(class).unwrap().keys_strictly_ascending());
        std::mem::swap(&mut moved, &mut other);
    }

    // One version per move plus one per rebalance.
    let end_version = store.container_version(class).unwrap();
    assert!(end_version - start_version > 40);
}

#[test]
fn guard_rejects_unauthorized_containers() {
    let conn = setup();
    let store = SqliteSequenceStore::try_new(&conn).unwrap();
    let class = store.create_container("Staff only").unwrap();
    let a = store.create_task(class, None).unwrap().id;
    let b = store.create_task(class, None).unwrap().id;

    let service =
        ReorderService::with_guard(store, move |container: ContainerId| container != class);
    let err = service
        .reorder(&ReorderRequest::start(class, b))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let order = service.store().list_scope(class, Scope::TopLevel).unwrap();
    assert_eq!(
        order.iter().map(|entity| entity.id).collect::<Vec<_>>(),
        vec![a, b]
    );
}
