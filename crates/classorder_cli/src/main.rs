//! CLI smoke entry point.
//!
//! # Responsibility
//! - Seed one class into an in-memory database and replay a few drags.
//! - Print the order after every move so engine wiring can be eyeballed.

use classorder_core::db::open_db_in_memory;
use classorder_core::{
    ContainerId, EntityId, Position, ReorderRequest, ReorderService, Scope, SequenceStore,
    SqliteSequenceStore,
};
use std::collections::HashMap;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    println!("classorder_core version={}", classorder_core::core_version());

    let conn = open_db_in_memory()?;
    let service = ReorderService::new(SqliteSequenceStore::try_new(&conn)?);
    let store = service.store();
    let class = store.create_container("Demo class")?;

    let a = store.create_task(class, None)?.id;
    let b = store.create_group(class)?.id;
    let c = store.create_task(class, None)?.id;
    let labels = HashMap::from([(a, "A(task)"), (b, "B(group)"), (c, "C(task)")]);
    print_order(&service, &labels, class, "seeded")?;

    let moves = [
        ("C before B", ReorderRequest::before(class, c, b)),
        ("A after B", ReorderRequest::after(class, a, b)),
        ("C into B", ReorderRequest::new(class, c, Position::End, Some(b))),
        ("C before A", ReorderRequest::before(class, c, a)),
    ];
    for (label, request) in moves {
        match service.reorder(&request) {
            Ok(receipt) => println!("{label}: ok version={}", receipt.version),
            Err(err) => println!("{label}: {} ({err})", err.kind()),
        }
        print_order(&service, &labels, class, label)?;
    }

    let rejected = service.reorder(&ReorderRequest::after(class, a, a));
    if let Err(err) = rejected {
        println!("A after A: {}", err.kind());
    }
    Ok(())
}

fn print_order<S: SequenceStore>(
    service: &ReorderService<S>,
    labels: &HashMap<EntityId, &str>,
    class: ContainerId,
    step: &str,
) -> Result<(), Box<dyn Error>> {
    let snapshot = service.load(class)?;
    let name = |id: &EntityId| labels.get(id).copied().unwrap_or("?");

    let mut line = Vec::new();
    for entity in snapshot.top_level() {
        let nested = snapshot.scope_ids(Scope::Group(entity.id));
        if entity.is_group() && !nested.is_empty() {
            let inner: Vec<&str> = nested.iter().map(name).collect();
            line.push(format!("{}[{}]", name(&entity.id), inner.join(", ")));
        } else {
            line.push(name(&entity.id).to_string());
        }
    }
    println!("  {step:<12} -> {}", line.join(", "));
    Ok(())
}
