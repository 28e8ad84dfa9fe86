use bricksberg_catalog::*;
use bricksberg_db::*;

fn red() -> EntityRecord {
    EntityRecord::titled("Red")
        .attr(keys::REBRICKABLE_ID, "4")
        .attr(keys::COLOR_NAME, "Red")
        .attr("rgb_hex", "C91A09")
}

#[test]
fn upsert_creates_then_merges() {
    let conn = open_memory().unwrap();
    let id = upsert_entity(&conn, EntityKind::Color, None, &red()).unwrap();

    let patch = EntityRecord::patch().attr("rgb_hex", "B40000");
    let same = upsert_entity(&conn, EntityKind::Color, Some(id), &patch).unwrap();
    assert_eq!(same, id);

    let stored = get_entity(&conn, id).unwrap().unwrap();
    assert_eq!(stored.title, "Red");
    assert_eq!(stored.kind, EntityKind::Color);
    assert_eq!(stored.attr("rgb_hex"), Some("B40000"));
    assert_eq!(stored.attr(keys::COLOR_NAME), Some("Red"));
    assert_eq!(count_entities(&conn, EntityKind::Color).unwrap(), 1);
}

#[test]
fn new_entity_without_title_is_rejected() {
    let conn = open_memory().unwrap();
    let err = upsert_entity(&conn, EntityKind::Part, None, &EntityRecord::patch()).unwrap_err();
    assert!(matches!(err, OperationError::MissingTitle(EntityKind::Part)));
}

#[test]
fn update_of_wrong_kind_is_not_found() {
    let conn = open_memory().unwrap();
    let id = upsert_entity(&conn, EntityKind::Color, None, &red()).unwrap();
    let err = upsert_entity(&conn, EntityKind::Part, Some(id), &EntityRecord::patch()).unwrap_err();
    assert!(matches!(err, OperationError::NotFound { .. }));
}

#[test]
fn find_by_attribute_and_title_is_kind_scoped() {
    let conn = open_memory().unwrap();
    let color = upsert_entity(&conn, EntityKind::Color, None, &red()).unwrap();
    let theme = upsert_entity(
        &conn,
        EntityKind::Theme,
        None,
        &EntityRecord::titled("Red").attr(keys::THEME_ID, "4"),
    )
    .unwrap();

    assert_eq!(
        find_entity_by_key(&conn, EntityKind::Color, keys::REBRICKABLE_ID, "4").unwrap(),
        Some(color)
    );
    assert_eq!(
        find_entity_by_key(&conn, EntityKind::Theme, keys::TITLE, "Red").unwrap(),
        Some(theme)
    );
    assert_eq!(
        find_entity_by_key(&conn, EntityKind::Part, keys::TITLE, "Red").unwrap(),
        None
    );
}

#[test]
fn relationship_lines_replace_and_append() {
    let conn = open_memory().unwrap();
    let parent = upsert_entity(&conn, EntityKind::Set, None, &EntityRecord::titled("Castle")).unwrap();
    let a = upsert_entity(&conn, EntityKind::Part, None, &EntityRecord::titled("Brick 2x4")).unwrap();
    let b = upsert_entity(&conn, EntityKind::Part, None, &EntityRecord::titled("Plate 1x1")).unwrap();

    set_relationship_lines(
        &conn,
        parent,
        relations::INVENTORY_PARTS,
        &[RelationshipLine::new(a, 4), RelationshipLine::new(b, 2)],
    )
    .unwrap();
    set_relationship_lines(
        &conn,
        parent,
        relations::INVENTORY_PARTS,
        &[RelationshipLine::new(b, 3)],
    )
    .unwrap();
    assert_eq!(
        relationship_lines(&conn, parent, relations::INVENTORY_PARTS).unwrap(),
        vec![RelationshipLine::new(b, 3)]
    );

    let line = RelationshipLine::new(a, 1).with_flag("spare");
    append_relationship_line(&conn, parent, relations::INVENTORY_PARTS, &line).unwrap();
    append_relationship_line(&conn, parent, relations::INVENTORY_PARTS, &line).unwrap();
    assert_eq!(
        relationship_lines(&conn, parent, relations::INVENTORY_PARTS)
            .unwrap()
            .len(),
        2
    );

    assert_eq!(
        parents_with_relation(&conn, relations::INVENTORY_PARTS).unwrap(),
        vec![parent]
    );
    clear_relationship_lines(&conn, parent, relations::INVENTORY_PARTS).unwrap();
    assert!(parents_with_relation(&conn, relations::INVENTORY_PARTS)
        .unwrap()
        .is_empty());
}

#[test]
fn store_trait_maps_errors() {
    let conn = open_memory().unwrap();
    let store = SqliteEntityStore::new(&conn);
    let err = store
        .upsert(EntityKind::Theme, None, &EntityRecord::patch())
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingTitle(EntityKind::Theme)));

    let err = store
        .upsert(EntityKind::Theme, Some(999), &EntityRecord::patch())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { id: 999, .. }));

    let id = store.upsert(EntityKind::Color, None, &red()).unwrap();
    assert_eq!(store.count(EntityKind::Color).unwrap(), 1);
    assert_eq!(store.get(id).unwrap().unwrap().title, "Red");
}
