use std::cell::Cell;
use std::fs;
use std::path::PathBuf;

use bricksberg_catalog::*;
use bricksberg_db::*;
use bricksberg_import::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use csv::StringRecord;
use rusqlite::Connection;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn options(strategy: RelationStrategy) -> SchedulerOptions {
    SchedulerOptions {
        catalog_batch_size: 2,
        inventory_batch_size: 2,
        job_timeout: std::time::Duration::from_secs(300),
        batch_time_budget: std::time::Duration::from_secs(60),
        max_log_entries: 500,
        relation_strategy: strategy,
    }
}

fn write_csv(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Submit a catalog job and tick until the scheduler is idle.
fn import(
    conn: Connection,
    dir: &TempDir,
    files: &[(&str, &str)],
    strategy: RelationStrategy,
) -> (Connection, JobId) {
    let files: Vec<(String, PathBuf)> = files
        .iter()
        .map(|(key, contents)| (key.to_string(), write_csv(dir, &format!("{key}.csv"), contents)))
        .collect();
    let job_id = submit_catalog_job(&conn, &files, t0(), 500).unwrap();
    let mut scheduler = Scheduler::new(conn, options(strategy));
    for tick in 0..100 {
        let report = scheduler.tick_at(t0() + Duration::seconds(tick)).unwrap();
        if report.outcome == TickOutcome::Idle {
            break;
        }
    }
    let conn = scheduler.into_connection();
    assert_eq!(job_status(&conn, job_id).unwrap(), Some(JobStatus::Complete));
    (conn, job_id)
}

fn id_of(conn: &Connection, kind: EntityKind, field: &str, value: &str) -> EntityId {
    find_entity_by_key(conn, kind, field, value)
        .unwrap()
        .unwrap_or_else(|| panic!("{kind} {field}={value} not found"))
}

fn warnings(conn: &Connection, job_id: JobId) -> Vec<String> {
    job_log_tail(conn, job_id, 500)
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .filter(|m| m.starts_with("WARNING:"))
        .collect()
}

const COLORS: &str = "id,name,rgb,is_trans\n0,Black,05131D,f\n4,Red,C91A09,f\n";
const THEMES: &str = "id,name,parent_id\n158,Star Wars,\n159,Episode IV,158\n160,Orphan,999\n";
const CATEGORIES: &str = "id,name\n11,Bricks\n";
const PARTS: &str = "part_num,name,part_cat_id,brickowl_ids\n\
    3001,Brick 2 x 4,11,771344\n\
    3001p01,Brick 2 x 4 with Print,11,\n\
    3002,Brick 2 x 3,11,\n\
    3003,Brick 2 x 2,11,\n";
const SETS: &str = "set_num,name,year,theme_id,num_parts\n\
    10000-1,Collection,1999,158,0\n\
    7140-1,X-wing Fighter,1999,159,263\n\
    7150-1,TIE Fighter,1999,159,171\n";
const MINIFIGS: &str = "fig_num,name,num_parts\nfig-000001,Luke Skywalker,4\n";

// ── Catalog tables ──────────────────────────────────────────────────────────

#[test]
fn catalog_tables_link_by_external_keys() {
    let dir = TempDir::new().unwrap();
    let (conn, job_id) = import(
        open_memory().unwrap(),
        &dir,
        &[
            ("colors", COLORS),
            ("themes", THEMES),
            ("part_categories", CATEGORIES),
            ("parts", PARTS),
            ("sets", SETS),
            ("minifigs", MINIFIGS),
        ],
        RelationStrategy::Buffered,
    );

    let star_wars = id_of(&conn, EntityKind::Theme, keys::THEME_ID, "158");
    let episode_iv = id_of(&conn, EntityKind::Theme, keys::THEME_ID, "159");
    let episode_iv = get_entity(&conn, episode_iv).unwrap().unwrap();
    assert_eq!(episode_iv.attr("parent"), Some(star_wars.to_string().as_str()));
    assert_eq!(episode_iv.attr("slug"), Some("episode-iv-159"));

    let orphan = id_of(&conn, EntityKind::Theme, keys::THEME_ID, "160");
    assert_eq!(get_entity(&conn, orphan).unwrap().unwrap().attr("parent"), None);
    assert!(
        warnings(&conn, job_id)
            .iter()
            .any(|w| w.contains("theme '999' not found"))
    );

    let category = id_of(&conn, EntityKind::PartCategory, keys::CATEGORY_ID, "11");
    let brick = id_of(&conn, EntityKind::Part, keys::BRICKOWL_ID, "771344");
    let brick = get_entity(&conn, brick).unwrap().unwrap();
    assert_eq!(brick.title, "Brick 2 x 4");
    assert_eq!(brick.attr(keys::PART_NUM), Some("3001"));
    assert_eq!(brick.attr(keys::REBRICKABLE_ID), Some("3001"));
    assert_eq!(brick.attr("category"), Some(category.to_string().as_str()));

    let xwing = id_of(&conn, EntityKind::Set, keys::SET_NUM, "7140-1");
    let xwing = get_entity(&conn, xwing).unwrap().unwrap();
    assert_eq!(xwing.attr("year"), Some("1999"));
    assert_eq!(xwing.attr("num_parts"), Some("263"));
    assert_eq!(xwing.attr("theme"), Some(episode_iv.id.to_string().as_str()));

    id_of(&conn, EntityKind::Minifigure, keys::FIG_NUM, "fig-000001");
    let counts = catalog_counts(&conn).unwrap();
    assert_eq!(counts.count(EntityKind::Part), 4);
    assert_eq!(counts.count(EntityKind::Set), 3);
}

// ── Dependency ordering ─────────────────────────────────────────────────────

#[test]
fn lines_before_their_parents_are_skipped_then_resolve_in_order() {
    let dir = TempDir::new().unwrap();
    let inventory_sets = "inventory_id,set_num,quantity\n1,7140-1,1\n1,7150-1,2\n";

    let (conn, early) = import(
        open_memory().unwrap(),
        &dir,
        &[("inventory_sets", inventory_sets)],
        RelationStrategy::Buffered,
    );
    let early_warnings = warnings(&conn, early);
    assert_eq!(
        early_warnings,
        [
            "WARNING: line 2 in inventory_sets.csv: parent not found: 1",
            "WARNING: line 3 in inventory_sets.csv: parent not found: 1",
        ]
    );

    let inventories = "id,version,set_num\n1,1,10000-1\n2,1,7140-1\n3,1,7150-1\n4,1,fig-000001\n";
    let (conn, _) = import(
        conn,
        &dir,
        &[
            ("inventory_sets", inventory_sets),
            ("inventories", inventories),
            ("sets", SETS),
            ("minifigs", MINIFIGS),
        ],
        RelationStrategy::Buffered,
    );

    let collection = id_of(&conn, EntityKind::Set, keys::SET_NUM, "10000-1");
    let xwing = id_of(&conn, EntityKind::Set, keys::SET_NUM, "7140-1");
    let tie = id_of(&conn, EntityKind::Set, keys::SET_NUM, "7150-1");
    assert_eq!(
        relationship_lines(&conn, collection, relations::INVENTORY_SETS).unwrap(),
        [RelationshipLine::new(xwing, 1), RelationshipLine::new(tie, 2)]
    );

    let luke = id_of(&conn, EntityKind::Minifigure, keys::FIG_NUM, "fig-000001");
    assert_eq!(
        id_of(&conn, EntityKind::Minifigure, keys::INVENTORY_ID, "4"),
        luke
    );
}

#[test]
fn inventories_keep_the_newest_version() {
    let dir = TempDir::new().unwrap();
    let (conn, _) = import(
        open_memory().unwrap(),
        &dir,
        &[
            ("sets", SETS),
            ("inventories", "id,version,set_num\n11,1,7140-1\n12,3,7140-1\n13,2,7140-1\n"),
        ],
        RelationStrategy::Buffered,
    );
    let xwing = id_of(&conn, EntityKind::Set, keys::SET_NUM, "7140-1");
    let xwing = get_entity(&conn, xwing).unwrap().unwrap();
    assert_eq!(xwing.attr(keys::INVENTORY_ID), Some("12"));
    assert_eq!(xwing.attr("inventory_version"), Some("3"));

    // A later run still compares against the stored version.
    let (conn, _) = import(
        conn,
        &dir,
        &[("inventories", "id,version,set_num\n14,2,7140-1\n")],
        RelationStrategy::Buffered,
    );
    let xwing = get_entity(&conn, xwing.id).unwrap().unwrap();
    assert_eq!(xwing.attr(keys::INVENTORY_ID), Some("12"));
}

#[test]
fn replaced_inventory_ids_stop_resolving_within_a_run() {
    let dir = TempDir::new().unwrap();
    let (conn, job_id) = import(
        open_memory().unwrap(),
        &dir,
        &[
            ("colors", COLORS),
            ("parts", PARTS),
            ("sets", SETS),
            ("inventories", "id,version,set_num\n11,1,7140-1\n12,2,7140-1\n"),
            (
                "inventory_parts",
                "inventory_id,part_num,color_id,quantity\n\
                 11,3003,0,1\n\
                 12,3001,4,2\n",
            ),
        ],
        RelationStrategy::Buffered,
    );

    let xwing = id_of(&conn, EntityKind::Set, keys::SET_NUM, "7140-1");
    assert_eq!(
        find_entity_by_key(&conn, EntityKind::Set, keys::INVENTORY_ID, "11").unwrap(),
        None
    );
    let lines = relationship_lines(&conn, xwing, relations::INVENTORY_PARTS).unwrap();
    let brick = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3001");
    let red = id_of(&conn, EntityKind::Color, keys::REBRICKABLE_ID, "4");
    assert_eq!(lines, [RelationshipLine::new(brick, 2).with_color(red)]);
    assert!(
        warnings(&conn, job_id)
            .iter()
            .any(|w| w == "WARNING: line 2 in inventory_parts.csv: parent not found: 11")
    );
}

#[test]
fn inventory_parts_and_elements_carry_colors() {
    let dir = TempDir::new().unwrap();
    let (conn, job_id) = import(
        open_memory().unwrap(),
        &dir,
        &[
            ("colors", COLORS),
            ("parts", PARTS),
            ("sets", SETS),
            ("elements", "element_id,part_num,color_id\n300126,3001,0\n300121,3001,4\n"),
            ("inventories", "id,version,set_num\n2,1,7140-1\n"),
            (
                "inventory_parts",
                "inventory_id,part_num,color_id,quantity,is_spare\n\
                 2,771344,0,4,f\n\
                 2,3003,4,1,t\n\
                 2,3003,4,0,f\n",
            ),
        ],
        RelationStrategy::Buffered,
    );
    let black = id_of(&conn, EntityKind::Color, keys::REBRICKABLE_ID, "0");
    let red = id_of(&conn, EntityKind::Color, keys::REBRICKABLE_ID, "4");
    let brick = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3001");
    let small = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3003");
    let xwing = id_of(&conn, EntityKind::Set, keys::SET_NUM, "7140-1");

    assert_eq!(
        relationship_lines(&conn, brick, relations::ELEMENTS).unwrap(),
        [
            RelationshipLine::new(black, 1).with_flag("300126"),
            RelationshipLine::new(red, 1).with_flag("300121"),
        ]
    );
    assert_eq!(
        relationship_lines(&conn, xwing, relations::INVENTORY_PARTS).unwrap(),
        [
            RelationshipLine::new(brick, 4).with_color(black),
            RelationshipLine::new(small, 1).with_color(red).with_flag("spare"),
        ]
    );
    let errors: Vec<_> = job_log_tail(&conn, job_id, 500)
        .unwrap()
        .into_iter()
        .filter(|e| e.message.starts_with("ERROR:"))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("invalid value for 'quantity': '0'"));
}

// ── Relationship replacement ────────────────────────────────────────────────

fn part_relationship_replacement(strategy: RelationStrategy) -> (Connection, EntityId, EntityId) {
    let dir = TempDir::new().unwrap();
    let (conn, _) = import(
        open_memory().unwrap(),
        &dir,
        &[("parts", PARTS)],
        strategy,
    );

    let first = "rel_type,child_part_num,parent_part_num\n\
        P,3001p01,3001\n\
        M,3001p01,3002\n\
        A,3003,3002\n";
    let (conn, _) = import(conn, &dir, &[("part_relationships", first)], strategy);

    let printed = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3001p01");
    let brick = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3001");
    let other = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3002");
    assert_eq!(
        relationship_lines(&conn, printed, relations::PART_RELATIONSHIPS).unwrap(),
        [
            RelationshipLine::new(brick, 1).with_flag("P"),
            RelationshipLine::new(other, 1).with_flag("M"),
        ]
    );

    let second = "rel_type,child_part_num,parent_part_num\n\
        P,3001p01,3001\n\
        P,3001p01,3001\n";
    let (conn, _) = import(conn, &dir, &[("part_relationships", second)], strategy);
    assert_eq!(
        relationship_lines(&conn, printed, relations::PART_RELATIONSHIPS).unwrap(),
        [RelationshipLine::new(brick, 1).with_flag("P")]
    );
    let small = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3003");
    (conn, small, other)
}

#[test]
fn buffered_reimport_replaces_lines_and_clears_dropped_parents() {
    let (conn, small, _) = part_relationship_replacement(RelationStrategy::Buffered);
    assert!(
        relationship_lines(&conn, small, relations::PART_RELATIONSHIPS)
            .unwrap()
            .is_empty()
    );
    let staged: i64 = conn
        .query_row("SELECT COUNT(*) FROM relationship_staging", [], |r| r.get(0))
        .unwrap();
    assert_eq!(staged, 0);
}

#[test]
fn clear_then_append_reimport_replaces_touched_parents() {
    let (conn, small, other) = part_relationship_replacement(RelationStrategy::ClearThenAppend);
    // Parents the second file never mentions keep their lines.
    assert_eq!(
        relationship_lines(&conn, small, relations::PART_RELATIONSHIPS).unwrap(),
        [RelationshipLine::new(other, 1).with_flag("A")]
    );
    let markers: i64 = conn
        .query_row("SELECT COUNT(*) FROM relationship_clears", [], |r| r.get(0))
        .unwrap();
    assert_eq!(markers, 0);
}

// ── BrickOwl inventory ──────────────────────────────────────────────────────

#[test]
fn brickowl_inventory_resolves_parts_and_colors() {
    let dir = TempDir::new().unwrap();
    let (conn, _) = import(
        open_memory().unwrap(),
        &dir,
        &[("colors", COLORS), ("parts", PARTS)],
        RelationStrategy::Buffered,
    );
    let path = write_csv(
        &dir,
        "brickowl.csv",
        "BOID,Color,Condition,Qty,Unit_Price,Item_Name,Remarks,External_ID_1\n\
         771344,Black,Used,4,0.12,Brick 2x4,bin A,X1\n\
         999999,Black,New,1,0.10,,,\n\
         3003,Red,new,0,0.10,,,\n\
         3003,Red,NEW,2,0.08,,,\n",
    );
    let job_id = submit_inventory_job(&conn, &path, t0(), 500).unwrap();
    let mut scheduler = Scheduler::new(conn, options(RelationStrategy::Buffered));
    for tick in 0..10 {
        let report = scheduler.tick_at(t0() + Duration::seconds(tick)).unwrap();
        if report.outcome == TickOutcome::Idle {
            break;
        }
    }
    let conn = scheduler.into_connection();
    assert_eq!(job_status(&conn, job_id).unwrap(), Some(JobStatus::Complete));
    assert_eq!(count_entities(&conn, EntityKind::InventoryItem).unwrap(), 2);

    let black = id_of(&conn, EntityKind::Color, keys::REBRICKABLE_ID, "0");
    let brick = id_of(&conn, EntityKind::Part, keys::PART_NUM, "3001");
    let item = id_of(
        &conn,
        EntityKind::InventoryItem,
        keys::UID,
        &format!("771344|{black}|used"),
    );
    let item = get_entity(&conn, item).unwrap().unwrap();
    assert_eq!(item.title, "771344 - Black (used)");
    assert_eq!(item.attr("part"), Some(brick.to_string().as_str()));
    assert_eq!(item.attr("quantity"), Some("4"));
    assert_eq!(item.attr("price"), Some("0.12"));
    assert_eq!(item.attr("name"), Some("Brick 2x4"));
    assert_eq!(item.attr("remarks"), Some("bin A"));
    assert_eq!(item.attr("external_id"), Some("X1"));
    assert_eq!(item.attr("sale_price"), None);

    let log: Vec<_> = job_log_tail(&conn, job_id, 500)
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert!(log.iter().any(|m| m == "WARNING: line 3 in brickowl.csv: part not found: 999999"));
    assert!(log.iter().any(|m| m.starts_with("ERROR: line 4 in brickowl.csv")));
    assert!(!path.exists());
}

// ── Negative caching ────────────────────────────────────────────────────────

/// Store wrapper that counts key lookups.
struct CountingStore<'a> {
    inner: SqliteEntityStore<'a>,
    lookups: Cell<u32>,
}

impl EntityStore for CountingStore<'_> {
    fn find_by_key(
        &self,
        kind: EntityKind,
        key_field: &str,
        key_value: &str,
    ) -> Result<Option<EntityId>, StoreError> {
        self.lookups.set(self.lookups.get() + 1);
        self.inner.find_by_key(kind, key_field, key_value)
    }
    fn upsert(
        &self,
        kind: EntityKind,
        id: Option<EntityId>,
        record: &EntityRecord,
    ) -> Result<EntityId, StoreError> {
        self.inner.upsert(kind, id, record)
    }
    fn get(&self, id: EntityId) -> Result<Option<StoredEntity>, StoreError> {
        self.inner.get(id)
    }
    fn count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        self.inner.count(kind)
    }
    fn set_relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
        lines: &[RelationshipLine],
    ) -> Result<(), StoreError> {
        self.inner.set_relationship_lines(parent, relation, lines)
    }
    fn clear_relationship_lines(&self, parent: EntityId, relation: &str) -> Result<(), StoreError> {
        self.inner.clear_relationship_lines(parent, relation)
    }
    fn append_relationship_line(
        &self,
        parent: EntityId,
        relation: &str,
        line: &RelationshipLine,
    ) -> Result<(), StoreError> {
        self.inner.append_relationship_line(parent, relation, line)
    }
    fn relationship_lines(
        &self,
        parent: EntityId,
        relation: &str,
    ) -> Result<Vec<RelationshipLine>, StoreError> {
        self.inner.relationship_lines(parent, relation)
    }
    fn parents_with_relation(&self, relation: &str) -> Result<Vec<EntityId>, StoreError> {
        self.inner.parents_with_relation(relation)
    }
}

#[test]
fn unresolved_parent_reaches_the_store_once_per_run() {
    let conn = open_memory().unwrap();
    let job_id = insert_job(
        &conn,
        JobKind::CatalogImport,
        &[Task::new("inventory_sets", "/tmp/inventory_sets.csv")],
        t0(),
    )
    .unwrap();
    let store = CountingStore {
        inner: SqliteEntityStore::new(&conn),
        lookups: Cell::new(0),
    };
    let mut cache = ResolutionCache::new();
    let log = JobLog::new(&conn, job_id, 50, t0());
    let mut handler = HandlerRegistry::with_defaults()
        .build("inventory_sets", &HandlerOptions::default())
        .unwrap();
    let header = HeaderMap::from_fields(["inventory_id", "set_num", "quantity"], &[]);

    let mut ctx = HandlerContext {
        job_id,
        conn: &conn,
        store: &store,
        cache: &mut cache,
        log: &log,
    };
    for line in 2..5 {
        let record = StringRecord::from(vec!["77", "7140-1", "1"]);
        let row = Row::new(&record, &header, line);
        let err = handler.process_row(&mut ctx, &row).unwrap_err();
        assert!(err.is_warning());
        assert_eq!(err.to_string(), "parent not found: 77");
    }
    // One lookup per owner kind (set, minifigure), all on the first row.
    assert_eq!(store.lookups.get(), 2);
    assert_eq!(cache.stats().negative_entries, 2);
}
