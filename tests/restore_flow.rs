use std::fs;

use tempfile::TempDir;

use rinktrax_admin::idmap::{MappingTable, SharedMappings, UserMappings};
use rinktrax_admin::tabular::migrate::migrate_sessions;
use rinktrax_admin::tabular::CsvTable;
use rinktrax_admin::{db, fixtures, AdminPaths, Restorer, Step, STEP_ORDER};

fn write_admin_tree(root: &std::path::Path) -> AdminPaths {
    let paths = AdminPaths::new(root);

    let pooled = paths.pooled_dir();
    fs::create_dir_all(&pooled).unwrap();
    fs::write(
        pooled.join("coaches.yaml"),
        "- coach_id: coach-1\n  first_name: Ann\n  last_name: Ice\n  hourly_rate: 55.0\n\
         - coach_id: coach-2\n  first_name: Bo\n  last_name: Blade\n",
    )
    .unwrap();
    fs::write(
        pooled.join("locations.yaml"),
        "- rink_id: rink-1\n  name: Main Rink\n  city: Northfield\n\
         - rink_id: rink-2\n  name: Annex\n",
    )
    .unwrap();
    fs::write(
        pooled.join("clubs.yaml"),
        "- club_id: club-1\n  club_name: North FSC\n- club_id: club-2\n  club_name: South FSC\n",
    )
    .unwrap();

    let user_dir = paths.user_dir("sparkles");
    fs::create_dir_all(&user_dir).unwrap();
    fs::write(
        user_dir.join("auth.yaml"),
        "login: sparkles\nemail: s@example.com\nphone: '555-0100'\n\
         skater_id: uuid-s\npassword: hunter2\n",
    )
    .unwrap();
    fs::write(
        user_dir.join("profile.yaml"),
        "first_name: Sparkle\nlast_name: Pond\nactive_coach: coach-1\n\
         home_rink: rink-1\nclub_id: club-1\n",
    )
    .unwrap();
    fs::write(
        user_dir.join("equipment.yaml"),
        "boots:\n  - boot_id: b1\n    brand: Edea\n    size: 9.5\n\
         blades:\n  - blade_id: bl1\n    brand: MK\n\
         configs:\n  - config_id: c1\n    boot_id: b1\n    blade_id: bl1\n    name: comp\n",
    )
    .unwrap();
    fs::write(
        user_dir.join("memberships.yaml"),
        "club_memberships:\n  - club_id: club-1\n    member_number: '42'\n\
         punch_cards:\n  - rink_id: rink-1\n    punches_total: 10\n\
         lts_classes:\n  - location_id: rink-2\n    class_name: Basic 4\n",
    )
    .unwrap();
    fs::write(
        user_dir.join("maintenance.yaml"),
        "- date: '2026-01-10'\n  blade_id: bl1\n  rink_id: rink-1\n  service: sharpening\n  cost: 25.0\n",
    )
    .unwrap();

    let sessions = paths.sessions_dir("sparkles");
    fs::create_dir_all(&sessions).unwrap();
    fs::write(
        sessions.join("2026_01.csv"),
        "session_id,skater_id,date,minutes,cost,rink_id\n\
         1,uuid-s,2026-01-03,60,12.5,rink-1\n\
         2,uuid-s,2026-01-05,45,12.5,rink-1\n\
         3,uuid-other,2026-01-05,45,12.5,rink-1\n",
    )
    .unwrap();

    let migrations = paths.user_migrations_dir("sparkles");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        paths.shared_mappings(),
        "locations:\n  3: rink-1\ncoaches:\n  12: coach-1\nskate_types:\n  1: freestyle\n",
    )
    .unwrap();
    fs::write(
        paths.user_mappings("sparkles"),
        "skaters:\n  1: uuid-s\nskate_configs:\n  7: c1\n",
    )
    .unwrap();

    paths
}

async fn count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn restore_then_migrate_round_trip() {
    let tmp = TempDir::new().unwrap();
    let paths = write_admin_tree(&tmp.path().join("admin"));
    let db_path = tmp.path().join("rinktrax.sqlite3");

    let pool = db::open_pool(&db_path).await.unwrap();
    db::apply_schema(&pool).await.unwrap();

    // Full restore in dependency order.
    let restorer = Restorer::new(&pool, &paths, "sparkles");
    let report = restorer.run(&STEP_ORDER).await.unwrap();
    assert_eq!(report.steps.len(), 7);
    assert!(report.steps.iter().all(|s| s.failed == 0));

    assert_eq!(count(&pool, "coaches").await, 2);
    assert_eq!(count(&pool, "rinks").await, 2);
    assert_eq!(count(&pool, "clubs").await, 2);
    assert_eq!(count(&pool, "auth").await, 1);
    assert_eq!(count(&pool, "skater_profile").await, 1);
    assert_eq!(count(&pool, "boots").await, 1);
    assert_eq!(count(&pool, "blades").await, 1);
    assert_eq!(count(&pool, "skate_configs").await, 1);
    assert_eq!(count(&pool, "club_members").await, 1);
    assert_eq!(count(&pool, "punch_cards").await, 1);
    assert_eq!(count(&pool, "lts_classes").await, 1);
    assert_eq!(count(&pool, "maintenance").await, 1);
    // sessions: 3 input rows, one belongs to another identity
    assert_eq!(count(&pool, "ice_sessions").await, 2);

    // A second restore of the pooled step performs zero writes.
    let second = restorer.run(&[Step::Pooled]).await.unwrap();
    assert!(second.steps[0].skipped);
    assert_eq!(count(&pool, "coaches").await, 2);

    // Legacy migration translates the old integer keys into the same store.
    let shared = SharedMappings::load(&paths.shared_mappings()).unwrap();
    let user_maps = UserMappings::load(&paths.user_mappings("sparkles")).unwrap();
    let mapping = MappingTable::build(&shared, &user_maps);
    let owner = fixtures::owner_id(&paths, "sparkles").unwrap();

    let legacy = CsvTable {
        source: "ice_time.csv".to_string(),
        headers: ["id", "skater_id", "date", "minutes", "rink_id", "coach_id", "skate_config"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows: vec![
            vec!["1", "1", "2019-11-02", "60", "3", "12", "7.0"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            vec!["2", "1", "0000-00-00", "60", "3", "12", "7"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        ],
    };
    let migration = migrate_sessions(&pool, legacy, &mapping, &owner).await.unwrap();
    assert_eq!(migration.written, 1);
    assert_eq!(migration.date_invalid.len(), 1);
    assert!(migration.unmapped.is_empty());
    assert_eq!(count(&pool, "ice_sessions").await, 3);

    let migrated: (String, String, String) = sqlx::query_as(
        "SELECT rink_id, coach_id, skate_config FROM ice_sessions WHERE date = '2019-11-02'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(migrated.0, "rink-1");
    assert_eq!(migrated.1, "coach-1");
    assert_eq!(migrated.2, "c1");

    pool.close().await;
}
