//! Directory-level validation tests.

use std::fs;
use std::path::{Path, PathBuf};

use mech_test_utils::fixtures::{duel_roster, mirror_roster, roster_ron};
use mech_tools::validate::validate_data_directory;

fn shipped_data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

#[test]
fn shipped_master_data_is_valid() {
    let report = validate_data_directory(&shipped_data_dir()).unwrap();
    assert!(report.files_checked >= 4);
    assert!(report.is_ok(), "{:#?}", report.problems);
}

#[test]
fn rosters_see_personalities_from_the_same_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut roster = mirror_roster(2);
    roster.teams[0].members[0].personality = Some("sniper".into());
    fs::create_dir(dir.path().join("rosters")).unwrap();
    fs::write(dir.path().join("rosters/mirror.ron"), roster_ron(&roster)).unwrap();

    let report = validate_data_directory(dir.path()).unwrap();
    assert_eq!(report.problems.len(), 1, "{:?}", report.problems);
    assert!(report.problems[0].message.contains("sniper"));

    fs::write(
        dir.path().join("personalities.ron"),
        r#"[(key: "sniper", routines: [(part: "powerful_attack", target: "enemy_leader")])]"#,
    )
    .unwrap();
    let report = validate_data_directory(dir.path()).unwrap();
    assert!(report.is_ok(), "{:?}", report.problems);
    assert_eq!(report.files_checked, 2);
}

#[test]
fn config_limits_apply_to_rosters() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("duel.ron"), roster_ron(&duel_roster())).unwrap();
    fs::write(dir.path().join("config.ron"), "BattleConfig(max_might: 15)").unwrap();

    let report = validate_data_directory(dir.path()).unwrap();
    assert!(!report.is_ok());
    assert!(report
        .problems
        .iter()
        .all(|p| p.message.contains("exceeds max_might")));
}

#[test]
fn parse_errors_and_structural_errors_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.ron"), "RosterData(teams: [").unwrap();
    let mut lonely = duel_roster();
    lonely.teams.truncate(1);
    fs::write(dir.path().join("lonely.ron"), roster_ron(&lonely)).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let report = validate_data_directory(dir.path()).unwrap();
    assert_eq!(report.files_checked, 2);
    let messages: Vec<String> = report.problems.iter().map(ToString::to_string).collect();
    assert!(messages.iter().any(|m| m.contains("broken.ron")), "{messages:?}");
    assert!(messages.iter().any(|m| m.contains("two teams")), "{messages:?}");
}
