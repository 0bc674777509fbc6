//! End-to-end tests for the headless runner: scenario files on disk,
//! streamed output, batches and determinism checks.

use std::fs;

use mech_headless::{
    run_batch, run_battle, verify_determinism, BatchConfig, BatchResults, BattleRunner, Scenario,
    ScenarioError,
};
use mech_test_utils::fixtures::{duel_roster, mirror_roster, roster_ron};

fn scenario_file_text(name: &str, roster_text: &str) -> String {
    format!("Scenario(name: \"{name}\", config: (update_interval_ms: 20), roster: {roster_text})")
}

#[test]
fn scenario_file_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.ron");
    fs::write(&path, scenario_file_text("mirror", &roster_ron(&mirror_roster(2)))).unwrap();

    let scenario = Scenario::resolve(path.to_str().unwrap()).unwrap();
    assert_eq!(scenario.name, "mirror");
    assert_eq!(scenario.roster, mirror_roster(2));

    let metrics = run_battle(&scenario, 11, 20_000).unwrap();
    assert!(metrics.finished);
    assert_eq!(metrics.scenario, "mirror");
}

#[test]
fn serialized_scenario_loads_back() {
    let scenario = Scenario::builtin("skirmish_3v3").unwrap();
    let text = ron::ser::to_string_pretty(&scenario, ron::ser::PrettyConfig::default()).unwrap();
    let loaded = Scenario::from_ron_str(&text).unwrap();
    assert_eq!(loaded.roster, scenario.roster);
    assert_eq!(loaded.personalities, scenario.personalities);
    assert_eq!(loaded.config, scenario.config);
}

#[test]
fn missing_file_path_falls_back_to_builtin_lookup() {
    assert!(matches!(
        Scenario::resolve("/definitely/not/here.ron"),
        Err(ScenarioError::UnknownScenario(_))
    ));
    assert!(matches!(
        Scenario::load("/definitely/not/here.ron"),
        Err(ScenarioError::FileNotFound(_))
    ));
}

#[test]
fn invalid_roster_is_rejected_at_start() {
    let mut roster = duel_roster();
    roster.teams.pop();
    let text = scenario_file_text("lonely", &roster_ron(&roster));
    let scenario = Scenario::from_ron_str(&text).unwrap();
    assert!(matches!(scenario.start(0), Err(ScenarioError::Battle(_))));
}

#[test]
fn human_combatants_are_driven_by_ai() {
    let mut roster = duel_roster();
    roster.teams[0].members[0].ai_controlled = false;
    let text = scenario_file_text("manual", &roster_ron(&roster));
    let scenario = Scenario::from_ron_str(&text).unwrap();

    let metrics = run_battle(&scenario, 5, 20_000).unwrap();
    assert!(metrics.finished);
}

#[test]
fn streamed_events_match_summary() {
    let scenario = Scenario::builtin("skirmish_3v3").unwrap();
    let mut out = Vec::new();
    let metrics = BattleRunner::new(&scenario, 21, 20_000)
        .unwrap()
        .run_streaming(&mut out)
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let game_overs = lines
        .iter()
        .filter(|l| l["type"] == "tick")
        .flat_map(|l| l["events"].as_array().cloned().unwrap_or_default())
        .filter(|e| e.get("GameOver").is_some())
        .count();
    assert_eq!(game_overs, usize::from(metrics.finished));

    let summary = lines.last().unwrap();
    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["duration_ticks"], metrics.duration_ticks);
}

#[test]
fn batch_results_are_reproducible() {
    let config = BatchConfig::new("duel", 8).with_seed(100);
    let first = run_batch(config.clone()).unwrap();
    let second = run_batch(config).unwrap();

    let hashes = |r: &BatchResults| -> Vec<u64> {
        r.games.iter().map(|g| g.final_state_hash).collect()
    };
    assert_eq!(hashes(&first), hashes(&second));
    assert_eq!(first.summary.wins, second.summary.wins);
}

#[test]
fn parallel_batch_matches_sequential_runs() {
    let scenario = Scenario::builtin("duel").unwrap();
    let mut config = BatchConfig::new("duel", 6).with_seed(40);
    config.parallel_games = 2;
    let batch = run_batch(config).unwrap();

    for game in &batch.games {
        let single = run_battle(&scenario, game.seed, game.duration_ticks.max(1)).unwrap();
        assert_eq!(single.final_state_hash, game.final_state_hash, "seed {}", game.seed);
    }
}

#[test]
fn batch_results_save_into_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = BatchConfig::new("duel", 3).with_output(dir.path().to_path_buf());
    let results = run_batch(config).unwrap();

    let path = dir.path().join("nested").join("batch_results.json");
    results.save(&path).unwrap();
    let loaded = BatchResults::load(&path).unwrap();
    assert_eq!(loaded.summary.total_games, 3);
}

#[test]
fn determinism_holds_for_file_scenarios() {
    let text = scenario_file_text("mirror", &roster_ron(&mirror_roster(3)));
    let scenario = Scenario::from_ron_str(&text).unwrap();
    let report = verify_determinism(&scenario, 9, 3, 5_000).unwrap();
    assert!(report.deterministic, "{:?}", report.hashes);
}
