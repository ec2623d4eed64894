use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn uloom_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("uloom");
    path
}

fn fixture_bundle() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/corpus.json")
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/uloom.sqlite"

[server]
bind = "127.0.0.1:7340"

[search]
default_limit = 20
max_limit = 50
"#,
        root.display()
    );

    let config_path = config_dir.join("uloom.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_uloom(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = uloom_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("ULOOM_DB_PATH")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run uloom binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn init_and_import(config_path: &Path) {
    let (stdout, stderr, success) = run_uloom(config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);

    let bundle = fixture_bundle();
    let (stdout, stderr, success) = run_uloom(config_path, &["import", bundle.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_uloom(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/uloom.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_uloom(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_uloom(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    run_uloom(&config_path, &["init"]);
    let bundle = fixture_bundle();
    let (stdout, stderr, success) = run_uloom(&config_path, &["import", bundle.to_str().unwrap()]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("surahs:         4"), "got: {}", stdout);
    assert!(stdout.contains("verses:         10"), "got: {}", stdout);
    assert!(stdout.contains("tafsir entries: 4"), "got: {}", stdout);
    assert!(stdout.contains("variants:       1 (4 readings)"), "got: {}", stdout);
    assert!(stdout.contains("asbab records:  3"), "got: {}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reimport_is_skipped_unless_forced() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let bundle = fixture_bundle();
    let (stdout, _, success) = run_uloom(&config_path, &["import", bundle.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("(skipped)"), "got: {}", stdout);

    let (stdout, _, success) = run_uloom(
        &config_path,
        &["import", bundle.to_str().unwrap(), "--force"],
    );
    assert!(success);
    assert!(!stdout.contains("(skipped)"));
    assert!(stdout.contains("verses:         10"));

    let (stdout, _, success) = run_uloom(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Variants:        1 (4 readings)"), "got: {}", stdout);
    assert!(stdout.contains("Asbab records:   3"), "got: {}", stdout);
}

#[test]
fn test_invalid_bundle_leaves_database_untouched() {
    let (tmp, config_path) = setup_test_env();
    run_uloom(&config_path, &["init"]);

    let bad = tmp.path().join("bad.json");
    fs::write(
        &bad,
        r#"{
            "surahs": [{"id": 1, "name_ar": "الفاتحة", "name_en": "The Opening",
                        "name_transliterated": "Al-Fatihah", "revelation_type": "meccan",
                        "ayah_count": 7}],
            "verses": [{"surah": 1, "ayah": 1, "text_uthmani": "بِسْمِ ٱللَّهِ"}],
            "tafsir": [{"source": "no_such_book", "verse_key": "1:1", "text": "..."}]
        }"#,
    )
    .unwrap();

    let (_, stderr, success) = run_uloom(&config_path, &["import", bad.to_str().unwrap()]);
    assert!(!success, "import of an invalid bundle should fail");
    assert!(stderr.contains("no_such_book"), "got: {}", stderr);

    let (stdout, _, success) = run_uloom(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Verses:          0"), "got: {}", stdout);
}

#[test]
fn test_verse_lookup() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, stderr, success) = run_uloom(&config_path, &["verse", "1:4"]);
    assert!(success, "verse failed: {}", stderr);
    assert!(stdout.contains("1:4"));
    assert!(stdout.contains("مالك يوم الدين"));
    assert!(stdout.contains("page 1, juz 1"));
}

#[test]
fn test_verse_lookup_errors() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (_, _, success) = run_uloom(&config_path, &["verse", "2:1"]);
    assert!(!success, "missing verse should fail");

    let (_, _, success) = run_uloom(&config_path, &["verse", "115:1"]);
    assert!(!success, "out-of-range surah should fail");
}

#[test]
fn test_lookup_before_init_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_uloom(&config_path, &["verse", "1:1"]);
    assert!(!success);
    assert!(stderr.contains("Database not found"), "got: {}", stderr);
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, _, success) = run_uloom(&config_path, &["search", "القيوم"]);
    assert!(success, "search failed");
    assert!(stdout.contains("2:255"), "got: {}", stdout);
    assert!(stdout.contains("1 result(s)"), "got: {}", stdout);
}

#[test]
fn test_search_in_mushaf_order_with_limit() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, _, success) = run_uloom(&config_path, &["search", "الله", "--limit", "2"]);
    assert!(success);
    let first = stdout.find("1:1").expect("1:1 in results");
    let second = stdout.find("2:255").expect("2:255 in results");
    assert!(first < second);
    assert!(stdout.contains("2 result(s)"), "got: {}", stdout);
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, _, success) = run_uloom(&config_path, &["search", "zzzz"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_rejects_short_query() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (_, _, success) = run_uloom(&config_path, &["search", "ا"]);
    assert!(!success);
}

#[test]
fn test_resolve_prefers_transmitter_rule() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, stderr, success) = run_uloom(
        &config_path,
        &["resolve", "between_surahs", "nafi", "--transmitter", "warsh"],
    );
    assert!(success, "resolve failed: {}", stderr);
    assert!(
        stdout.contains("between_surahs for nafi / warsh: three_options"),
        "got: {}",
        stdout
    );
    assert!(stdout.contains("Transmitter"));
}

#[test]
fn test_resolve_imported_rule_and_fallbacks() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    // The bundle adds a transmitter-level rule for al-Bazzi.
    let (stdout, _, success) = run_uloom(
        &config_path,
        &["resolve", "silah_mim_jam", "ibn_kathir", "--transmitter", "bazzi"],
    );
    assert!(success);
    assert!(stdout.contains("level:   Transmitter"), "got: {}", stdout);

    let (stdout, _, success) = run_uloom(
        &config_path,
        &["resolve", "silah_mim_jam", "ibn_kathir", "--transmitter", "qunbul"],
    );
    assert!(success);
    assert!(stdout.contains("level:   Reader"), "got: {}", stdout);

    let (stdout, _, success) = run_uloom(&config_path, &["resolve", "madd_lazim", "hamza"]);
    assert!(success);
    assert!(stdout.contains("madd_lazim for hamza: 6"), "got: {}", stdout);
    assert!(stdout.contains("level:   Universal"), "got: {}", stdout);
}

#[test]
fn test_resolve_not_defined() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, _, success) = run_uloom(&config_path, &["resolve", "madd_munfasil", "nafi"]);
    assert!(success);
    assert!(
        stdout.contains("madd_munfasil for nafi: not defined"),
        "got: {}",
        stdout
    );
}

#[test]
fn test_resolve_rejects_mismatched_transmitter() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (_, _, success) = run_uloom(
        &config_path,
        &["resolve", "between_surahs", "asim", "--transmitter", "warsh"],
    );
    assert!(!success);

    let (_, _, success) = run_uloom(&config_path, &["resolve", "no_such_rule", "asim"]);
    assert!(!success);
}

#[test]
fn test_compare_in_priority_order() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, stderr, success) = run_uloom(
        &config_path,
        &["compare", "2:255", "--sources", "ibn_kathir,tabari,baghawi"],
    );
    assert!(success, "compare failed: {}", stderr);

    let tabari = stdout.find("[tabari]").expect("tabari block");
    let baghawi = stdout.find("[baghawi]").expect("baghawi block");
    let ibn_kathir = stdout.find("[ibn_kathir]").expect("ibn_kathir block");
    assert!(tabari < baghawi && baghawi < ibn_kathir, "got: {}", stdout);
    assert!(stdout.contains("(no entry)"));
}

#[test]
fn test_compare_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (_, _, success) = run_uloom(&config_path, &["compare", "2:255", "--sources", "nope"]);
    assert!(!success);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    init_and_import(&config_path);

    let (stdout, _, success) = run_uloom(&config_path, &["stats"]);
    assert!(success, "stats failed");
    assert!(stdout.contains("Surahs:          4"), "got: {}", stdout);
    assert!(stdout.contains("Verses:          10"), "got: {}", stdout);
    assert!(stdout.contains("Asbab records:   3"), "got: {}", stdout);
    assert!(!stdout.contains("Last import:     never"));
}
