//! Script file parsing from real files on disk

use std::io::Write;

use crawlcheck::script::{parse_script, read_lines, resolve, Action, VerifyKind};

#[test]
fn test_parse_instruction_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("instructions");

    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# seed then verify").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "seed {{SCHEME}}://a.{{DOMAIN}}:{{PORT}}/").unwrap();
    writeln!(file, "wait_spider_done").unwrap();
    writeln!(file, "config_log ldq 1 ldspid 1").unwrap();
    writeln!(file, "verify_indexed hello").unwrap();
    drop(file);

    let lines = read_lines(&path);
    let instructions = parse_script(&lines);

    assert_eq!(instructions.len(), 4);
    assert_eq!(instructions[0].verb, "seed");
    assert_eq!(instructions[1].verb, "wait_spider_done");
    assert_eq!(
        instructions[2].args,
        vec!["ldq", "1", "ldspid", "1"]
    );
    assert_eq!(
        resolve(&instructions[3].verb),
        Some(Action::Verify(VerifyKind::Indexed))
    );
}

#[test]
fn test_item_file_lines_are_verbatim() {
    // Item files keep their `|` delimiters; only script files tokenize.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verify_query_terms");

    std::fs::write(&path, "hello world||2|hello|world\nsecond query||1|second\n").unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "hello world||2|hello|world");
}

#[test]
fn test_missing_fixture_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let lines = read_lines(&dir.path().join("verify_indexed"));
    assert!(lines.is_empty());
}
