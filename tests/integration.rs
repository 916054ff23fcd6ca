use std::path::Path;
use std::process::{Command, Output};

fn marginalia(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_marginalia"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

fn ok(dir: &Path, args: &[&str]) -> String {
    let out = marginalia(dir, args);
    assert!(
        out.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

fn session_json(dir: &Path, id: &str) -> serde_json::Value {
    let path = dir.join(".marginalia/sessions").join(format!("session-{id}.json"));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// New session with one user and one assistant message; returns (session, assistant id).
fn seeded(dir: &Path) -> (String, String) {
    let session = ok(dir, &["new", "--summary", "Foxes"]).trim().to_string();
    std::fs::write(dir.join("q.md"), "Describe a fox.\n").unwrap();
    std::fs::write(dir.join("a.md"), "# Answer\n\nThe quick brown fox\n").unwrap();
    ok(dir, &["add-message", &session, "--role", "user", "q.md"]);
    let answer = ok(
        dir,
        &[
            "add-message", &session, "--role", "assistant", "--model", "gpt-4o",
            "--input-tokens", "1000000", "--output-tokens", "1000000", "a.md",
        ],
    )
    .trim()
    .to_string();
    (session, answer)
}

#[test]
fn spans_lists_positional_ids() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("doc.md"), "# Title\n\nThe *quick* fox\n").unwrap();
    let out = ok(dir.path(), &["spans", "doc.md"]);
    assert!(out.contains("h1-1-1\tTitle"), "{out}");
    assert!(out.contains("p-3-1\tThe quick fox"), "{out}");
}

#[test]
fn memo_is_persisted_and_shown() {
    let dir = tempfile::tempdir().unwrap();
    let (session, answer) = seeded(dir.path());

    let anchor = ["--message", answer.as_str(), "--span", "p-3-1", "--start", "4", "--end", "9"];
    let mut args = vec!["memo", session.as_str()];
    args.extend(anchor);
    args.push("adjective");
    ok(dir.path(), &args);

    let json = session_json(dir.path(), &session);
    let message = &json["messages"][1];
    assert_eq!(message["memos"][0]["clientSideId"], "p-3-1");
    assert_eq!(message["memos"][0]["rangeStart"], 4);
    assert_eq!(message["memos"][0]["rangeEnd"], 9);
    assert_eq!(message["memos"][0]["memo"], "adjective");
    assert!((message["cost"].as_f64().unwrap() - 12.5).abs() < 1e-9);

    let shown = ok(dir.path(), &["show", &session]);
    assert!(shown.contains("[p-3-1] The ==quick== brown fox"), "{shown}");
    assert!(shown.contains("4..9 memo: adjective"), "{shown}");
}

#[test]
fn unhighlight_removes_memo() {
    let dir = tempfile::tempdir().unwrap();
    let (session, answer) = seeded(dir.path());
    let anchor = ["--message", answer.as_str(), "--span", "p-3-1", "--start", "4", "--end", "9"];

    let mut memo = vec!["memo", session.as_str()];
    memo.extend(anchor);
    memo.push("adjective");
    ok(dir.path(), &memo);

    let mut unhighlight = vec!["unhighlight", session.as_str()];
    unhighlight.extend(anchor);
    ok(dir.path(), &unhighlight);

    let json = session_json(dir.path(), &session);
    assert!(json["messages"][1].get("memos").is_none());
    let shown = ok(dir.path(), &["show", &session]);
    assert!(shown.contains("[p-3-1] The quick brown fox"), "{shown}");
}

#[test]
fn supplement_appends_to_thread() {
    let dir = tempfile::tempdir().unwrap();
    let (session, answer) = seeded(dir.path());
    let anchor = ["--message", answer.as_str(), "--span", "p-3-1", "--start", "10", "--end", "15"];

    for text in ["Brown is a colour.", "Foxes are often red."] {
        let mut args = vec!["supplement", session.as_str()];
        args.extend(anchor);
        args.push(text);
        ok(dir.path(), &args);
    }

    let json = session_json(dir.path(), &session);
    let thread = &json["messages"][1]["supplementaryMessages"][0];
    assert_eq!(thread["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(thread["items"][1]["content"], "Foxes are often red.");
}

#[test]
fn unknown_span_fails_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let (session, answer) = seeded(dir.path());
    let out = marginalia(
        dir.path(),
        &["memo", &session, "--message", &answer, "--span", "p-99-1", "--start", "0", "--end", "1", "x"],
    );
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Span Not Found"));
}

#[test]
fn missing_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = marginalia(dir.path(), &["show", "41"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Session Not Found"));
}

#[test]
fn list_pages_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["one", "two", "three"] {
        ok(dir.path(), &["new", "--summary", name]);
    }

    let first = ok(dir.path(), &["list", "--limit", "2"]);
    let ids: Vec<&str> = first.lines().filter_map(|l| l.split('\t').next()).collect();
    assert_eq!(ids, vec!["3", "2"]);

    let rest = ok(dir.path(), &["list", "--limit", "2", "--cursor", "2"]);
    assert!(rest.starts_with("1\t0 messages\tone"), "{rest}");
}

#[test]
fn config_redirects_session_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".marginalia.toml"), "sessions_dir = \"store\"\n").unwrap();
    ok(dir.path(), &["new"]);
    assert!(dir.path().join("store/session-1.json").exists());
}

#[test]
fn malformed_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".marginalia.toml"), "page_size = [").unwrap();
    let out = marginalia(dir.path(), &["list"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Invalid TOML"));
}
