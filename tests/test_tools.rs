//! Tool-dispatch façade behaviour through the public catalog.

use agentdesk::config::Config;
use agentdesk::subsystems::memory::ConversationStore;
use agentdesk::subsystems::tools::{Catalog, ToolContext, ToolError};
use agentdesk::supervisor::bus::SupervisorBus;
use tempfile::TempDir;

fn catalog(dir: &TempDir) -> (Catalog, ToolContext) {
    let cfg = Config::test_default(dir.path());
    let catalog = Catalog::from_config(&cfg.tools).unwrap();
    // None of the calls below reach the LLM, so a detached bus is enough.
    let ctx = ToolContext::new(SupervisorBus::new(1).handle, "test");
    (catalog, ctx)
}

#[tokio::test]
async fn write_file_stores_exact_data_under_base_dir() {
    let dir = TempDir::new().unwrap();
    let (catalog, ctx) = catalog(&dir);

    let input = r#"{"data": "line one\nline two", "fileName": "notes.txt"}"#;
    let out = catalog.execute("write_file", input, &ctx).await.unwrap();
    assert!(out.starts_with("Write successful"));

    let written = std::fs::read_to_string(dir.path().join("ai-generated/notes.txt")).unwrap();
    assert_eq!(written, "line one\nline two");

    let read = catalog.execute("read_file", "notes.txt", &ctx).await.unwrap();
    assert_eq!(read, "line one\nline two");
}

#[tokio::test]
async fn write_file_rejects_traversal_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let (catalog, ctx) = catalog(&dir);

    for name in ["../x", "a/b", "/tmp/agentdesk-abs"] {
        let input = serde_json::json!({ "data": "nope", "fileName": name }).to_string();
        let err = catalog.execute("write_file", &input, &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Denied(_)), "{name}: {err:?}");
    }
    assert!(!dir.path().join("x").exists());
    assert!(!dir.path().join("ai-generated/a").exists());
    assert!(!std::path::Path::new("/tmp/agentdesk-abs").exists());
}

#[tokio::test]
async fn terminal_returns_stdout_and_fails_with_stderr() {
    let dir = TempDir::new().unwrap();
    let (catalog, ctx) = catalog(&dir);

    let out = catalog.execute("terminal", "echo hello", &ctx).await.unwrap();
    assert_eq!(out, "hello\n");

    let err = catalog.execute("terminal", "ls /definitely/not/here", &ctx).await.unwrap_err();
    match err {
        ToolError::Backend(stderr) => assert!(!stderr.is_empty()),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn identical_memory_appends_are_both_stored() {
    let dir = TempDir::new().unwrap();
    let store = ConversationStore::open(&dir.path().join("memory.db"), None).unwrap();
    store.append(1, Some("same"), Some("same")).unwrap();
    store.append(1, Some("same"), Some("same")).unwrap();
    assert_eq!(store.list(1, None, None).unwrap().len(), 2);
}

#[cfg(feature = "tool-code-qa")]
#[tokio::test]
async fn code_qa_on_empty_directory_is_not_found() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("code/empty")).unwrap();
    let (catalog, ctx) = catalog(&dir);

    let input = r#"{"prompt": "what does main do?", "path": "empty"}"#;
    let err = catalog.execute("code_qa", input, &ctx).await.unwrap_err();
    assert_eq!(err, ToolError::NotFound("no documents found".into()));
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn database_unrunnable_query_is_backend_failure() {
    let dir = TempDir::new().unwrap();
    let (catalog, ctx) = catalog(&dir);

    let err = catalog.execute("database", "SELECT * FROM no_such_table", &ctx).await.unwrap_err();
    assert_eq!(err, ToolError::Backend("Failed to execute query".into()));
    assert!(err.to_failure().recoverable);
}

#[tokio::test]
async fn unknown_and_disabled_tools_are_distinguished() {
    let dir = TempDir::new().unwrap();
    let mut cfg = Config::test_default(dir.path());
    cfg.tools.terminal.enabled = false;
    let catalog = Catalog::from_config(&cfg.tools).unwrap();
    let ctx = ToolContext::new(SupervisorBus::new(1).handle, "test");

    let err = catalog.execute("terminal", "echo hi", &ctx).await.unwrap_err();
    assert_eq!(err.code(), "unavailable");
    let err = catalog.execute("teleport", "mars", &ctx).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}
