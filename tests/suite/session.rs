//! Session-driven flow against a mock Gemini endpoint.

use scribe_engine::{AGENT_NAME, Flow};

use crate::common::{
    Line, Project, ScriptedConsole, gemini_registry, session, setup_runtime, start_gemini_mock,
};

const REPLY: &str = "Updated the greeting.\n\n# FILEPATH: src/main.py\n```python\nprint(\"hello, world\")\n```\n";

#[test]
fn message_stages_changes_and_apply_writes_them() {
    let project = Project::new(&[("src/main.py", "print(\"hello\")\n"), ("README.md", "demo\n")]);
    let runtime = setup_runtime();
    let server = start_gemini_mock(&runtime, REPLY);
    let mut session = session(&project, gemini_registry(&server), false);
    let mut console = ScriptedConsole::default();

    assert_eq!(session.handle_line("/add src/main.py", &mut console), Flow::Continue);
    session.handle_line("please greet the world", &mut console);

    assert!(console.lines.iter().any(|line| matches!(
        line,
        Line::Agent(name, text) if name == AGENT_NAME && text.contains("Updated the greeting.")
    )));
    let pending = session.pending().expect("pending batch");
    assert_eq!(pending.len(), 1);
    assert!(console.saw("Use /apply to review and apply these changes"));

    let requests = runtime
        .block_on(server.received_requests())
        .expect("request recording");
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("please greet the world"));
    assert!(body.contains("src/main.py"));

    console.push_inputs(&["y"]);
    session.handle_line("/apply", &mut console);

    assert_eq!(project.read("src/main.py"), "print(\"hello, world\")");
    assert!(session.pending().is_none());
    assert!(session.pinned().contains(&project.root.join("src/main.py")));
    assert!(console.errors().is_empty(), "unexpected errors: {:?}", console.errors());
    session.shutdown();
}

#[test]
fn discard_drops_pending_changes() {
    let project = Project::new(&[("src/main.py", "print(\"hello\")\n")]);
    let runtime = setup_runtime();
    let server = start_gemini_mock(&runtime, REPLY);
    let mut session = session(&project, gemini_registry(&server), false);
    let mut console = ScriptedConsole::default();

    session.handle_line("change it", &mut console);
    assert!(session.pending().is_some());
    session.handle_line("/discard", &mut console);
    assert!(session.pending().is_none());

    session.handle_line("/apply", &mut console);
    assert!(console.saw("No changes available to apply."));
    assert_eq!(project.read("src/main.py"), "print(\"hello\")\n");
}

#[test]
fn error_reply_stages_nothing() {
    let project = Project::new(&[("a.txt", "a\n")]);
    let runtime = setup_runtime();
    let server = start_gemini_mock(&runtime, "Error: quota exceeded");
    let mut session = session(&project, gemini_registry(&server), false);
    let mut console = ScriptedConsole::default();

    session.handle_line("do something", &mut console);
    assert!(session.pending().is_none());
    assert!(console
        .errors()
        .iter()
        .any(|e| e.starts_with("AI/API Error:")));
}

#[test]
fn quit_ends_the_loop() {
    let project = Project::new(&[]);
    let runtime = setup_runtime();
    let server = start_gemini_mock(&runtime, "unused");
    let mut session = session(&project, gemini_registry(&server), false);
    let mut console = ScriptedConsole::default();

    assert_eq!(session.handle_line("/exit", &mut console), Flow::Quit);
    assert_eq!(session.handle_line("   ", &mut console), Flow::Continue);
    assert!(session.available_models().contains(&"gemini".to_string()));
}
