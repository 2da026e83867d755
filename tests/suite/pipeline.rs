//! Library-level flow: reply text -> proposals -> review -> writes -> reindex.

use scribe_engine::{ItemOutcome, SkipReason, apply_confirmed, review_batch};
use scribe_tools::{ChangeParser, ProjectSandbox};
use scribe_types::ApplyAction;

use crate::common::{Project, ScriptedConsole};

const REPLY: &str = "\
Here are the changes.

# FILEPATH: /home/someone/work/demo/src/main.py
```python
print(\"hello, world\")
```

# FILEPATH: src/util.py
```python
def helper():
    return 1
```

# FILEPATH: ../outside.txt
```
nope
```
";

#[test]
fn parsed_reply_is_reviewed_applied_and_reindexed() {
    let project = Project::new(&[("src/main.py", "print(\"hello\")\n")]);
    let mut index = project.index();
    assert!(!index.contains("src/util.py"));

    let sandbox = ProjectSandbox::new(&project.root);
    let outcome = ChangeParser::new(&sandbox).parse(REPLY);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].identifier, "../outside.txt");
    let batch = outcome.into_batch().expect("two proposals");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.new_and_modified_counts(), (1, 1));

    let mut console = ScriptedConsole::with_inputs(&["y", "y"]);
    let report = review_batch(batch, &project.root, false, &mut console);
    assert_eq!(report.confirmed.len(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|(_, outcome)| *outcome == ItemOutcome::Confirmed));

    let applied = apply_confirmed(report.confirmed, &project.root, &mut console);
    assert!(applied.failed.is_empty());
    assert_eq!(
        applied.written,
        vec![
            (project.root.join("src/main.py"), ApplyAction::Modified),
            (project.root.join("src/util.py"), ApplyAction::Created),
        ]
    );
    assert_eq!(project.read("src/main.py"), "print(\"hello, world\")");
    assert_eq!(project.read("src/util.py"), "def helper():\n    return 1");
    assert!(!project.dir.path().join("outside.txt").exists());

    index.refresh();
    assert!(index.contains("src/util.py"));
}

#[test]
fn skip_all_leaves_remaining_files_untouched() {
    let project = Project::new(&[
        ("a.txt", "old a\n"),
        ("b.txt", "old b\n"),
        ("c.txt", "old c\n"),
    ]);
    let sandbox = ProjectSandbox::new(&project.root);
    let reply = "# FILEPATH: c.txt\n```\nnew c\n```\n# FILEPATH: a.txt\n```\nnew a\n```\n# FILEPATH: b.txt\n```\nnew b\n```";
    let batch = ChangeParser::new(&sandbox)
        .parse(reply)
        .into_batch()
        .expect("proposals");

    // Review runs in target order: a, then skip-all at b.
    let mut console = ScriptedConsole::with_inputs(&["y", "s"]);
    let report = review_batch(batch, &project.root, false, &mut console);
    assert_eq!(console.prompts.len(), 2);
    assert_eq!(
        report.outcomes,
        vec![
            (project.root.join("a.txt"), ItemOutcome::Confirmed),
            (project.root.join("b.txt"), ItemOutcome::Skipped(SkipReason::User)),
            (project.root.join("c.txt"), ItemOutcome::Skipped(SkipReason::SkipAll)),
        ]
    );

    apply_confirmed(report.confirmed, &project.root, &mut console);
    assert_eq!(project.read("a.txt"), "new a");
    assert_eq!(project.read("b.txt"), "old b\n");
    assert_eq!(project.read("c.txt"), "old c\n");
}

#[test]
fn admin_mode_can_deny_a_new_file_before_review() {
    let project = Project::new(&[("keep.txt", "keep\n")]);
    let sandbox = ProjectSandbox::new(&project.root);
    let batch = ChangeParser::new(&sandbox)
        .parse("# FILEPATH: fresh.txt\n```\nbrand new\n```")
        .into_batch()
        .expect("proposal");

    let mut console = ScriptedConsole::with_inputs(&["n"]);
    let report = review_batch(batch, &project.root, true, &mut console);
    assert!(report.is_nothing_confirmed());
    assert_eq!(report.denied().count(), 1);
    assert!(console.saw("DENIED by user"));
    assert!(!project.root.join("fresh.txt").exists());
}
