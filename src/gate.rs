//! Confirmation gate for changes to shared resources
//!
//! Every change that becomes irreversible once published (a commit pushed to
//! a shared branch, a CI job reconfigured) is shown to the operator first and
//! only applied after an affirmative answer. The answer comes from a
//! [`DecisionSource`] so the gate runs the same against a console or a script.

use std::collections::VecDeque;

use similar::{ChangeTag, TextDiff};
use tracing::info;

use crate::error::{ReleaseError, Result};
use crate::ui;

/// Lines of unchanged context shown around each changed line.
const DIFF_CONTEXT: usize = 2;

/// Re-prompt shown after an answer that is neither yes nor no.
pub const REPROMPT: &str = "Please answer with 'y' or 'n'";

/// A change awaiting operator review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub description: String,
    pub original: String,
    pub updated: String,
}

impl PendingChange {
    pub fn new(
        description: impl Into<String>,
        original: impl Into<String>,
        updated: impl Into<String>,
    ) -> Self {
        PendingChange {
            description: description.into(),
            original: original.into(),
            updated: updated.into(),
        }
    }

    /// True when applying the change would not alter anything.
    pub fn is_noop(&self) -> bool {
        self.original == self.updated
    }

    /// Line diff with `-`/`+` markers and `@@ line N @@` hunk headers.
    ///
    /// A carriage return is shown as `^M` and a last line without a newline
    /// is followed by a `\ No newline at end of file` marker, so line-ending
    /// changes stay visible.
    pub fn diff_lines(&self) -> Vec<String> {
        let diff = TextDiff::from_lines(self.original.as_str(), self.updated.as_str());
        let mut out = Vec::new();
        for group in diff.grouped_ops(DIFF_CONTEXT) {
            let Some(first) = group.first() else {
                continue;
            };
            out.push(format!("@@ line {} @@", first.old_range().start + 1));
            for op in &group {
                for change in diff.iter_changes(op) {
                    let marker = match change.tag() {
                        ChangeTag::Delete => '-',
                        ChangeTag::Insert => '+',
                        ChangeTag::Equal => ' ',
                    };
                    out.push(format!("{}{}", marker, visible_line(change.value())));
                    if change.missing_newline() {
                        out.push(NO_NEWLINE_MARKER.to_string());
                    }
                }
            }
        }
        out
    }
}

/// Marker following a last line that has no newline.
const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// A diffed line without its newline, with a carriage return spelled out.
fn visible_line(line: &str) -> String {
    let line = line.strip_suffix('\n').unwrap_or(line);
    match line.strip_suffix('\r') {
        Some(text) => format!("{}^M", text),
        None => line.to_string(),
    }
}

/// Where the gate's answers come from.
pub trait DecisionSource {
    /// Show `prompt` and return the raw answer.
    fn ask(&mut self, prompt: &str) -> Result<String>;
}

/// Answers yes to everything (`--yes`).
#[derive(Debug, Default)]
pub struct AssumeYes;

impl DecisionSource for AssumeYes {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        info!(prompt, "auto-accepting");
        Ok("y".to_string())
    }
}

/// Pre-recorded answers, for tests and scripted runs.
///
/// Running out of answers is an error rather than an implicit yes.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    answers: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedDecisions {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedDecisions {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Prompts asked so far, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl DecisionSource for ScriptedDecisions {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.prompts.push(prompt.to_string());
        self.answers.pop_front().ok_or_else(|| {
            ReleaseError::operator_abort(format!("no scripted answer for '{}'", prompt))
        })
    }
}

/// Interpret one answer: `Some(true)` for empty/`y`, `Some(false)` for `n`,
/// `None` for anything else.
pub fn interpret_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "" | "y" => Some(true),
        "n" => Some(false),
        _ => None,
    }
}

/// Gate lifecycle for a single reviewed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    PendingReview,
    Published,
    Aborted,
}

/// The confirmation gate.
pub struct ReviewGate {
    decisions: Box<dyn DecisionSource>,
    state: GateState,
}

impl ReviewGate {
    pub fn new(decisions: Box<dyn DecisionSource>) -> Self {
        ReviewGate {
            decisions,
            state: GateState::PendingReview,
        }
    }

    /// State after the most recent review.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Ask until the answer is yes or no. Empty input counts as yes.
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        let mut prompt = format!("{} (Y/n): ", question);
        loop {
            let answer = self.decisions.ask(&prompt)?;
            if let Some(decision) = interpret_answer(&answer) {
                return Ok(decision);
            }
            prompt = format!("{}: ", REPROMPT);
        }
    }

    /// Confirm a value; a "no" aborts with `exit_message`.
    pub fn verify(&mut self, question: &str, exit_message: &str) -> Result<()> {
        if self.confirm(question)? {
            Ok(())
        } else {
            Err(ReleaseError::operator_abort(exit_message))
        }
    }

    /// Show `changes`, ask `question`, and run `publish` only on yes.
    ///
    /// A "no" moves the gate to `Aborted` and returns
    /// [`ReleaseError::OperatorAbort`] carrying `abort_message`; `publish` is
    /// never called and nothing already done is undone.
    pub fn publish<T, F>(
        &mut self,
        question: &str,
        changes: &[PendingChange],
        abort_message: &str,
        publish: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.state = GateState::PendingReview;
        for change in changes {
            ui::display_pending_change(change);
        }

        if !self.confirm(question)? {
            self.state = GateState::Aborted;
            return Err(ReleaseError::operator_abort(abort_message));
        }

        let published = publish()?;
        self.state = GateState::Published;
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn gate(answers: &[&str]) -> ReviewGate {
        ReviewGate::new(Box::new(ScriptedDecisions::new(answers.to_vec())))
    }

    fn change() -> PendingChange {
        PendingChange::new("build.properties", "app.version=2.4.1\n", "app.version=2.5.0\n")
    }

    #[test]
    fn test_interpret_answer() {
        assert_eq!(interpret_answer(""), Some(true));
        assert_eq!(interpret_answer("y"), Some(true));
        assert_eq!(interpret_answer("Y"), Some(true));
        assert_eq!(interpret_answer("n"), Some(false));
        assert_eq!(interpret_answer("N"), Some(false));
        assert_eq!(interpret_answer("yes please"), None);
        assert_eq!(interpret_answer("maybe"), None);
    }

    #[test]
    fn test_empty_answer_publishes() {
        let mut gate = gate(&[""]);
        let written = Cell::new(false);
        gate.publish("Push?", &[change()], "abort", || {
            written.set(true);
            Ok(())
        })
        .unwrap();
        assert!(written.get());
        assert_eq!(gate.state(), GateState::Published);
    }

    #[test]
    fn test_no_aborts_without_publishing() {
        let mut gate = gate(&["N"]);
        let written = Cell::new(false);
        let err = gate
            .publish("Push?", &[change()], "finish manually", || {
                written.set(true);
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_operator_abort());
        assert!(err.to_string().contains("finish manually"));
        assert!(!written.get());
        assert_eq!(gate.state(), GateState::Aborted);
    }

    /// Scripted answers whose prompts stay readable after the gate owns them.
    struct SharedScript {
        answers: VecDeque<String>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl DecisionSource for SharedScript {
        fn ask(&mut self, prompt: &str) -> Result<String> {
            self.prompts.borrow_mut().push(prompt.to_string());
            self.answers
                .pop_front()
                .ok_or_else(|| ReleaseError::operator_abort("out of answers"))
        }
    }

    #[test]
    fn test_unrecognized_answer_reprompts() {
        let prompts = Rc::new(RefCell::new(Vec::new()));
        let script = SharedScript {
            answers: ["what", "later", "y"].iter().map(|a| a.to_string()).collect(),
            prompts: Rc::clone(&prompts),
        };
        let mut gate = ReviewGate::new(Box::new(script));
        let written = Cell::new(false);

        gate.publish("Push?", &[change()], "abort", || {
            written.set(true);
            Ok(())
        })
        .unwrap();

        let prompts = prompts.borrow();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0], "Push? (Y/n): ");
        assert!(prompts[1].starts_with(REPROMPT));
        assert!(prompts[2].starts_with(REPROMPT));
        assert!(written.get());
        assert_eq!(gate.state(), GateState::Published);
    }

    #[test]
    fn test_confirm_loops_until_decision() {
        let mut gate = gate(&["x", "", "n"]);
        assert!(gate.confirm("Proceed?").unwrap());
        assert!(!gate.confirm("Proceed?").unwrap());
    }

    #[test]
    fn test_verify_aborts_on_no() {
        let mut gate = gate(&["n"]);
        let err = gate.verify("Correct?", "values are wrong").unwrap_err();
        assert!(err.is_operator_abort());
    }

    #[test]
    fn test_running_out_of_answers_is_not_consent() {
        let mut gate = gate(&[]);
        assert!(gate.confirm("Proceed?").is_err());
    }

    #[test]
    fn test_diff_single_changed_line() {
        let diff = change().diff_lines();
        assert_eq!(
            diff,
            vec![
                "@@ line 1 @@".to_string(),
                "-app.version=2.4.1".to_string(),
                "+app.version=2.5.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_diff_context_and_separate_hunks() {
        let original: String = (1..=12).map(|i| format!("line{}\n", i)).collect();
        let updated = original
            .replace("line2\n", "LINE2\n")
            .replace("line11\n", "LINE11\n");
        let diff = PendingChange::new("f", original, updated).diff_lines();
        let headers: Vec<&String> = diff.iter().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(headers.len(), 2);
        assert!(diff.contains(&" line1".to_string()));
        assert!(diff.contains(&"-line11".to_string()));
        assert!(diff.contains(&"+LINE11".to_string()));
    }

    #[test]
    fn test_diff_inserted_lines() {
        let diff = PendingChange::new("f", "a\nb\nc\n", "a\nb\nx\ny\nc\n").diff_lines();
        assert_eq!(
            diff,
            vec![
                "@@ line 1 @@".to_string(),
                " a".to_string(),
                " b".to_string(),
                "+x".to_string(),
                "+y".to_string(),
                " c".to_string(),
            ]
        );
    }

    #[test]
    fn test_diff_shows_dropped_trailing_newline() {
        let change = PendingChange::new("f", "a\n", "a");
        assert!(!change.is_noop());
        assert_eq!(
            change.diff_lines(),
            vec![
                "@@ line 1 @@".to_string(),
                "-a".to_string(),
                "+a".to_string(),
                NO_NEWLINE_MARKER.to_string(),
            ]
        );
    }

    #[test]
    fn test_diff_shows_line_ending_change() {
        let diff = PendingChange::new("f", "a\r\nb\r\n", "a\nb\n").diff_lines();
        assert!(diff.contains(&"-a^M".to_string()));
        assert!(diff.contains(&"-b^M".to_string()));
        assert!(diff.contains(&"+a".to_string()));
        assert!(diff.contains(&"+b".to_string()));
    }

    #[test]
    fn test_diff_keeps_shifted_lines_as_context() {
        let diff = PendingChange::new("f", "a\nb\nc\nd\n", "b\nc\nd\ne\n").diff_lines();
        assert!(diff.contains(&"-a".to_string()));
        assert!(diff.contains(&"+e".to_string()));
        assert!(diff.contains(&" c".to_string()));
        assert!(!diff.iter().any(|line| line == "-b" || line == "+b"));
    }

    #[test]
    fn test_noop_change() {
        assert!(PendingChange::new("f", "same", "same").is_noop());
        assert!(!change().is_noop());
    }
}
