//! A scriptable stand-in for the page.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned test locks

use jxn_core::environment::{
    ConfirmCallback, Dialogs, FileInput, FormHost, Navigator, NodeRef, ScriptSandbox, SelectedFile,
    Stylesheets, TargetResolver,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Host double implementing every page-facing capability.
///
/// Nodes, components and file inputs are declared up front with the
/// `with_*` builders. Dialogs, navigation and condition evaluation are
/// recorded so tests can assert on them afterwards.
///
/// Confirmations are answered from the script given to
/// [`answer_confirms`](Self::answer_confirms); once it runs out they are held
/// until the test calls [`answer_pending`](Self::answer_pending).
#[derive(Default)]
pub struct RecordingHost {
    nodes: HashMap<String, NodeRef>,
    components: HashMap<(String, Option<String>), NodeRef>,
    inputs: HashMap<String, FileInput>,
    confirm_answers: Mutex<VecDeque<bool>>,
    pending_confirms: Mutex<VecDeque<ConfirmCallback>>,
    questions: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    conditions: Mutex<HashMap<String, VecDeque<bool>>>,
    evaluations: AtomicUsize,
    rule_counts: Mutex<Vec<usize>>,
}

impl RecordingHost {
    /// An empty page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element with the given id.
    #[must_use]
    pub fn with_node(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.nodes.insert(id.clone(), NodeRef(id));
        self
    }

    /// Bind a component (and optional item) to a node.
    #[must_use]
    pub fn with_component(mut self, name: &str, item: Option<&str>, node: impl Into<String>) -> Self {
        self.components.insert(
            (name.to_string(), item.map(str::to_string)),
            NodeRef(node.into()),
        );
        self
    }

    /// Add a file input with the given selection.
    #[must_use]
    pub fn with_file_input(mut self, id: impl Into<String>, name: impl Into<String>, files: Vec<SelectedFile>) -> Self {
        self.inputs.insert(
            id.into(),
            FileInput {
                is_file_input: true,
                name: Some(name.into()),
                files,
            },
        );
        self
    }

    /// Add an element that exists but is not usable as an upload field.
    #[must_use]
    pub fn with_plain_input(mut self, id: impl Into<String>) -> Self {
        self.inputs.insert(id.into(), FileInput::default());
        self
    }

    /// Answer the next confirmations with these values, in order.
    pub fn answer_confirms(&self, answers: impl IntoIterator<Item = bool>) {
        self.confirm_answers.lock().unwrap().extend(answers);
    }

    /// Answer the oldest confirmation still waiting.
    ///
    /// Returns `false` when nothing was waiting.
    pub fn answer_pending(&self, yes: bool) -> bool {
        let callback = self.pending_confirms.lock().unwrap().pop_front();
        match callback {
            Some(callback) => {
                callback(yes);
                true
            },
            None => false,
        }
    }

    /// Confirmations still waiting for an answer.
    #[must_use]
    pub fn pending_confirms(&self) -> usize {
        self.pending_confirms.lock().unwrap().len()
    }

    /// Every question asked so far.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    /// Every alert shown so far.
    #[must_use]
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }

    /// Every navigation so far.
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// Script the results of evaluating `expression`.
    ///
    /// The last result repeats once the script is exhausted; an unscripted
    /// expression fails to evaluate.
    pub fn script_condition(&self, expression: impl Into<String>, results: impl IntoIterator<Item = bool>) {
        self.conditions
            .lock()
            .unwrap()
            .insert(expression.into(), results.into_iter().collect());
    }

    /// How many times a condition was evaluated.
    #[must_use]
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    /// Set the rule count of each tracked stylesheet.
    pub fn set_rule_counts(&self, counts: Vec<usize>) {
        *self.rule_counts.lock().unwrap() = counts;
    }
}

impl TargetResolver for RecordingHost {
    fn by_id(&self, id: &str) -> Option<NodeRef> {
        self.nodes.get(id).cloned()
    }

    fn by_component(&self, name: &str, item: Option<&str>) -> Option<NodeRef> {
        self.components
            .get(&(name.to_string(), item.map(str::to_string)))
            .cloned()
    }
}

impl FormHost for RecordingHost {
    fn file_input(&self, field_id: &str) -> Option<FileInput> {
        self.inputs.get(field_id).cloned()
    }
}

impl Dialogs for RecordingHost {
    fn confirm(&self, question: &str, _title: Option<&str>, answer: ConfirmCallback) {
        self.questions.lock().unwrap().push(question.to_string());
        let scripted = self.confirm_answers.lock().unwrap().pop_front();
        match scripted {
            Some(yes) => answer(yes),
            None => self.pending_confirms.lock().unwrap().push_back(answer),
        }
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

impl Navigator for RecordingHost {
    fn navigate(&self, location: &str) {
        self.navigations.lock().unwrap().push(location.to_string());
    }
}

impl ScriptSandbox for RecordingHost {
    fn evaluate(&self, expression: &str) -> Result<bool, String> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let mut conditions = self.conditions.lock().unwrap();
        let results = conditions
            .get_mut(expression)
            .ok_or_else(|| format!("unknown expression: {expression}"))?;
        match results.len() {
            0 => Err(format!("no result scripted for: {expression}")),
            1 => Ok(results[0]),
            _ => Ok(results.pop_front().unwrap_or(false)),
        }
    }
}

impl Stylesheets for RecordingHost {
    fn rule_counts(&self) -> Vec<usize> {
        self.rule_counts.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for RecordingHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHost")
            .field("nodes", &self.nodes.len())
            .field("alerts", &self.alerts.lock().unwrap().len())
            .field("navigations", &self.navigations.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}
