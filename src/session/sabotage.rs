//! Covert task detection
//!
//! Each task is a regex matched against the full shared code on every update.
//! Patterns use default flags, so `.` stops at a newline and a match cannot
//! span lines unless the pattern spells out `\n`.

use crate::catalog::Challenge;
use crate::types::SabotageTaskState;
use regex::Regex;

#[derive(Debug, Clone)]
struct TrackedTask {
    state: SabotageTaskState,
    /// `None` when the catalog pattern failed to compile; such a task never completes
    pattern: Option<Regex>,
}

#[derive(Debug, Clone, Default)]
pub struct SabotageEngine {
    tasks: Vec<TrackedTask>,
}

impl SabotageEngine {
    pub fn from_challenge(challenge: &Challenge) -> Self {
        let tasks = challenge
            .sabotage_tasks
            .iter()
            .map(|task| {
                let pattern = match Regex::new(&task.pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::error!("Invalid sabotage pattern for {}: {}", task.id, e);
                        None
                    }
                };
                TrackedTask {
                    state: SabotageTaskState {
                        id: task.id.clone(),
                        description: task.description.clone(),
                        completed: false,
                    },
                    pattern,
                }
            })
            .collect();

        Self { tasks }
    }

    /// Flip every still-open task whose pattern matches `code`.
    ///
    /// Returns true if at least one task completed on this call. Completed
    /// tasks are never re-checked, so reverting the code does not undo them.
    pub fn evaluate(&mut self, code: &str) -> bool {
        let mut changed = false;
        for task in self.tasks.iter_mut().filter(|t| !t.state.completed) {
            if task.pattern.as_ref().is_some_and(|re| re.is_match(code)) {
                tracing::debug!("Sabotage task {} completed", task.state.id);
                task.state.completed = true;
                changed = true;
            }
        }
        changed
    }

    pub fn tasks(&self) -> Vec<SabotageTaskState> {
        self.tasks.iter().map(|t| t.state.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.state.completed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ChallengeCatalog, SabotageTask};
    use crate::types::Category;

    fn frontend_engine() -> SabotageEngine {
        let catalog = ChallengeCatalog::builtin();
        SabotageEngine::from_challenge(catalog.challenge(Category::Frontend).unwrap())
    }

    #[test]
    fn test_match_completes_task() {
        let mut engine = frontend_engine();
        assert!(engine.evaluate("const [count, setCount] = useState(100);"));

        let tasks = engine.tasks();
        let task = tasks.iter().find(|t| t.id == "fe-start-at-100").unwrap();
        assert!(task.completed);
        assert_eq!(engine.completed_count(), 1);
    }

    #[test]
    fn test_no_change_reports_false() {
        let mut engine = frontend_engine();
        assert!(!engine.evaluate("const [count, setCount] = useState(0);"));
        assert!(engine.evaluate("useState(100)"));
        // Same code again: already completed, nothing new
        assert!(!engine.evaluate("useState(100)"));
    }

    #[test]
    fn test_completion_is_monotonic() {
        let mut engine = frontend_engine();
        engine.evaluate("useState(100)");
        engine.evaluate("useState(0)");
        engine.evaluate("");

        assert!(engine
            .tasks()
            .iter()
            .any(|t| t.id == "fe-start-at-100" && t.completed));
    }

    #[test]
    fn test_several_tasks_in_one_update() {
        let mut engine = frontend_engine();
        let code = "useState(100)\nsetCount(count - 1)\n<marquee>{count}</marquee>";
        assert!(engine.evaluate(code));
        assert_eq!(engine.completed_count(), 3);
    }

    #[test]
    fn test_dot_does_not_cross_lines() {
        let challenge = Challenge {
            category: Category::Security,
            language_id: 71,
            starter_code: String::new(),
            test_cases: vec![],
            sabotage_tasks: vec![SabotageTask {
                id: "t".to_string(),
                description: "log password".to_string(),
                pattern: r"print\(.*password".to_string(),
            }],
        };
        let mut engine = SabotageEngine::from_challenge(&challenge);

        assert!(!engine.evaluate("print(user)\npassword = 1"));
        assert!(engine.evaluate("print(user, password)"));
    }

    #[test]
    fn test_invalid_pattern_never_completes() {
        let challenge = Challenge {
            category: Category::Dsa,
            language_id: 71,
            starter_code: String::new(),
            test_cases: vec![],
            sabotage_tasks: vec![SabotageTask {
                id: "broken".to_string(),
                description: "broken".to_string(),
                pattern: "(unclosed".to_string(),
            }],
        };
        let mut engine = SabotageEngine::from_challenge(&challenge);
        assert!(!engine.evaluate("(unclosed"));
        assert_eq!(engine.tasks().len(), 1);
    }

    #[test]
    fn test_empty_engine_is_noop() {
        let mut engine = SabotageEngine::default();
        assert!(engine.is_empty());
        assert!(!engine.evaluate("anything"));
    }
}
