use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ViewTransition {
    pub from: Option<String>,
    pub to: String,
    pub entering: bool,
}

/// In-memory screen stack; `pushScreen`/`popScreen` emit `viewTransition`
/// events (§4.6). The orchestrator is responsible for forcing an immediate
/// VisualCapture snapshot on every transition this produces.
#[derive(Default)]
pub struct NavigationStack {
    stack: Mutex<Vec<String>>,
}

impl NavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_screen(&self, id: impl Into<String>) -> ViewTransition {
        let id = id.into();
        let mut stack = self.stack.lock().unwrap();
        let from = stack.last().cloned();
        stack.push(id.clone());
        ViewTransition {
            from,
            to: id,
            entering: true,
        }
    }

    pub fn pop_screen(&self) -> Option<ViewTransition> {
        let mut stack = self.stack.lock().unwrap();
        let popped = stack.pop()?;
        let revealed = stack.last().cloned().unwrap_or_default();
        Some(ViewTransition {
            from: Some(popped),
            to: revealed,
            entering: false,
        })
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_round_trips() {
        let nav = NavigationStack::new();
        let push = nav.push_screen("home");
        assert!(push.entering);
        assert_eq!(push.to, "home");
        assert_eq!(push.from, None);

        let push2 = nav.push_screen("details");
        assert_eq!(push2.from, Some("home".to_string()));

        let pop = nav.pop_screen().unwrap();
        assert!(!pop.entering);
        assert_eq!(nav.depth(), 1);
    }

    #[test]
    fn pop_on_empty_stack_returns_none() {
        let nav = NavigationStack::new();
        assert!(nav.pop_screen().is_none());
    }
}
