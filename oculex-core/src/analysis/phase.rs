//! Phase machine for one submission's run.

/// Where a run currently is. Transitions move forward only; `Failed` is
/// reachable from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Received,
    Parsing,
    ResolvingFrames,
    InvokingBackend,
    ParsingResults,
    Persisting,
    Cleanup,
    Completed,
    Failed,
}

impl AnalysisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisPhase::Received => "received",
            AnalysisPhase::Parsing => "parsing",
            AnalysisPhase::ResolvingFrames => "resolving_frames",
            AnalysisPhase::InvokingBackend => "invoking_backend",
            AnalysisPhase::ParsingResults => "parsing_results",
            AnalysisPhase::Persisting => "persisting",
            AnalysisPhase::Cleanup => "cleanup",
            AnalysisPhase::Completed => "completed",
            AnalysisPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisPhase::Completed | AnalysisPhase::Failed)
    }

    /// Legal next phases: the immediate successor, or `Failed`.
    pub fn can_transition_to(self, next: AnalysisPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == AnalysisPhase::Failed {
            return true;
        }
        matches!(
            (self, next),
            (AnalysisPhase::Received, AnalysisPhase::Parsing)
                | (AnalysisPhase::Parsing, AnalysisPhase::ResolvingFrames)
                | (AnalysisPhase::ResolvingFrames, AnalysisPhase::InvokingBackend)
                | (AnalysisPhase::InvokingBackend, AnalysisPhase::ParsingResults)
                | (AnalysisPhase::ParsingResults, AnalysisPhase::Persisting)
                | (AnalysisPhase::Persisting, AnalysisPhase::Cleanup)
                | (AnalysisPhase::Cleanup, AnalysisPhase::Completed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let order = [
            AnalysisPhase::Received,
            AnalysisPhase::Parsing,
            AnalysisPhase::ResolvingFrames,
            AnalysisPhase::InvokingBackend,
            AnalysisPhase::ParsingResults,
            AnalysisPhase::Persisting,
            AnalysisPhase::Cleanup,
            AnalysisPhase::Completed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
        assert!(!AnalysisPhase::Received.can_transition_to(AnalysisPhase::InvokingBackend));
    }

    #[test]
    fn failure_is_reachable_from_any_live_phase() {
        for phase in [
            AnalysisPhase::Received,
            AnalysisPhase::Parsing,
            AnalysisPhase::ResolvingFrames,
            AnalysisPhase::InvokingBackend,
            AnalysisPhase::ParsingResults,
            AnalysisPhase::Persisting,
            AnalysisPhase::Cleanup,
        ] {
            assert!(phase.can_transition_to(AnalysisPhase::Failed), "{phase:?}");
        }
    }

    #[test]
    fn terminal_phases_go_nowhere() {
        assert!(!AnalysisPhase::Completed.can_transition_to(AnalysisPhase::Failed));
        assert!(!AnalysisPhase::Failed.can_transition_to(AnalysisPhase::Parsing));
        assert!(AnalysisPhase::Completed.is_terminal());
        assert!(AnalysisPhase::Failed.is_terminal());
    }
}
