use std::time::Duration;

use moka::sync::Cache;

/// The last known state of the conversion producing a given PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionState {
    Submitting,
    AwaitingCompletion {
        job_id: String,
        attempts: u32,
    },
    Fetching,
    Done,
    Failed {
        detail: String,
    },
    TimedOut {
        attempts: u32,
    },
}

impl ConversionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitting => "submitting",
            Self::AwaitingCompletion { .. } => "awaiting-completion",
            Self::Fetching => "fetching",
            Self::Done => "done",
            Self::Failed { .. } => "failed",
            Self::TimedOut { .. } => "failed-timeout",
        }
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut { .. })
    }
}

/// Remembers conversion outcomes keyed by PDF name so lookups can tell
/// a failed conversion apart from one that is still running.
#[derive(Clone)]
pub struct StatusTracker {
    states: Cache<String, ConversionState>,
}

impl StatusTracker {
    pub fn new(retention: Duration, capacity: u64) -> Self {
        let states = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(retention)
            .build();

        Self { states }
    }

    pub fn record(&self, pdf_name: &str, state: ConversionState) {
        trace!("Conversion for {} is now {}", pdf_name, state.label());
        self.states.insert(pdf_name.to_string(), state);
    }

    pub fn get(&self, pdf_name: &str) -> Option<ConversionState> {
        self.states.get(&pdf_name.to_string())
    }

    pub fn forget(&self, pdf_name: &str) {
        self.states.invalidate(&pdf_name.to_string());
    }
}
