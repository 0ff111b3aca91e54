//! Model tier selection.
//!
//! Each user message is classified by keyword into "simple" and "complex"
//! buckets. Complex work goes to the capable model while its daily quota
//! lasts; everything else is served by the fast model.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::config::ModelTiers;

const SIMPLE_KEYWORDS: &[&str] = &[
    "open", "click", "type", "screenshot", "save", "read", "scroll", "wait", "close", "show",
    "list", "go to", "navigate", "press",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "analyz",
    "compare",
    "strategy",
    "plan",
    "summarize",
    "summary",
    "report",
    "optimize",
    "explain",
    "create",
    "design",
    "budget",
    "calculate",
    "step by step",
    "excel",
    "spreadsheet",
    "html",
    "table",
    "chart",
    "graph",
    "following",
    "perform",
];

/// Messages longer than this are always treated as complex.
const LONG_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Fast,
    Capable,
}

impl Tier {
    pub fn model<'a>(&self, models: &'a ModelTiers) -> &'a str {
        match self {
            Tier::Fast => &models.fast,
            Tier::Capable => &models.capable,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Fast => write!(f, "fast"),
            Tier::Capable => write!(f, "capable"),
        }
    }
}

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Capable-tier calls made on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCounter {
    pub count: u32,
    pub day: NaiveDate,
}

/// Quota snapshot for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaUsage {
    pub used: u32,
    pub limit: u32,
}

/// Picks a tier per message and owns the daily quota.
pub struct TierSelector {
    counter: QuotaCounter,
    limit: u32,
    clock: Arc<dyn Clock>,
}

impl TierSelector {
    pub fn new(limit: u32, clock: Arc<dyn Clock>) -> Self {
        let counter = QuotaCounter {
            count: 0,
            day: clock.today(),
        };
        Self {
            counter,
            limit,
            clock,
        }
    }

    /// Decide the tier for `message`, consuming quota when choosing Capable.
    pub fn choose_tier(&mut self, message: &str) -> Tier {
        self.roll_day();

        let (simple, complex) = classify(message);
        let available = self.counter.count < self.limit;

        let tier = if complex && available {
            Tier::Capable
        } else if simple && !complex {
            Tier::Fast
        } else if available {
            Tier::Capable
        } else {
            Tier::Fast
        };

        if tier == Tier::Capable {
            self.counter.count += 1;
        }

        tracing::debug!(
            simple,
            complex,
            used = self.counter.count,
            limit = self.limit,
            "Selected {} tier",
            tier
        );
        tier
    }

    pub fn usage(&mut self) -> QuotaUsage {
        self.roll_day();
        QuotaUsage {
            used: self.counter.count,
            limit: self.limit,
        }
    }

    fn roll_day(&mut self) {
        let today = self.clock.today();
        if today != self.counter.day {
            tracing::info!("New day {}: capable quota reset", today);
            self.counter = QuotaCounter {
                count: 0,
                day: today,
            };
        }
    }
}

/// Keyword classification as `(simple, complex)`.
pub fn classify(message: &str) -> (bool, bool) {
    let lower = message.to_lowercase();
    let simple = SIMPLE_KEYWORDS.iter().any(|k| lower.contains(k));
    let complex = message.chars().count() > LONG_MESSAGE_CHARS
        || COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k));
    (simple, complex)
}
