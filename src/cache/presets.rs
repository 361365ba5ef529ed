//! Domain Presets
//!
//! Fixed TTL and priority combinations for the platform's common payloads.
//! Thin helpers over `SetOptions`; the cache does not depend on them.

use std::time::Duration;

use crate::cache::{Priority, SetOptions};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Per-student progress, read on every dashboard load
    StudentProgress,
    /// Graded mock test results, immutable once produced
    MockTestResults,
    /// Generated explanations, large and expensive to regenerate
    AiExplanation,
    /// Question bank pages per topic and difficulty
    QuestionBank,
}

impl Preset {
    pub fn ttl(&self) -> Duration {
        let secs = match self {
            Preset::StudentProgress => 5 * MINUTE,
            Preset::MockTestResults => 30 * MINUTE,
            Preset::AiExplanation => 24 * HOUR,
            Preset::QuestionBank => HOUR,
        };
        Duration::from_secs(secs)
    }

    pub fn priority(&self) -> Priority {
        match self {
            Preset::StudentProgress => Priority::High,
            Preset::MockTestResults => Priority::Critical,
            Preset::AiExplanation => Priority::Medium,
            Preset::QuestionBank => Priority::High,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Preset::StudentProgress => "progress",
            Preset::MockTestResults => "mock-test",
            Preset::AiExplanation => "explanations",
            Preset::QuestionBank => "questions",
        }
    }

    pub fn options(&self) -> SetOptions {
        let options = SetOptions::new().ttl(self.ttl()).priority(self.priority());
        match self {
            // Explanations are long prose and always worth compressing
            Preset::AiExplanation => options.compress(true),
            _ => options,
        }
    }

    /// Builds `prefix:part1:part2...`.
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = String::from(self.prefix());
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}
