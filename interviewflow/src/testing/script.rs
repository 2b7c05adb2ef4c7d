//! Canned model behaviour for curriculum runs.

use super::{MockModelClient, MockOutcome};
use crate::config::ProviderId;
use crate::curriculum::prompts;
use crate::providers::{Citation, Completion, CompletionRequest, GroundingMetadata};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;

/// Answers curriculum prompts by heading.
///
/// Quality scores are served in order; the last one repeats.
#[derive(Debug, Clone)]
pub struct CurriculumScript {
    scores: Arc<Mutex<VecDeque<f64>>>,
    rounds: usize,
    citations: Vec<String>,
    failing: Vec<&'static str>,
}

impl CurriculumScript {
    /// Script serving `scores` to the quality review, three rounds by default.
    #[must_use]
    pub fn new(scores: impl IntoIterator<Item = f64>) -> Self {
        Self {
            scores: Arc::new(Mutex::new(scores.into_iter().collect())),
            rounds: 3,
            citations: Vec::new(),
            failing: Vec::new(),
        }
    }

    /// Number of rounds in the designed structure.
    #[must_use]
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Attaches search citations to company analysis answers.
    #[must_use]
    pub fn with_citations(mut self, urls: &[&str]) -> Self {
        self.citations = urls.iter().map(|u| (*u).to_string()).collect();
        self
    }

    /// Fails (HTTP 500) every prompt under `heading`.
    #[must_use]
    pub fn failing(mut self, heading: &'static str) -> Self {
        self.failing.push(heading);
        self
    }

    /// A mock client for `provider` driven by this script.
    #[must_use]
    pub fn client(&self, provider: ProviderId) -> MockModelClient {
        let script = self.clone();
        MockModelClient::new(provider).with_responder(move |request| script.respond(request))
    }

    fn next_score(&self) -> f64 {
        let mut scores = self.scores.lock();
        if scores.len() > 1 {
            scores.pop_front().unwrap_or(100.0)
        } else {
            scores.front().copied().unwrap_or(100.0)
        }
    }

    /// The answer for one request.
    pub fn respond(&self, request: &CompletionRequest) -> MockOutcome {
        let prompt = request.prompt.as_str();
        if let Some(heading) = self.failing.iter().find(|h| prompt.starts_with(**h)) {
            return MockOutcome::provider_failure(format!("scripted failure for {heading}"));
        }
        let title = prompt
            .lines()
            .next()
            .and_then(|line| line.split_once(": "))
            .map_or("Round", |(_, t)| t)
            .to_string();

        let body = if prompt.starts_with(prompts::JOB_ANALYSIS) {
            json!({
                "title": "Backend Engineer",
                "seniority": "senior",
                "skills": ["rust", "distributed systems", "postgres"],
                "responsibilities": ["own services"]
            })
        } else if prompt.starts_with(prompts::COMPANY_ANALYSIS) {
            let context = json!({
                "summary": "Acme builds rockets",
                "values": ["ownership"],
                "interview_focus": ["reliability"]
            });
            return self.company_answer(&context.to_string());
        } else if prompt.starts_with(prompts::INTERVIEW_STRUCTURE) {
            let rounds: Vec<_> = (1..=self.rounds)
                .map(|i| {
                    json!({
                        "title": format!("Round {i}"),
                        "focus": format!("focus {i}"),
                        "duration_minutes": 45,
                        "question_count": 2
                    })
                })
                .collect();
            json!({ "rounds": rounds })
        } else if prompt.starts_with(prompts::INTERVIEW_ROUND) {
            round_json(&title)
        } else if prompt.starts_with(prompts::ROUND_REFINEMENT) {
            round_json(&format!("{title} (refined)"))
        } else if prompt.starts_with(prompts::QUALITY_REVIEW) {
            json!({ "score": self.next_score(), "weak_rounds": [0], "feedback": ["dig deeper"] })
        } else {
            return MockOutcome::provider_failure("unrecognised prompt");
        };
        MockOutcome::content(body.to_string())
    }

    fn company_answer(&self, content: &str) -> MockOutcome {
        let mut completion = Completion::new(content, 10, 20);
        if !self.citations.is_empty() {
            completion.grounding = Some(GroundingMetadata {
                citations: self
                    .citations
                    .iter()
                    .map(|url| Citation {
                        url: url.clone(),
                        title: None,
                    })
                    .collect(),
                search_queries: vec!["acme".to_string()],
            });
        }
        MockOutcome::Content(completion)
    }
}

fn round_json(title: &str) -> serde_json::Value {
    json!({
        "title": title,
        "focus": "depth",
        "questions": [{ "text": format!("Question for {title}"), "follow_ups": [] }]
    })
}
