//! Prompt builders.
//!
//! Each prompt opens with a fixed heading so transcripts are easy to scan.

use super::models::{
    CompanyContext, CurriculumRequest, InterviewRound, ParsedJob, QualityReview, RoundPlan,
};
use serde::Serialize;

/// Heading of the job analysis prompt.
pub const JOB_ANALYSIS: &str = "## Job analysis";
/// Heading of the company analysis prompt.
pub const COMPANY_ANALYSIS: &str = "## Company analysis";
/// Heading of the structure design prompt.
pub const INTERVIEW_STRUCTURE: &str = "## Interview structure";
/// Heading prefix of every round generation prompt.
pub const INTERVIEW_ROUND: &str = "## Interview round";
/// Heading of the quality review prompt.
pub const QUALITY_REVIEW: &str = "## Quality review";
/// Heading prefix of every refinement prompt.
pub const ROUND_REFINEMENT: &str = "## Round refinement";

/// System instruction shared by every structured call.
pub const SYSTEM: &str = "You design rigorous, fair technical interview curricula. \
Answer with a single JSON document and nothing else.";

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn optional(label: &str, value: Option<&str>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| format!("\n{label}:\n{v}\n"))
        .unwrap_or_default()
}

/// Asks for a [`ParsedJob`].
pub fn job_analysis(request: &CurriculumRequest) -> String {
    format!(
        "{JOB_ANALYSIS}\n\
         Extract the role from the job description below.\n\
         Return {{\"title\", \"seniority\", \"skills\": [..], \"responsibilities\": [..]}}.\n\n\
         Job description:\n{}\n",
        request.job_description.trim()
    )
}

/// Asks for a [`CompanyContext`].
pub fn company_analysis(company: &str, notes: Option<&str>, job: &ParsedJob) -> String {
    format!(
        "{COMPANY_ANALYSIS}\n\
         Company: {company}\nRole: {}\n{}\n\
         Summarise what this company values in candidates for this role.\n\
         Return {{\"summary\", \"values\": [..], \"interview_focus\": [..]}}.\n",
        job.title,
        optional("Notes", notes),
    )
}

/// Asks for exactly the requested number of rounds.
pub fn interview_structure(
    request: &CurriculumRequest,
    job: &ParsedJob,
    company: Option<&CompanyContext>,
) -> String {
    format!(
        "{INTERVIEW_STRUCTURE}\n\
         Design exactly {} interview rounds for this role.\n\
         Return {{\"rounds\": [{{\"title\", \"focus\", \"duration_minutes\", \"question_count\"}}]}}.\n\n\
         Role:\n{}\n{}{}",
        request.effective_round_count(),
        json(job),
        company.map(|c| format!("\nCompany context:\n{}\n", json(c))).unwrap_or_default(),
        optional("Candidate", request.candidate_summary.as_deref()),
    )
}

/// Asks for one round. `index` is zero-based.
pub fn interview_round(job: &ParsedJob, plan: &RoundPlan, index: usize, total: usize) -> String {
    format!(
        "{INTERVIEW_ROUND} {} of {total}: {}\n\
         Focus: {}\nQuestions: {}\nDuration: {} minutes\nRole: {}\n\
         Return {{\"title\", \"focus\", \"questions\": [{{\"text\", \"competency\", \"follow_ups\": [..]}}]}}.\n",
        index + 1,
        plan.title,
        plan.focus,
        plan.question_count,
        plan.duration_minutes,
        job.title,
    )
}

/// Asks for a [`QualityReview`] of `rounds`.
pub fn quality_review(job: &ParsedJob, rounds: &[InterviewRound], threshold: f64) -> String {
    format!(
        "{QUALITY_REVIEW}\n\
         Score this curriculum from 0 to 100 for a {} role. Scores below {threshold} \
         will be refined. List the zero-based indices of weak rounds.\n\
         Return {{\"score\", \"weak_rounds\": [..], \"feedback\": [..]}}.\n\n\
         Rounds:\n{}\n",
        job.title,
        json(&rounds),
    )
}

/// Asks for a better version of one round, quoting the review.
pub fn round_refinement(round: &InterviewRound, index: usize, review: &QualityReview) -> String {
    format!(
        "{ROUND_REFINEMENT} {}: {}\n\
         The reviewer scored the curriculum {}. Rewrite this round to address the feedback.\n\
         Feedback:\n- {}\n\n\
         Current round:\n{}\n",
        index + 1,
        round.title,
        review.score,
        review.feedback.join("\n- "),
        json(round),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ParsedJob {
        ParsedJob {
            title: "Backend Engineer".to_string(),
            seniority: Some("senior".to_string()),
            skills: vec!["rust".to_string()],
            responsibilities: Vec::new(),
        }
    }

    #[test]
    fn test_prompts_open_with_headings() {
        let request = CurriculumRequest::new("We need a Rust engineer").with_round_count(3);
        assert!(job_analysis(&request).starts_with(JOB_ANALYSIS));
        assert!(company_analysis("Acme", None, &job()).starts_with(COMPANY_ANALYSIS));

        let structure = interview_structure(&request, &job(), None);
        assert!(structure.starts_with(INTERVIEW_STRUCTURE));
        assert!(structure.contains("exactly 3 interview rounds"));
    }

    #[test]
    fn test_round_prompt_numbers_from_one() {
        let plan = RoundPlan {
            title: "System design".to_string(),
            focus: "distributed systems".to_string(),
            duration_minutes: 60,
            question_count: 3,
        };
        let prompt = interview_round(&job(), &plan, 1, 4);
        assert!(prompt.starts_with("## Interview round 2 of 4: System design"));
    }

    #[test]
    fn test_optional_sections_are_omitted_when_blank() {
        let with = company_analysis("Acme", Some("Ships rockets"), &job());
        let without = company_analysis("Acme", Some("   "), &job());
        assert!(with.contains("Ships rockets"));
        assert!(!without.contains("Notes"));
    }
}
