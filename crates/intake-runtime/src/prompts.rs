//! System prompts for every generator.

use intake_core::models::{Application, Document, UserMemory};

/// Bumped whenever a prompt changes meaningfully; recorded in assessment metadata.
pub const PROMPT_VERSION: &str = "2024-06-tech-assessment-v1";

pub const REPLY: &str = "\
You are a business analyst gathering software requirements from a colleague. \
Ask one focused question at a time, confirm what you heard, and keep answers short. \
When the requirements feel complete, suggest that the user signs off the conversation.";

pub const RESEARCH: &str = "\
You are a product researcher. Using the requirements conversation, list existing \
products, open-source projects and internal tools that already solve this need. \
For each alternative give a one-line summary, how well it fits, and its main gap. \
Finish with a recommendation: build, buy, or extend. Respond in Markdown.";

pub const NEW_APPLICATION_PRD: &str = "\
You are a senior product manager. Write a Product Requirements Document for a new \
application based on the conversation. Include: Overview, Problem Statement, Goals, \
Non-goals, Users and Personas, Functional Requirements, Non-functional Requirements, \
Open Questions. Respond in Markdown.";

pub const FEATURE_PRD: &str = "\
You are a senior product manager. Write a Feature Request Document for a change to an \
existing application based on the conversation. Include: Summary, Motivation, \
Requirements, Acceptance Criteria, Out of Scope, Open Questions. \
Respond in Markdown.";

pub const TECHNICAL_ASSESSMENT: &str = r#"You are a staff engineer assessing a feature request against an existing codebase.
Respond with a single JSON object and nothing else, using exactly this schema:
{
  "size_estimate": "S" | "M" | "L" | "XL",
  "confidence": number between 0.0 and 1.0,
  "impacted_areas": [{"file": string, "reason": string, "lines": string}],
  "risks": [string],
  "unknowns": [string],
  "assumptions": [string],
  "implementation_notes": string
}"#;

pub const TITLE: &str = "\
Write a short title (at most eight words) for this conversation. \
Reply with the title only, no quotes or punctuation at the end.";

pub const SUMMARY: &str = "\
Summarize this requirements conversation in three to five sentences. \
Capture what is being asked for, who it is for, and any decisions already made.";

pub const USER_MEMORY: &str = "\
You maintain a short profile of a user across conversations: their role, team, \
domain, preferences and recurring needs. Merge the existing profile with anything \
new in this conversation and reply with the complete updated profile as plain text. \
Drop nothing that is still true.";

/// Append a section describing the target application, if any.
pub fn with_application(prompt: &str, application: Option<&Application>) -> String {
    let Some(app) = application else {
        return prompt.to_string();
    };

    let mut out = format!("{prompt}\n\n## Target application\n\nName: {}", app.name);
    if let Some(description) = app.short_description.as_deref() {
        out.push_str(&format!("\nDescription: {description}"));
    }
    if let Some(repo) = app.usable_repo() {
        out.push_str(&format!("\nRepository: {repo}"));
    }
    if let Some(overview) = app.overview.as_deref().filter(|o| !o.is_empty()) {
        out.push_str(&format!("\n\n### Codebase overview\n\n{overview}"));
    }
    out
}

/// Append the latest technical assessment so the PRD builds on its findings.
pub fn with_assessment(prompt: &str, assessment: Option<&Document>) -> String {
    match assessment {
        Some(doc) => format!(
            "{prompt}\n\n## Technical assessment\n\n\
             Base scope and acceptance criteria on these findings:\n\n{}",
            doc.content
        ),
        None => prompt.to_string(),
    }
}

/// Append what is already known about the user.
pub fn with_memory(prompt: &str, memory: Option<&UserMemory>) -> String {
    match memory {
        Some(memory) if !memory.memory_content.is_empty() => format!(
            "{prompt}\n\n## Existing profile\n\n{}",
            memory.memory_content
        ),
        _ => prompt.to_string(),
    }
}
