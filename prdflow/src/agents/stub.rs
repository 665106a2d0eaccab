//! Deterministic offline backend.
//!
//! Answers every stage with a canned, schema-valid JSON object. Domain
//! words in the canned text are substituted based on keywords found in
//! the product idea, so different ideas yield recognisably different
//! documents without any network access.

use super::backend::{BackendError, CompletionRequest, ModelBackend};
use crate::core::StageId;
use async_trait::async_trait;
use std::time::Duration;

/// Substitutions for one product domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainVocabulary {
    /// Domain name, for logs.
    pub name: &'static str,
    keywords: &'static [&'static str],
    problem_domain: &'static str,
    main_use_case: &'static str,
    item: &'static str,
    item_title: &'static str,
    product: &'static str,
}

const DOMAINS: [DomainVocabulary; 4] = [
    DomainVocabulary {
        name: "fitness",
        keywords: &["fitness", "workout", "exercise", "gym"],
        problem_domain: "fitness tracking",
        main_use_case: "workout planning",
        item: "workout",
        item_title: "Workout",
        product: "Fitness Tracker",
    },
    DomainVocabulary {
        name: "finance",
        keywords: &["finance", "budget", "money", "investment", "banking"],
        problem_domain: "personal finance management",
        main_use_case: "budget tracking",
        item: "transaction",
        item_title: "Transaction",
        product: "Finance Manager",
    },
    DomainVocabulary {
        name: "meditation",
        keywords: &["meditation", "mindfulness", "relax", "stress", "mental"],
        problem_domain: "stress management and mental wellness",
        main_use_case: "meditation practice",
        item: "meditation session",
        item_title: "Meditation Session",
        product: "Mindfulness App",
    },
    DomainVocabulary {
        name: "productivity",
        keywords: &["productivity", "task", "todo", "schedule", "project", "team"],
        problem_domain: "task management and productivity",
        main_use_case: "task organization",
        item: "task",
        item_title: "Task",
        product: "Productivity Manager",
    },
];

const GENERIC: DomainVocabulary = DomainVocabulary {
    name: "generic",
    keywords: &[],
    problem_domain: "the problem domain",
    main_use_case: "the main use case",
    item: "entry",
    item_title: "Entry",
    product: "Product",
};

impl DomainVocabulary {
    /// Picks the vocabulary for an idea; the first matching domain wins.
    #[must_use]
    pub fn detect(idea: &str) -> &'static Self {
        let idea = idea.to_lowercase();
        DOMAINS
            .iter()
            .find(|d| d.keywords.iter().any(|k| idea.contains(k)))
            .unwrap_or(&GENERIC)
    }

    /// Replaces the domain placeholders in a canned text.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        text.replace("[problem domain]", self.problem_domain)
            .replace("[main use case]", self.main_use_case)
            .replace("[item]", self.item)
            .replace("[Item]", self.item_title)
            .replace("[Product Name]", self.product)
            .replace("[Product]", self.product)
    }
}

/// Returns the canned answer for a stage with placeholders unresolved.
#[must_use]
pub fn canned_template(stage: StageId) -> &'static str {
    match stage {
        StageId::Strategist => STRATEGIST,
        StageId::Architect => ARCHITECT,
        StageId::UxWriter => UX_WRITER,
        StageId::MockupDesigner => MOCKUP_DESIGNER,
        StageId::Synthesizer => SYNTHESIZER,
    }
}

/// Returns the idea paragraph of a rendered prompt, or the whole prompt.
fn idea_section(prompt: &str) -> &str {
    prompt
        .split_once("Product idea:")
        .map_or(prompt, |(_, rest)| {
            let rest = rest.trim_start();
            rest.split_once("\n\n").map_or(rest, |(idea, _)| idea)
        })
}

/// Backend that answers from canned templates.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    latency: Duration,
}

impl StubBackend {
    /// Creates a stub backend that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artificial delay to every answer.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Produces the answer for a stage and prompt.
    #[must_use]
    pub fn answer(stage: StageId, prompt: &str) -> String {
        DomainVocabulary::detect(idea_section(prompt)).apply(canned_template(stage))
    }
}

#[async_trait]
impl ModelBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(Self::answer(request.stage, &request.prompt))
    }
}

const STRATEGIST: &str = r#"{
  "problem_statement": "People who care about [problem domain] lack a simple, reliable way to handle [main use case]. Existing tools are either too complex or too generic, so most users give up within a few weeks.",
  "market_analysis": "The market for [problem domain] apps is growing steadily, driven by smartphone adoption and rising interest in self-improvement. Incumbents compete on feature breadth; a focused product that makes [main use case] effortless can win on retention.",
  "personas": [
    {"name": "Busy Professional", "goal": "Log each [item] in under ten seconds", "pain": "No time for complicated apps"},
    {"name": "Motivated Beginner", "goal": "Build a lasting habit", "pain": "Loses motivation without feedback"},
    {"name": "Data Enthusiast", "goal": "Understand long-term trends", "pain": "Data is scattered across tools"}
  ],
  "assumptions": [
    "Users will record at least one [item] per day",
    "Timely reminders measurably improve retention",
    "A free tier with an optional subscription is commercially viable"
  ]
}"#;

const ARCHITECT: &str = r#"{
  "features": [
    {"name": "Quick [Item] Logging", "priority": "P0", "description": "Record a [item] with one tap from the home screen"},
    {"name": "Smart Reminders", "priority": "P0", "description": "Adaptive notifications based on user behaviour"},
    {"name": "Progress Dashboard", "priority": "P1", "description": "Daily and weekly summaries of [main use case]"},
    {"name": "Insights", "priority": "P1", "description": "Trends and streaks over time"},
    {"name": "Data Export", "priority": "P2", "description": "CSV export of all recorded data"}
  ],
  "tech_stack": "Mobile client in React Native; REST API in Rust (axum) backed by PostgreSQL; push notifications via Firebase Cloud Messaging; hosted on a managed container platform.",
  "architecture_notes": "Offline-first client that syncs a local event log to the API. The server stores an append-only event table per user and derives summaries in background jobs, keeping the write path small and fast."
}"#;

const UX_WRITER: &str = r#"{
  "ux_flows": [
    {"name": "Onboarding", "steps": ["Welcome screen", "Set a personal goal", "Enable reminders", "Land on dashboard"]},
    {"name": "Log a [item]", "steps": ["Tap the primary button", "Adjust details if needed", "Confirm", "See updated progress"]},
    {"name": "Review progress", "steps": ["Open Insights", "Switch between week and month", "Tap a day for details"]}
  ],
  "microcopy": {
    "welcome_headline": "Make [main use case] effortless",
    "primary_button": "Log [Item]",
    "empty_state": "No [item] yet today. Your first one is a tap away.",
    "reminder": "Time for your next [item]!",
    "error_offline": "You're offline. We'll sync as soon as you're back."
  }
}"#;

const MOCKUP_DESIGNER: &str = r#"{
  "product_name": "[Product Name]",
  "screens": [
    {
      "name": "Dashboard",
      "route": "/",
      "layout": "single-column",
      "components": [
        {"type": "header", "label": "Today"},
        {"type": "card", "label": "Daily Progress", "children": [
          {"type": "chart", "label": "Progress ring"},
          {"type": "button", "label": "Log [Item]"}
        ]},
        {"type": "list", "label": "Recent [item] entries"}
      ]
    },
    {
      "name": "Log [Item]",
      "route": "/log",
      "layout": "modal",
      "components": [
        {"type": "header", "label": "New [Item]"},
        {"type": "form", "label": "[Item] details", "fields": ["amount", "time", "note"]},
        {"type": "button", "label": "Save"}
      ]
    },
    {
      "name": "Insights",
      "route": "/insights",
      "layout": "single-column",
      "components": [
        {"type": "header", "label": "Insights"},
        {"type": "chart", "label": "Weekly trend"},
        {"type": "table", "label": "Daily history"}
      ]
    }
  ]
}"#;

const SYNTHESIZER: &str = r#"{
  "executive_summary": "[Product] helps people take control of [problem domain] by making [main use case] fast, friendly and habit-forming. The first release focuses on one-tap logging, smart reminders and clear progress feedback, validated with a closed beta before public launch.",
  "execution_plan": {
    "phases": [
      {"name": "Foundation", "start_week": 1, "end_week": 3, "tasks": ["Set up repositories, CI and environments", "Implement accounts and authentication", "Define the [item] data model and API"]},
      {"name": "Core Experience", "start_week": 4, "end_week": 7, "tasks": ["Build quick [item] logging", "Ship the progress dashboard", "Implement reminders"]},
      {"name": "Insights & Polish", "start_week": 8, "end_week": 10, "tasks": ["Add trends and streaks", "Accessibility and performance pass", "Instrument analytics"]},
      {"name": "Beta & Launch", "start_week": 11, "end_week": 12, "tasks": ["Run closed beta with 100 users", "Fix top issues", "Publish to app stores"]}
    ]
  },
  "success_metrics": [
    "40% of new users log a [item] on at least 5 of their first 7 days",
    "Day-30 retention above 25%",
    "Median time to log a [item] under 10 seconds",
    "App store rating of 4.5 or higher"
  ],
  "risks": [
    {"risk": "Reminder fatigue leads to uninstalls", "mitigation": "Adaptive frequency and easy snoozing"},
    {"risk": "Low differentiation from incumbents", "mitigation": "Focus on speed of logging and clear feedback"},
    {"risk": "Sync conflicts in offline mode", "mitigation": "Append-only event log with server-side merge"}
  ]
}"#;
