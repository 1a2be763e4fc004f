//! Step sequencing for the audit wizard.
//!
//! The [`Sequencer`] is a pure state machine over a fixed list of steps. Its
//! primitive operations (`advance`, `retreat`, `jump_to`, `finish`) only do
//! index arithmetic and never look at the answers. Conditional omission of
//! steps is expressed as a [`StepGuard`] per step and applied afterwards by
//! `settle_forward` / `settle_backward`, which repeat the primitives until a
//! step whose guard holds is reached.

use crate::enrichment_wait::EnrichedField;
use crate::models::{AnswerRecord, AuditResults, WEBSITE_URL_KEY};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepId {
    Welcome,
    WebsiteUrl,
    Email,
    PhoneNumber,
    Name,
    CompanyName,
    CompanyDescription,
    MonthlyRevenue,
    EmployeeCount,
    Niche,
    AcquisitionChannels,
    SocialMedia,
    MainOffers,
    UserRole,
    GrowthGoal,
    DeepQuestions,
    Results,
    ThankYou,
}

impl StepId {
    /// Key under which this step's answer is stored, if it collects one.
    pub fn answer_key(&self) -> Option<&'static str> {
        match self {
            StepId::WebsiteUrl => Some(WEBSITE_URL_KEY),
            StepId::Email => Some("email"),
            StepId::PhoneNumber => Some("phoneNumber"),
            StepId::Name => Some("name"),
            StepId::CompanyName => Some("companyName"),
            StepId::CompanyDescription => Some("companyDescription"),
            StepId::MonthlyRevenue => Some("monthlyRevenue"),
            StepId::EmployeeCount => Some("employeeCount"),
            StepId::Niche => Some("niche"),
            StepId::AcquisitionChannels => Some("acquisitionChannels"),
            StepId::SocialMedia => Some("socialMedia"),
            StepId::MainOffers => Some("mainOffers"),
            StepId::UserRole => Some("userRole"),
            StepId::GrowthGoal => Some("growthGoal"),
            StepId::Welcome | StepId::DeepQuestions | StepId::Results | StepId::ThankYou => None,
        }
    }

    /// Company profile field this step is prefilled from.
    pub fn enriched_field(&self) -> Option<EnrichedField> {
        match self {
            StepId::CompanyName => Some(EnrichedField::CompanyName),
            StepId::CompanyDescription => Some(EnrichedField::CompanyDescription),
            StepId::MonthlyRevenue => Some(EnrichedField::MonthlyRevenue),
            StepId::EmployeeCount => Some(EnrichedField::EmployeeCount),
            StepId::Niche => Some(EnrichedField::Niche),
            StepId::AcquisitionChannels => Some(EnrichedField::AcquisitionChannels),
            StepId::SocialMedia => Some(EnrichedField::SocialMedia),
            StepId::MainOffers => Some(EnrichedField::MainOffers),
            _ => None,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepId::Welcome => "welcome",
            StepId::WebsiteUrl => "websiteUrl",
            StepId::Email => "email",
            StepId::PhoneNumber => "phoneNumber",
            StepId::Name => "name",
            StepId::CompanyName => "companyName",
            StepId::CompanyDescription => "companyDescription",
            StepId::MonthlyRevenue => "monthlyRevenue",
            StepId::EmployeeCount => "employeeCount",
            StepId::Niche => "niche",
            StepId::AcquisitionChannels => "acquisitionChannels",
            StepId::SocialMedia => "socialMedia",
            StepId::MainOffers => "mainOffers",
            StepId::UserRole => "userRole",
            StepId::GrowthGoal => "growthGoal",
            StepId::DeepQuestions => "deepQuestions",
            StepId::Results => "results",
            StepId::ThankYou => "thankYou",
        };
        write!(f, "{}", name)
    }
}

/// Inclusion predicate over the persisted answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepGuard {
    Always,
    /// Omitted once the website step recorded `hasWebsite: false`.
    RequiresWebsite,
}

impl StepGuard {
    pub fn includes(&self, answers: &AnswerRecord) -> bool {
        match self {
            StepGuard::Always => true,
            StepGuard::RequiresWebsite => {
                answers
                    .get(WEBSITE_URL_KEY)
                    .and_then(|entry| entry.has_website)
                    != Some(false)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardedStep {
    pub id: StepId,
    pub guard: StepGuard,
}

impl GuardedStep {
    pub fn new(id: StepId) -> Self {
        Self {
            id,
            guard: StepGuard::Always,
        }
    }
}

/// Ordered, fixed list of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSequence {
    steps: Vec<GuardedStep>,
}

impl StepSequence {
    pub fn new(ids: &[StepId]) -> Self {
        Self {
            steps: ids.iter().copied().map(GuardedStep::new).collect(),
        }
    }

    /// welcome → website → contact → company basics → deep questions → results.
    pub fn default_sequence() -> Self {
        Self::new(&[
            StepId::Welcome,
            StepId::WebsiteUrl,
            StepId::Email,
            StepId::PhoneNumber,
            StepId::Name,
            StepId::CompanyName,
            StepId::CompanyDescription,
            StepId::MonthlyRevenue,
            StepId::Niche,
            StepId::DeepQuestions,
            StepId::Results,
            StepId::ThankYou,
        ])
    }

    /// Default sequence plus the enrichment-detail and profile steps.
    pub fn extended() -> Self {
        Self::new(&[
            StepId::Welcome,
            StepId::WebsiteUrl,
            StepId::Email,
            StepId::PhoneNumber,
            StepId::Name,
            StepId::CompanyName,
            StepId::CompanyDescription,
            StepId::MonthlyRevenue,
            StepId::EmployeeCount,
            StepId::Niche,
            StepId::AcquisitionChannels,
            StepId::SocialMedia,
            StepId::MainOffers,
            StepId::UserRole,
            StepId::GrowthGoal,
            StepId::DeepQuestions,
            StepId::Results,
            StepId::ThankYou,
        ])
    }

    /// Guards every enrichment-prefilled step with [`StepGuard::RequiresWebsite`].
    pub fn skip_enrichment_without_website(mut self) -> Self {
        for step in &mut self.steps {
            if step.id.enriched_field().is_some() {
                step.guard = StepGuard::RequiresWebsite;
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GuardedStep> {
        self.steps.get(index)
    }

    pub fn position(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }
}

/// What the presentation layer should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "step", rename_all = "camelCase")]
pub enum StepView {
    Step(StepId),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub index: usize,
    pub total: usize,
}

/// Current position plus the in-memory answers of one wizard run.
#[derive(Debug, Clone)]
pub struct Sequencer {
    sequence: StepSequence,
    index: usize,
    answers: Map<String, Value>,
    results: Option<AuditResults>,
}

impl Sequencer {
    pub fn new(sequence: StepSequence) -> Self {
        Self {
            sequence,
            index: 0,
            answers: Map::new(),
            results: None,
        }
    }

    pub fn sequence(&self) -> &StepSequence {
        &self.sequence
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn answers(&self) -> &Map<String, Value> {
        &self.answers
    }

    pub fn results(&self) -> Option<&AuditResults> {
        self.results.as_ref()
    }

    /// Shallow-merges `partial` into the answers and moves one step forward.
    /// At the terminal index the position stays put.
    pub fn advance(&mut self, partial: Map<String, Value>) {
        self.answers.extend(partial);
        if self.index < self.sequence.len() {
            self.index += 1;
        }
    }

    /// One step back, floored at 0. Answers are untouched.
    pub fn retreat(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Sets the position directly, clamped to `[0, last index]`.
    pub fn jump_to(&mut self, index: usize) {
        self.index = index.min(self.sequence.len().saturating_sub(1));
    }

    /// Records the final report and moves to the results step (or one
    /// step forward when the sequence has none).
    pub fn finish(&mut self, results: AuditResults) {
        self.results = Some(results);
        match self.sequence.position(StepId::Results) {
            Some(position) => self.index = position,
            None => self.advance(Map::new()),
        }
    }

    pub fn current(&self) -> StepView {
        match self.sequence.get(self.index) {
            Some(step) => StepView::Step(step.id),
            None => StepView::Complete,
        }
    }

    pub fn current_step(&self) -> Option<StepId> {
        match self.current() {
            StepView::Step(id) => Some(id),
            StepView::Complete => None,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            index: self.index,
            total: self.sequence.len(),
        }
    }

    fn current_excluded(&self, answers: &AnswerRecord) -> bool {
        self.sequence
            .get(self.index)
            .map(|step| !step.guard.includes(answers))
            .unwrap_or(false)
    }

    /// Advances past steps whose guard excludes them. Returns how many were skipped.
    pub fn settle_forward(&mut self, answers: &AnswerRecord) -> usize {
        let mut skipped = 0;
        while self.current_excluded(answers) {
            tracing::debug!("Skipping step {:?}", self.current());
            self.advance(Map::new());
            skipped += 1;
        }
        skipped
    }

    /// Retreats past excluded steps. If index 0 itself is excluded the
    /// sequencer settles forward instead.
    pub fn settle_backward(&mut self, answers: &AnswerRecord) -> usize {
        let mut skipped = 0;
        while self.current_excluded(answers) && self.index > 0 {
            self.retreat();
            skipped += 1;
        }
        skipped + self.settle_forward(answers)
    }
}
