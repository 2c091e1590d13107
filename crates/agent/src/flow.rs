use std::sync::Arc;

use rand::seq::SliceRandom;
use santai_core::audit::{AuditContext, AuditSink};
use santai_core::domain::candidate::{rank_candidates, Candidate, RankingMode};
use santai_core::domain::preferences::{MergeReport, PreferenceRecord, PreferenceUpdate};
use santai_core::domain::session::SessionId;
use santai_core::errors::{ApplicationError, GiftFlowError};
use santai_core::flows::{
    ConversationState, FlowContext, FlowEngine, FlowEvent, FlowType, GiftFinderFlow,
    GiftSendingFlow, TransitionOutcome,
};
use santai_core::input::{classify, match_category, UserIntent};
use serde::Serialize;

use crate::categories::{surprise_pick, CategoryProvider, FALLBACK_CATEGORIES};
use crate::conversation::PreferenceExtractor;
use crate::replies;
use crate::search::{search_with_retry, ProductSearch, SearchQuery};
use crate::store::SessionStore;

const ACTOR: &str = "flow-manager";

/// What the user sees after one message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reply {
    pub session_id: SessionId,
    pub state: ConversationState,
    pub text: String,
    pub candidates: Vec<Candidate>,
    pub categories: Vec<String>,
    #[serde(skip)]
    pub error: Option<GiftFlowError>,
}

impl Reply {
    pub fn new(session_id: SessionId, state: ConversationState, text: impl Into<String>) -> Self {
        Self {
            session_id,
            state,
            text: text.into(),
            candidates: Vec::new(),
            categories: Vec::new(),
            error: None,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_error(mut self, error: GiftFlowError) -> Self {
        self.error = Some(error);
        self
    }

    /// Puts `lead` on its own line above the current text.
    pub fn prefixed(mut self, lead: &str) -> Self {
        if !lead.is_empty() {
            self.text = format!("{lead}\n\n{}", self.text);
        }
        self
    }
}

/// Drives one session through the conversation state machine.
///
/// Callers hold the session's turn guard for the duration of `handle`; every state change
/// goes through `advance`, which checks it against the transition table and audits it.
pub struct ConversationFlowManager {
    store: Arc<SessionStore>,
    extractor: Arc<dyn PreferenceExtractor>,
    categories: Arc<dyn CategoryProvider>,
    search: Arc<dyn ProductSearch>,
    audit: Arc<dyn AuditSink>,
    finder: FlowEngine<GiftFinderFlow>,
    sender: FlowEngine<GiftSendingFlow>,
}

impl ConversationFlowManager {
    pub fn new(
        store: Arc<SessionStore>,
        extractor: Arc<dyn PreferenceExtractor>,
        categories: Arc<dyn CategoryProvider>,
        search: Arc<dyn ProductSearch>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            extractor,
            categories,
            search,
            audit,
            finder: FlowEngine::new(GiftFinderFlow),
            sender: FlowEngine::new(GiftSendingFlow),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub async fn handle(
        &self,
        id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        if classify(text) == UserIntent::Reset {
            return self.reset(id, correlation_id);
        }

        let mut state = self.store.snapshot(id).state;
        if state.is_terminal() {
            self.reset(id, correlation_id)?;
            state = ConversationState::Collecting;
        }

        match state {
            ConversationState::Collecting => self.collect(id, text, correlation_id).await,
            ConversationState::CategorySelection => {
                self.choose_category(id, text, correlation_id).await
            }
            ConversationState::Presenting | ConversationState::AwaitingSelection => {
                self.respond_to_candidates(id, text, correlation_id).await
            }
            ConversationState::Searching => {
                self.run_search(id, RankingMode::Weighted, correlation_id).await
            }
            ConversationState::ResolvingRecipient
            | ConversationState::Notifying
            | ConversationState::Completed => {
                tracing::warn!(
                    event_name = "flow.stale_state",
                    session_id = %id,
                    correlation_id,
                    state = state.as_str(),
                    "session left mid-turn, starting over"
                );
                self.reset(id, correlation_id)
            }
        }
    }

    /// Clears the session and returns it to collecting.
    pub fn reset(&self, id: &SessionId, correlation_id: &str) -> Result<Reply, ApplicationError> {
        self.advance(id, FlowEvent::ResetRequested, correlation_id)?;
        self.store.reset(id);
        Ok(Reply::new(id.clone(), ConversationState::Collecting, replies::fresh_start()))
    }

    /// Shows the session's current step again under `lead` without touching the session.
    /// Unknown sessions are not created.
    pub fn resume(&self, id: &SessionId, lead: &str) -> Reply {
        let Some(session) = self.store.peek(id) else {
            let missing = PreferenceRecord::default().missing_fields();
            let text = replies::missing_fields_prompt(&missing);
            return Reply::new(id.clone(), ConversationState::Collecting, text).prefixed(lead);
        };

        match session.state {
            ConversationState::CategorySelection => {
                let text = replies::category_menu(lead, &session.categories);
                Reply::new(id.clone(), session.state, text).with_categories(session.categories)
            }
            ConversationState::Presenting | ConversationState::AwaitingSelection => {
                let category = session.record.category.as_deref();
                let text = replies::candidate_list(category, &session.candidates);
                Reply::new(id.clone(), session.state, text)
                    .with_candidates(session.candidates)
                    .prefixed(lead)
            }
            state => {
                let text = replies::missing_fields_prompt(&session.record.missing_fields());
                Reply::new(id.clone(), state, text).prefixed(lead)
            }
        }
    }

    /// Applies `event` to the session's current state under the session lock.
    pub fn advance(
        &self,
        id: &SessionId,
        event: FlowEvent,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let audit = AuditContext::new(Some(id.clone()), correlation_id, ACTOR);
        let outcome = self.store.update(id, |session| {
            let context = FlowContext {
                missing_required_fields: session
                    .record
                    .missing_fields()
                    .iter()
                    .map(|field| field.as_str().to_string())
                    .collect(),
            };
            let sink = self.audit.as_ref();
            let outcome = match session.flow_type {
                FlowType::SelfGift => {
                    self.finder.apply_with_audit(&session.state, &event, &context, sink, &audit)
                }
                FlowType::SendToRecipient => {
                    self.sender.apply_with_audit(&session.state, &event, &context, sink, &audit)
                }
            }?;
            session.state = outcome.to;
            Ok::<_, ApplicationError>(outcome)
        })?;

        tracing::debug!(
            event_name = "flow.transition",
            session_id = %id,
            correlation_id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            event = ?outcome.event,
            "state advanced"
        );
        Ok(outcome)
    }

    /// Extracts preferences from `text` and merges them into the session's record.
    pub async fn absorb(
        &self,
        id: &SessionId,
        text: &str,
    ) -> Result<(PreferenceRecord, MergeReport), GiftFlowError> {
        let current = self.store.get(id);
        let update = self.extractor.extract(text, &current).await?;
        Ok(self.store.merge(id, &update))
    }

    async fn collect(
        &self,
        id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        match self.absorb(id, text).await {
            Ok((record, report)) => {
                self.after_collecting(id, &record, &report, correlation_id).await
            }
            Err(error) => {
                let missing = self.store.get(id).missing_fields();
                let text = format!(
                    "{}\n{}",
                    error.user_message(),
                    replies::missing_fields_prompt(&missing)
                );
                Ok(Reply::new(id.clone(), ConversationState::Collecting, text).with_error(error))
            }
        }
    }

    async fn after_collecting(
        &self,
        id: &SessionId,
        record: &PreferenceRecord,
        report: &MergeReport,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let acknowledgment = replies::acknowledge(report, record).unwrap_or_default();
        let missing = record.missing_fields();
        if !missing.is_empty() {
            let text = replies::missing_fields_prompt(&missing);
            return Ok(Reply::new(id.clone(), ConversationState::Collecting, text)
                .prefixed(&acknowledgment));
        }

        self.advance(id, FlowEvent::RequiredFieldsCollected, correlation_id)?;
        let reply = self.present_categories(id, record).await;
        Ok(reply.prefixed(&acknowledgment))
    }

    async fn present_categories(&self, id: &SessionId, record: &PreferenceRecord) -> Reply {
        let categories = self.categories.suggest(record).await;
        self.offer(id, categories.clone());
        let text = replies::category_menu(&replies::categories_intro(record), &categories);
        Reply::new(id.clone(), ConversationState::CategorySelection, text)
            .with_categories(categories)
    }

    fn offer(&self, id: &SessionId, categories: Vec<String>) {
        self.store.update(id, |session| session.offer_categories(categories));
    }

    async fn choose_category(
        &self,
        id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let session = self.store.snapshot(id);
        let menu = session.categories.clone();

        match classify(text) {
            UserIntent::Select(index) if index <= menu.len() => {
                self.select_category(id, &menu[index - 1], correlation_id).await
            }
            UserIntent::Select(index) => {
                Ok(self.invalid_category(id, index.to_string(), menu))
            }
            UserIntent::BadNumber(input) => Ok(self.invalid_category(id, input, menu)),
            UserIntent::SurpriseMe => match surprise_pick(&menu) {
                Some(category) => {
                    let reply = self.select_category(id, &category, correlation_id).await?;
                    Ok(reply.prefixed(&format!("Surprise! I picked {category}.")))
                }
                None => Ok(self.present_categories(id, &session.record).await),
            },
            UserIntent::MoreOptions => {
                let more = self.categories.more(&session.record, &session.offered_categories).await;
                if more.is_empty() {
                    let text = replies::category_menu(replies::no_more_categories(), &menu);
                    return Ok(Reply::new(id.clone(), ConversationState::CategorySelection, text)
                        .with_categories(menu));
                }
                self.offer(id, more.clone());
                let text = replies::category_menu("Here are some more ideas:", &more);
                Ok(Reply::new(id.clone(), ConversationState::CategorySelection, text)
                    .with_categories(more))
            }
            UserIntent::Reset => self.reset(id, correlation_id),
            UserIntent::FreeText => {
                if let Some(category) = match_category(text, &menu) {
                    return self.select_category(id, &category, correlation_id).await;
                }
                self.refine_while_choosing(id, text, menu).await
            }
        }
    }

    fn invalid_category(&self, id: &SessionId, input: String, menu: Vec<String>) -> Reply {
        let error = GiftFlowError::InvalidSelection { input, max: menu.len() };
        let text = replies::category_menu(&error.user_message(), &menu);
        Reply::new(id.clone(), ConversationState::CategorySelection, text)
            .with_categories(menu)
            .with_error(error)
    }

    /// Free text that names no category is read as more detail about the gift.
    async fn refine_while_choosing(
        &self,
        id: &SessionId,
        text: &str,
        menu: Vec<String>,
    ) -> Result<Reply, ApplicationError> {
        let (lead, error) = match self.absorb(id, text).await {
            Ok((record, report)) => {
                let lead = replies::acknowledge(&report, &record)
                    .unwrap_or_else(|| "I didn't catch a category there.".to_string());
                (lead, None)
            }
            Err(error) => (error.user_message(), Some(error)),
        };

        let text = replies::category_menu(&format!("{lead} Which category sounds good?"), &menu);
        let reply = Reply::new(id.clone(), ConversationState::CategorySelection, text)
            .with_categories(menu);
        Ok(match error {
            Some(error) => reply.with_error(error),
            None => reply,
        })
    }

    async fn select_category(
        &self,
        id: &SessionId,
        category: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        self.store.merge(id, &PreferenceUpdate::default().with_category(category));
        self.advance(id, FlowEvent::CategoryChosen, correlation_id)?;
        self.run_search(id, RankingMode::Weighted, correlation_id).await
    }

    /// Searches from the `Searching` state and moves to `Presenting`, or back to category
    /// selection when nothing matched or the catalog is down.
    pub async fn run_search(
        &self,
        id: &SessionId,
        mode: RankingMode,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let session = self.store.snapshot(id);
        let query = SearchQuery::from_record(&session.record);
        let exclude = match mode {
            RankingMode::Relaxed => session.shown_candidates.clone(),
            RankingMode::Weighted => Vec::new(),
        };

        tracing::info!(
            event_name = "flow.search",
            session_id = %id,
            correlation_id,
            query = %query.text(),
            budget = %query.budget,
            mode = ?mode,
            "searching catalog"
        );

        let items = match search_with_retry(self.search.as_ref(), &query).await {
            Ok(items) => items,
            Err(error) => {
                self.advance(id, FlowEvent::SearchUnavailable, correlation_id)?;
                let fallback: Vec<String> =
                    FALLBACK_CATEGORIES.into_iter().map(str::to_string).collect();
                self.offer(id, fallback.clone());
                let text = replies::category_menu(&error.user_message(), &fallback);
                return Ok(Reply::new(id.clone(), ConversationState::CategorySelection, text)
                    .with_categories(fallback)
                    .with_error(error));
            }
        };

        let ranked = rank_candidates(items, &session.record, mode, &exclude);
        if ranked.is_empty() {
            self.advance(id, FlowEvent::NoMatches, correlation_id)?;
            let menu = if session.categories.is_empty() {
                let suggested = self.categories.suggest(&session.record).await;
                self.offer(id, suggested.clone());
                suggested
            } else {
                session.categories.clone()
            };
            let lead = replies::no_matches(session.record.category.as_deref());
            let text = replies::category_menu(&lead, &menu);
            return Ok(Reply::new(id.clone(), ConversationState::CategorySelection, text)
                .with_categories(menu));
        }

        self.advance(id, FlowEvent::ResultsReady, correlation_id)?;
        self.store.cache_candidates(id, ranked.clone());
        let text = replies::candidate_list(session.record.category.as_deref(), &ranked);
        Ok(Reply::new(id.clone(), ConversationState::Presenting, text).with_candidates(ranked))
    }

    async fn respond_to_candidates(
        &self,
        id: &SessionId,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let session = self.store.snapshot(id);
        let candidates = session.candidates.clone();

        match classify(text) {
            UserIntent::Select(index) if index <= candidates.len() => {
                self.select_candidate(id, candidates[index - 1].clone(), correlation_id)
            }
            UserIntent::Select(index) => {
                Ok(self.invalid_candidate(id, session.state, index.to_string(), candidates))
            }
            UserIntent::BadNumber(input) => {
                Ok(self.invalid_candidate(id, session.state, input, candidates))
            }
            UserIntent::SurpriseMe => {
                let pick = candidates.choose(&mut rand::thread_rng()).cloned();
                match pick {
                    Some(candidate) => self.select_candidate(id, candidate, correlation_id),
                    None => self.run_search(id, RankingMode::Weighted, correlation_id).await,
                }
            }
            UserIntent::MoreOptions => {
                self.advance(id, FlowEvent::MoreOptionsRequested, correlation_id)?;
                self.run_search(id, RankingMode::Relaxed, correlation_id).await
            }
            UserIntent::Reset => self.reset(id, correlation_id),
            UserIntent::FreeText => {
                match self.absorb(id, text).await {
                    Ok((record, report)) => {
                        self.advance(id, FlowEvent::PreferencesCorrected, correlation_id)?;
                        let text =
                            replies::correction_noted(replies::acknowledge(&report, &record));
                        Ok(Reply::new(id.clone(), ConversationState::AwaitingSelection, text)
                            .with_candidates(candidates))
                    }
                    Err(error) => {
                        let text = format!(
                            "{} Pick a number from the list, or say \"more options\".",
                            error.user_message()
                        );
                        Ok(Reply::new(id.clone(), session.state, text)
                            .with_candidates(candidates)
                            .with_error(error))
                    }
                }
            }
        }
    }

    fn invalid_candidate(
        &self,
        id: &SessionId,
        state: ConversationState,
        input: String,
        candidates: Vec<Candidate>,
    ) -> Reply {
        let error = GiftFlowError::InvalidSelection { input, max: candidates.len() };
        Reply::new(id.clone(), state, error.user_message())
            .with_candidates(candidates)
            .with_error(error)
    }

    fn select_candidate(
        &self,
        id: &SessionId,
        candidate: Candidate,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        self.store.update(id, |session| session.selected = Some(candidate.clone()));
        let outcome = self.advance(id, FlowEvent::CandidateSelected, correlation_id)?;

        tracing::info!(
            event_name = "flow.candidate_selected",
            session_id = %id,
            correlation_id,
            gift = %candidate.name,
            "candidate selected"
        );

        let text = replies::selection_confirmed(&candidate);
        Ok(Reply::new(id.clone(), outcome.to, text).with_candidates(vec![candidate]))
    }
}
