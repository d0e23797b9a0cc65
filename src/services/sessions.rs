//! Session turn API: start / submit / next / precache / end.
//!
//! One mostly-serial loop per learner, with fire-and-forget background
//! tasks for the dual pre-cache. Handlers stay concurrent; the store's
//! transactions and CAS guards keep shared state consistent.

use std::sync::Arc;

use serde::Serialize;

use crate::config::AdaptiveConfig;
use crate::response::AppError;
use crate::services::answers;
use crate::services::generation::{self, SimulatedOutcome, TurnDeps};
use crate::services::llm::LlmClient;
use crate::services::precache::{CachedBranch, OutcomeBranch, Precache};
use crate::store::operations::sessions::{CurrentItem, Session};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub is_correct: bool,
    pub is_close: bool,
    pub partial_score: f64,
    pub rating_before: f64,
    pub rating_after: f64,
    pub mastery: f64,
    pub feedback: Option<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

#[derive(Clone)]
pub struct TutorService {
    store: Arc<Store>,
    llm: Arc<LlmClient>,
    config: Arc<AdaptiveConfig>,
    precache: Arc<Precache>,
}

impl TutorService {
    pub fn new(store: Arc<Store>, llm: Arc<LlmClient>, config: AdaptiveConfig) -> Self {
        Self {
            store,
            llm,
            config: Arc::new(config),
            precache: Arc::new(Precache::new()),
        }
    }

    fn deps(&self) -> TurnDeps<'_> {
        TurnDeps {
            store: &self.store,
            llm: &self.llm,
            config: &self.config,
        }
    }

    /// Start a session and produce its first item. At-most-one active
    /// session per learner is enforced here as policy: older actives are
    /// ended first.
    pub async fn start(
        &self,
        learner_id: &str,
        topic_id: &str,
    ) -> Result<(Session, Option<CurrentItem>), AppError> {
        self.store.get_learner(learner_id)?;
        self.store.get_topic(topic_id)?;

        for stale in self.store.active_sessions_for_learner(learner_id)? {
            self.store.end_session(&stale.id)?;
            self.precache.clear(learner_id, &stale.id);
        }

        let session = self.store.create_session(learner_id, Some(topic_id))?;
        let item =
            generation::generate_next(&self.deps(), learner_id, topic_id, &session, None).await?;

        let session = match &item {
            Some(item) => {
                let updated = self
                    .store
                    .set_session_current(&session.id, Some(item.clone()))?;
                self.spawn_precache(&updated);
                updated
            }
            None => session,
        };

        Ok((session, item))
    }

    /// Grade the answer for the current item and record the outcome.
    pub async fn submit(
        &self,
        session_id: &str,
        answer_given: &str,
        response_time_s: Option<f64>,
    ) -> Result<SubmitResult, AppError> {
        let session = self.store.get_session(session_id)?;
        if !session.is_active() {
            return Err(AppError::bad_request("SESSION_ENDED", "session has ended"));
        }
        let Some(current) = session.current_item.clone() else {
            return Err(AppError::bad_request(
                "NO_CURRENT_ITEM",
                "no item is awaiting an answer",
            ));
        };
        if let Some(last) = &session.last_result {
            if last.item_id == current.item_id {
                return Err(AppError::conflict(
                    "ALREADY_ANSWERED",
                    "current item was already answered",
                ));
            }
        }

        let result =
            answers::process_answer(&self.deps(), &session, &current, answer_given, response_time_s)
                .await?;
        self.store
            .set_session_last_result(session_id, result.clone())?;

        Ok(SubmitResult {
            is_correct: result.is_correct,
            is_close: result.is_close,
            partial_score: result.partial_score,
            rating_before: result.rating_before,
            rating_after: result.rating_after,
            mastery: result.mastery,
            feedback: result.feedback,
            correct_answer: current.correct_answer.clone(),
            explanation: current.explanation.clone(),
        })
    }

    /// Advance to the next item. Returns the still-unanswered current item
    /// when called before submit; `None` when generation comes up empty.
    pub async fn next(&self, session_id: &str) -> Result<Option<CurrentItem>, AppError> {
        let session = self.store.get_session(session_id)?;
        if !session.is_active() {
            return Err(AppError::bad_request("SESSION_ENDED", "session has ended"));
        }

        let answered_current = match (&session.current_item, &session.last_result) {
            (Some(current), Some(last)) if last.item_id == current.item_id => {
                Some((current.clone(), last.clone()))
            }
            (Some(current), _) => return Ok(Some(current.clone())),
            (None, _) => None,
        };

        let Some(topic_id) = session.topic_id.clone() else {
            return Ok(None);
        };

        let item = match &answered_current {
            Some((_, last)) => {
                self.next_after_answer(&session, &topic_id, last.is_correct)
                    .await?
            }
            None => {
                generation::generate_next(
                    &self.deps(),
                    &session.learner_id,
                    &topic_id,
                    &session,
                    None,
                )
                .await?
            }
        };

        if let Some(item) = &item {
            let updated = self
                .store
                .set_session_current(session_id, Some(item.clone()))?;
            self.spawn_precache(&updated);
        }
        Ok(item)
    }

    /// Pre-cache read path: take the branch matching the outcome, verify
    /// its concept still matches what the policy picks now, otherwise fall
    /// through to synchronous generation.
    async fn next_after_answer(
        &self,
        session: &Session,
        topic_id: &str,
        was_correct: bool,
    ) -> Result<Option<CurrentItem>, AppError> {
        let deps = self.deps();
        let ctx =
            generation::build_context(&deps, &session.learner_id, topic_id, session, None)?;
        let expected_focus = generation::focus_of(&ctx, &self.config);

        let branch = OutcomeBranch::from_outcome(was_correct);
        if let Some(cached) = self
            .precache
            .take(&session.learner_id, &session.id, branch)
        {
            match &expected_focus {
                Some(focus) if *focus == cached.concept_id => {
                    tracing::info!(branch = branch.as_str(), "Pre-cache hit");
                    return Ok(Some(cached.item));
                }
                _ => {
                    tracing::info!(
                        branch = branch.as_str(),
                        cached_concept = %cached.concept_id,
                        "Pre-cache miss: focus concept changed"
                    );
                }
            }
        }

        generation::generate_for_context(&deps, &ctx, &session.learner_id, topic_id, session).await
    }

    /// Fire-and-forget dual pre-generation for the current item. Idempotent
    /// per displayed item; failures silently produce no entry.
    pub fn precache_trigger(&self, session_id: &str) -> Result<(), AppError> {
        let session = self.store.get_session(session_id)?;
        if session.is_active() {
            self.spawn_precache(&session);
        }
        Ok(())
    }

    pub async fn end(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.store.end_session(session_id)?;
        self.precache.clear(&session.learner_id, session_id);
        Ok(session)
    }

    fn spawn_precache(&self, session: &Session) {
        let Some(current) = &session.current_item else {
            return;
        };
        let Some(topic_id) = session.topic_id.clone() else {
            return;
        };
        if !self
            .precache
            .begin(&session.learner_id, &session.id, &current.item_id)
        {
            return;
        }

        for branch in [OutcomeBranch::Correct, OutcomeBranch::Wrong] {
            let store = self.store.clone();
            let llm = self.llm.clone();
            let config = self.config.clone();
            let precache = self.precache.clone();
            let session = session.clone();
            let topic_id = topic_id.clone();
            let sim = SimulatedOutcome {
                concept_id: current.concept_id.clone(),
                difficulty: current.difficulty,
                is_correct: branch == OutcomeBranch::Correct,
            };
            let item_id = current.item_id.clone();

            tokio::spawn(async move {
                let deps = TurnDeps {
                    store: &store,
                    llm: &llm,
                    config: &config,
                };
                match generation::generate_next(
                    &deps,
                    &session.learner_id,
                    &topic_id,
                    &session,
                    Some(&sim),
                )
                .await
                {
                    Ok(Some(item)) => {
                        precache.fulfill(
                            &session.learner_id,
                            &session.id,
                            &item_id,
                            branch,
                            CachedBranch {
                                concept_id: item.concept_id.clone(),
                                item,
                            },
                        );
                    }
                    Ok(None) => {
                        tracing::debug!(branch = branch.as_str(), "Pre-cache produced no item");
                    }
                    Err(e) => {
                        tracing::warn!(branch = branch.as_str(), error = %e, "Pre-cache task failed");
                    }
                }
            });
        }
    }
}
