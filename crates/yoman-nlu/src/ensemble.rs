use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, warn};

use yoman_core::clock::Clock;
use yoman_core::config::NluConfig;
use yoman_core::types::UserId;

use crate::anthropic::AnthropicModel;
use crate::compare::{ComparisonLog, ModelObservation};
use crate::costs::CostAccountant;
use crate::openai::OpenAiModel;
use crate::prompt::{build_prompt, ClassifyContext};
use crate::provider::{IntentModel, ProviderError};
use crate::types::{Intent, NluResult};

/// Confidence assigned when all successful models agree.
const CONFIDENCE_UNANIMOUS: f64 = 0.95;
/// Confidence assigned on a 2-way majority.
const CONFIDENCE_MAJORITY: f64 = 0.85;
/// Ceiling applied when no majority exists and clarification is needed.
const CONFIDENCE_SPLIT_CAP: f64 = 0.60;

/// One configured model slot with its pricing.
struct Slot {
    model: Arc<dyn IntentModel>,
    input_cost_per_mtok: f64,
    output_cost_per_mtok: f64,
}

/// Parallel multi-model intent classifier.
///
/// Invokes every configured slot under a shared deadline, majority-votes
/// the intents, merges entity fields from the agreeing models, accounts
/// costs and writes the shadow comparison row. Never blocks longer than
/// the deadline; total failure yields `{intent: unknown, confidence: 0}`.
pub struct NluEnsemble {
    slots: Vec<Slot>,
    deadline: Duration,
    clock: Arc<dyn Clock>,
    costs: Option<Arc<CostAccountant>>,
    compare: Option<Arc<ComparisonLog>>,
}

impl NluEnsemble {
    pub fn new(
        models: Vec<Arc<dyn IntentModel>>,
        deadline: Duration,
        clock: Arc<dyn Clock>,
        costs: Option<Arc<CostAccountant>>,
        compare: Option<Arc<ComparisonLog>>,
    ) -> Self {
        let slots = models
            .into_iter()
            .map(|model| Slot {
                model,
                input_cost_per_mtok: 0.0,
                output_cost_per_mtok: 0.0,
            })
            .collect();
        Self {
            slots,
            deadline,
            clock,
            costs,
            compare,
        }
    }

    /// Build the ensemble from configuration (up to three slots).
    pub fn from_config(
        config: &NluConfig,
        clock: Arc<dyn Clock>,
        costs: Option<Arc<CostAccountant>>,
        compare: Option<Arc<ComparisonLog>>,
    ) -> Self {
        let slots = config
            .models
            .iter()
            .take(3)
            .filter_map(|m| {
                let model: Arc<dyn IntentModel> = match m.kind.as_str() {
                    "anthropic" => Arc::new(AnthropicModel::new(
                        m.api_key.clone(),
                        m.model.clone(),
                        m.base_url.clone(),
                    )),
                    "openai" | "openai-compat" => Arc::new(OpenAiModel::new(
                        m.api_key.clone(),
                        m.model.clone(),
                        m.base_url.clone(),
                    )),
                    other => {
                        warn!(kind = %other, "unknown NLU model kind — slot skipped");
                        return None;
                    }
                };
                Some(Slot {
                    model,
                    input_cost_per_mtok: m.input_cost_per_mtok,
                    output_cost_per_mtok: m.output_cost_per_mtok,
                })
            })
            .collect();
        Self {
            slots,
            deadline: Duration::from_millis(config.deadline_ms),
            clock,
            costs,
            compare,
        }
    }

    /// Classify one message. See the module docs for the voting rules.
    pub async fn classify(&self, user_id: &UserId, text: &str, ctx: &ClassifyContext) -> NluResult {
        if self.slots.is_empty() {
            return NluResult::unknown();
        }
        let prompt = build_prompt(text, ctx);

        let calls = self.slots.iter().map(|slot| {
            let prompt = &prompt;
            async move {
                let started = Instant::now();
                let outcome =
                    tokio::time::timeout(self.deadline, slot.model.classify(prompt)).await;
                let latency_ms = started.elapsed().as_millis() as i64;
                let reply = match outcome {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ProviderError::Timeout),
                };
                (slot, reply, latency_ms)
            }
        });
        let outcomes = join_all(calls).await;

        let mut successes: Vec<(String, NluResult, i64)> = Vec::new();
        for (slot, reply, latency_ms) in outcomes {
            match reply {
                Ok(reply) => {
                    if let Some(costs) = &self.costs {
                        let cost = CostAccountant::compute_cost(
                            reply.tokens_in,
                            reply.tokens_out,
                            slot.input_cost_per_mtok,
                            slot.output_cost_per_mtok,
                        );
                        let _ = costs.record(
                            Some(user_id),
                            slot.model.name(),
                            "nlu_classify",
                            reply.tokens_in,
                            reply.tokens_out,
                            cost,
                        );
                    }
                    successes.push((slot.model.name().to_string(), reply.result, latency_ms));
                }
                Err(e) => {
                    warn!(model = %slot.model.name(), error = %e, "NLU model failed");
                }
            }
        }

        // Shadow comparison — observational, off the hot path.
        if let Some(compare) = &self.compare {
            let observations: Vec<ModelObservation> = successes
                .iter()
                .map(|(model, result, latency_ms)| ModelObservation {
                    model: model.clone(),
                    intent: result.intent.as_str().to_string(),
                    confidence: result.confidence,
                    response_time_ms: *latency_ms,
                })
                .collect();
            let compare = Arc::clone(compare);
            let uid = user_id.clone();
            let message = text.to_string();
            let at = self.clock.now_utc();
            tokio::spawn(async move {
                compare.log(&uid, &message, &observations, at);
            });
        }

        let replies: Vec<NluResult> = successes.into_iter().map(|(_, r, _)| r).collect();
        vote(replies)
    }
}

/// Majority-vote a set of successful model replies.
fn vote(mut replies: Vec<NluResult>) -> NluResult {
    if replies.is_empty() {
        return NluResult::unknown();
    }
    // Highest-confidence first: drives both tie-breaking and entity merge
    // priority.
    replies.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut counts: Vec<(Intent, usize)> = Vec::new();
    for reply in &replies {
        match counts.iter_mut().find(|(i, _)| *i == reply.intent) {
            Some((_, c)) => *c += 1,
            None => counts.push((reply.intent, 1)),
        }
    }
    let k = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    // First entry wins ties — counts preserves confidence order.
    let winner = counts
        .iter()
        .find(|(_, c)| *c == k)
        .map(|(i, _)| *i)
        .unwrap_or(Intent::Unknown);

    if k <= 1 && replies.len() > 1 {
        // No agreement: surface the distinct intents for clarification.
        let mut candidates: Vec<NluResult> = Vec::new();
        for reply in &replies {
            if candidates.iter().any(|c| c.intent == reply.intent) {
                continue;
            }
            candidates.push(reply.clone());
            if candidates.len() == 2 {
                break;
            }
        }
        let best_conf = replies[0].confidence;
        let mut result = replies[0].clone();
        result.confidence = best_conf.min(CONFIDENCE_SPLIT_CAP);
        result.needs_clarification = true;
        result.candidates = candidates;
        return result;
    }

    let agreeing: Vec<&NluResult> = replies.iter().filter(|r| r.intent == winner).collect();
    let confidence = match k {
        _ if k >= 3 => CONFIDENCE_UNANIMOUS,
        2 => CONFIDENCE_MAJORITY,
        // Single model overall: keep its own confidence.
        _ => agreeing[0].confidence,
    };

    let mut merged = merge_agreeing(&agreeing);
    merged.intent = winner;
    merged.confidence = confidence;
    if replies.len() > 1 {
        // A real majority overrides any single model's hedging.
        merged.needs_clarification = false;
        merged.candidates = Vec::new();
    }
    debug!(intent = %winner.as_str(), k, n = replies.len(), "ensemble vote complete");
    merged
}

/// Merge entity payloads across agreeing replies (already sorted by
/// confidence): scalars take the first non-null value, lists union.
fn merge_agreeing(agreeing: &[&NluResult]) -> NluResult {
    let mut base = serde_json::to_value(agreeing[0]).unwrap_or_default();
    for reply in &agreeing[1..] {
        let value = serde_json::to_value(reply).unwrap_or_default();
        merge_value(&mut base, &value);
    }
    serde_json::from_value(base).unwrap_or_default()
}

fn merge_value(base: &mut serde_json::Value, other: &serde_json::Value) {
    match (base, other) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(other_map)) => {
            for (key, other_val) in other_map {
                match base_map.get_mut(key) {
                    None => {
                        base_map.insert(key.clone(), other_val.clone());
                    }
                    Some(base_val) => {
                        if base_val.is_null() {
                            *base_val = other_val.clone();
                        } else if base_val.is_object() && other_val.is_object() {
                            merge_value(base_val, other_val);
                        } else if let (Some(base_arr), Some(other_arr)) =
                            (base_val.as_array().cloned(), other_val.as_array())
                        {
                            let mut union = base_arr;
                            for item in other_arr {
                                if !union.contains(item) {
                                    union.push(item.clone());
                                }
                            }
                            *base_val = serde_json::Value::Array(union);
                        }
                        // Non-null scalars keep the higher-confidence value.
                    }
                }
            }
        }
        (base_slot, _) if base_slot.is_null() => *base_slot = other.clone(),
        _ => {}
    }
}
