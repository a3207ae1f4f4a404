use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::model::Explanation;

struct LedgerEntry {
    explanation: Explanation,
    recorded_at: Instant,
}

/// Accepted explanations and the emission grants derived from them.
///
/// A grant is valid once, for the owning task, within `ttl` of acceptance.
pub struct ExplanationLedger {
    ttl: Duration,
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl ExplanationLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores a complete explanation; incomplete ones are refused.
    ///
    /// Expired entries are dropped on every call.
    pub async fn record(&self, explanation: Explanation) -> CoreResult<String> {
        if !explanation.complete {
            return Err(CoreError::Validation {
                message: "explanation is incomplete".into(),
                fields: explanation.missing_sections.clone(),
            });
        }
        let id = explanation.id.clone();
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, e| e.recorded_at.elapsed() <= ttl);
        if entries.contains_key(&id) {
            return Err(CoreError::Conflict(format!("explanation {id} already recorded")));
        }
        entries.insert(
            id.clone(),
            LedgerEntry {
                explanation,
                recorded_at: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Consumes the emission grant of `explanation_id` for `task_id` and hands
    /// back the explanation it was issued for.
    ///
    /// The entry leaves the ledger once granted or found expired.
    pub async fn authorize(&self, explanation_id: &str, task_id: &str) -> CoreResult<Explanation> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get(explanation_id)
            .ok_or_else(|| CoreError::not_found("explanation grant", explanation_id))?;

        if entry.explanation.task_id != task_id {
            return Err(CoreError::Conflict(format!(
                "explanation {explanation_id} was accepted for task {}, not {task_id}",
                entry.explanation.task_id
            )));
        }
        let expired = entry.recorded_at.elapsed() > self.ttl;
        let Some(entry) = entries.remove(explanation_id) else {
            return Err(CoreError::not_found("explanation grant", explanation_id));
        };
        if expired {
            return Err(CoreError::Conflict(format!(
                "emission grant for explanation {explanation_id} expired"
            )));
        }
        Ok(entry.explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn explanation(task_id: &str, complete: bool) -> Explanation {
        Explanation {
            id: crate::model::new_id(),
            task_id: task_id.into(),
            approach: "layered".into(),
            sections: BTreeMap::new(),
            complete,
            missing_sections: if complete {
                Vec::new()
            } else {
                vec!["risks".into()]
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn grant_is_single_use_and_task_bound() {
        let ledger = ExplanationLedger::new(Duration::from_secs(60));
        let id = ledger.record(explanation("t1", true)).await.unwrap();

        assert!(matches!(
            ledger.authorize(&id, "t2").await,
            Err(CoreError::Conflict(_))
        ));
        let granted = ledger.authorize(&id, "t1").await.unwrap();
        assert_eq!(granted.id, id);
        assert!(ledger.entries.lock().await.is_empty());
        assert!(matches!(
            ledger.authorize(&id, "t1").await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.authorize("missing", "t1").await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn expired_grant_is_refused() {
        let ledger = ExplanationLedger::new(Duration::from_millis(1));
        let id = ledger.record(explanation("t1", true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            ledger.authorize(&id, "t1").await,
            Err(CoreError::Conflict(_))
        ));
        assert!(ledger.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_when_recording() {
        let ledger = ExplanationLedger::new(Duration::from_millis(1));
        ledger.record(explanation("t1", true)).await.unwrap();
        ledger.record(explanation("t2", true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        ledger.record(explanation("t3", true)).await.unwrap();
        assert_eq!(ledger.entries.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn incomplete_explanation_is_not_recorded() {
        let ledger = ExplanationLedger::new(Duration::from_secs(60));
        let err = ledger.record(explanation("t1", false)).await.unwrap_err();
        match err {
            CoreError::Validation { fields, .. } => assert_eq!(fields, vec!["risks".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
