use std::collections::HashMap;
use std::sync::Arc;

use teloxide::types::ChatId;
use tokio::sync::RwLock;

/// Scratch key holding the account number captured by the first bind step.
pub const SCRATCH_ACCOUNT: &str = "account";

/// Where a user currently is inside a multi-step workflow.
///
/// There is at most one workflow in flight per user; starting a new one
/// simply overwrites the state. Nothing here survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogueState {
    #[default]
    Idle,
    AwaitingAccount,
    AwaitingCustomerCode,
    AwaitingThreshold,
    AwaitingInterval,
}

#[derive(Default)]
struct DialogueMaps {
    states: HashMap<ChatId, DialogueState>,
    scratch: HashMap<ChatId, HashMap<String, String>>,
}

/// In-memory conversation state, shared across all message handlers.
///
/// Both maps sit behind one lock: a `set_state(Idle)` racing a
/// `set_scratch` must not leave a stale scratch entry behind for the
/// next workflow.
#[derive(Clone, Default)]
pub struct DialogueStore {
    inner: Arc<RwLock<DialogueMaps>>,
}

impl DialogueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the user's state. Going idle drops the user's scratch
    /// data in the same critical section.
    pub async fn set_state(&self, chat_id: ChatId, state: DialogueState) {
        let mut maps = self.inner.write().await;
        maps.states.insert(chat_id, state);
        if state == DialogueState::Idle {
            maps.scratch.remove(&chat_id);
        }
    }

    /// Users we have never seen are idle.
    pub async fn get_state(&self, chat_id: ChatId) -> DialogueState {
        self.inner
            .read()
            .await
            .states
            .get(&chat_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set_scratch(&self, chat_id: ChatId, key: &str, value: &str) {
        let mut maps = self.inner.write().await;
        maps.scratch
            .entry(chat_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Missing user or key reads as an empty string.
    pub async fn get_scratch(&self, chat_id: ChatId, key: &str) -> String {
        self.inner
            .read()
            .await
            .scratch
            .get(&chat_id)
            .and_then(|data| data.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: ChatId = ChatId(1);
    const BOB: ChatId = ChatId(2);

    #[tokio::test]
    async fn fresh_store_is_idle_with_empty_scratch() {
        let store = DialogueStore::new();
        assert_eq!(store.get_state(ALICE).await, DialogueState::Idle);
        assert_eq!(store.get_scratch(ALICE, SCRATCH_ACCOUNT).await, "");
    }

    #[tokio::test]
    async fn scratch_survives_while_workflow_is_active() {
        let store = DialogueStore::new();
        store.set_state(ALICE, DialogueState::AwaitingAccount).await;
        store.set_scratch(ALICE, SCRATCH_ACCOUNT, "20231001").await;
        store
            .set_state(ALICE, DialogueState::AwaitingCustomerCode)
            .await;
        assert_eq!(store.get_scratch(ALICE, SCRATCH_ACCOUNT).await, "20231001");
    }

    #[tokio::test]
    async fn going_idle_clears_scratch() {
        let store = DialogueStore::new();
        store.set_state(ALICE, DialogueState::AwaitingAccount).await;
        store.set_scratch(ALICE, SCRATCH_ACCOUNT, "20231001").await;
        store.set_state(ALICE, DialogueState::Idle).await;
        assert_eq!(store.get_state(ALICE).await, DialogueState::Idle);
        assert_eq!(store.get_scratch(ALICE, SCRATCH_ACCOUNT).await, "");
    }

    #[tokio::test]
    async fn users_do_not_share_state_or_scratch() {
        let store = DialogueStore::new();
        store
            .set_state(ALICE, DialogueState::AwaitingThreshold)
            .await;
        store.set_scratch(ALICE, "k", "v").await;
        assert_eq!(store.get_state(BOB).await, DialogueState::Idle);
        assert_eq!(store.get_scratch(BOB, "k").await, "");
    }
}
