use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use super::models::{NewPrompt, Prompt, PromptEvent, PromptPatch};
use crate::storage::Storage;
use crate::store::{EVENT_BUFFER_SIZE, StoreResult, load_record, new_id, now_millis, save_record};

/// Storage key of the prompt collection record.
pub const PROMPTS_STORAGE_KEY: &str = "prompts-storage";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PromptsState {
    prompts: Vec<Prompt>,
}

/// Persisted collection of prompt templates.
pub struct PromptStore {
    storage: Arc<dyn Storage>,
    state: Mutex<PromptsState>,
    events: broadcast::Sender<PromptEvent>,
}

impl PromptStore {
    pub async fn open(storage: Arc<dyn Storage>) -> StoreResult<Self> {
        let state: PromptsState = load_record(&storage, PROMPTS_STORAGE_KEY).await?;
        debug!("Loaded {} prompt(s)", state.prompts.len());
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Ok(Self {
            storage,
            state: Mutex::new(state),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PromptEvent> {
        self.events.subscribe()
    }

    pub async fn list_prompts(&self) -> Vec<Prompt> {
        self.state.lock().await.prompts.clone()
    }

    pub async fn get_prompt(&self, id: &str) -> Option<Prompt> {
        self.state
            .lock()
            .await
            .prompts
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn add_prompt(&self, new: NewPrompt) -> StoreResult<Prompt> {
        let now = now_millis();
        let prompt = Prompt {
            id: new_id(),
            title: new.title,
            content: new.content,
            created_at: now,
            updated_at: now,
        };

        let created = prompt.clone();
        self.mutate(move |state| {
            let prompt_id = prompt.id.clone();
            state.prompts.push(prompt);
            ((), Some(PromptEvent::Created { prompt_id }))
        })
        .await?;
        Ok(created)
    }

    /// Apply a partial update. Returns `false` for an unknown id.
    pub async fn update_prompt(&self, id: &str, patch: PromptPatch) -> StoreResult<bool> {
        let now = now_millis();
        self.mutate(|state| match state.prompts.iter_mut().find(|p| p.id == id) {
            Some(prompt) => {
                if let Some(title) = patch.title {
                    prompt.title = title;
                }
                if let Some(content) = patch.content {
                    prompt.content = content;
                }
                prompt.updated_at = now;
                (
                    true,
                    Some(PromptEvent::Updated {
                        prompt_id: id.to_string(),
                    }),
                )
            }
            None => (false, None),
        })
        .await
    }

    /// Delete a prompt. Returns `false` for an unknown id.
    pub async fn delete_prompt(&self, id: &str) -> StoreResult<bool> {
        self.mutate(|state| {
            let before = state.prompts.len();
            state.prompts.retain(|p| p.id != id);
            if state.prompts.len() == before {
                (false, None)
            } else {
                (
                    true,
                    Some(PromptEvent::Deleted {
                        prompt_id: id.to_string(),
                    }),
                )
            }
        })
        .await
    }

    async fn mutate<R>(
        &self,
        apply: impl FnOnce(&mut PromptsState) -> (R, Option<PromptEvent>),
    ) -> StoreResult<R> {
        let mut state = self.state.lock().await;
        let snapshot = state.clone();
        let (result, event) = apply(&mut state);

        let Some(event) = event else {
            return Ok(result);
        };

        if let Err(e) = save_record(&self.storage, PROMPTS_STORAGE_KEY, &*state).await {
            warn!("Failed to persist prompts, rolling back: {}", e);
            *state = snapshot;
            return Err(e);
        }

        let _ = self.events.send(event);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    async fn setup() -> (PromptStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(temp_dir.path()));
        (PromptStore::open(storage).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_prompt_crud() {
        let (store, _temp) = setup().await;

        let prompt = store
            .add_prompt(NewPrompt::new("Review", "Review this code:"))
            .await
            .unwrap();
        assert_eq!(store.list_prompts().await, vec![prompt.clone()]);

        let patch = PromptPatch {
            content: Some("Review this diff:".to_string()),
            ..Default::default()
        };
        assert!(store.update_prompt(&prompt.id, patch).await.unwrap());
        let updated = store.get_prompt(&prompt.id).await.unwrap();
        assert_eq!(updated.title, "Review");
        assert_eq!(updated.content, "Review this diff:");

        assert!(store.delete_prompt(&prompt.id).await.unwrap());
        assert!(store.list_prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_noop() {
        let (store, _temp) = setup().await;
        let mut rx = store.subscribe();

        assert!(!store.update_prompt("nope", PromptPatch::default()).await.unwrap());
        assert!(!store.delete_prompt("nope").await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_prompts_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(temp_dir.path()));

        let store = PromptStore::open(storage.clone()).await.unwrap();
        let prompt = store
            .add_prompt(NewPrompt::new("Summarize", "Summarize briefly:"))
            .await
            .unwrap();
        drop(store);

        let reopened = PromptStore::open(storage).await.unwrap();
        assert_eq!(reopened.get_prompt(&prompt.id).await, Some(prompt));
    }

    #[tokio::test]
    async fn test_events_published() {
        let (store, _temp) = setup().await;
        let mut rx = store.subscribe();

        let prompt = store.add_prompt(NewPrompt::new("t", "c")).await.unwrap();
        store.delete_prompt(&prompt.id).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            PromptEvent::Created {
                prompt_id: prompt.id.clone()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            PromptEvent::Deleted {
                prompt_id: prompt.id
            }
        );
    }
}
