// 🧭 Session - the shopping-list state machine
//
// `ListState` is the request-scoped copy of the list plus the transient check marks.
// `Services` holds the injected collaborators and implements every user action as
// load/modify/save against an explicit state value. A state is only replaced after the
// store confirmed the write, so after any failure it still equals the last persisted list.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::entry::Entry;
use crate::household::{Household, HouseholdError};
use crate::notify::{self, Notification, Notifier};
use crate::recipe::{self, GenerationError, Generator, RecipeError, DEFAULT_GENERATION_TIMEOUT};
use crate::store::{self, ListError, ListStore, ListVersion, Snapshot, StoreError};

// ============================================================================
// ERRORS
// ============================================================================

/// Everything a user action can report back
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Household(#[from] HouseholdError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),
}

impl ActionError {
    /// Message suitable for showing to the user (Korean, like the rest of the app)
    pub fn user_message(&self) -> String {
        match self {
            ActionError::List(ListError::EmptyName) => "상품 이름을 입력해 주세요.".to_string(),
            ActionError::List(ListError::IndexOutOfRange { index, len }) => {
                format!("{}번 항목이 없습니다. (목록에 {}개)", index + 1, len)
            }
            ActionError::Household(HouseholdError::UnknownMember(label)) => {
                format!("'{}'은(는) 가족 구성원이 아닙니다.", label)
            }
            ActionError::Household(e) => format!("가족 설정이 올바르지 않습니다. ({})", e),
            ActionError::Store(StoreError::WriteRejected { reason, .. }) => {
                format!("목록을 저장하지 못했습니다. 아무것도 바뀌지 않았습니다. ({})", reason)
            }
            ActionError::Store(StoreError::Unavailable { reason, .. }) => {
                format!("목록을 불러오지 못했습니다. ({})", reason)
            }
            ActionError::Store(StoreError::Conflict) => {
                "다른 곳에서 목록이 바뀌었습니다. 새로 불러왔으니 다시 시도해 주세요.".to_string()
            }
            ActionError::Store(StoreError::Encode(_)) => {
                "상품 이름에는 줄바꿈을 넣을 수 없습니다.".to_string()
            }
            ActionError::Recipe(RecipeError::EmptySelection) => {
                "먼저 재료를 선택한 뒤 레시피를 요청해 주세요.".to_string()
            }
            ActionError::Recipe(RecipeError::Generation(GenerationError::NotConfigured)) => {
                "레시피 추천이 설정되지 않았습니다. (GEMINI_API_KEY)".to_string()
            }
            ActionError::Recipe(RecipeError::Generation(GenerationError::Timeout(_))) => {
                "레시피 응답이 늦어지고 있습니다. 잠시 후 다시 시도해 주세요.".to_string()
            }
            ActionError::Recipe(RecipeError::Generation(e)) => {
                format!("레시피를 받아오지 못했습니다. ({})", e)
            }
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Request-scoped view of the list
#[derive(Debug, Clone)]
pub struct ListState {
    entries: Vec<Entry>,
    selected: BTreeSet<usize>,
    version: ListVersion,
    degraded: bool,
}

impl ListState {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        ListState {
            entries: snapshot.entries,
            selected: BTreeSet::new(),
            version: snapshot.version,
            degraded: snapshot.degraded,
        }
    }

    /// State pinned to the version a client last saw. A degraded state keeps its
    /// unknown version: its stand-in entries must never be saved.
    pub fn at_version(mut self, version: ListVersion) -> Self {
        if !self.degraded {
            self.version = version;
        }
        self
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn version(&self) -> &ListVersion {
        &self.version
    }

    /// The backing resource could not be read; the list shown is a stand-in
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Flip the check mark of an entry
    pub fn toggle(&mut self, index: usize) -> Result<bool, ListError> {
        if index >= self.entries.len() {
            return Err(ListError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }

        if self.selected.remove(&index) {
            Ok(false)
        } else {
            self.selected.insert(index);
            Ok(true)
        }
    }

    /// Names of the checked entries, in list order
    pub fn selected_names(&self) -> Vec<String> {
        self.selected
            .iter()
            .filter_map(|&index| self.entries.get(index))
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn committed(entries: Vec<Entry>, version: ListVersion) -> Self {
        ListState {
            entries,
            selected: BTreeSet::new(),
            version,
            degraded: false,
        }
    }
}

// ============================================================================
// SERVICES
// ============================================================================

#[derive(Clone)]
pub struct Services {
    store: ListStore,
    household: Household,
    generator: Option<Arc<dyn Generator>>,
    notifier: Option<Arc<dyn Notifier>>,
    generation_timeout: Duration,
}

impl Services {
    pub fn new(store: ListStore, household: Household) -> Self {
        Services {
            store,
            household,
            generator: None,
            notifier: None,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn household(&self) -> &Household {
        &self.household
    }

    pub fn store(&self) -> &ListStore {
        &self.store
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Fresh state from the store (check marks cleared)
    pub async fn open(&self) -> ListState {
        ListState::from_snapshot(self.store.snapshot().await)
    }

    /// Reload `state` in place
    pub async fn refresh(&self, state: &mut ListState) {
        *state = self.open().await;
    }

    /// Add an item for `owner_label`. The notification goes out after the save.
    pub async fn add(
        &self,
        state: &mut ListState,
        owner_label: &str,
        name: &str,
    ) -> Result<Entry, ActionError> {
        let owner = self.household.resolve(owner_label)?;
        let next = store::append(&state.entries, owner.clone(), name)?;
        let added = next[next.len() - 1].clone();

        self.commit(state, next).await?;
        info!(owner = %added.owner, item = %added.name, "Item added");

        if let Some(notifier) = &self.notifier {
            notify::dispatch(notifier.clone(), Notification::item_added(owner, &added.name));
        }

        Ok(added)
    }

    /// Delete the entry at `index`. Out-of-range indices write nothing.
    pub async fn delete(&self, state: &mut ListState, index: usize) -> Result<Entry, ActionError> {
        let removed = state
            .entries
            .get(index)
            .cloned()
            .ok_or(ListError::IndexOutOfRange {
                index,
                len: state.entries.len(),
            })?;
        let next = store::remove_at(&state.entries, index)?;

        self.commit(state, next).await?;
        info!(item = %removed.name, index, "Item deleted");
        Ok(removed)
    }

    /// Empty the whole list
    pub async fn clear(&self, state: &mut ListState) -> Result<(), ActionError> {
        self.commit(state, store::clear()).await?;
        info!("List cleared");
        Ok(())
    }

    /// Recipe for the checked entries of `state`
    pub async fn recipe(&self, state: &ListState, today: NaiveDate) -> Result<String, ActionError> {
        self.recipe_for(&state.selected_names(), today).await
    }

    /// Recipe for an explicit list of item names
    pub async fn recipe_for<S: AsRef<str>>(
        &self,
        names: &[S],
        today: NaiveDate,
    ) -> Result<String, ActionError> {
        Ok(recipe::suggest(self.generator.as_ref(), names, today, self.generation_timeout).await?)
    }

    /// Save `next` against the version `state` was loaded at and adopt it on success.
    /// On a conflict the state is reloaded so the user sees what changed.
    async fn commit(&self, state: &mut ListState, next: Vec<Entry>) -> Result<(), ActionError> {
        match self.store.save_if_current(&state.version, &next).await {
            Ok(version) => {
                *state = ListState::committed(next, version);
                Ok(())
            }
            Err(StoreError::Conflict) => {
                warn!(backend = %self.store.describe(), "Concurrent change detected, reloading");
                self.refresh(state).await;
                Err(StoreError::Conflict.into())
            }
            Err(e) => {
                warn!(error = %e, "Save failed, keeping the last saved list");
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::entry::Owner;
    use crate::store::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingNotifier {
        sent: mpsc::UnboundedSender<Notification>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            let _ = self.sent.send(notification.clone());
            Ok(())
        }
    }

    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        fn model(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok(format!("recipe for: {}", prompt))
        }
    }

    fn services() -> (Arc<MemoryBackend>, Services) {
        let backend = Arc::new(MemoryBackend::new());
        let services = Services::new(ListStore::new(backend.clone()), Household::default());
        (backend, services)
    }

    fn july() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[tokio::test]
    async fn test_add_delete_scenario() {
        let (_, services) = services();
        let mut state = services.open().await;
        assert!(state.entries().is_empty());

        services.add(&mut state, "아빠", "우유").await.unwrap();
        let reloaded = services.open().await;
        assert_eq!(
            reloaded.entries(),
            &[Entry::new(Owner::Member("아빠".to_string()), "우유").unwrap()]
        );

        services.delete(&mut state, 0).await.unwrap();
        assert!(services.open().await.entries().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_save_leaves_state_untouched() {
        let (backend, services) = services();
        let mut state = services.open().await;
        services.add(&mut state, "엄마", "두부").await.unwrap();
        let before = state.entries().to_vec();

        backend.set_reject_writes(true);

        let add = services.add(&mut state, "아빠", "우유").await;
        assert!(matches!(
            add,
            Err(ActionError::Store(StoreError::WriteRejected { .. }))
        ));
        assert_eq!(state.entries(), before.as_slice());

        let delete = services.delete(&mut state, 0).await;
        assert!(delete.is_err());
        assert_eq!(state.entries(), before.as_slice());

        assert!(services.clear(&mut state).await.is_err());
        assert_eq!(state.entries(), before.as_slice());

        backend.set_reject_writes(false);
        assert_eq!(services.open().await.entries(), before.as_slice());
    }

    #[tokio::test]
    async fn test_delete_out_of_range_writes_nothing() {
        let (backend, services) = services();
        let mut state = services.open().await;
        services.add(&mut state, "아빠", "우유").await.unwrap();
        let persisted = backend.lines();

        let result = services.delete(&mut state, 5).await;
        assert!(matches!(
            result,
            Err(ActionError::List(ListError::IndexOutOfRange { index: 5, len: 1 }))
        ));
        assert_eq!(backend.lines(), persisted);
        assert_eq!(state.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_member_is_rejected() {
        let (backend, services) = services();
        let mut state = services.open().await;

        let result = services.add(&mut state, "이웃", "우유").await;
        assert!(matches!(
            result,
            Err(ActionError::Household(HouseholdError::UnknownMember(_)))
        ));
        assert_eq!(backend.lines(), None);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let (_, services) = services();
        let mut state = services.open().await;
        assert!(matches!(
            services.add(&mut state, "아빠", "   ").await,
            Err(ActionError::List(ListError::EmptyName))
        ));
    }

    #[tokio::test]
    async fn test_stale_state_conflicts_and_reloads() {
        let (_, services) = services();
        let mut first_tab = services.open().await;
        let mut second_tab = services.open().await;

        services.add(&mut first_tab, "아빠", "우유").await.unwrap();

        let result = services.add(&mut second_tab, "엄마", "두부").await;
        assert!(matches!(result, Err(ActionError::Store(StoreError::Conflict))));

        // The stale tab now shows the other tab's item, and can retry
        assert_eq!(second_tab.entries().len(), 1);
        services.add(&mut second_tab, "엄마", "두부").await.unwrap();
        assert_eq!(services.open().await.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_notification_only_after_save() {
        let (backend, services) = services();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let services = services.with_notifier(Arc::new(RecordingNotifier { sent: tx }));
        let mut state = services.open().await;

        backend.set_reject_writes(true);
        assert!(services.add(&mut state, "아빠", "우유").await.is_err());

        backend.set_reject_writes(false);
        services.add(&mut state, "큰아들", "과자").await.unwrap();

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.item, "과자");
        assert_eq!(sent.owner, Owner::Member("큰아들".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_selection_resets_after_change() {
        let (_, services) = services();
        let mut state = services.open().await;
        services.add(&mut state, "아빠", "우유").await.unwrap();
        services.add(&mut state, "엄마", "사과").await.unwrap();

        assert_eq!(state.toggle(1), Ok(true));
        assert!(state.is_selected(1));

        services.add(&mut state, "엄마", "계란").await.unwrap();
        assert!(!state.is_selected(1));
        assert!(state.toggle(9).is_err());
    }

    #[tokio::test]
    async fn test_recipe_uses_checked_items() {
        let (_, services) = services();
        let generator = Arc::new(EchoGenerator {
            prompts: Mutex::new(Vec::new()),
        });
        let services = services.with_generator(generator.clone());
        let mut state = services.open().await;
        services.add(&mut state, "아빠", "우유").await.unwrap();
        services.add(&mut state, "엄마", "두부").await.unwrap();
        services.add(&mut state, "엄마", "사과").await.unwrap();

        state.toggle(2).unwrap();
        state.toggle(0).unwrap();
        assert_eq!(state.selected_names(), vec!["우유".to_string(), "사과".to_string()]);

        let text = services.recipe(&state, july()).await.unwrap();
        assert!(text.starts_with("recipe for: "));

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("우유, 사과"));
        assert!(prompts[0].contains("여름"));
    }

    #[tokio::test]
    async fn test_recipe_without_selection() {
        let (_, services) = services();
        let state = services.open().await;

        let err = services.recipe(&state, july()).await.unwrap_err();
        assert!(matches!(err, ActionError::Recipe(RecipeError::EmptySelection)));
        assert_eq!(err.user_message(), "먼저 재료를 선택한 뒤 레시피를 요청해 주세요.");
    }

    #[tokio::test]
    async fn test_degraded_state_cannot_clobber_list() {
        let (backend, services) = services();
        let mut state = services.open().await;
        services.add(&mut state, "아빠", "우유").await.unwrap();

        backend.set_fail_reads(true);
        let mut degraded = services.open().await;
        assert!(degraded.is_degraded());
        backend.set_fail_reads(false);

        assert!(services.clear(&mut degraded).await.is_err());
        assert_eq!(services.open().await.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_read_ignores_client_version() {
        let (backend, services) = services();
        let mut state = services.open().await;
        services.add(&mut state, "아빠", "우유").await.unwrap();
        services.add(&mut state, "엄마", "두부").await.unwrap();
        services.add(&mut state, "기본", "사과").await.unwrap();
        let client_version = state.version().clone();
        let persisted = backend.lines();

        // The next read fails while the client still holds a good version
        backend.set_fail_reads(true);
        let mut pinned = services.open().await.at_version(client_version);
        backend.set_fail_reads(false);

        assert!(pinned.is_degraded());
        assert!(pinned.version().is_unknown());

        let err = services.add(&mut pinned, "큰아들", "과자").await.unwrap_err();
        assert!(matches!(err, ActionError::Store(StoreError::WriteRejected { .. })));
        assert!(err.user_message().starts_with("목록을 저장하지 못했습니다"));
        assert_eq!(backend.lines(), persisted);
    }

    #[test]
    fn test_user_messages() {
        let err = ActionError::List(ListError::IndexOutOfRange { index: 2, len: 1 });
        assert_eq!(err.user_message(), "3번 항목이 없습니다. (목록에 1개)");

        let err = ActionError::Store(StoreError::Conflict);
        assert!(err.user_message().starts_with("다른 곳에서 목록이 바뀌었습니다"));
    }
}
