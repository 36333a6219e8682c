// Family Basket - Core Library
// Exposes the shopping-list state machine for the CLI/TUI, the API server, and tests

pub mod codec;
pub mod config;
pub mod entry;
pub mod household;
pub mod logging;
pub mod notify;
pub mod recipe;
pub mod session;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use codec::{decode, encode, EncodeError};
pub use config::{AppConfig, BackendConfig};
pub use entry::{Entry, Owner, DEFAULT_OWNER_LABEL};
pub use household::{Household, HouseholdError, Member};
pub use notify::{MailRelayNotifier, Notification, Notifier, NotifyError};
pub use recipe::{
    build_prompt, build_prompt_with, request_recipe, GeminiGenerator, GenerationError, Generator,
    PromptStyle, RecipeError, Season,
};
pub use session::{ActionError, ListState, Services};
pub use store::{
    append, clear, remove_at, Backend, FileBackend, ListError, ListStore, ListVersion,
    MemoryBackend, SheetBackend, Snapshot, SqliteBackend, StoreError, TableBackend,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
