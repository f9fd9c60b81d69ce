//! # Stash Core
//!
//! Runtime-free logic shared by the Stash server and client: the bookmark
//! model, the record store abstraction, fuzzy search, the filter pipeline,
//! pagination and the display state that ties them together.
//!
//! This crate contains no tokio, sqlx, network or filesystem I/O. Async
//! only appears in trait signatures via `async_trait`.

pub mod filter;
pub mod fuzzy;
pub mod models;
pub mod pagination;
pub mod store;
pub mod view;

pub use models::{BookmarkDraft, BookmarkRecord};
pub use store::{RecordStore, StoreError, StoreResult};
pub use view::DisplayState;
