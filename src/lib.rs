//! # Stash
//!
//! A self-hosted bookmark and notes manager with progressive sync and
//! fuzzy search.
//!
//! Stash runs as a small REST backend over SQLite and as a CLI client
//! that loads bookmarks in two phases (a bounded newest-first page, then
//! the full set in the background), re-filters them locally with a fuzzy
//! index, and reveals results page by page.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  HTTP   ┌────────────┐   ┌──────────┐
//! │ SyncController│───────▶│ axum server │──▶│  SQLite   │
//! │ + DisplayState│ bearer │ (REST API)  │   │ bookmarks │
//! └──────┬───────┘         └────────────┘   └──────────┘
//!        │ fuzzy / filter / reveal (stash-core)
//!        ▼
//!   ┌──────────┐
//!   │   CLI    │
//!   │ (stash)  │
//!   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! stash init                              # create database
//! stash user add me@example.com --password hunter22
//! stash serve                             # start the REST API
//! stash login me@example.com --password hunter22
//! stash add --url https://kubernetes.io/docs/ --tags k8s
//! stash list --query kubenetes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite-backed record store |
//! | [`auth`] | Password hashing and bearer tokens |
//! | [`title`] | Page-title resolution |
//! | [`server`] | REST HTTP server |
//! | [`client`] | HTTP record store and auth calls |
//! | [`session`] | Persisted login session |
//! | [`debounce`] | Cancellable delayed delivery |
//! | [`sync`] | Two-phase sync controller |
//! | [`progress`] | Load progress reporting |
//! | [`browse`] | Plain-text rendering |
//!
//! The search, filter, and pagination core lives in the `stash-core`
//! crate.

pub mod auth;
pub mod browse;
pub mod client;
pub mod config;
pub mod db;
pub mod debounce;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod sync;
pub mod title;
