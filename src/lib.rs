//! namespace-backup-webhook: keeps Velero backups in step with labelled namespaces.
//!
//! The API server calls `/validate` on every Namespace create, update and
//! delete. A namespace is a backup target when it carries both
//! `namespace.oam.dev/target: <non-empty>` and `usage.oam.dev/runtime: target`.
//! When a namespace becomes a target, a recurring Velero `Schedule` and an
//! instant `Backup` are created for it. When it stops being one, the schedule
//! is removed. The namespace operation itself is always allowed.

pub mod client;
pub mod config;
pub mod crd;
pub mod error;
pub mod orchestrator;
pub mod target;
pub mod transition;
pub mod webhook;
