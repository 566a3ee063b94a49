//! Vaultsync Core - Domain logic and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `BackupTarget`, `Schedule`, `ScheduleRegistry`, `CronExpr`
//! - **Configuration** - `Config`, `StoreConfig` and the override resolver
//! - **Port definitions** - Traits for adapters: `IObjectStore`, `IDumpProducer`
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The sync engine, trigger engine and orchestrator live in `vaultsync-sync`.

pub mod config;
pub mod domain;
pub mod ports;
