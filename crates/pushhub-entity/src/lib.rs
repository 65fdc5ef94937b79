//! # pushhub-entity
//!
//! Domain models for PushHub: apps and their provider credentials,
//! devices, notifications, delivery logs, and queue jobs. Row types derive
//! `sqlx::FromRow`; enums map to PostgreSQL enum types.

pub mod app;
pub mod delivery;
pub mod device;
pub mod job;
pub mod notification;
