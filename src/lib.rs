//! Core library for the `stampede` load-generation worker.
//!
//! This crate is one node of a distributed load-generation fleet: a central
//! coordinator assigns a test case (step sequence, target concurrency, ramp
//! profile, per-step rate ceilings), and the worker drives that case with many
//! parallel executors, folds per-call latencies into approximate quantile
//! sketches, and streams them back to the coordinator. The embedding
//! application registers [`case::CaseDefinition`]s on a [`worker::WorkerRunner`]
//! and drives its poll loop; there is no CLI here.
pub mod case;
pub mod control;
pub mod error;
pub mod gate;
pub mod logger;
pub mod metrics;
pub mod params;
pub mod record;
pub mod runner;
pub mod worker;
