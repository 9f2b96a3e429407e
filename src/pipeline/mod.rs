//! Batch orchestration of archive jobs
//!
//! `Analyzing -> Fetching -> Encoding -> Uploading -> Notifying -> Done`,
//! or `Failed` when nothing could be archived or the upload fails.

mod batch;
mod orchestrator;

pub use batch::{CollectionProfile, PlannedFile, Risk, assign_entry_names, plan_batches};
pub use orchestrator::{
    JobOutcome, JobPhase, NO_FILES_PROCESSED, Orchestrator, PipelineSettings, PipelineSetupError,
};
