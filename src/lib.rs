#![doc(test(attr(deny(warnings))))]

//! Campus Market drives the multi-step forms of a student marketplace:
//! account sign-up, profile setup, and item listing. Each form is a
//! [`wizard::Wizard`] over a flow definition, validated step by step and
//! submitted through injected auth, storage, and record collaborators.

pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod flows;
pub mod forms;
pub mod staging;
pub mod submission;
pub mod utils;
pub mod wizard;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Campus Market tracing initialized.");
    });
}
