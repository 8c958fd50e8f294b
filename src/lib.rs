pub mod ai_providers;
pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod logging;
pub mod models;
pub mod tutor_service;

pub use ai_providers::{build_chain, AiProvider, AskOutcome, ProviderFactory, ProviderRegistry};
pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use models::*;
pub use tutor_service::{derive_verdict, ResolvedAnswer, TaskDraft, TutorService};
