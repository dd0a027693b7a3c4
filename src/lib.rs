//! Loopgate: an agentic tool-use chat loop with risk-gated human approval.
//!
//! A turn streams model output, dispatches the tools the model asks for and
//! feeds results back until the model stops calling tools. Tools at or above
//! [`tools::RiskLevel::Medium`] suspend the turn behind a pending approval;
//! a later decision resumes it from the stored history.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use loopgate::prelude::*;
//!
//! # async fn example() -> loopgate::error::Result<()> {
//! let config = LoopConfig::load(None)?;
//! let agent = Arc::new(ChatAgent::from_config(&config)?);
//! let conversation = agent.store().create_conversation(None).await?;
//!
//! let mut events = agent.initiate(conversation.id, "What files are here?".into());
//! while let Some(event) = events.next().await {
//!     if let StreamEvent::ToolApproval(request) = &event {
//!         let _resumed = agent.resume(request.id, true);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod conversation;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;

#[cfg(feature = "server")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;
