//! backspace: run a coding agent against a repository and open a pull request.
//!
//! One [`pipeline::Pipeline`] run takes a repository URL and a task prompt
//! through these stages:
//!
//! - [`workspace`] clones the repository into a throwaway directory
//! - [`branch`] derives and checks out a work branch
//! - [`session`] drives the [`agent`] and folds its [`stream`] of events
//! - [`reconcile`] commits whatever the agent changed
//! - [`publish`] pushes the branch and opens a pull request
//!
//! Progress is reported through [`reporter`] as it happens.

pub mod agent;
pub mod branch;
pub mod config;
pub mod errors;
pub mod git;
pub mod github;
pub mod pipeline;
pub mod publish;
pub mod reconcile;
pub mod reporter;
pub mod server;
pub mod session;
pub mod stream;
pub mod workspace;
