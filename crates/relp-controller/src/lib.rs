/*
 * 5D Labs RELP Forwarding Extension - Node log and audit shipping for managed clusters
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! RELP forwarding extension core library
//!
//! This crate provides the node configuration reconciler for the rsyslog RELP
//! extension: the tenant configuration model, the pure artifact synthesizer,
//! the node-side apply and cleanup programs, observability wiring and the
//! Kubernetes controller that drives the per-tenant lifecycle.

pub mod apis;
pub mod cleanup;
pub mod crds;
pub mod monitoring;
pub mod synthesis;
pub mod tasks;

// Re-export commonly used types
pub use apis::{parse_config, set_defaults, validate_config, FieldError, FieldErrors, RsyslogRelpConfig};
pub use crds::{ClusterContext, NodeBundle, RsyslogRelp, RsyslogRelpSpec, RsyslogRelpStatus};
pub use synthesis::{synthesize, ArtifactSet};
pub use tasks::config::ControllerConfig;
