// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ambient process layer for running a key transparency directory node:
//! CLI args and configuration, logging, signal handling, the framed RPC
//! and HTTP/JSON gateway surfaces (§6), and the glue ([`service::Service`])
//! tying them to [`kt_directory`]'s admin/read/write paths.

pub mod args;
pub mod cfg;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod node;
pub mod rpc;
pub mod service;
pub mod signals;
pub mod wire;
