// Copyright 2024 The Imagevault Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// Operational mode of the server process.
#[allow(non_camel_case_types)]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationalMode {
    /// Normal request-serving mode.
    #[default]
    serve,
    /// Runs startup checks (config validation, backend connectivity) and
    /// exits without binding a listener. Useful for container health
    /// probes run as a separate command.
    check,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Operational mode. Defaults to `serve`.
    #[serde(default)]
    pub mode: OperationalMode,

    /// How long to wait for in-flight requests to finish after receiving
    /// SIGINT/SIGTERM before forcing shutdown.
    ///
    /// Default: 30s
    #[serde(default = "default_drain_seconds")]
    pub graceful_shutdown_drain_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_port: default_listen_port(),
            mode: OperationalMode::default(),
            graceful_shutdown_drain_seconds: default_drain_seconds(),
        }
    }
}

const fn default_listen_port() -> u16 {
    8080
}

const fn default_drain_seconds() -> u64 {
    30
}
