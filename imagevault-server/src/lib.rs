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

//! External Interface Layer (C7): the HTTP surface (`axum`), auth,
//! rate limiting, metrics, and graceful-shutdown wiring over
//! `imagevault-service`, per `spec.md` §6.

pub mod auth;
pub mod dto;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
