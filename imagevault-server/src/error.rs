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

//! Maps `imagevault_error::Code` to HTTP status, per `SPEC_FULL.md` §7.
//! Internal context (`Error::messages`) is logged but never serialized
//! into the response body, the way the teacher's gRPC services log a
//! `Status`'s detail server-side while returning a generic code to the
//! wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use imagevault_error::{Code, Error};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, public_message) = match self.0.code {
            Code::InvalidArgument => (StatusCode::BAD_REQUEST, "invalid request"),
            Code::FailedPrecondition => (StatusCode::UNPROCESSABLE_ENTITY, "request could not be processed"),
            Code::NotFound => (StatusCode::NOT_FOUND, "not found"),
            Code::Unavailable => (StatusCode::BAD_GATEWAY, "storage backend unavailable"),
            Code::Internal => (StatusCode::SERVICE_UNAVAILABLE, "internal error"),
            Code::Fatal => (StatusCode::SERVICE_UNAVAILABLE, "fatal error"),
        };
        if status.is_server_error() {
            tracing::error!(code = ?self.0.code, detail = %self.0, "request failed");
        } else {
            tracing::debug!(code = ?self.0.code, detail = %self.0, "request rejected");
        }
        (status, Json(ErrorBody { error: public_message.to_string() })).into_response()
    }
}
