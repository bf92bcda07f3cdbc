//
// Copyright 2024 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Error type for mailbox operations.

/// Errors surfaced to callers of mailbox operations.
///
/// None of these are retried internally; a timeout or protocol mismatch
/// generally indicates a firmware or hardware fault and callers are expected
/// to fail their own operation and propagate.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The firmware did not acknowledge within the operation's deadline.
    #[error("mailbox {mailbox} request timed out waiting for a reply")]
    Timeout { mailbox: u8 },
    /// The acknowledge header did not match the request in flight, which
    /// means host and firmware have desynchronized.
    #[error("unexpected acknowledge header {header:#04x} on mailbox {mailbox}")]
    Protocol { mailbox: u8, header: u8 },
    /// The firmware explicitly reported failure for the request.
    #[error("firmware returned failure status {status:#04x}")]
    RequestFailed { status: u8 },
    /// The caller passed an out-of-range argument; no mailbox traffic was
    /// generated.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}
