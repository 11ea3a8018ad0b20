// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP client for the door controller.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::tracker::DoorCommand;
use crate::error::ProtocolError;

#[derive(Debug, Deserialize)]
struct StateBody {
    open: bool,
}

/// Calls the door controller's `/open`, `/close` and `/state` endpoints.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use door_opener::monitor::{DoorClient, DoorCommand};
///
/// # async fn example() -> Result<(), door_opener::error::ProtocolError> {
/// let door = DoorClient::new("http://192.168.1.50:3000", Duration::from_secs(5))?;
/// if !door.state().await? {
///     door.send(DoorCommand::Open).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DoorClient {
    base_url: String,
    client: Client,
}

impl DoorClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a client for the controller at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an http(s) URL or the HTTP
    /// client cannot be created.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProtocolError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ProtocolError::InvalidAddress(base_url));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(Self { base_url, client })
    }

    /// Returns the controller base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends `command`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the controller answers with
    /// a non-success status.
    pub async fn send(&self, command: DoorCommand) -> Result<(), ProtocolError> {
        self.get(command.path()).await.map(drop)
    }

    /// Opens the door.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn open(&self) -> Result<(), ProtocolError> {
        self.send(DoorCommand::Open).await
    }

    /// Closes the door.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn close(&self) -> Result<(), ProtocolError> {
        self.send(DoorCommand::Close).await
    }

    /// Polls whether the controller believes the door is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not `{"open": bool}`.
    pub async fn state(&self) -> Result<bool, ProtocolError> {
        let body: StateBody = self.get("/state").await?.json().await?;
        Ok(body.open)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ProtocolError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(url = %url, "Sending door request");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProtocolError::UnexpectedStatus(status.as_u16()));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = DoorClient::new("http://door.local:3000/", DoorClient::DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base_url(), "http://door.local:3000");
    }

    #[test]
    fn rejects_non_http_url() {
        assert!(matches!(
            DoorClient::new("door.local:3000", DoorClient::DEFAULT_TIMEOUT),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }
}
