use std::time::Duration;

use serde_derive::Deserialize;
use tracing::{debug, error, warn};

use crate::consumption::calculate_daily_consumption;
use crate::error::FullupError;
use crate::tank::{HistoryPoint, TankId, TankInfo, TankRecord};

const DEFAULT_BASE_URL: &str = "https://api.fullup.be";

/// Every call to the vendor API is independently bounded by this timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Token and tank-id set from one successful authentication round.
///
/// Kept as a single value that is replaced atomically so a token from one
/// round can never be paired with tank ids from another.
#[derive(Debug, Clone)]
struct AuthenticatedSession {
    token: String,
    tank_ids: Vec<TankId>,
}

/// Client for the Fullup tank telemetry API.
///
/// One instance per credential pair. The `reqwest::Client` is handed in by the
/// caller and shared; this client never tears it down. All batch entry points
/// authenticate lazily and convert failures into `false`/`None` sentinels, so
/// the polling scheduler simply tries again on its next cycle.
pub struct FullupClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    password: String,
    session: Option<AuthenticatedSession>,
}

#[derive(Deserialize)]
struct LoginEnvelope {
    #[serde(default)]
    result: Vec<TankId>,
}

#[derive(Deserialize)]
struct TokenEnvelope {
    result: TokenPayload,
}

#[derive(Deserialize)]
struct TokenPayload {
    #[serde(default)]
    token: String,
}

#[derive(Deserialize)]
struct TankInfoEnvelope {
    result: TankInfo,
}

// The deployed API answers with "result" on one firmware and "results" on
// another; accept both spellings.
#[derive(Deserialize)]
struct HistoryEnvelope {
    #[serde(alias = "results")]
    result: Vec<HistoryPoint>,
}

impl FullupClient {
    pub fn new(http: reqwest::Client, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_owned(),
            email: email.into(),
            password: password.into(),
            session: None,
        }
    }

    /// Points the client at a different API host. Used by tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Establishes a fresh session: fetches the account's tank ids, then a
    /// bearer token. Returns `true` only when both calls succeed and both
    /// values are non-empty. On `false` the session is cleared and unusable.
    pub async fn authenticate(&mut self) -> bool {
        self.session = None;

        let tank_ids = match self.fetch_tank_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                error!("Failed to get tank IDs: {err}");
                return false;
            }
        };

        let token = match self.fetch_token().await {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to generate authentication token: {err}");
                return false;
            }
        };

        if token.is_empty() || tank_ids.is_empty() {
            warn!(
                "Fullup login answered but returned an incomplete session \
                 (token empty: {}, tank list empty: {})",
                token.is_empty(),
                tank_ids.is_empty()
            );
            return false;
        }

        debug!("Authenticated with Fullup, {} tank(s) visible", tank_ids.len());
        self.session = Some(AuthenticatedSession { token, tank_ids });
        true
    }

    /// Fetches every tank the account owns, in the order the vendor listed
    /// them, each with its derived daily consumption attached.
    ///
    /// All-or-nothing: any single fetch failure discards the whole batch and
    /// yields `None`. An empty vec is a real answer ("zero tanks"), `None`
    /// means "could not retrieve".
    pub async fn get_tanks(&mut self) -> Option<Vec<TankRecord>> {
        if self.session.is_none() && !self.authenticate().await {
            return None;
        }

        match self.fetch_all_tanks().await {
            Ok(records) => Some(records),
            Err(err) => {
                error!("Failed to get tanks data: {err}");
                None
            }
        }
    }

    /// Fetches the measurement history for one tank, as received (unsorted).
    ///
    /// Unlike `get_tanks` this surfaces the failure cause: authentication
    /// problems and upstream/transport problems come back as distinct errors.
    pub async fn get_tank_history(
        &mut self,
        tank_id: &TankId,
    ) -> Result<Vec<HistoryPoint>, FullupError> {
        if self.session.is_none() && !self.authenticate().await {
            return Err(FullupError::AuthenticationFailure);
        }
        let session = self
            .session
            .as_ref()
            .ok_or(FullupError::AuthenticationFailure)?;
        self.fetch_history(session, tank_id).await
    }

    async fn fetch_tank_ids(&self) -> Result<Vec<TankId>, FullupError> {
        let response = self
            .http
            .get(format!("{}/loginApi", self.base_url))
            .query(&[("email", &self.email), ("password", &self.password)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let envelope: LoginEnvelope = Self::parse_success(response).await?;
        Ok(envelope.result)
    }

    async fn fetch_token(&self) -> Result<String, FullupError> {
        let response = self
            .http
            .post(format!("{}/auth/generate", self.base_url))
            .json(&serde_json::json!({
                "email": self.email,
                "password": self.password,
            }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let envelope: TokenEnvelope = Self::parse_success(response).await?;
        Ok(envelope.result.token)
    }

    // The session is read-only for the whole batch; no re-authentication can
    // happen mid-batch.
    async fn fetch_all_tanks(&self) -> Result<Vec<TankRecord>, FullupError> {
        let session = self
            .session
            .as_ref()
            .ok_or(FullupError::AuthenticationFailure)?;

        let mut records = Vec::with_capacity(session.tank_ids.len());
        for tank_id in &session.tank_ids {
            let info = self.fetch_info(session, tank_id).await?;
            let history = self.fetch_history(session, tank_id).await?;
            let daily_consumption = calculate_daily_consumption(&history);
            records.push(TankRecord {
                info,
                daily_consumption,
            });
        }
        Ok(records)
    }

    async fn fetch_info(
        &self,
        session: &AuthenticatedSession,
        tank_id: &TankId,
    ) -> Result<TankInfo, FullupError> {
        let response = self
            .http
            .get(format!("{}/tanks_public/{tank_id}", self.base_url))
            .bearer_auth(&session.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let envelope: TankInfoEnvelope = Self::parse_success(response).await?;
        Ok(envelope.result)
    }

    async fn fetch_history(
        &self,
        session: &AuthenticatedSession,
        tank_id: &TankId,
    ) -> Result<Vec<HistoryPoint>, FullupError> {
        let response = self
            .http
            .get(format!("{}/tanks/{tank_id}/data", self.base_url))
            .bearer_auth(&session.token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let envelope: HistoryEnvelope = Self::parse_success(response).await?;
        Ok(envelope.result)
    }

    /// Rejects non-2xx responses with the status attached, then decodes the
    /// body. A body that does not match the expected shape is a data error,
    /// not a crash.
    async fn parse_success<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FullupError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FullupError::Upstream { status });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| FullupError::Data(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    const EMAIL: &str = "owner@example.com";
    const PASSWORD: &str = "hunter2";
    const TOKEN: &str = "test-token";

    fn client(server: &ServerGuard) -> FullupClient {
        FullupClient::new(reqwest::Client::new(), EMAIL, PASSWORD).with_base_url(server.url())
    }

    async fn mock_login(server: &mut ServerGuard, tank_ids: serde_json::Value) -> mockito::Mock {
        server
            .mock("GET", "/loginApi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("email".into(), EMAIL.into()),
                Matcher::UrlEncoded("password".into(), PASSWORD.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "result": tank_ids }).to_string())
            .create_async()
            .await
    }

    async fn mock_token(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/auth/generate")
            .match_body(Matcher::Json(json!({
                "email": EMAIL,
                "password": PASSWORD,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "result": { "token": TOKEN } }).to_string())
            .create_async()
            .await
    }

    async fn mock_info(server: &mut ServerGuard, tank_id: &str, volume: f64) -> mockito::Mock {
        server
            .mock("GET", format!("/tanks_public/{tank_id}").as_str())
            .match_header("Authorization", format!("Bearer {TOKEN}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "result": {
                        "tank_id": tank_id,
                        "tank_name": format!("Tank {tank_id}"),
                        "current_volume": volume,
                        "tank_total_volume": 2000.0,
                    }
                })
                .to_string(),
            )
            .create_async()
            .await
    }

    async fn mock_history(
        server: &mut ServerGuard,
        tank_id: &str,
        key: &str,
        points: serde_json::Value,
    ) -> mockito::Mock {
        server
            .mock("GET", format!("/tanks/{tank_id}/data").as_str())
            .match_header("Authorization", format!("Bearer {TOKEN}").as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ key: points }).to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn authenticate_succeeds_with_token_and_tanks() {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, json!([101, 102])).await;
        let token = mock_token(&mut server).await;

        let mut client = client(&server);
        assert!(client.authenticate().await);
        assert!(client.is_authenticated());

        login.assert_async().await;
        token.assert_async().await;
    }

    #[tokio::test]
    async fn authenticate_fails_when_token_fetch_fails() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([101])).await;
        server
            .mock("POST", "/auth/generate")
            .with_status(401)
            .create_async()
            .await;

        let mut client = client(&server);
        assert!(!client.authenticate().await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_fails_when_tank_id_fetch_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/loginApi")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        mock_token(&mut server).await;

        let mut client = client(&server);
        assert!(!client.authenticate().await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_fails_on_empty_tank_list_despite_2xx() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([])).await;
        mock_token(&mut server).await;

        let mut client = client(&server);
        assert!(!client.authenticate().await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_clears_a_previous_session_on_failure() {
        let mut server = Server::new_async().await;
        let login = mock_login(&mut server, json!([101])).await;
        let token = mock_token(&mut server).await;

        let mut client = client(&server);
        assert!(client.authenticate().await);

        login.remove_async().await;
        token.remove_async().await;
        server
            .mock("GET", "/loginApi")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        assert!(!client.authenticate().await);
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn get_tanks_preserves_tank_id_order_and_attaches_consumption() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([101, 102])).await;
        mock_token(&mut server).await;
        mock_info(&mut server, "101", 1000.0).await;
        mock_info(&mut server, "102", 500.0).await;
        // 101: (1030 - 1000) / (26h / 24h) = 27.69... -> 27.7
        mock_history(
            &mut server,
            "101",
            "result",
            json!([
                { "date": "2023-06-02T14:00:00Z", "volume": 1000.0 },
                { "date": "2023-06-01T12:00:00Z", "volume": 1030.0 },
            ]),
        )
        .await;
        mock_history(&mut server, "102", "result", json!([])).await;

        let mut client = client(&server);
        let tanks = client.get_tanks().await.expect("batch should succeed");

        assert_eq!(tanks.len(), 2);
        assert_eq!(tanks[0].info.tank_id, TankId::from("101"));
        assert_eq!(tanks[1].info.tank_id, TankId::from("102"));
        assert_eq!(tanks[0].daily_consumption, 27.7);
        assert_eq!(tanks[1].daily_consumption, 0.0);
        assert_eq!(tanks[0].fill_level_percentage(), Some(50.0));
    }

    #[tokio::test]
    async fn get_tanks_returns_none_when_one_tank_fails() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([101, 102, 103])).await;
        mock_token(&mut server).await;
        mock_info(&mut server, "101", 1000.0).await;
        mock_history(&mut server, "101", "result", json!([])).await;
        server
            .mock("GET", "/tanks_public/102")
            .with_status(502)
            .create_async()
            .await;
        mock_info(&mut server, "103", 300.0).await;
        mock_history(&mut server, "103", "result", json!([])).await;

        let mut client = client(&server);
        assert_eq!(client.get_tanks().await, None);
    }

    #[tokio::test]
    async fn get_tanks_returns_none_when_authentication_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/loginApi")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let mut client = client(&server);
        assert_eq!(client.get_tanks().await, None);
    }

    #[tokio::test]
    async fn get_tank_history_distinguishes_auth_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/loginApi")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let mut client = client(&server);
        let err = client
            .get_tank_history(&TankId::from("101"))
            .await
            .unwrap_err();
        assert!(matches!(err, FullupError::AuthenticationFailure));
    }

    #[tokio::test]
    async fn get_tank_history_carries_the_upstream_status() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([101])).await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/tanks/101/data")
            .with_status(404)
            .create_async()
            .await;

        let mut client = client(&server);
        let err = client
            .get_tank_history(&TankId::from("101"))
            .await
            .unwrap_err();
        assert_eq!(
            err.upstream_status(),
            Some(reqwest::StatusCode::NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn get_tank_history_accepts_the_results_spelling() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([101])).await;
        mock_token(&mut server).await;
        mock_history(
            &mut server,
            "101",
            "results",
            json!([{ "date": "2023-06-01T12:00:00Z", "volume": 850.0 }]),
        )
        .await;

        let mut client = client(&server);
        let history = client.get_tank_history(&TankId::from("101")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].volume, 850.0);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_data_error() {
        let mut server = Server::new_async().await;
        mock_login(&mut server, json!([101])).await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/tanks/101/data")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"unexpected": true}"#)
            .create_async()
            .await;

        let mut client = client(&server);
        let err = client
            .get_tank_history(&TankId::from("101"))
            .await
            .unwrap_err();
        assert!(matches!(err, FullupError::Data(_)));
    }
}
