use crate::{
    ClientError, Result,
    config::ClientConfig,
    transport::{Session, Transport, TransportError, TransportResponse},
};
use reqwest::StatusCode;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use tracing::{debug, warn};
use twitscrape_common::model::{
    Id,
    user::{ScreenName, UserMarker},
};

pub const USER_BY_SCREEN_NAME: QueryId =
    QueryId::new("Vf8si2dfZ1zmah8ePYPjDQ", "UserByScreenNameWithoutResults");
pub const USER_TWEETS: QueryId = QueryId::new("L15nBTK_B0O_NMEpnsH4MQ", "UserTweets");

/// A GraphQL operation, addressed as `{id}/{name}` under the base url.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct QueryId {
    pub id: &'static str,
    pub name: &'static str,
}

impl QueryId {
    #[must_use]
    pub const fn new(id: &'static str, name: &'static str) -> Self {
        Self { id, name }
    }
}

impl Display for QueryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.id, self.name)
    }
}

/// What to do with an `errors` payload on an otherwise successful response.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ApplicationErrors {
    Raise,
    /// The timeline query routinely returns benign errors next to usable data.
    Ignore,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Errors in query {:?}: {}", .query.name, .messages.join(", "))]
pub struct QueryError {
    pub query: QueryId,
    pub messages: Vec<String>,
    pub variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct UserByScreenNameData {
    user: UserRestId,
}

#[derive(Deserialize)]
struct UserRestId {
    rest_id: Id<UserMarker>,
}

pub struct QueryExecutor<T> {
    transport: T,
    base_url: String,
}

impl<T> QueryExecutor<T> {
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> QueryExecutor<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            base_url: config.graphql_base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Runs `query` until the remote service gives a usable answer.
    ///
    /// Transport failures and unexpected statuses are retried forever, each time
    /// on a fresh session. A 404 means the query no longer exists and is returned
    /// as [`ClientError::Incompatible`].
    pub fn execute(
        &self,
        query: QueryId,
        variables: &Value,
        application_errors: ApplicationErrors,
    ) -> Result<Value> {
        let url = format!("{}/{query}", self.base_url);
        let encoded_variables = variables.to_string();

        loop {
            let response = match self.attempt(&url, &encoded_variables) {
                Ok(response) => response,
                Err(err) if err.is_retryable() => {
                    debug!(error = %err, "Request failed, re-circuiting...");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match response.status {
                StatusCode::OK => {}
                StatusCode::NOT_FOUND => return Err(ClientError::Incompatible(query)),
                status => {
                    debug!(%status, "Request failed, re-circuiting...");
                    continue;
                }
            }

            let contents: GraphQlResponse = match serde_json::from_str(&response.body) {
                Ok(contents) => contents,
                Err(err) => {
                    debug!(error = %err, "Response was not valid JSON, re-circuiting...");
                    continue;
                }
            };

            if !contents.errors.is_empty() {
                let err = QueryError {
                    query,
                    messages: contents.errors.into_iter().map(|e| e.message).collect(),
                    variables: variables.clone(),
                };
                match application_errors {
                    ApplicationErrors::Raise => return Err(err.into()),
                    ApplicationErrors::Ignore => warn!(error = %err, "Ignoring query errors"),
                }
            }

            return contents.data.ok_or(ClientError::MissingData(query));
        }
    }

    fn attempt(
        &self,
        url: &str,
        encoded_variables: &str,
    ) -> Result<TransportResponse, TransportError> {
        let session = self.transport.open_session()?;
        session.get(url, &[("variables", encoded_variables)])
    }

    pub fn lookup_user_id(&self, screen_name: &ScreenName) -> Result<Id<UserMarker>> {
        let variables = json!({
            "screen_name": screen_name.get(),
            "withHighlightedLabel": true,
        });
        let data = self.execute(USER_BY_SCREEN_NAME, &variables, ApplicationErrors::Raise)?;
        let data: UserByScreenNameData = decode_data(USER_BY_SCREEN_NAME, data)?;

        Ok(data.user.rest_id)
    }
}

pub(crate) fn decode_data<D: DeserializeOwned>(query: QueryId, data: Value) -> Result<D> {
    serde_json::from_value(data).map_err(|source| ClientError::UnexpectedShape { query, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Attempt, StubTransport};

    fn executor(attempts: Vec<Attempt>) -> QueryExecutor<StubTransport> {
        QueryExecutor::new(StubTransport::new(attempts), &ClientConfig::default())
    }

    #[test]
    fn retries_until_success() {
        let executor = executor(vec![
            Attempt::respond(StatusCode::SERVICE_UNAVAILABLE, "nope"),
            Attempt::respond(StatusCode::TOO_MANY_REQUESTS, ""),
            Attempt::respond(StatusCode::OK, "<html>"),
            Attempt::respond(StatusCode::OK, r#"{"data": {"answer": 42}}"#),
        ]);

        let data = executor
            .execute(USER_TWEETS, &json!({}), ApplicationErrors::Raise)
            .unwrap();

        assert_eq!(data, json!({"answer": 42}));
        assert_eq!(executor.transport.sessions_opened(), 4);
    }

    #[test]
    fn not_found_is_fatal() {
        let executor = executor(vec![
            Attempt::respond(StatusCode::NOT_FOUND, ""),
            Attempt::respond(StatusCode::OK, r#"{"data": {}}"#),
        ]);

        let result = executor.execute(USER_TWEETS, &json!({}), ApplicationErrors::Ignore);

        assert!(matches!(result, Err(ClientError::Incompatible(USER_TWEETS))));
        assert_eq!(executor.transport.sessions_opened(), 1);
    }

    #[test]
    fn fatal_session_errors_propagate() {
        let executor = executor(vec![Attempt::fail(TransportError::GuestTokenRejected(
            StatusCode::FORBIDDEN,
        ))]);

        let result = executor.execute(USER_TWEETS, &json!({}), ApplicationErrors::Ignore);

        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::GuestTokenRejected(
                StatusCode::FORBIDDEN
            )))
        ));
    }

    #[test]
    fn application_errors_raise_or_ignore() {
        let body = r#"{"data": {"user": {}}, "errors": [{"message": "Not found"}, {"message": "Denied"}]}"#;

        let raised = executor(vec![Attempt::respond(StatusCode::OK, body)])
            .execute(USER_BY_SCREEN_NAME, &json!({"x": 1}), ApplicationErrors::Raise)
            .unwrap_err();
        let ClientError::Query(err) = raised else {
            panic!("expected query error, got {raised:?}");
        };
        assert_eq!(err.query, USER_BY_SCREEN_NAME);
        assert_eq!(err.messages, ["Not found", "Denied"]);
        assert_eq!(err.variables, json!({"x": 1}));
        assert_eq!(
            err.to_string(),
            "Errors in query \"UserByScreenNameWithoutResults\": Not found, Denied"
        );

        let ignored = executor(vec![Attempt::respond(StatusCode::OK, body)])
            .execute(USER_BY_SCREEN_NAME, &json!({}), ApplicationErrors::Ignore)
            .unwrap();
        assert_eq!(ignored, json!({"user": {}}));
    }

    #[test]
    fn requests_query_url_with_encoded_variables() {
        let executor = executor(vec![Attempt::respond(StatusCode::OK, r#"{"data": {}}"#)]);

        executor
            .execute(USER_TWEETS, &json!({"userId": "12"}), ApplicationErrors::Raise)
            .unwrap();

        let requests = executor.transport.requests();
        assert_eq!(
            requests,
            [(
                "https://twitter.com/i/api/graphql/L15nBTK_B0O_NMEpnsH4MQ/UserTweets".to_owned(),
                vec![("variables".to_owned(), r#"{"userId":"12"}"#.to_owned())]
            )]
        );
    }

    #[test]
    fn lookup_user_id_reads_rest_id() {
        let executor = executor(vec![Attempt::respond(
            StatusCode::OK,
            r#"{"data": {"user": {"rest_id": "783214", "legacy": {}}}}"#,
        )]);

        let user_id = executor.lookup_user_id(&"jack".parse().unwrap()).unwrap();

        assert_eq!(user_id, Id::new(783_214));
    }

    #[test]
    fn lookup_user_id_rejects_missing_user() {
        let executor = executor(vec![Attempt::respond(StatusCode::OK, r#"{"data": {}}"#)]);

        let result = executor.lookup_user_id(&"jack".parse().unwrap());

        assert!(matches!(result, Err(ClientError::UnexpectedShape { .. })));
    }
}
