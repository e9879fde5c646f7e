pub mod batch;
pub mod config;
pub mod query;
pub mod stream;
pub mod timeline;
pub mod transport;

#[cfg(test)]
mod testing;

use crate::{batch::MalformedPageError, query::QueryError, query::QueryId, transport::TransportError};
use thiserror::Error;
use twitscrape_common::model::raw::DecodeError;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(
        "The query {0} returned a 404, this likely means the API has changed and this client is \
        no longer compatible"
    )]
    Incompatible(QueryId),
    #[error("The query {0} returned no data")]
    MissingData(QueryId),
    #[error("The response to query {query} had an unexpected shape: {source}")]
    UnexpectedShape {
        query: QueryId,
        source: serde_json::Error,
    },
    #[error("Malformed page: {0}")]
    MalformedPage(#[from] MalformedPageError),
    #[error("Could not decode post: {0}")]
    Decode(#[from] DecodeError),
}
